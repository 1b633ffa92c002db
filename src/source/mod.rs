//! Rating source: resolves a username to its current hackerlab.pro rating.
//!
//! The upstream is unstable: the JSON API is cheaper but not every profile
//! is reachable through it, and the rendered profile page is slower but
//! almost always present. Each lookup walks an ordered list of strategies
//! and returns the first value any of them produces. Every strategy is
//! attempted at most once per lookup; retrying is left to the caller
//! (the next poll cycle or the next user request).

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

pub mod api;
pub mod page;

/// A leaderboard rating. Always non-negative.
pub type Rating = u64;

// ── Errors ──────────────────────────────────────────────────────────

/// Why a single strategy failed to produce a rating.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("upstream status error: {0}")]
    UpstreamStatus(String),
    #[error("parse error: {0}")]
    Parse(String),
}

/// Coarse failure classification exposed on a [`RatingLookup`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    Transport,
    UpstreamStatus,
    Parse,
    NotFound,
}

impl FetchError {
    pub fn reason(&self) -> FailureReason {
        match self {
            FetchError::Transport(_) => FailureReason::Transport,
            FetchError::UpstreamStatus(_) => FailureReason::UpstreamStatus,
            FetchError::Parse(_) => FailureReason::Parse,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => FetchError::UpstreamStatus(format!("HTTP {}", status)),
            None => FetchError::Transport(e.to_string()),
        }
    }
}

// ── Lookup Result ───────────────────────────────────────────────────

/// Outcome of one [`RateSource::fetch_rating`] call.
///
/// `rating: None` with `failure: None` means every strategy answered
/// cleanly but none of them had a value for this user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RatingLookup {
    pub rating: Option<Rating>,
    pub failure: Option<FailureReason>,
}

impl RatingLookup {
    pub fn found(rating: Rating) -> Self {
        Self { rating: Some(rating), failure: None }
    }

    pub fn failed(reason: FailureReason) -> Self {
        Self { rating: None, failure: Some(reason) }
    }

    pub fn absent() -> Self {
        Self { rating: None, failure: None }
    }
}

// ── Strategy Trait ──────────────────────────────────────────────────

/// One way of reading a rating from upstream.
///
/// `Ok(None)` means the upstream answered but had no value; the next
/// strategy is still tried.
#[async_trait]
pub trait RatingStrategy: Send + Sync {
    /// Short identifier used in logs (e.g., "api", "page").
    fn name(&self) -> &str;

    /// Fetch the rating for an already-normalized username.
    async fn fetch(&self, username: &str) -> Result<Option<Rating>, FetchError>;
}

/// Strip surrounding whitespace; `None` if nothing is left.
pub fn normalize_username(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

/// Parse upstream text as a base-10 rating. No lenient coercion.
pub fn parse_rating(text: &str) -> Result<Rating, FetchError> {
    text.parse::<Rating>()
        .map_err(|_| FetchError::Parse(format!("'{}' is not a non-negative integer", text)))
}

// ── Public API ──────────────────────────────────────────────────────

/// Ordered fallback over a list of strategies.
pub struct RateSource {
    strategies: Vec<Box<dyn RatingStrategy>>,
}

impl RateSource {
    pub fn new(strategies: Vec<Box<dyn RatingStrategy>>) -> Self {
        Self { strategies }
    }

    /// The production chain: JSON API first, rendered profile page second.
    pub fn hackerlab(
        client: reqwest::Client,
        api_base: reqwest::Url,
        page_base: reqwest::Url,
    ) -> Self {
        Self::new(vec![
            Box::new(api::ApiStrategy::new(client.clone(), api_base)),
            Box::new(page::PageStrategy::new(client, page_base)),
        ])
    }

    /// Resolve `username` to a rating, trying each strategy in order.
    pub async fn fetch_rating(&self, username: &str) -> RatingLookup {
        let username = match normalize_username(username) {
            Some(u) => u,
            None => {
                debug!("Empty username rejected before lookup");
                return RatingLookup::failed(FailureReason::NotFound);
            }
        };

        let mut saw_error = false;
        for strategy in &self.strategies {
            match strategy.fetch(username).await {
                Ok(Some(rating)) => {
                    debug!(username = %username, strategy = strategy.name(), rating, "Rating resolved");
                    return RatingLookup::found(rating);
                }
                Ok(None) => {
                    debug!(username = %username, strategy = strategy.name(), "Strategy had no rating");
                }
                Err(e) => {
                    saw_error = true;
                    warn!(
                        username = %username,
                        strategy = strategy.name(),
                        reason = ?e.reason(),
                        "Rating strategy failed: {}",
                        e
                    );
                }
            }
        }

        if saw_error {
            RatingLookup::failed(FailureReason::NotFound)
        } else {
            RatingLookup::absent()
        }
    }

    /// Convenience wrapper for callers that only care about the value.
    pub async fn rating(&self, username: &str) -> Option<Rating> {
        self.fetch_rating(username).await.rating
    }
}
