//! On-demand request path: check, add, remove and list for one subscriber.
//!
//! Every operation returns the text to show the user. Checks go through
//! the rate limiter before any network call and never touch the stored
//! ratings; only the monitor writes those.

use reqwest::Url;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

use crate::limiter::RateLimiter;
use crate::messages;
use crate::notify::{Action, ChannelLog};
use crate::source::{normalize_username, RateSource};
use crate::store::{StoreError, TrackingStore};

/// Who is asking: the subscriber key plus an HTML link for log lines.
#[derive(Debug, Clone)]
pub struct Caller {
    pub subscriber_id: String,
    pub link: String,
}

impl Caller {
    pub fn new(subscriber_id: impl Into<String>) -> Self {
        let subscriber_id = subscriber_id.into();
        let link = messages::subscriber_link(&subscriber_id);
        Self { subscriber_id, link }
    }

    pub fn with_link(subscriber_id: impl Into<String>, link: String) -> Self {
        Self { subscriber_id: subscriber_id.into(), link }
    }
}

pub struct OnDemandHandler {
    source: Arc<RateSource>,
    limiter: Arc<RateLimiter>,
    store: Arc<TrackingStore>,
    log: Arc<ChannelLog>,
    page_base: Url,
}

impl OnDemandHandler {
    pub fn new(
        source: Arc<RateSource>,
        limiter: Arc<RateLimiter>,
        store: Arc<TrackingStore>,
        log: Arc<ChannelLog>,
        page_base: Url,
    ) -> Self {
        Self { source, limiter, store, log, page_base }
    }

    /// One-off rating lookup. Does not enroll the username in monitoring.
    pub async fn check(&self, caller: &Caller, raw_username: &str) -> String {
        let Some(username) = normalize_username(raw_username) else {
            return messages::ENTER_USERNAME.to_string();
        };

        if !self.limiter.admit(&caller.subscriber_id, Instant::now()) {
            info!(subscriber = %caller.subscriber_id, "On-demand check rate-limited");
            return messages::RATE_LIMITED.to_string();
        }

        match self.source.rating(username).await {
            Some(rating) => {
                let detail = format!("{} = {}", messages::profile_link(&self.page_base, username), rating);
                self.log.action(&caller.link, Action::Check, Some(&detail)).await;
                messages::current_rating(&self.page_base, username, rating)
            }
            None => {
                self.log.error(
                    &caller.link,
                    Action::Check,
                    &messages::fetch_failed_detail(&self.page_base, username),
                ).await;
                messages::CHECK_FAILED.to_string()
            }
        }
    }

    /// Start monitoring a username. A failed first fetch still adds it.
    pub async fn add(&self, caller: &Caller, raw_username: &str) -> String {
        let Some(username) = normalize_username(raw_username) else {
            return messages::ENTER_USERNAME.to_string();
        };
        let subscriber = caller.subscriber_id.as_str();

        // Reject before spending a network call.
        if let Err(e) = self.store.ensure_can_add(subscriber, username) {
            return self.store_rejection(caller, Action::Add, e);
        }

        let initial = self.source.rating(username).await;
        if initial.is_none() {
            warn!(subscriber = %subscriber, username = %username, "Adding without an initial rating");
            self.log.error(
                &caller.link,
                Action::Add,
                &messages::fetch_failed_detail(&self.page_base, username),
            ).await;
        }

        match self.store.add_tracked(subscriber, username, initial) {
            Ok(()) => {
                let link = messages::profile_link(&self.page_base, username);
                self.log.action(&caller.link, Action::Add, Some(&link)).await;
                messages::ADDED.to_string()
            }
            Err(e) => self.store_rejection(caller, Action::Add, e),
        }
    }

    pub async fn remove(&self, caller: &Caller, raw_username: &str) -> String {
        let Some(username) = normalize_username(raw_username) else {
            return messages::ENTER_USERNAME.to_string();
        };

        match self.store.remove_tracked(&caller.subscriber_id, username) {
            Ok(()) => {
                let link = messages::profile_link(&self.page_base, username);
                self.log.action(&caller.link, Action::Remove, Some(&link)).await;
                messages::REMOVED.to_string()
            }
            Err(e) => self.store_rejection(caller, Action::Remove, e),
        }
    }

    pub async fn list(&self, caller: &Caller) -> String {
        let entries = match self.store.list_tracked(&caller.subscriber_id) {
            Ok(entries) => entries,
            Err(e) => return self.store_rejection(caller, Action::List, e),
        };

        let detail = format!("пользователей: {}", entries.len());
        self.log.action(&caller.link, Action::List, Some(&detail)).await;
        messages::tracked_list(&self.page_base, entries.iter().map(|e| e.username.as_str()))
    }

    /// Prompt for the remove flow, or `None` when nothing is tracked.
    pub fn remove_prompt(&self, caller: &Caller) -> Result<Option<String>, StoreError> {
        let entries = self.store.list_tracked(&caller.subscriber_id)?;
        if entries.is_empty() {
            return Ok(None);
        }
        Ok(Some(messages::remove_prompt(entries.iter().map(|e| e.username.as_str()))))
    }

    fn store_rejection(&self, caller: &Caller, action: Action, e: StoreError) -> String {
        match e {
            StoreError::DuplicateEntry => messages::ALREADY_TRACKED.to_string(),
            StoreError::CapacityExceeded { .. } => messages::LIMIT_REACHED.to_string(),
            StoreError::NotFound => messages::NOT_TRACKED.to_string(),
            other => {
                error!(
                    subscriber = %caller.subscriber_id,
                    action = action.label(),
                    "Store operation failed: {}",
                    other
                );
                messages::STORE_FAILURE.to_string()
            }
        }
    }
}
