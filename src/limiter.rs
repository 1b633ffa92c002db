//! Sliding-window rate limiter for on-demand rating checks.
//!
//! Keeps the instants of recent admitted requests per subscriber. Stale
//! instants are pruned lazily on every admission attempt, so a window never
//! holds more than `max_requests` entries after it is touched. State lives
//! only in memory and is reset by a restart.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

pub const DEFAULT_MAX_REQUESTS: usize = 5;
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(300);

pub struct RateLimiter {
    /// Map of subscriber → instants of admitted requests, oldest first
    windows: Mutex<HashMap<String, VecDeque<Instant>>>,
    /// Maximum admissions per window
    max_requests: usize,
    window: Duration,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            max_requests,
            window,
        }
    }

    /// Admit or reject a request made at `now`. Records `now` on success.
    pub fn admit(&self, subscriber_id: &str, now: Instant) -> bool {
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
        let timestamps = windows.entry(subscriber_id.to_string()).or_default();

        while let Some(&oldest) = timestamps.front() {
            if now.duration_since(oldest) >= self.window {
                timestamps.pop_front();
            } else {
                break;
            }
        }

        if timestamps.len() >= self.max_requests {
            return false;
        }

        timestamps.push_back(now);
        true
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_REQUESTS, DEFAULT_WINDOW)
    }
}
