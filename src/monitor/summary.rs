//! Daily summary: drains the check counters once a day into the log channel.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::Arc;
use tokio::time::{self, Duration};
use tracing::info;

use super::stats::StatsCollector;
use crate::messages;
use crate::notify::ChannelLog;

/// Time from `now` until the next `hour_utc:00:00`. Never zero.
pub fn until_next(now: DateTime<Utc>, hour_utc: u32) -> Duration {
    let Some(today) = now.date_naive().and_hms_opt(hour_utc, 0, 0) else {
        return Duration::from_secs(24 * 3600);
    };
    let mut next = DateTime::<Utc>::from_naive_utc_and_offset(today, Utc);
    if next <= now {
        next += ChronoDuration::days(1);
    }
    (next - now).to_std().unwrap_or(Duration::from_secs(24 * 3600))
}

/// Post the summary every day at `hour_utc`.
pub async fn run_summary(stats: Arc<StatsCollector>, log: Arc<ChannelLog>, hour_utc: u32) {
    info!(hour_utc, "Daily summary scheduled");
    loop {
        time::sleep(until_next(Utc::now(), hour_utc)).await;

        let totals = stats.drain();
        info!(
            checked = totals.checked,
            changed = totals.changed,
            errors = totals.errors,
            "Daily summary"
        );
        log.send(&messages::daily_summary(&totals), true).await;
    }
}
