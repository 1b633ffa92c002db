//! Rating monitor: polls every tracked username on a fixed interval.
//!
//! One cycle snapshots all tracked entries, fetches each rating once,
//! persists changes with a compare-and-set and notifies the owning
//! subscriber. Cycles never overlap: the loop awaits a cycle before
//! waiting for the next tick, and ticks missed while a cycle ran are
//! skipped. A failing entry never stops the rest of the cycle.

use anyhow::{Context, Result};
use reqwest::Url;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{self, Duration, MissedTickBehavior};
use tracing::{debug, error, info, warn, Instrument};

use crate::messages;
use crate::notify::{Action, ChannelLog, Notifier};
use crate::source::RateSource;
use crate::store::{TrackedEntry, TrackingStore};

pub mod detector;
pub mod stats;
pub mod summary;

use stats::{CycleReport, StatsCollector};

/// How one entry fared within a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryOutcome {
    FetchFailed,
    Unchanged,
    Changed { delivered: bool },
    /// The row changed or vanished after the cycle snapshot.
    Stale,
    StoreFailed,
}

impl CycleReport {
    fn record(&mut self, outcome: EntryOutcome) {
        self.checked += 1;
        match outcome {
            EntryOutcome::FetchFailed | EntryOutcome::StoreFailed => self.errors += 1,
            EntryOutcome::Changed { delivered } => {
                self.changed += 1;
                if !delivered {
                    self.errors += 1;
                }
            }
            EntryOutcome::Unchanged | EntryOutcome::Stale => {}
        }
    }
}

pub struct Monitor {
    source: Arc<RateSource>,
    store: Arc<TrackingStore>,
    notifier: Arc<dyn Notifier>,
    log: Arc<ChannelLog>,
    stats: Arc<StatsCollector>,
    page_base: Url,
    /// Entries fetched concurrently within one cycle
    concurrency: usize,
}

impl Monitor {
    pub fn new(
        source: Arc<RateSource>,
        store: Arc<TrackingStore>,
        notifier: Arc<dyn Notifier>,
        log: Arc<ChannelLog>,
        stats: Arc<StatsCollector>,
        page_base: Url,
        concurrency: usize,
    ) -> Self {
        Self {
            source,
            store,
            notifier,
            log,
            stats,
            page_base,
            concurrency: concurrency.max(1),
        }
    }

    /// Run one full pass over every entry tracked at cycle start.
    pub async fn run_cycle(self: &Arc<Self>) -> Result<CycleReport> {
        let entries = self.store.list_all_tracked()
            .context("Failed to list tracked entries")?;

        info!(entries = entries.len(), "Starting monitoring cycle");

        let permits = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();
        for entry in entries {
            let monitor = Arc::clone(self);
            let permits = Arc::clone(&permits);
            tasks.spawn(
                async move {
                    let _permit = permits.acquire_owned().await.ok();
                    monitor.check_entry(entry).await
                }
                .in_current_span(),
            );
        }

        let mut report = CycleReport::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => report.record(outcome),
                Err(e) => {
                    error!("Entry check task failed: {}", e);
                    report.record(EntryOutcome::FetchFailed);
                }
            }
        }

        self.stats.record(&report);
        info!(
            checked = report.checked,
            changed = report.changed,
            errors = report.errors,
            "Monitoring cycle complete"
        );
        Ok(report)
    }

    async fn check_entry(&self, entry: TrackedEntry) -> EntryOutcome {
        let lookup = self.source.fetch_rating(&entry.username).await;
        let current = match lookup.rating {
            Some(rating) => rating,
            None => {
                warn!(
                    subscriber = %entry.subscriber_id,
                    username = %entry.username,
                    failure = ?lookup.failure,
                    "Rating unavailable"
                );
                self.log.error(
                    &messages::subscriber_link(&entry.subscriber_id),
                    Action::Monitoring,
                    &messages::fetch_failed_detail(&self.page_base, &entry.username),
                ).await;
                return EntryOutcome::FetchFailed;
            }
        };

        let event = match detector::detect(&entry, current) {
            Some(event) => event,
            None => return EntryOutcome::Unchanged,
        };

        match self.store.update_rating(&entry.subscriber_id, &entry.username, entry.last_rating, current) {
            Ok(true) => {}
            Ok(false) => {
                debug!(
                    subscriber = %entry.subscriber_id,
                    username = %entry.username,
                    "Entry changed since cycle start — skipping"
                );
                return EntryOutcome::Stale;
            }
            Err(e) => {
                error!(
                    subscriber = %entry.subscriber_id,
                    username = %entry.username,
                    "Failed to persist rating: {}",
                    e
                );
                return EntryOutcome::StoreFailed;
            }
        }

        info!(
            subscriber = %event.subscriber_id,
            username = %event.username,
            previous = ?event.previous_rating,
            current = event.new_rating,
            "Rating changed"
        );

        // The rating stays recorded even if the subscriber never sees this.
        match self.notifier.deliver(&event.subscriber_id, &event.message(&self.page_base)).await {
            Ok(()) => EntryOutcome::Changed { delivered: true },
            Err(e) => {
                error!(subscriber = %event.subscriber_id, username = %event.username, "Notification failed: {}", e);
                self.log.error(
                    &messages::subscriber_link(&event.subscriber_id),
                    Action::Monitoring,
                    &messages::delivery_failed_detail(&self.page_base, &event.username),
                ).await;
                EntryOutcome::Changed { delivered: false }
            }
        }
    }
}

/// Run the monitor in the background. The first cycle starts one full
/// interval after launch.
pub async fn run_monitor(monitor: Arc<Monitor>, every: Duration) {
    info!(interval_secs = every.as_secs(), "📡 Rating monitor started");

    let mut interval = time::interval(every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval.tick().await; // Skip the immediate tick

    loop {
        interval.tick().await;
        let span = tracing::info_span!("cycle", id = %uuid::Uuid::new_v4());
        if let Err(e) = monitor.run_cycle().instrument(span).await {
            error!("Monitoring cycle failed: {:#}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::tests::RecordingNotifier;
    use crate::source::{FetchError, Rating, RatingStrategy};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Answers from a fixed username → rating table; unknown users fail.
    struct TableStrategy(HashMap<&'static str, Rating>);

    #[async_trait]
    impl RatingStrategy for TableStrategy {
        fn name(&self) -> &str { "table" }

        async fn fetch(&self, username: &str) -> Result<Option<Rating>, FetchError> {
            self.0.get(username).copied().map(Some)
                .ok_or_else(|| FetchError::UpstreamStatus("HTTP 404".into()))
        }
    }

    fn monitor(
        table: &[(&'static str, Rating)],
        store: Arc<TrackingStore>,
        notifier: Arc<RecordingNotifier>,
    ) -> Arc<Monitor> {
        let source = RateSource::new(vec![Box::new(TableStrategy(table.iter().copied().collect()))]);
        Arc::new(Monitor::new(
            Arc::new(source),
            store,
            notifier,
            Arc::new(ChannelLog::disabled()),
            Arc::new(StatsCollector::new()),
            Url::parse("https://hackerlab.pro").unwrap(),
            2,
        ))
    }

    fn rating_of(store: &TrackingStore, subscriber: &str, username: &str) -> Option<Rating> {
        store.list_tracked(subscriber).unwrap()
            .into_iter()
            .find(|e| e.username == username)
            .and_then(|e| e.last_rating)
    }

    #[tokio::test]
    async fn test_cycle_counts_failures_unchanged_and_changes() {
        let store = Arc::new(TrackingStore::open_in_memory().unwrap());
        store.add_tracked("1", "anna", Some(5)).unwrap();
        store.add_tracked("1", "boris", Some(7)).unwrap();
        store.add_tracked("2", "clara", Some(10)).unwrap();
        let notifier = Arc::new(RecordingNotifier::default());

        // anna is missing upstream, boris is unchanged, clara moved 10 -> 20.
        let monitor = monitor(&[("boris", 7), ("clara", 20)], Arc::clone(&store), Arc::clone(&notifier));
        let report = monitor.run_cycle().await.unwrap();

        assert_eq!(report, CycleReport { checked: 3, changed: 1, errors: 1 });
        let sent = notifier.messages();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "2");
        assert!(sent[0].1.ends_with("изменился: 10 -> 20"));

        assert_eq!(rating_of(&store, "1", "anna"), Some(5));
        assert_eq!(rating_of(&store, "1", "boris"), Some(7));
        assert_eq!(rating_of(&store, "2", "clara"), Some(20));
        assert_eq!(monitor.stats.snapshot(), report);
    }

    #[tokio::test]
    async fn test_first_observation_notifies() {
        let store = Arc::new(TrackingStore::open_in_memory().unwrap());
        store.add_tracked("1", "anna", None).unwrap();
        let notifier = Arc::new(RecordingNotifier::default());

        let monitor = monitor(&[("anna", 3)], Arc::clone(&store), Arc::clone(&notifier));
        let report = monitor.run_cycle().await.unwrap();

        assert_eq!(report, CycleReport { checked: 1, changed: 1, errors: 0 });
        assert!(notifier.messages()[0].1.ends_with("anna</a>: 3"));
        assert_eq!(rating_of(&store, "1", "anna"), Some(3));

        // The next cycle sees no change and sends nothing.
        let report = monitor.run_cycle().await.unwrap();
        assert_eq!(report, CycleReport { checked: 1, changed: 0, errors: 0 });
        assert_eq!(notifier.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_delivery_failure_keeps_new_rating() {
        let store = Arc::new(TrackingStore::open_in_memory().unwrap());
        store.add_tracked("blocked", "anna", Some(1)).unwrap();
        store.add_tracked("ok", "anna", Some(1)).unwrap();
        let notifier = Arc::new(RecordingNotifier::failing_for(&["blocked"]));

        let monitor = monitor(&[("anna", 2)], Arc::clone(&store), Arc::clone(&notifier));
        let report = monitor.run_cycle().await.unwrap();

        assert_eq!(report, CycleReport { checked: 2, changed: 2, errors: 1 });
        assert_eq!(rating_of(&store, "blocked", "anna"), Some(2));
        assert_eq!(rating_of(&store, "ok", "anna"), Some(2));
        assert_eq!(notifier.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_store_is_a_quiet_cycle() {
        let store = Arc::new(TrackingStore::open_in_memory().unwrap());
        let notifier = Arc::new(RecordingNotifier::default());
        let monitor = monitor(&[], store, Arc::clone(&notifier));

        assert_eq!(monitor.run_cycle().await.unwrap(), CycleReport::default());
        assert!(notifier.messages().is_empty());
    }

    /// First fetch is slow, later ones are quick. Tracks how many overlap.
    struct SlowStrategy {
        first_delay: Duration,
        calls: Arc<AtomicUsize>,
        live: AtomicUsize,
        max_live: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl RatingStrategy for SlowStrategy {
        fn name(&self) -> &str { "slow" }

        async fn fetch(&self, _username: &str) -> Result<Option<Rating>, FetchError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_live.fetch_max(live, Ordering::SeqCst);
            let delay = if call == 0 { self.first_delay } else { Duration::from_millis(10) };
            time::sleep(delay).await;
            self.live.fetch_sub(1, Ordering::SeqCst);
            Ok(Some(1))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_monitor_waits_one_interval_and_never_overlaps() {
        let calls = Arc::new(AtomicUsize::new(0));
        let max_live = Arc::new(AtomicUsize::new(0));
        let strategy = SlowStrategy {
            first_delay: Duration::from_millis(250),
            calls: Arc::clone(&calls),
            live: AtomicUsize::new(0),
            max_live: Arc::clone(&max_live),
        };

        let store = Arc::new(TrackingStore::open_in_memory().unwrap());
        store.add_tracked("1", "anna", None).unwrap();
        let monitor = Arc::new(Monitor::new(
            Arc::new(RateSource::new(vec![Box::new(strategy)])),
            store,
            Arc::new(RecordingNotifier::default()),
            Arc::new(ChannelLog::disabled()),
            Arc::new(StatsCollector::new()),
            Url::parse("https://hackerlab.pro").unwrap(),
            4,
        ));
        let task = tokio::spawn(run_monitor(monitor, Duration::from_millis(100)));

        time::sleep(Duration::from_millis(99)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0, "no cycle before the first interval");

        // Cycle one runs 100..350 ms. The missed 200 and 300 ms ticks collapse
        // into one late cycle at 350 ms, then the schedule resumes at 400 ms.
        time::sleep(Duration::from_millis(341)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(max_live.load(Ordering::SeqCst), 1);

        task.abort();
    }

    #[test]
    fn test_stale_entries_are_not_counted_as_changes() {
        let mut report = CycleReport::default();
        report.record(EntryOutcome::Stale);
        report.record(EntryOutcome::StoreFailed);
        assert_eq!(report, CycleReport { checked: 2, changed: 0, errors: 1 });
    }
}
