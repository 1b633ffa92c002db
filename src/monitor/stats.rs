//! Check counters: per cycle, and accumulated until the next summary.

use std::sync::{Mutex, PoisonError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub checked: u64,
    pub changed: u64,
    pub errors: u64,
}

impl CycleReport {
    pub fn merge(&mut self, other: &CycleReport) {
        self.checked += other.checked;
        self.changed += other.changed;
        self.errors += other.errors;
    }
}

/// Totals since the last summary, shared between the monitor and the reporter.
#[derive(Default)]
pub struct StatsCollector {
    totals: Mutex<CycleReport>,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, report: &CycleReport) {
        self.totals.lock().unwrap_or_else(PoisonError::into_inner).merge(report);
    }

    #[cfg(test)]
    pub fn snapshot(&self) -> CycleReport {
        *self.totals.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Read and reset in one step.
    pub fn drain(&self) -> CycleReport {
        std::mem::take(&mut *self.totals.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_accumulates_until_drain() {
        let stats = StatsCollector::new();
        stats.record(&CycleReport { checked: 3, changed: 1, errors: 1 });
        stats.record(&CycleReport { checked: 3, changed: 0, errors: 2 });
        assert_eq!(stats.snapshot(), CycleReport { checked: 6, changed: 1, errors: 3 });

        assert_eq!(stats.drain(), CycleReport { checked: 6, changed: 1, errors: 3 });
        assert_eq!(stats.snapshot(), CycleReport::default());
    }
}
