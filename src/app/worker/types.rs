//! Worker statistics and progress counters

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Shared, monotonically increasing count of dispatched fetch attempts
///
/// Observability only; nothing in the pipeline branches on it.
#[derive(Debug, Clone, Default)]
pub struct DispatchCounter(Arc<AtomicU64>);

impl DispatchCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one attempt and return the new total
    pub fn increment(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Per-worker counters, returned when the worker exits
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerStats {
    pub worker_id: u32,
    /// Fetches that produced a stored result
    pub fetched: u64,
    /// Fetches that failed or timed out
    pub failed: u64,
    /// Queue polls that timed out without an item
    pub empty_polls: u64,
    /// Denylisted fields removed across all results
    pub fields_stripped: u64,
}

/// Aggregate over the whole pool
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerPoolStats {
    pub workers: usize,
    pub fetched: u64,
    pub failed: u64,
    pub empty_polls: u64,
    pub fields_stripped: u64,
    /// Workers that panicked instead of returning stats
    pub panicked: usize,
}

impl WorkerPoolStats {
    pub fn record(&mut self, stats: &WorkerStats) {
        self.workers += 1;
        self.fetched += stats.fetched;
        self.failed += stats.failed;
        self.empty_polls += stats.empty_polls;
        self.fields_stripped += stats.fields_stripped;
    }

    /// Share of attempts that succeeded, in percent
    pub fn success_rate(&self) -> f64 {
        let attempts = self.fetched + self.failed;
        if attempts == 0 {
            return 0.0;
        }
        self.fetched as f64 / attempts as f64 * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_counter_shared_between_clones() {
        let counter = DispatchCounter::new();
        let other = counter.clone();
        assert_eq!(counter.increment(), 1);
        assert_eq!(other.increment(), 2);
        assert_eq!(counter.get(), 2);
    }

    #[test]
    fn test_pool_stats_aggregation() {
        let mut pool = WorkerPoolStats::default();
        pool.record(&WorkerStats {
            worker_id: 0,
            fetched: 3,
            failed: 1,
            ..Default::default()
        });
        pool.record(&WorkerStats {
            worker_id: 1,
            fetched: 1,
            failed: 3,
            ..Default::default()
        });

        assert_eq!(pool.workers, 2);
        assert_eq!(pool.fetched, 4);
        assert_eq!(pool.failed, 4);
        assert!((pool.success_rate() - 50.0).abs() < f64::EPSILON);
    }
}
