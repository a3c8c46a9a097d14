//! Pipeline run statistics

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::app::id::{ProducerStats, Section};
use crate::app::sink::SinkStats;
use crate::app::worker::WorkerPoolStats;

/// Aggregated statistics for one run
#[derive(Debug, Clone)]
pub struct PipelineStats {
    /// Section all candidates were generated in
    pub section: Section,
    /// Rows already stored when the run started
    pub initially_stored: usize,
    /// Generator counters; `None` if the producer task died
    pub producer: Option<ProducerStats>,
    /// Worker pool aggregate
    pub workers: WorkerPoolStats,
    /// Sink counters; `None` if the sink task died or its final flush failed
    pub sink: Option<SinkStats>,
    /// Fetch attempts dispatched
    pub dispatched: u64,
    /// Queued candidates dropped at the drain deadline
    pub discarded: usize,
    /// Start of the run
    pub session_start: DateTime<Utc>,
}

impl PipelineStats {
    pub fn new(section: Section, initially_stored: usize) -> Self {
        Self {
            section,
            initially_stored,
            producer: None,
            workers: WorkerPoolStats::default(),
            sink: None,
            dispatched: 0,
            discarded: 0,
            session_start: Utc::now(),
        }
    }

    /// Rows added to the store during this run
    pub fn newly_stored(&self) -> usize {
        self.sink
            .as_ref()
            .map(|s| s.persisted_rows.saturating_sub(self.initially_stored))
            .unwrap_or(0)
    }

    /// Next cursor position, for resuming with `--start`
    pub fn next_cursor(&self) -> Option<(u32, u16)> {
        self.producer.map(|p| p.cursor)
    }
}

/// Final result of a pipeline run
#[derive(Debug, Clone)]
pub struct SessionResult {
    pub stats: PipelineStats,
    /// Whether every component finished cleanly
    pub success: bool,
    /// Problems that did not prevent the final flush
    pub errors: Vec<String>,
    pub duration: Duration,
}

impl SessionResult {
    pub fn new(stats: PipelineStats, errors: Vec<String>, duration: Duration) -> Self {
        Self {
            success: errors.is_empty(),
            stats,
            errors,
            duration,
        }
    }

    /// Fetch attempts per second over the run
    pub fn dispatch_rate(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs > 0.0 {
            self.stats.dispatched as f64 / secs
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_newly_stored_rows() {
        let mut stats = PipelineStats::new(Section::new(5), 10);
        assert_eq!(stats.newly_stored(), 0);

        stats.sink = Some(SinkStats {
            persisted_rows: 25,
            ..Default::default()
        });
        assert_eq!(stats.newly_stored(), 15);
    }

    #[test]
    fn test_session_success_follows_errors() {
        let stats = PipelineStats::new(Section::new(1), 0);
        let ok = SessionResult::new(stats.clone(), Vec::new(), Duration::from_secs(2));
        assert!(ok.success);

        let failed = SessionResult::new(stats, vec!["worker panicked".into()], Duration::ZERO);
        assert!(!failed.success);
        assert_eq!(failed.dispatch_rate(), 0.0);
    }
}
