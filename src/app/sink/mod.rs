//! Result sink: batching and durable persistence
//!
//! The sink is the single consumer of the result queue. It appends results to
//! an in-memory batch and, once the batch reaches `batch_size`, merges it into
//! the full result set and rewrites the primary and backup store files. A
//! failed flush keeps the batch and retries on the next trigger. When the
//! result queue closes the remaining partial batch is flushed with a bounded
//! number of retries.

pub mod store;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::app::models::FetchResult;
use crate::app::queue::ResultReceiver;
use crate::constants::{sink, workers};
use crate::errors::{ConfigError, ConfigResult, PersistenceError, PersistenceResult};

pub use store::{
    backup_path_for, load_seed_ids, read_results, to_record_batch, ParquetStore, StoreConfig,
    StoredResults,
};

/// Sink batching and retry settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Results per flush
    pub batch_size: usize,
    /// Bounded wait on the result queue
    pub poll_interval: Duration,
    /// Attempts for the shutdown flush
    pub final_flush_attempts: u32,
    /// Delay between shutdown flush attempts
    pub final_flush_retry_delay: Duration,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            batch_size: sink::DEFAULT_BATCH_SIZE,
            poll_interval: workers::DEFAULT_POLL_INTERVAL,
            final_flush_attempts: sink::FINAL_FLUSH_ATTEMPTS,
            final_flush_retry_delay: sink::FINAL_FLUSH_RETRY_DELAY,
        }
    }
}

impl SinkConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "batch_size".to_string(),
                value: "0".to_string(),
                reason: "batch size must be at least 1".to_string(),
            });
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "poll_interval".to_string(),
                value: "0".to_string(),
                reason: "result queue poll interval cannot be zero".to_string(),
            });
        }
        if self.final_flush_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "final_flush_attempts".to_string(),
                value: "0".to_string(),
                reason: "at least one final flush attempt is required".to_string(),
            });
        }
        Ok(())
    }
}

/// Sink counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkStats {
    /// Results taken off the result queue
    pub received: u64,
    /// Successful flushes
    pub flushes: u64,
    /// Failed flush attempts
    pub failed_flushes: u64,
    /// Rows in the store after the last successful flush
    pub persisted_rows: usize,
}

/// Batching writer in front of the durable store
#[derive(Debug)]
pub struct ResultSink {
    config: SinkConfig,
    store: ParquetStore,
    results: StoredResults,
    batch: Vec<FetchResult>,
    consecutive_failures: u32,
    stats: SinkStats,
    persisted_gauge: Arc<AtomicUsize>,
}

impl ResultSink {
    /// Create a sink over an already loaded result set
    pub fn new(config: SinkConfig, store: ParquetStore, existing: StoredResults) -> Self {
        let stats = SinkStats {
            persisted_rows: existing.len(),
            ..Default::default()
        };
        Self {
            batch: Vec::with_capacity(config.batch_size),
            config,
            store,
            persisted_gauge: Arc::new(AtomicUsize::new(existing.len())),
            results: existing,
            consecutive_failures: 0,
            stats,
        }
    }

    /// Live view of the persisted row count, for progress reporting
    pub fn persisted_gauge(&self) -> Arc<AtomicUsize> {
        self.persisted_gauge.clone()
    }

    /// Consume the result queue until it closes, then flush what is left
    pub async fn run(mut self, mut result_rx: ResultReceiver) -> PersistenceResult<SinkStats> {
        info!(
            "Result sink started (batch size {}, {} stored)",
            self.config.batch_size,
            self.results.len()
        );

        loop {
            match timeout(self.config.poll_interval, result_rx.recv()).await {
                Ok(Some(result)) => {
                    self.push(result);
                    if self.batch.len() >= self.config.batch_size {
                        // Failure is logged inside; the batch is kept for the next trigger
                        let _ = self.flush().await;
                    }
                }
                Ok(None) => {
                    debug!("Result queue closed");
                    break;
                }
                Err(_) => {}
            }
        }

        self.final_flush().await?;
        info!(
            "Result sink finished: {} received, {} flushes, {} rows stored",
            self.stats.received, self.stats.flushes, self.stats.persisted_rows
        );
        Ok(self.stats)
    }

    /// Append a result to the pending batch
    pub fn push(&mut self, result: FetchResult) {
        self.stats.received += 1;
        self.batch.push(result);
    }

    /// Merge the batch into the full set and persist it
    ///
    /// On error the batch is retained so the next call retries it.
    pub async fn flush(&mut self) -> PersistenceResult<usize> {
        match self.try_flush().await {
            Ok(rows) => {
                self.consecutive_failures = 0;
                Ok(rows)
            }
            Err(e) => {
                self.consecutive_failures += 1;
                self.stats.failed_flushes += 1;
                error!(
                    "Flush of {} results failed ({} consecutive): {}",
                    self.batch.len(),
                    self.consecutive_failures,
                    e
                );
                Err(e)
            }
        }
    }

    async fn try_flush(&mut self) -> PersistenceResult<usize> {
        // Re-merging a retained batch is idempotent: last write wins per id
        for result in &self.batch {
            self.results.insert(result.id, result.document.clone());
        }

        let record_batch = to_record_batch(&self.results)?;
        let store = self.store.clone();
        let rows = tokio::task::spawn_blocking(move || store.write(&record_batch))
            .await
            .map_err(|e| PersistenceError::TaskJoin(e.to_string()))??;

        debug!("Flushed {} results, {} rows stored", self.batch.len(), rows);
        self.batch.clear();
        self.stats.flushes += 1;
        self.stats.persisted_rows = rows;
        self.persisted_gauge.store(rows, Ordering::Relaxed);
        Ok(rows)
    }

    async fn final_flush(&mut self) -> PersistenceResult<()> {
        if self.batch.is_empty() {
            return Ok(());
        }

        let attempts = self.config.final_flush_attempts;
        for attempt in 1..=attempts {
            if self.flush().await.is_ok() {
                return Ok(());
            }
            if attempt < attempts {
                warn!(
                    "Final flush attempt {}/{} failed, retrying in {:?}",
                    attempt, attempts, self.config.final_flush_retry_delay
                );
                tokio::time::sleep(self.config.final_flush_retry_delay).await;
            }
        }

        Err(PersistenceError::FinalFlushFailed {
            attempts,
            pending: self.batch.len(),
        })
    }

    pub fn pending(&self) -> usize {
        self.batch.len()
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn stats(&self) -> &SinkStats {
        &self.stats
    }

    pub fn results(&self) -> &StoredResults {
        &self.results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::queue::result_queue;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    fn sink_config(batch_size: usize) -> SinkConfig {
        SinkConfig {
            batch_size,
            poll_interval: Duration::from_millis(10),
            final_flush_attempts: 2,
            final_flush_retry_delay: Duration::from_millis(10),
        }
    }

    fn store_in(temp_dir: &TempDir) -> ParquetStore {
        ParquetStore::new(&StoreConfig {
            path: temp_dir.path().join("results.parquet"),
            ..Default::default()
        })
    }

    /// Test exactly one flush when the batch threshold is reached
    #[tokio::test]
    async fn test_flush_at_batch_threshold() {
        let temp_dir = TempDir::new().unwrap();
        let store = store_in(&temp_dir);
        let (result_tx, result_rx) = result_queue();

        for id in 0..4u64 {
            result_tx
                .send(FetchResult::new(id, json!({"n": id})))
                .unwrap();
        }

        let sink = ResultSink::new(sink_config(4), store.clone(), StoredResults::new());
        let handle = tokio::spawn(sink.run(result_rx));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(read_results(store.primary_path()).unwrap().unwrap().len(), 4);

        drop(result_tx);
        let stats = handle.await.unwrap().unwrap();
        assert_eq!(stats.flushes, 1);
        assert_eq!(stats.received, 4);
        assert_eq!(stats.persisted_rows, 4);
    }

    /// Test the partial batch is persisted when the queue closes
    #[tokio::test]
    async fn test_partial_batch_flushed_on_close() {
        let temp_dir = TempDir::new().unwrap();
        let store = store_in(&temp_dir);
        let (result_tx, result_rx) = result_queue();

        result_tx.send(FetchResult::new(9, json!({"a": 1}))).unwrap();
        drop(result_tx);

        let sink = ResultSink::new(sink_config(100), store.clone(), StoredResults::new());
        let stats = sink.run(result_rx).await.unwrap();
        assert_eq!(stats.flushes, 1);

        let stored = read_results(store.backup_path()).unwrap().unwrap();
        assert_eq!(stored.get(&9), Some(&json!({"a": 1})));
    }

    #[tokio::test]
    async fn test_existing_results_preserved() {
        let temp_dir = TempDir::new().unwrap();
        let store = store_in(&temp_dir);
        let mut existing = StoredResults::new();
        existing.insert(1, json!({"old": true}));

        let mut sink = ResultSink::new(sink_config(10), store.clone(), existing);
        let gauge = sink.persisted_gauge();
        assert_eq!(gauge.load(Ordering::Relaxed), 1);
        sink.push(FetchResult::new(2, json!({"new": true})));
        assert_eq!(sink.flush().await.unwrap(), 2);
        assert_eq!(sink.pending(), 0);
        assert_eq!(gauge.load(Ordering::Relaxed), 2);

        let stored = store.load().unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored.get(&1), Some(&json!({"old": true})));
    }

    /// Test a failed flush keeps the batch for the next attempt
    ///
    /// A directory occupying the primary path makes the rename fail; once it
    /// is removed the retained batch is written.
    #[tokio::test]
    async fn test_failed_flush_retains_batch() {
        let temp_dir = TempDir::new().unwrap();
        let store = store_in(&temp_dir);
        fs::create_dir(store.primary_path()).unwrap();
        fs::write(store.primary_path().join("blocker"), b"x").unwrap();

        let mut sink = ResultSink::new(sink_config(1), store.clone(), StoredResults::new());
        sink.push(FetchResult::new(5, json!({})));

        assert!(sink.flush().await.is_err());
        assert_eq!(sink.pending(), 1);
        assert_eq!(sink.consecutive_failures(), 1);
        assert_eq!(sink.stats().failed_flushes, 1);

        fs::remove_dir_all(store.primary_path()).unwrap();
        assert_eq!(sink.flush().await.unwrap(), 1);
        assert_eq!(sink.pending(), 0);
        assert_eq!(sink.consecutive_failures(), 0);
    }

    #[tokio::test]
    async fn test_final_flush_failure_surfaces() {
        let temp_dir = TempDir::new().unwrap();
        let store = store_in(&temp_dir);
        fs::create_dir(store.primary_path()).unwrap();
        fs::write(store.primary_path().join("blocker"), b"x").unwrap();

        let (result_tx, result_rx) = result_queue();
        result_tx.send(FetchResult::new(1, json!({}))).unwrap();
        drop(result_tx);

        let sink = ResultSink::new(sink_config(10), store, StoredResults::new());
        let err = sink.run(result_rx).await.unwrap_err();
        assert!(matches!(
            err,
            PersistenceError::FinalFlushFailed {
                attempts: 2,
                pending: 1
            }
        ));
    }
}
