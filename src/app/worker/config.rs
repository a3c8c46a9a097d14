//! Worker configuration management

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::workers;
use crate::errors::{ConfigError, ConfigResult};

/// Configuration for fetch workers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Number of concurrent workers to spawn
    pub worker_count: usize,
    /// Bounded wait on the work queue before re-checking pipeline state
    pub poll_interval: Duration,
    /// Upper bound on a single fetch
    pub fetch_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_count: workers::DEFAULT_WORKER_COUNT,
            poll_interval: workers::DEFAULT_POLL_INTERVAL,
            fetch_timeout: workers::DEFAULT_FETCH_TIMEOUT,
        }
    }
}

impl WorkerConfig {
    /// Work queue capacity implied by the worker count
    pub fn queue_capacity(&self) -> usize {
        self.worker_count * workers::QUEUE_SLOTS_PER_WORKER
    }

    /// Validate configuration values and return errors for invalid settings
    pub fn validate(&self) -> ConfigResult<()> {
        if self.worker_count == 0 || self.worker_count > workers::MAX_WORKER_COUNT {
            return Err(ConfigError::InvalidValue {
                field: "worker_count".to_string(),
                value: self.worker_count.to_string(),
                reason: format!("must be between 1 and {}", workers::MAX_WORKER_COUNT),
            });
        }

        if self.poll_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "poll_interval".to_string(),
                value: "0".to_string(),
                reason: "queue poll interval cannot be zero".to_string(),
            });
        }

        if self.fetch_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "fetch_timeout".to_string(),
                value: "0".to_string(),
                reason: "fetch timeout cannot be zero".to_string(),
            });
        }

        Ok(())
    }

    /// Fast settings for tests
    pub fn testing() -> Self {
        Self {
            worker_count: 2,
            poll_interval: Duration::from_millis(20),
            fetch_timeout: Duration::from_millis(500),
        }
    }
}
