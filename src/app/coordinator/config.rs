//! Configuration structures for the pipeline controller

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::app::sink::SinkConfig;
use crate::app::worker::WorkerConfig;
use crate::constants::{coordinator, id};
use crate::errors::{ConfigError, ConfigResult};

/// Runtime configuration for one pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Unix seconds the generator starts from
    pub start_timestamp: u32,
    /// Worker pool settings
    pub worker_config: WorkerConfig,
    /// Sink batching settings
    pub sink_config: SinkConfig,
    /// Longest time queued work is drained after cancellation
    pub shutdown_timeout: Duration,
    /// How often progress is logged
    pub progress_log_interval: Duration,
    /// Install the Ctrl-C / SIGTERM handler
    pub handle_signals: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            start_timestamp: id::DEFAULT_START_TIMESTAMP as u32,
            worker_config: WorkerConfig::default(),
            sink_config: SinkConfig::default(),
            shutdown_timeout: coordinator::DEFAULT_SHUTDOWN_TIMEOUT,
            progress_log_interval: coordinator::PROGRESS_LOG_INTERVAL,
            handle_signals: true,
        }
    }
}

impl PipelineConfig {
    pub fn with_worker_count(mut self, count: usize) -> Self {
        self.worker_config.worker_count = count;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.sink_config.batch_size = batch_size;
        self
    }

    pub fn with_start_timestamp(mut self, timestamp: u32) -> Self {
        self.start_timestamp = timestamp;
        self
    }

    /// Set the queue poll interval for both workers and the sink
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.worker_config.poll_interval = interval;
        self.sink_config.poll_interval = interval;
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    pub fn with_progress_log_interval(mut self, interval: Duration) -> Self {
        self.progress_log_interval = interval;
        self
    }

    pub fn with_signal_handling(mut self, enabled: bool) -> Self {
        self.handle_signals = enabled;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        self.worker_config.validate()?;
        self.sink_config.validate()?;

        if self.shutdown_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "shutdown_timeout".to_string(),
                value: "0".to_string(),
                reason: "shutdown timeout cannot be zero".to_string(),
            });
        }

        if self.progress_log_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "progress_log_interval".to_string(),
                value: "0".to_string(),
                reason: "progress log interval cannot be zero".to_string(),
            });
        }

        Ok(())
    }
}
