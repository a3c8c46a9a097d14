//! Configuration management for snowprobe
//!
//! Settings come from defaults, then an optional TOML file, then CLI flags.
//! The file is looked up in this order: an explicit `--config` path (which
//! must exist), `./snowprobe.toml`, then the user config directory.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::app::sink::SinkConfig;
use crate::app::worker::WorkerConfig;
use crate::app::{FetchConfig, PipelineConfig, StoreConfig};
use crate::constants::{coordinator, files, id, sink, workers};
use crate::errors::{ConfigError, ConfigResult};

/// Unified application configuration for TOML serialization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Generator, worker and sink settings
    pub pipeline: PipelineConfigToml,
    /// Durable store and seed corpus
    pub store: StoreConfig,
    /// Remote fetch collaborator
    pub fetch: FetchConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// TOML-friendly pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfigToml {
    /// Number of fetch workers
    pub worker_count: usize,
    /// Results per flush
    pub batch_size: usize,
    /// Generation start (RFC 3339); defaults to 2023-06-01T10:00:00Z
    pub start_time: Option<DateTime<Utc>>,
    /// Queue wait timeout, the cancellation poll point
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    /// Upper bound on a single fetch
    #[serde(with = "humantime_serde")]
    pub fetch_timeout: Duration,
    /// Longest time queued work is drained after cancellation
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
    /// Interval between progress log lines
    #[serde(with = "humantime_serde")]
    pub progress_log_interval: Duration,
    /// Attempts for the shutdown flush
    pub final_flush_attempts: u32,
    /// Delay between shutdown flush attempts
    #[serde(with = "humantime_serde")]
    pub final_flush_retry_delay: Duration,
}

impl Default for PipelineConfigToml {
    fn default() -> Self {
        Self {
            worker_count: workers::DEFAULT_WORKER_COUNT,
            batch_size: sink::DEFAULT_BATCH_SIZE,
            start_time: None,
            poll_interval: workers::DEFAULT_POLL_INTERVAL,
            fetch_timeout: workers::DEFAULT_FETCH_TIMEOUT,
            shutdown_timeout: coordinator::DEFAULT_SHUTDOWN_TIMEOUT,
            progress_log_interval: coordinator::PROGRESS_LOG_INTERVAL,
            final_flush_attempts: sink::FINAL_FLUSH_ATTEMPTS,
            final_flush_retry_delay: sink::FINAL_FLUSH_RETRY_DELAY,
        }
    }
}

impl PipelineConfigToml {
    /// Convert to the runtime configuration
    pub fn to_runtime_config(&self) -> ConfigResult<PipelineConfig> {
        let start_timestamp = match self.start_time {
            Some(start) => timestamp_from_datetime(start)?,
            None => id::DEFAULT_START_TIMESTAMP as u32,
        };

        Ok(PipelineConfig {
            start_timestamp,
            worker_config: WorkerConfig {
                worker_count: self.worker_count,
                poll_interval: self.poll_interval,
                fetch_timeout: self.fetch_timeout,
            },
            sink_config: SinkConfig {
                batch_size: self.batch_size,
                poll_interval: self.poll_interval,
                final_flush_attempts: self.final_flush_attempts,
                final_flush_retry_delay: self.final_flush_retry_delay,
            },
            shutdown_timeout: self.shutdown_timeout,
            progress_log_interval: self.progress_log_interval,
            handle_signals: true,
        })
    }
}

/// Convert a UTC instant to the 32-bit seconds field of an identifier
pub fn timestamp_from_datetime(start: DateTime<Utc>) -> ConfigResult<u32> {
    u32::try_from(start.timestamp()).map_err(|_| ConfigError::InvalidValue {
        field: "start_time".to_string(),
        value: start.to_rfc3339(),
        reason: "must fall within the 32-bit Unix seconds range".to_string(),
    })
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `-v`/`-q` and `RUST_LOG`
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the first file found, or defaults
    pub async fn load(config_file_override: Option<PathBuf>) -> ConfigResult<Self> {
        let config_path = match config_file_override {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigError::NotFound { path });
                }
                Some(path)
            }
            None => Self::find_config_file(),
        };

        match config_path {
            Some(path) => Self::load_from_file(&path).await,
            None => {
                debug!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Find configuration file in standard locations
    fn find_config_file() -> Option<PathBuf> {
        let mut search_paths = vec![PathBuf::from(format!("./{}", files::LOCAL_CONFIG_FILE))];
        if let Some(user_config) = Self::default_config_path() {
            search_paths.push(user_config);
        }

        search_paths.into_iter().find(|path| {
            let found = path.exists();
            if found {
                debug!("Found config file: {}", path.display());
            }
            found
        })
    }

    /// Per-user config file path
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("snowprobe").join("config.toml"))
    }

    /// Load configuration from a TOML file
    pub async fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;

        let config: AppConfig = toml::from_str(&content)?;
        info!("Loaded configuration from: {}", path.display());
        Ok(config)
    }

    /// Check every section; the pipeline section is checked in runtime form
    pub fn validate(&self) -> ConfigResult<()> {
        self.pipeline.to_runtime_config()?.validate()?;
        self.store.validate()?;
        self.fetch.validate()?;
        Ok(())
    }

    /// Default configuration content with comments
    pub fn generate_default_config_content() -> String {
        format!(
            r#"# snowprobe configuration

[pipeline]
# Concurrent fetch workers (1-{max_workers})
worker_count = {worker_count}

# Results per flush to the store
batch_size = {batch_size}

# Generation start (RFC 3339); omit to use 2023-06-01T10:00:00Z
# start_time = "2023-06-01T10:00:00Z"

poll_interval = "1s"
fetch_timeout = "30s"
shutdown_timeout = "30s"
progress_log_interval = "60s"
final_flush_attempts = {final_flush_attempts}
final_flush_retry_delay = "500ms"

[store]
# Primary store; the backup sits next to it with a _bckup suffix
path = "{store_path}"

# Extra ids for section selection
# seed_path = "./data/seed.parquet"
seed_id_column = "{seed_column}"
zstd_level = {zstd_level}

[fetch]
# Endpoint template; {{id}} is replaced by the candidate id
endpoint = "http://127.0.0.1:8080/aweme/related?aweme_id={{id}}"
rate_limit_rps = {rps}
request_timeout = "20s"
headers = []
denylist = ["duet_origin_item", "show_follow_button", "entertainment_product_info"]

[logging]
level = "info"
"#,
            max_workers = workers::MAX_WORKER_COUNT,
            worker_count = workers::DEFAULT_WORKER_COUNT,
            batch_size = sink::DEFAULT_BATCH_SIZE,
            final_flush_attempts = sink::FINAL_FLUSH_ATTEMPTS,
            store_path = files::DEFAULT_STORE_PATH,
            seed_column = files::DEFAULT_SEED_ID_COLUMN,
            zstd_level = sink::DEFAULT_ZSTD_LEVEL,
            rps = crate::constants::fetch::DEFAULT_RATE_LIMIT_RPS,
        )
    }
}
