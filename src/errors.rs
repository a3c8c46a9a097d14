//! Error types for snowprobe
//!
//! Errors are split by concern. Startup problems are [`ConfigError`] and stop
//! the pipeline before it runs; [`FetchError`] is contained inside a single
//! worker iteration; [`PersistenceError`] keeps the batch in memory and is
//! only surfaced when the shutdown flush cannot be completed.

use std::path::PathBuf;
use thiserror::Error;

/// Configuration and startup errors (fatal)
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    NotFound { path: PathBuf },

    /// Configuration file could not be read
    #[error("Failed to read configuration file {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Invalid configuration format
    #[error("Invalid configuration format")]
    InvalidFormat(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration value for {field}: {value}. {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    /// No identifiers available to select a section from
    #[error("Seed corpus is empty: no basis for section selection")]
    EmptySeedCorpus,

    /// Durable store exists but cannot be read
    #[error("Durable store unreadable: {path}: {reason}")]
    StoreUnreadable { path: PathBuf, reason: String },
}

/// Errors from a single fetch (transient, never abort the pool)
#[derive(Error, Debug)]
pub enum FetchError {
    /// HTTP request error
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Server returned error status
    #[error("Server error: HTTP {status}")]
    Status { status: u16 },

    /// Rate limit exceeded
    #[error("Rate limit exceeded. Server responded with HTTP 429")]
    RateLimited,

    /// Fetch did not finish in time
    #[error("Fetch timed out after {elapsed:?}")]
    Timeout { elapsed: std::time::Duration },

    /// Response body was not a usable document
    #[error("Invalid response: {reason}")]
    InvalidResponse { reason: String },

    /// Invalid URL built from the endpoint template
    #[error("Invalid URL: {url} - {error}")]
    InvalidUrl { url: String, error: String },
}

/// Durable store errors
#[derive(Error, Debug)]
pub enum PersistenceError {
    /// I/O error during file operations
    #[error("Store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Parquet encode/decode error
    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    /// Arrow array construction error
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// Document could not be encoded or decoded as JSON
    #[error("Document serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Atomic file operation failed
    #[error("Atomic file operation failed: could not rename {temp_path} to {final_path}")]
    AtomicRename {
        temp_path: PathBuf,
        final_path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Store file layout does not match the expected schema
    #[error("Unexpected store schema in {path}: {reason}")]
    Schema { path: PathBuf, reason: String },

    /// Blocking write task died
    #[error("Store write task failed: {0}")]
    TaskJoin(String),

    /// The shutdown flush never succeeded
    #[error("Final flush failed after {attempts} attempts; {pending} results not persisted")]
    FinalFlushFailed { attempts: u32, pending: usize },
}

/// Pipeline lifecycle and coordination errors
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Invalid state transition
    #[error("Invalid pipeline state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    /// Worker pool used in the wrong lifecycle state
    #[error("Worker pool is {state}, cannot {action}")]
    PoolState { state: String, action: String },

    /// A spawned component panicked
    #[error("{component} panicked or terminated unexpectedly")]
    TaskPanic { component: String },
}

/// Top-level application error that can represent any error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Fetch error
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Persistence error
    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    /// Pipeline error
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// Generic I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Generic application error with context
    #[error("Application error: {message}")]
    Generic { message: String },
}

impl AppError {
    /// Create a generic application error with a message
    pub fn generic(message: impl Into<String>) -> Self {
        Self::Generic {
            message: message.into(),
        }
    }

    /// Check if the error is recoverable (transient)
    pub fn is_recoverable(&self) -> bool {
        match self {
            AppError::Fetch(_) => true,
            AppError::Persistence(PersistenceError::FinalFlushFailed { .. }) => false,
            AppError::Persistence(PersistenceError::Io(_))
            | AppError::Persistence(PersistenceError::AtomicRename { .. })
            | AppError::Persistence(PersistenceError::TaskJoin(_)) => true,
            _ => false,
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            AppError::Config(_) => "config",
            AppError::Fetch(_) => "fetch",
            AppError::Persistence(_) => "persistence",
            AppError::Pipeline(_) => "pipeline",
            AppError::Io(_) => "io",
            AppError::Generic { .. } => "generic",
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;

/// Configuration result type alias
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Outcome of a single fetch
pub type FetchOutcome<T> = std::result::Result<T, FetchError>;

/// Persistence result type alias
pub type PersistenceResult<T> = std::result::Result<T, PersistenceError>;

/// Pipeline result type alias
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categories() {
        let err = AppError::from(ConfigError::EmptySeedCorpus);
        assert_eq!(err.category(), "config");
        assert!(!err.is_recoverable());

        let err = AppError::from(FetchError::RateLimited);
        assert_eq!(err.category(), "fetch");
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_final_flush_failure_is_not_recoverable() {
        let err = AppError::from(PersistenceError::FinalFlushFailed {
            attempts: 3,
            pending: 12,
        });
        assert_eq!(err.category(), "persistence");
        assert!(!err.is_recoverable());
        assert!(err.to_string().contains("12 results not persisted"));
    }

    #[test]
    fn test_fetch_timeout_reports_sub_second_duration() {
        let err = FetchError::Timeout {
            elapsed: std::time::Duration::from_millis(500),
        };
        assert_eq!(err.to_string(), "Fetch timed out after 500ms");

        let outcome: FetchOutcome<()> = Err(err);
        assert!(matches!(outcome, Err(FetchError::Timeout { .. })));
    }
}
