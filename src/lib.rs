//! snowprobe library
//!
//! Samples a remote API keyed by snowflake-style 64-bit identifiers. Candidate
//! ids are synthesized in the dominant section of an observed corpus, fetched
//! concurrently under backpressure and persisted to Parquet with crash-safe
//! atomic writes and deduplication against everything already stored.

pub mod app;
pub mod cli;
pub mod config;
pub mod constants;
pub mod errors;
pub mod prelude;

// Re-export commonly used types for convenience
pub use errors::{AppError, Result};

#[cfg(test)]
mod tests {
    use super::*;
    use constants::*;

    #[test]
    fn test_constants_accessible() {
        assert_eq!(DEFAULT_WORKER_COUNT, 8);
        assert_eq!(TEMP_FILE_SUFFIX, ".tmp");
        assert!(USER_AGENT.starts_with("snowprobe"));
    }

    #[test]
    fn test_error_types() {
        let app_error = AppError::from(errors::ConfigError::EmptySeedCorpus);

        assert_eq!(app_error.category(), "config");
        assert!(!app_error.is_recoverable());
    }
}
