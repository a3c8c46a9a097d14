//! Prelude module for the snowprobe library
//!
//! Re-exports the items needed to assemble and run a pipeline with a single
//! `use snowprobe::prelude::*;` statement.
//!
//! # Usage
//!
//! ```rust,no_run
//! use snowprobe::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = AppConfig::load(None).await?;
//!     let fetcher = Arc::new(HttpFetcher::new(&config.fetch)?);
//!     let pipeline = Pipeline::open(
//!         config.pipeline.to_runtime_config()?,
//!         &config.store,
//!         fetcher,
//!         config.fetch.denylist(),
//!     )?;
//!
//!     let handle = pipeline.shutdown_handle();
//!     tokio::spawn(async move {
//!         tokio::time::sleep(std::time::Duration::from_secs(60)).await;
//!         handle.shutdown();
//!     });
//!
//!     let result = pipeline.run().await?;
//!     println!("{} new results", result.stats.newly_stored());
//!     Ok(())
//! }
//! ```

// Core result types
pub use crate::errors::{AppError, Result};

// Pipeline assembly
pub use crate::app::{
    FetchConfig, Fetcher, FieldDenylist, HttpFetcher, Pipeline, PipelineConfig, SessionResult,
    ShutdownHandle, StoreConfig,
};

// Identifier codec
pub use crate::app::{decode, encode, CandidateId, IdParts, Section};

pub use crate::config::AppConfig;
