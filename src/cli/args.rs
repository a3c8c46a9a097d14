//! Command-line argument parsing for snowprobe
//!
//! This module defines the CLI structure using clap derive macros: running
//! the sampling pipeline, decoding identifiers, and inspecting the section
//! distribution of the stored corpus.

use std::path::PathBuf;

use chrono::{DateTime, NaiveDateTime, Utc};
use clap::{Args, Parser, Subcommand};

/// snowprobe - sample a snowflake-keyed id space
#[derive(Parser, Debug)]
#[command(
    name = "snowprobe",
    version,
    about = "Probe a remote API by synthesizing snowflake-style identifiers",
    long_about = "Generates candidate 64-bit identifiers in the dominant section of an observed corpus,
fetches each one through a rate-limited HTTP endpoint and persists the results to Parquet."
)]
pub struct Cli {
    /// Global options
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Global arguments available to all subcommands
#[derive(Args, Debug)]
pub struct GlobalArgs {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Very verbose logging (debug level)
    #[arg(long, global = true)]
    pub very_verbose: bool,

    /// Quiet mode - suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Configuration file path
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Primary store file, overriding the configured path
    #[arg(long, global = true, value_name = "FILE")]
    pub store: Option<PathBuf>,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the sampling pipeline until interrupted
    Run(RunArgs),

    /// Decode identifiers into their bit fields
    Decode(DecodeArgs),

    /// Show the section distribution of the stored and seed corpus
    Sections(SectionsArgs),
}

/// Arguments for the run command
#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Number of concurrent fetch workers
    #[arg(short = 'w', long)]
    pub workers: Option<usize>,

    /// Results per flush to the store
    #[arg(short, long)]
    pub batch_size: Option<usize>,

    /// Generation start, RFC 3339 or "YYYY-MM-DD HH:MM:SS" (UTC)
    #[arg(short, long, value_parser = parse_start_time)]
    pub start: Option<DateTime<Utc>>,

    /// Parquet file with extra ids for section selection
    #[arg(long, value_name = "FILE")]
    pub seed: Option<PathBuf>,

    /// Disable the progress spinner
    #[arg(long)]
    pub no_progress: bool,
}

/// Arguments for the decode command
#[derive(Args, Debug, Clone)]
pub struct DecodeArgs {
    /// Identifiers to decode
    #[arg(required = true, value_name = "ID")]
    pub ids: Vec<u64>,
}

/// Arguments for the sections command
#[derive(Args, Debug, Clone)]
pub struct SectionsArgs {
    /// Number of most frequent sections to list
    #[arg(short = 'n', long, default_value = "10")]
    pub top: usize,

    /// Parquet file with extra ids to include
    #[arg(long, value_name = "FILE")]
    pub seed: Option<PathBuf>,
}

/// Parse a generation start time
pub fn parse_start_time(raw: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .map(|naive| naive.and_utc())
        .map_err(|e| format!("invalid start time '{}': {}", raw, e))
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Get the logging level based on global arguments
    ///
    /// `None` means no flag was given and the configured level applies.
    pub fn log_level(&self) -> Option<tracing::Level> {
        if self.global.quiet {
            Some(tracing::Level::ERROR)
        } else if self.global.very_verbose {
            Some(tracing::Level::DEBUG)
        } else if self.global.verbose {
            Some(tracing::Level::INFO)
        } else {
            None
        }
    }
}
