//! Command-line interface components
//!
//! This module contains CLI-specific code for snowprobe, including argument
//! parsing, command handlers and the progress spinner.

pub mod args;
pub mod commands;
pub mod progress;

pub use args::{Cli, Commands, DecodeArgs, GlobalArgs, RunArgs, SectionsArgs};
pub use commands::{handle_decode, handle_run, handle_sections};
pub use progress::ProgressSpinner;
