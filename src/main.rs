//! snowprobe CLI application
//!
//! Runs the candidate sampling pipeline and offers small inspection commands
//! for identifiers and the stored corpus.

use std::process;

use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use snowprobe::cli::{handle_decode, handle_run, handle_sections, Cli, Commands};
use snowprobe::config::{AppConfig, LoggingConfig};
use snowprobe::errors::Result;

#[tokio::main]
async fn main() {
    let result = run().await;

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

/// Main application logic
async fn run() -> Result<()> {
    // A missing .env file is fine
    dotenv::dotenv().ok();

    let cli = Cli::parse_args();
    let config = AppConfig::load(cli.global.config.clone()).await?;

    init_logging(&cli, &config.logging);

    info!("snowprobe v{} starting", env!("CARGO_PKG_VERSION"));

    let store_override = cli.global.store.clone();
    match cli.command {
        Commands::Run(args) => {
            info!("Executing run command");
            handle_run(args, config, store_override).await
        }
        Commands::Decode(args) => handle_decode(args).await,
        Commands::Sections(args) => {
            info!("Executing sections command");
            handle_sections(args, config, store_override).await
        }
    }
}

/// Initialize logging from `RUST_LOG`, then CLI verbosity, then the config file
fn init_logging(cli: &Cli, logging: &LoggingConfig) {
    let directive = match cli.log_level() {
        Some(level) => format!("snowprobe={}", level),
        None => format!("snowprobe={}", logging.level),
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(cli.global.very_verbose)
        .init();

    if cli.global.very_verbose {
        info!("Very verbose logging enabled");
    }
}
