//! Command handlers for the snowprobe CLI

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};

use super::args::{DecodeArgs, RunArgs, SectionsArgs};
use super::progress::ProgressSpinner;
use crate::app::id::to_bit_string;
use crate::app::{
    decode, load_corpus, CandidateId, HttpFetcher, ParquetStore, Pipeline, SectionHistogram,
    SessionResult,
};
use crate::config::AppConfig;
use crate::errors::{ConfigError, Result};

/// Run the sampling pipeline until Ctrl-C, SIGTERM or id exhaustion
pub async fn handle_run(
    args: RunArgs,
    mut config: AppConfig,
    store_override: Option<PathBuf>,
) -> Result<()> {
    if let Some(workers) = args.workers {
        config.pipeline.worker_count = workers;
    }
    if let Some(batch_size) = args.batch_size {
        config.pipeline.batch_size = batch_size;
    }
    if let Some(start) = args.start {
        config.pipeline.start_time = Some(start);
    }
    if let Some(seed) = args.seed {
        config.store.seed_path = Some(seed);
    }
    if let Some(path) = store_override {
        config.store.path = path;
    }
    config.validate()?;

    let pipeline_config = config.pipeline.to_runtime_config()?;
    let fetcher = Arc::new(HttpFetcher::new(&config.fetch)?);
    let pipeline = Pipeline::open(
        pipeline_config,
        &config.store,
        fetcher,
        config.fetch.denylist(),
    )?;

    println!("Store:    {}", config.store.path.display());
    println!("Stored:   {} results", pipeline.stored_count());
    println!("Section:  {}", pipeline.section());
    println!(
        "Workers:  {} (batch size {})",
        pipeline.config().worker_config.worker_count,
        pipeline.config().sink_config.batch_size
    );
    println!("Press Ctrl+C to stop.");
    println!();

    let spinner = if args.no_progress {
        None
    } else {
        Some(ProgressSpinner::start(pipeline.dispatch_counter())?)
    };

    let outcome = pipeline.run().await;
    if let Some(spinner) = spinner {
        spinner.finish().await;
    }

    let result = outcome?;
    print_session_summary(&result);
    for error in &result.errors {
        warn!("Session issue: {}", error);
    }
    Ok(())
}

fn print_session_summary(result: &SessionResult) {
    let stats = &result.stats;
    println!();
    println!("Session finished in {:.1?}", result.duration);
    println!(
        "  Dispatched: {} ({:.1}/s)",
        stats.dispatched,
        result.dispatch_rate()
    );
    println!(
        "  Fetched:    {} ok, {} failed",
        stats.workers.fetched, stats.workers.failed
    );
    println!("  New rows:   {}", stats.newly_stored());
    if stats.discarded > 0 {
        println!("  Discarded:  {} queued at drain deadline", stats.discarded);
    }
    if let Some((timestamp, counter)) = stats.next_cursor() {
        println!("  Next:       timestamp {} counter {}", timestamp, counter);
    }
}

/// Print the bit fields of each identifier
pub async fn handle_decode(args: DecodeArgs) -> Result<()> {
    for id in args.ids {
        println!("{}", format_decoded(id));
    }
    Ok(())
}

/// Human-readable breakdown of one identifier
pub fn format_decoded(id: CandidateId) -> String {
    let parts = decode(id);
    let bits = to_bit_string(id);
    format!(
        "{id}\n  timestamp: {} ({})\n  counter:   {}\n  section:   {}\n  layout:    {} {} {}",
        parts.timestamp,
        parts.datetime().to_rfc3339(),
        parts.sub_second_counter,
        parts.section,
        &bits[..32],
        &bits[32..42],
        &bits[42..],
    )
}

/// Print the section histogram of the corpus
pub async fn handle_sections(
    args: SectionsArgs,
    mut config: AppConfig,
    store_override: Option<PathBuf>,
) -> Result<()> {
    if let Some(seed) = args.seed {
        config.store.seed_path = Some(seed);
    }
    if let Some(path) = store_override {
        config.store.path = path;
    }
    config.store.validate()?;

    let store = ParquetStore::new(&config.store);
    let corpus = load_corpus(&store, &config.store)?;
    let histogram = SectionHistogram::from_ids(corpus.ids.iter().copied());
    if histogram.is_empty() {
        return Err(ConfigError::EmptySeedCorpus.into());
    }

    info!(
        "Section histogram over {} ids ({} stored)",
        histogram.total(),
        corpus.stored.len()
    );
    println!("{}", format_histogram(&histogram, args.top));
    Ok(())
}

/// Table of the most frequent sections
pub fn format_histogram(histogram: &SectionHistogram, top: usize) -> String {
    let total = histogram.total().max(1);
    let mut lines = vec![format!(
        "{} ids, {} distinct sections",
        histogram.total(),
        histogram.distinct()
    )];

    for (rank, (section, count)) in histogram.top(top).into_iter().enumerate() {
        lines.push(format!(
            "{:>3}. {} {:>8} ({:.1}%)",
            rank + 1,
            section,
            count,
            count as f64 / total as f64 * 100.0
        ));
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::{encode, Section};

    #[test]
    fn test_format_decoded_layout() {
        let id = encode(1_700_000_000, 3, Section::new(5));
        let text = format_decoded(id);

        assert!(text.starts_with(&id.to_string()));
        assert!(text.contains("timestamp: 1700000000 (2023-11-14T22:13:20+00:00)"));
        assert!(text.contains("counter:   3"));
        assert!(text.contains("0000000011 0000000000000000000101"));
    }

    #[test]
    fn test_format_histogram_ranks_sections() {
        let ids = (0..3)
            .map(|c| encode(10, c, Section::new(7)))
            .chain(std::iter::once(encode(10, 9, Section::new(2))));
        let histogram = SectionHistogram::from_ids(ids);

        let text = format_histogram(&histogram, 10);
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "4 ids, 2 distinct sections");
        assert!(lines[1].contains("(7)"));
        assert!(lines[1].contains("75.0%"));
        assert!(lines[2].contains("(2)"));
    }
}
