//! Pipeline orchestration and shutdown coordination
//!
//! The controller wires the generator, the worker pool and the result sink
//! together through two queues and owns the lifecycle state they observe.
//!
//! # Architecture
//!
//! - [`config`] - Runtime configuration and validation
//! - [`state`] - Forward-only lifecycle state published on a `watch` channel
//! - [`stats`] - Per-run statistics and the final session result
//! - [`signals`] - Ctrl-C / SIGTERM handling and programmatic shutdown
//! - [`background_tasks`] - Periodic progress logging
//!
//! # Shutdown
//!
//! A shutdown request moves the state to `Draining`. The generator stops and
//! drops its sender, which closes the work queue. Workers finish what is
//! queued, then exit; their result senders drop with them and the sink sees
//! its queue close, performs the final flush and returns. Only then does the
//! state become `Stopped`. If draining outlasts `shutdown_timeout`, queued
//! ids that no worker has taken yet are discarded; items already being
//! fetched are always awaited.
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use snowprobe::app::{FetchConfig, HttpFetcher, Pipeline, PipelineConfig, StoreConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let fetch_config = FetchConfig::default();
//! let fetcher = Arc::new(HttpFetcher::new(&fetch_config)?);
//!
//! let pipeline = Pipeline::open(
//!     PipelineConfig::default().with_worker_count(4),
//!     &StoreConfig::default(),
//!     fetcher,
//!     fetch_config.denylist(),
//! )?;
//!
//! let result = pipeline.run().await?;
//! println!("Dispatched {} fetches", result.stats.dispatched);
//! # Ok(())
//! # }
//! ```

pub mod background_tasks;
pub mod config;
pub mod signals;
pub mod state;
pub mod stats;

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::app::client::Fetcher;
use crate::app::id::{select_section, CandidateId, IdGenerator, Section, SeenIdSet};
use crate::app::models::FieldDenylist;
use crate::app::queue::{result_queue, work_queue};
use crate::app::sink::{load_seed_ids, ParquetStore, ResultSink, StoreConfig, StoredResults};
use crate::app::worker::{DispatchCounter, WorkerPool};
use crate::errors::{ConfigError, ConfigResult, PipelineError, Result};

pub use background_tasks::BackgroundTaskManager;
pub use config::PipelineConfig;
pub use signals::{create_shutdown_channel, ShutdownHandle, SignalHandler};
pub use state::{PipelineState, StateController};
pub use stats::{PipelineStats, SessionResult};

/// Stored results plus the id corpus used for section selection
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    pub stored: StoredResults,
    /// Every seed row followed by every stored id
    ///
    /// Repeated seed ids are kept so each occurrence counts towards its
    /// section.
    pub ids: Vec<CandidateId>,
}

/// Load the durable store and optional seed file
pub fn load_corpus(store: &ParquetStore, store_config: &StoreConfig) -> ConfigResult<Corpus> {
    let stored = store.load()?;
    let mut ids = Vec::new();

    if let Some(seed_path) = &store_config.seed_path {
        let seed_ids = load_seed_ids(seed_path, &store_config.seed_id_column).map_err(|e| {
            ConfigError::StoreUnreadable {
                path: seed_path.clone(),
                reason: e.to_string(),
            }
        })?;
        ids.extend(seed_ids);
    }
    ids.extend(stored.keys().copied());

    Ok(Corpus { stored, ids })
}

/// A fully prepared pipeline, ready to run
pub struct Pipeline {
    config: PipelineConfig,
    fetcher: Arc<dyn Fetcher>,
    denylist: FieldDenylist,
    store: ParquetStore,
    existing: StoredResults,
    section: Section,
    dispatched: DispatchCounter,
    shutdown_tx: broadcast::Sender<()>,
    shutdown_rx: broadcast::Receiver<()>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("store", &self.store)
            .field("stored", &self.existing.len())
            .field("section", &self.section)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Validate configuration, read persisted state and pick the section
    ///
    /// Every failure here is fatal: an unreadable store or an empty corpus
    /// leaves nothing sensible to generate.
    pub fn open(
        config: PipelineConfig,
        store_config: &StoreConfig,
        fetcher: Arc<dyn Fetcher>,
        denylist: FieldDenylist,
    ) -> ConfigResult<Self> {
        config.validate()?;
        store_config.validate()?;

        let store = ParquetStore::new(store_config);
        let corpus = load_corpus(&store, store_config)?;
        let section = select_section(corpus.ids.iter().copied())?;

        let (shutdown_tx, shutdown_rx) = create_shutdown_channel();

        Ok(Self {
            config,
            fetcher,
            denylist,
            store,
            existing: corpus.stored,
            section,
            dispatched: DispatchCounter::new(),
            shutdown_tx,
            shutdown_rx,
        })
    }

    /// Handle for requesting a graceful stop from elsewhere
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle::new(self.shutdown_tx.clone())
    }

    /// Shared count of dispatched fetch attempts
    pub fn dispatch_counter(&self) -> DispatchCounter {
        self.dispatched.clone()
    }

    pub fn section(&self) -> Section {
        self.section
    }

    pub fn stored_count(&self) -> usize {
        self.existing.len()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run until shutdown is requested or the id space is exhausted
    ///
    /// Returns an error only when results could not be persisted or the sink
    /// died; other component failures are reported in the session result.
    pub async fn run(self) -> Result<SessionResult> {
        let session_start = Instant::now();
        let Pipeline {
            config,
            fetcher,
            denylist,
            store,
            existing,
            section,
            dispatched,
            shutdown_tx,
            mut shutdown_rx,
        } = self;

        let mut stats = PipelineStats::new(section, existing.len());
        let mut errors = Vec::new();

        let signal_task = config
            .handle_signals
            .then(|| SignalHandler::new(shutdown_tx.clone()).setup());

        let state = StateController::new();
        let (work_tx, work_rx) = work_queue(config.worker_config.queue_capacity());
        let (result_tx, result_rx) = result_queue();

        let seen: SeenIdSet = existing.keys().copied().collect();
        let generator = IdGenerator::new(config.start_timestamp, section, seen);
        let mut producer = tokio::spawn(generator.produce(work_tx, state.subscribe()));

        let mut pool = WorkerPool::new(
            config.worker_config.clone(),
            fetcher,
            denylist,
            dispatched.clone(),
        );
        pool.start(work_rx.clone(), result_tx, state.subscribe())?;

        let sink = ResultSink::new(config.sink_config.clone(), store, existing);
        let persisted = sink.persisted_gauge();
        let sink_handle = tokio::spawn(sink.run(result_rx));

        let mut background = BackgroundTaskManager::new();
        background.start_periodic_logging_task(
            config.progress_log_interval,
            dispatched.clone(),
            work_rx.clone(),
            persisted,
            state.subscribe(),
        );

        info!(
            "Pipeline running: {} workers, section {}, queue capacity {}",
            config.worker_config.worker_count,
            section,
            work_rx.capacity()
        );

        let finished = tokio::select! {
            _ = shutdown_rx.recv() => {
                info!("Shutdown requested");
                None
            }
            joined = &mut producer => Some(joined),
        };

        state.advance(PipelineState::Draining)?;

        let producer_result = match finished {
            Some(joined) => joined,
            None => producer.await,
        };
        match producer_result {
            Ok(producer_stats) => stats.producer = Some(producer_stats),
            Err(e) => {
                error!("Generator task failed: {}", e);
                errors.push(format!("Generator task failed: {}", e));
            }
        }

        let pool_join = pool.join();
        tokio::pin!(pool_join);
        stats.workers = match tokio::time::timeout(config.shutdown_timeout, &mut pool_join).await {
            Ok(worker_stats) => worker_stats,
            Err(_) => {
                let discarded = work_rx.discard_pending().await;
                warn!(
                    "Drain deadline of {:?} reached, discarded {} queued candidates",
                    config.shutdown_timeout, discarded
                );
                stats.discarded = discarded;
                pool_join.await
            }
        };
        if stats.workers.panicked > 0 {
            errors.push(format!("{} workers panicked", stats.workers.panicked));
        }

        let sink_outcome = sink_handle.await;
        stats.dispatched = dispatched.get();

        state.advance(PipelineState::Stopped)?;
        background.shutdown_all().await;
        if let Some(task) = signal_task {
            task.abort();
        }

        match sink_outcome {
            Ok(Ok(sink_stats)) => stats.sink = Some(sink_stats),
            Ok(Err(e)) => {
                error!("Results could not be persisted: {}", e);
                return Err(e.into());
            }
            Err(e) => {
                error!("Result sink task failed: {}", e);
                return Err(PipelineError::TaskPanic {
                    component: "result sink".to_string(),
                }
                .into());
            }
        }

        let result = SessionResult::new(stats, errors, session_start.elapsed());
        info!(
            "Pipeline stopped after {:?}: {} dispatched, {} new results stored",
            result.duration,
            result.stats.dispatched,
            result.stats.newly_stored()
        );
        Ok(result)
    }
}
