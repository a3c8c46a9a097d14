//! Worker pool management and coordination
//!
//! The pool spawns the configured number of [`FetchWorker`]s over one shared
//! work queue and collects their statistics when they finish. A panicking
//! worker is counted but does not bring down the others.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::config::WorkerConfig;
use super::core::FetchWorker;
use super::types::{DispatchCounter, WorkerPoolStats, WorkerStats};
use crate::app::client::Fetcher;
use crate::app::coordinator::PipelineState;
use crate::app::models::FieldDenylist;
use crate::app::queue::{ResultSender, WorkReceiver};
use crate::errors::{PipelineError, PipelineResult};

/// Current state of the worker pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolState {
    /// Pool has been created but not started
    Created,
    /// Pool is running with active workers
    Running,
    /// Pool is waiting for workers to finish
    ShuttingDown,
    /// All workers have exited
    Shutdown,
}

/// Pool of fetch workers sharing one work queue
pub struct WorkerPool {
    config: WorkerConfig,
    fetcher: Arc<dyn Fetcher>,
    denylist: Arc<FieldDenylist>,
    dispatched: DispatchCounter,
    worker_handles: Vec<JoinHandle<WorkerStats>>,
    state: PoolState,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("config", &self.config)
            .field("workers", &self.worker_handles.len())
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl WorkerPool {
    pub fn new(
        config: WorkerConfig,
        fetcher: Arc<dyn Fetcher>,
        denylist: FieldDenylist,
        dispatched: DispatchCounter,
    ) -> Self {
        Self {
            config,
            fetcher,
            denylist: Arc::new(denylist),
            dispatched,
            worker_handles: Vec::new(),
            state: PoolState::Created,
        }
    }

    /// Spawn all workers
    ///
    /// Each worker receives its own clone of `result_tx`; the caller should
    /// drop its copy so the result queue closes once every worker is done.
    pub fn start(
        &mut self,
        work_rx: WorkReceiver,
        result_tx: ResultSender,
        state_rx: watch::Receiver<PipelineState>,
    ) -> PipelineResult<()> {
        if self.state != PoolState::Created {
            return Err(PipelineError::PoolState {
                state: format!("{:?}", self.state),
                action: "start".to_string(),
            });
        }

        info!("Starting {} workers", self.config.worker_count);

        for worker_id in 0..self.config.worker_count {
            let worker = FetchWorker::new(
                worker_id as u32,
                self.config.clone(),
                work_rx.clone(),
                result_tx.clone(),
                self.fetcher.clone(),
                self.denylist.clone(),
                self.dispatched.clone(),
                state_rx.clone(),
            );
            self.worker_handles.push(tokio::spawn(worker.run()));
        }

        self.state = PoolState::Running;
        Ok(())
    }

    /// Wait for every worker to exit and aggregate their statistics
    pub async fn join(mut self) -> WorkerPoolStats {
        if self.state != PoolState::Running {
            warn!("Joining worker pool in state: {:?}", self.state);
        }
        self.state = PoolState::ShuttingDown;

        let mut pool_stats = WorkerPoolStats::default();
        for handle in std::mem::take(&mut self.worker_handles) {
            match handle.await {
                Ok(stats) => pool_stats.record(&stats),
                Err(e) => {
                    warn!("Worker task failed: {}", e);
                    pool_stats.panicked += 1;
                }
            }
        }

        if pool_stats.panicked > 0 {
            warn!("{} workers panicked", pool_stats.panicked);
        }

        self.state = PoolState::Shutdown;
        info!(
            "Worker pool finished: {} fetched, {} failed ({:.1}% success)",
            pool_stats.fetched,
            pool_stats.failed,
            pool_stats.success_rate()
        );
        pool_stats
    }

    pub fn state(&self) -> PoolState {
        self.state
    }

    pub fn worker_count(&self) -> usize {
        self.worker_handles.len()
    }
}
