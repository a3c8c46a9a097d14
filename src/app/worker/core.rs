//! Core fetch worker implementation
//!
//! Each worker pulls candidate ids from the shared work queue, asks the
//! [`Fetcher`] for the matching document, strips denylisted fields and hands
//! the result to the sink. Fetch failures are logged and the item dropped;
//! the worker keeps going.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::config::WorkerConfig;
use super::types::{DispatchCounter, WorkerStats};
use crate::app::client::Fetcher;
use crate::app::coordinator::PipelineState;
use crate::app::id::CandidateId;
use crate::app::models::{FetchResult, FieldDenylist};
use crate::app::queue::{ResultSender, WorkPoll, WorkReceiver};
use crate::errors::FetchError;

/// A single fetch worker
pub struct FetchWorker {
    id: u32,
    config: WorkerConfig,
    work_rx: WorkReceiver,
    result_tx: ResultSender,
    fetcher: Arc<dyn Fetcher>,
    denylist: Arc<FieldDenylist>,
    dispatched: DispatchCounter,
    state_rx: watch::Receiver<PipelineState>,
    stats: WorkerStats,
}

impl std::fmt::Debug for FetchWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchWorker")
            .field("id", &self.id)
            .field("config", &self.config)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl FetchWorker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: u32,
        config: WorkerConfig,
        work_rx: WorkReceiver,
        result_tx: ResultSender,
        fetcher: Arc<dyn Fetcher>,
        denylist: Arc<FieldDenylist>,
        dispatched: DispatchCounter,
        state_rx: watch::Receiver<PipelineState>,
    ) -> Self {
        Self {
            id,
            config,
            work_rx,
            result_tx,
            fetcher,
            denylist,
            dispatched,
            state_rx,
            stats: WorkerStats {
                worker_id: id,
                ..Default::default()
            },
        }
    }

    /// Run until the work queue is closed and empty
    ///
    /// Draining does not stop the worker: items already queued are still
    /// fetched. The worker only leaves early if the pipeline reports
    /// `Stopped` while the queue is idle.
    pub async fn run(mut self) -> WorkerStats {
        debug!("Worker {} starting", self.id);

        loop {
            match self.work_rx.recv_timeout(self.config.poll_interval).await {
                WorkPoll::Item(candidate) => {
                    if !self.process(candidate).await {
                        break;
                    }
                }
                WorkPoll::Empty => {
                    self.stats.empty_polls += 1;
                    if *self.state_rx.borrow() == PipelineState::Stopped {
                        debug!("Worker {} saw pipeline stopped", self.id);
                        break;
                    }
                }
                WorkPoll::Closed => {
                    debug!("Worker {} found work queue closed", self.id);
                    break;
                }
            }
        }

        info!(
            "Worker {} finished: {} fetched, {} failed",
            self.id, self.stats.fetched, self.stats.failed
        );
        self.stats
    }

    /// Fetch one candidate; returns false if results can no longer be delivered
    async fn process(&mut self, candidate: CandidateId) -> bool {
        self.dispatched.increment();

        let outcome =
            match tokio::time::timeout(self.config.fetch_timeout, self.fetcher.fetch(candidate))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(FetchError::Timeout {
                    elapsed: self.config.fetch_timeout,
                }),
            };

        let mut document = match outcome {
            Ok(document) => document,
            Err(e) => {
                self.stats.failed += 1;
                warn!("Worker {} failed to fetch {}: {}", self.id, candidate, e);
                return true;
            }
        };

        self.stats.fields_stripped += self.denylist.strip(&mut document) as u64;

        if self
            .result_tx
            .send(FetchResult::new(candidate, document))
            .is_err()
        {
            warn!(
                "Worker {} cannot deliver {}: result queue closed",
                self.id, candidate
            );
            return false;
        }

        self.stats.fetched += 1;
        debug!("Worker {} fetched {}", self.id, candidate);
        true
    }

    pub fn id(&self) -> u32 {
        self.id
    }
}
