//! Background task management for the pipeline controller
//!
//! Background tasks watch the pipeline state channel and exit on their own
//! once the pipeline reports `Stopped`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::state::PipelineState;
use crate::app::queue::WorkReceiver;
use crate::app::worker::DispatchCounter;
use crate::constants::coordinator;

/// Background task manager for monitoring tasks
#[derive(Debug, Default)]
pub struct BackgroundTaskManager {
    tasks: Vec<JoinHandle<()>>,
}

impl BackgroundTaskManager {
    pub fn new() -> Self {
        Self { tasks: Vec::new() }
    }

    /// Start periodic progress logging task
    pub fn start_periodic_logging_task(
        &mut self,
        interval: Duration,
        dispatched: DispatchCounter,
        work_rx: WorkReceiver,
        persisted: Arc<AtomicUsize>,
        mut state_rx: watch::Receiver<PipelineState>,
    ) {
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately
            ticker.tick().await;
            let mut last_dispatched = 0u64;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let total = dispatched.get();
                        info!(
                            "Progress: {} dispatched (+{}), {} queued, {} stored",
                            total,
                            total.saturating_sub(last_dispatched),
                            work_rx.depth(),
                            persisted.load(Ordering::Relaxed)
                        );
                        last_dispatched = total;
                    }
                    changed = state_rx.changed() => {
                        if changed.is_err() || *state_rx.borrow_and_update() == PipelineState::Stopped {
                            debug!("Progress logging task stopping");
                            break;
                        }
                    }
                }
            }
        });

        self.tasks.push(task);
    }

    /// Wait for all background tasks, bounded per task
    pub async fn shutdown_all(self) {
        for task in self.tasks {
            if tokio::time::timeout(coordinator::TASK_SHUTDOWN_TIMEOUT, task)
                .await
                .is_err()
            {
                warn!(
                    "Background task shutdown timed out after {:?}",
                    coordinator::TASK_SHUTDOWN_TIMEOUT
                );
            }
        }
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }
}
