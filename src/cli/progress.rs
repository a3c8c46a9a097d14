//! Live progress spinner for the run command
//!
//! The spinner reads the shared dispatch counter on a fixed cadence; it never
//! touches pipeline internals and stops as soon as it is told to.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::app::DispatchCounter;
use crate::errors::{AppError, Result};

const REFRESH_INTERVAL: Duration = Duration::from_millis(200);

/// Spinner showing dispatched fetch attempts
pub struct ProgressSpinner {
    stop_tx: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl ProgressSpinner {
    /// Start the spinner over `dispatched`
    pub fn start(dispatched: DispatchCounter) -> Result<Self> {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {pos} dispatched ({per_sec}) {msg}")
                .map_err(|e| AppError::generic(format!("Progress template error: {}", e)))?,
        );
        pb.enable_steady_tick(Duration::from_millis(100));

        let (stop_tx, mut stop_rx) = oneshot::channel();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(REFRESH_INTERVAL);
            loop {
                tokio::select! {
                    _ = ticker.tick() => pb.set_position(dispatched.get()),
                    _ = &mut stop_rx => break,
                }
            }
            pb.set_position(dispatched.get());
            pb.finish_with_message("done");
        });

        Ok(Self { stop_tx, handle })
    }

    /// Stop refreshing and leave the final count on screen
    pub async fn finish(self) {
        let _ = self.stop_tx.send(());
        let _ = self.handle.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_spinner_start_and_finish() {
        let counter = DispatchCounter::new();
        let spinner = ProgressSpinner::start(counter.clone()).unwrap();
        counter.increment();
        tokio::time::timeout(Duration::from_secs(1), spinner.finish())
            .await
            .unwrap();
    }
}
