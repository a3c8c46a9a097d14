//! Signal handling for graceful shutdown
//!
//! Ctrl-C and SIGTERM are turned into a message on a broadcast channel; the
//! pipeline treats that message exactly like a programmatic
//! [`ShutdownHandle::shutdown`] call.

use tokio::signal;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::info;

/// Signal handler for graceful shutdown coordination
pub struct SignalHandler {
    shutdown_tx: broadcast::Sender<()>,
}

impl SignalHandler {
    pub fn new(shutdown_tx: broadcast::Sender<()>) -> Self {
        Self { shutdown_tx }
    }

    /// Spawn the task that waits for CTRL-C or SIGTERM
    pub fn setup(&self) -> JoinHandle<()> {
        let shutdown_tx = self.shutdown_tx.clone();

        tokio::spawn(async move {
            let ctrl_c = async {
                signal::ctrl_c()
                    .await
                    .expect("Failed to install Ctrl+C handler");
            };

            #[cfg(unix)]
            let terminate = async {
                signal::unix::signal(signal::unix::SignalKind::terminate())
                    .expect("Failed to install signal handler")
                    .recv()
                    .await;
            };

            #[cfg(not(unix))]
            let terminate = std::future::pending::<()>();

            tokio::select! {
                _ = ctrl_c => {
                    info!("Received Ctrl+C, draining pipeline");
                },
                _ = terminate => {
                    info!("Received terminate signal, draining pipeline");
                },
            }

            let _ = shutdown_tx.send(());
        })
    }
}

/// Cloneable handle that requests a graceful shutdown
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    shutdown_tx: broadcast::Sender<()>,
}

impl ShutdownHandle {
    pub fn new(shutdown_tx: broadcast::Sender<()>) -> Self {
        Self { shutdown_tx }
    }

    /// Ask the pipeline to stop producing and drain
    pub fn shutdown(&self) {
        // No receivers means the pipeline has already finished
        let _ = self.shutdown_tx.send(());
    }
}

/// Create a shutdown signal broadcaster
pub fn create_shutdown_channel() -> (broadcast::Sender<()>, broadcast::Receiver<()>) {
    broadcast::channel(1)
}
