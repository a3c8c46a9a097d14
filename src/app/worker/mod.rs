//! Fetch worker pool
//!
//! Workers pull candidate ids from the shared work queue, fetch them through
//! the [`Fetcher`](crate::app::client::Fetcher) collaborator and forward the
//! cleaned documents to the result sink.
//!
//! # Modules
//!
//! - [`config`] - Worker configuration and validation
//! - [`types`] - Statistics and the shared dispatch counter
//! - [`core`] - The single-worker fetch loop
//! - [`pool`] - Spawning, joining and panic accounting for N workers

pub mod config;
pub mod core;
pub mod pool;
pub mod types;

pub use config::WorkerConfig;
pub use core::FetchWorker;
pub use pool::{PoolState, WorkerPool};
pub use types::{DispatchCounter, WorkerPoolStats, WorkerStats};

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::{HashMap, HashSet};
    use std::time::Duration;

    use futures::future::BoxFuture;

    use crate::app::client::Fetcher;
    use crate::app::id::CandidateId;
    use crate::app::models::Document;
    use crate::errors::{FetchError, FetchOutcome};

    /// In-memory fetcher answering from a fixed table
    ///
    /// Unknown ids fail with a 404 status.
    #[derive(Debug, Default)]
    pub(crate) struct ScriptedFetcher {
        responses: HashMap<CandidateId, Document>,
        panics: HashSet<CandidateId>,
        delay: Option<Duration>,
    }

    impl ScriptedFetcher {
        pub(crate) fn respond(mut self, id: CandidateId, document: Document) -> Self {
            self.responses.insert(id, document);
            self
        }

        pub(crate) fn panic_on(mut self, id: CandidateId) -> Self {
            self.panics.insert(id);
            self
        }

        pub(crate) fn delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }
    }

    impl Fetcher for ScriptedFetcher {
        fn fetch(&self, id: CandidateId) -> BoxFuture<'_, FetchOutcome<Document>> {
            Box::pin(async move {
                if let Some(delay) = self.delay {
                    tokio::time::sleep(delay).await;
                }
                if self.panics.contains(&id) {
                    panic!("scripted panic for {id}");
                }
                self.responses
                    .get(&id)
                    .cloned()
                    .ok_or(FetchError::Status { status: 404 })
            })
        }
    }
}
