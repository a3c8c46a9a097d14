//! Core application logic for snowprobe
//!
//! This module contains the pipeline components: identifier codec and
//! generator, the fetch collaborator, the work and result queues, the worker
//! pool, the batching sink with its Parquet store, and the controller that
//! ties them together.

pub mod client;
pub mod coordinator;
pub mod id;
pub mod models;
pub mod queue;
pub mod sink;
pub mod worker;

// Re-export main public API
pub use client::{FetchConfig, Fetcher, HttpFetcher};
pub use coordinator::{
    load_corpus, Corpus, Pipeline, PipelineConfig, PipelineState, PipelineStats, SessionResult,
    ShutdownHandle,
};
pub use id::{
    decode, encode, select_section, CandidateId, IdGenerator, IdParts, Section, SectionHistogram,
    SeenIdSet,
};
pub use models::{Document, FetchResult, FieldDenylist};
pub use queue::{result_queue, work_queue, WorkPoll};
pub use sink::{ParquetStore, ResultSink, SinkConfig, SinkStats, StoreConfig, StoredResults};
pub use worker::{DispatchCounter, WorkerConfig, WorkerPool, WorkerPoolStats};
