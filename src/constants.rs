//! Application constants for snowprobe
//!
//! This module centralizes all constants used throughout the application,
//! organized by functional domain for maintainability and clarity.

use std::time::Duration;

/// Identifier bit layout (MSB to LSB: timestamp, counter, section)
pub mod id {
    /// Bits holding Unix epoch seconds
    pub const TIMESTAMP_BITS: u32 = 32;

    /// Bits holding the sub-second counter
    pub const COUNTER_BITS: u32 = 10;

    /// Bits holding the opaque section/shard field
    pub const SECTION_BITS: u32 = 22;

    pub const SECTION_SHIFT: u32 = 0;
    pub const COUNTER_SHIFT: u32 = SECTION_SHIFT + SECTION_BITS;
    pub const TIMESTAMP_SHIFT: u32 = COUNTER_SHIFT + COUNTER_BITS;

    pub const TIMESTAMP_MASK: u64 = (1 << TIMESTAMP_BITS) - 1;
    pub const COUNTER_MASK: u64 = (1 << COUNTER_BITS) - 1;
    pub const SECTION_MASK: u64 = (1 << SECTION_BITS) - 1;

    /// Number of distinct counter values per second
    pub const COUNTER_SPAN: u16 = 1 << COUNTER_BITS;

    /// Default generation start (2023-06-01T10:00:00Z)
    pub const DEFAULT_START_TIMESTAMP: i64 = 1_685_613_600;

    const _: () = assert!(
        TIMESTAMP_BITS + COUNTER_BITS + SECTION_BITS == u64::BITS,
        "id layout must cover exactly 64 bits"
    );
}

/// Worker and concurrency configuration
pub mod workers {
    use super::Duration;

    /// Default number of fetch workers
    pub const DEFAULT_WORKER_COUNT: usize = 8;

    /// Maximum allowed concurrent workers
    pub const MAX_WORKER_COUNT: usize = 64;

    /// Work queue capacity per worker
    pub const QUEUE_SLOTS_PER_WORKER: usize = 10;

    /// Queue wait timeout used as the cancellation poll point
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

    /// Timeout for a single fetch
    pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);
}

/// Result sink and persistence
pub mod sink {
    use super::Duration;

    /// Default number of results per flush
    pub const DEFAULT_BATCH_SIZE: usize = 256;

    /// Attempts made for the shutdown flush before giving up
    pub const FINAL_FLUSH_ATTEMPTS: u32 = 3;

    /// Delay between shutdown flush attempts
    pub const FINAL_FLUSH_RETRY_DELAY: Duration = Duration::from_millis(500);

    /// Zstd compression level for store files
    pub const DEFAULT_ZSTD_LEVEL: i32 = 3;

    /// Column holding the candidate id
    pub const ID_COLUMN: &str = "id";

    /// Column holding the JSON-encoded response document
    pub const RESULT_COLUMN: &str = "result";
}

/// File operation constants
pub mod files {
    /// Temporary file suffix for atomic operations
    pub const TEMP_FILE_SUFFIX: &str = ".tmp";

    /// Suffix inserted before the extension of the backup store
    pub const BACKUP_STEM_SUFFIX: &str = "_bckup";

    /// Default primary store path
    pub const DEFAULT_STORE_PATH: &str = "./data/sampled_results.parquet";

    /// Default id column in seed corpus files
    pub const DEFAULT_SEED_ID_COLUMN: &str = "aweme_id";

    /// Project-local config file name
    pub const LOCAL_CONFIG_FILE: &str = "snowprobe.toml";
}

/// Coordinator and orchestration constants
pub mod coordinator {
    use super::Duration;

    /// Maximum time spent draining queued work after cancellation
    pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

    /// Interval for periodic progress logging
    pub const PROGRESS_LOG_INTERVAL: Duration = Duration::from_secs(60);

    /// Timeout for background task shutdown
    pub const TASK_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);
}

/// Fetch collaborator defaults
pub mod fetch {
    use super::Duration;

    /// Default user agent for all HTTP requests
    pub const USER_AGENT: &str = "snowprobe/0.1.0";

    /// Placeholder substituted with the candidate id in the endpoint template
    pub const ID_PLACEHOLDER: &str = "{id}";

    /// Default request rate (requests per second)
    pub const DEFAULT_RATE_LIMIT_RPS: u32 = 10;

    /// Connection establishment timeout
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Field names removed from every response before storage
    pub const DEFAULT_DENYLIST: &[&str] = &[
        "duet_origin_item",
        "show_follow_button",
        "entertainment_product_info",
    ];
}

pub use fetch::USER_AGENT;
pub use files::TEMP_FILE_SUFFIX;
pub use workers::DEFAULT_WORKER_COUNT;
