//! Concurrent package fetching.
//!
//! - `engine`: bounded-concurrency batch downloader
//! - `retry`: per-task exponential backoff with jitter
//! - `writer`: atomic mirror file writes
//! - `progress`: optional progress callback plumbing
//! - `task`: task, failure and batch report types
//! - `error`: [`FetchError`] and its transient/permanent/fatal classes

mod engine;
mod error;
mod progress;
mod retry;
mod task;
mod writer;

pub use engine::FetchEngine;
pub use error::{FetchError, FetchResult};
pub use progress::{FetchProgress, ProgressCallback};
pub use retry::{
    RetryPolicy, DEFAULT_BACKOFF_MULTIPLIER, DEFAULT_INITIAL_DELAY_MS, DEFAULT_MAX_ATTEMPTS,
    DEFAULT_MAX_DELAY_SECS, DEFAULT_MAX_JITTER_MS,
};
pub use task::{BatchReport, DownloadTask, FailedTask, TaskOutcome};
pub use writer::{is_satisfied, partial_path, MANIFEST_FILE, PARTIAL_SUFFIX};
