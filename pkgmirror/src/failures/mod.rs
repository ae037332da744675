//! Failure isolation.
//!
//! Separates persistently failing tasks from the fast path:
//!
//! ```text
//! round 0 (main pass)   skip_failed = true,  concurrency 30
//!      │ failures ──► FailureIsolationStore
//! round 1..=2 (retry)   skip_failed = false, concurrency 10, store contents only
//!      │ residual ──► failed-packages.json
//! ```
//!
//! The store is created per run and passed explicitly to every component
//! that needs it.

mod error;
mod record;
mod store;

pub use error::{FailureStoreError, FailureStoreResult};
pub use record::{FailureManifestEntry, FailureRecord};
pub use store::{
    failure_manifest_path, session_path, FailureIsolationStore, FAILURE_MANIFEST_FILE,
    MAX_RETRY_ROUNDS, SESSION_FILE, STATE_DIR,
};
