//! Error types for failure store persistence.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for failure store persistence.
pub type FailureStoreResult<T> = Result<T, FailureStoreError>;

/// Errors that can occur while persisting failure state.
#[derive(Debug, Error)]
pub enum FailureStoreError {
    /// Reading or writing a state file failed.
    #[error("failure store I/O on {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },

    /// State could not be serialized.
    #[error("failed to serialize failure state: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl FailureStoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        FailureStoreError::Io {
            path: path.into(),
            source,
        }
    }
}
