//! Error types for lock document handling.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for lock document operations.
pub type LockfileResult<T> = Result<T, LockfileError>;

/// Errors that can occur while loading or extracting a lock document.
#[derive(Debug, Error)]
pub enum LockfileError {
    /// The document is not JSON, or matches neither supported shape.
    #[error("malformed lock document: {0}")]
    MalformedDocument(String),

    /// The lock file could not be read.
    #[error("failed to read lock file {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },
}
