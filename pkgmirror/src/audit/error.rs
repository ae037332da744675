//! Error types for mirror audits.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for audit operations.
pub type AuditResult<T> = Result<T, AuditError>;

/// Errors that stop an audit.
///
/// Unreadable entries below the root do not stop it; they are collected in
/// [`IntegrityReport::errors`](super::IntegrityReport::errors).
#[derive(Debug, Error)]
pub enum AuditError {
    /// The mirror root does not exist or is not a directory.
    #[error("mirror root {} is not a directory", .0.display())]
    RootNotFound(PathBuf),

    /// The mirror root could not be listed.
    #[error("failed to read mirror root {}: {source}", path.display())]
    RootUnreadable { path: PathBuf, source: io::Error },

    /// The snapshot could not be written.
    #[error("failed to write snapshot {}: {source}", path.display())]
    Snapshot { path: PathBuf, source: io::Error },

    /// The snapshot could not be serialized.
    #[error("failed to serialize snapshot: {0}")]
    Serialize(#[from] serde_json::Error),
}
