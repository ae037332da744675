//! Error types for network fetches and mirror writes.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for fetch operations.
pub type FetchResult<T> = Result<T, FetchError>;

/// Errors that can occur while fetching from the registry or writing to the
/// mirror.
///
/// Variants fall into three classes:
/// - transient: retried with backoff ([`FetchError::is_transient`])
/// - permanent: surface immediately as a task failure
/// - fatal: abort the whole run ([`FetchError::is_fatal`])
#[derive(Debug, Error, Clone)]
pub enum FetchError {
    /// Request exceeded the transport timeout.
    #[error("request to {url} timed out")]
    Timeout { url: String },

    /// Connection could not be established or was reset.
    #[error("connection to {url} failed: {reason}")]
    Connection { url: String, reason: String },

    /// Server answered with a non-success status.
    #[error("HTTP {status} from {url}")]
    HttpStatus { url: String, status: u16 },

    /// Response body was interrupted mid-stream.
    #[error("transfer from {url} interrupted: {reason}")]
    Stream { url: String, reason: String },

    /// The circuit breaker is open; no request was made.
    #[error("circuit breaker open, network acquisition refused")]
    CircuitOpen,

    /// Registry payload could not be understood.
    #[error("malformed registry payload from {url}: {reason}")]
    MalformedPayload { url: String, reason: String },

    /// A version string is not valid semver.
    #[error("invalid semantic version '{0}'")]
    InvalidVersion(String),

    /// Writing to the destination failed.
    #[error("failed to write {}: {reason}", path.display())]
    Write { path: PathBuf, reason: String },

    /// The mirror root could not be created. Fatal to the run.
    #[error("failed to create mirror root {}: {reason}", path.display())]
    CreateRoot { path: PathBuf, reason: String },

    /// The operation was cancelled before completion.
    #[error("cancelled")]
    Cancelled,
}

impl FetchError {
    /// Whether retrying the same request may succeed.
    ///
    /// Timeouts, connection failures, interrupted transfers, 5xx, 429 and an
    /// open circuit are transient. Everything else is permanent.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Timeout { .. }
            | FetchError::Connection { .. }
            | FetchError::Stream { .. }
            | FetchError::CircuitOpen => true,
            FetchError::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            FetchError::MalformedPayload { .. }
            | FetchError::InvalidVersion(_)
            | FetchError::Write { .. }
            | FetchError::CreateRoot { .. }
            | FetchError::Cancelled => false,
        }
    }

    /// Whether this error must abort the run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, FetchError::CreateRoot { .. })
    }

    /// Whether this failure reflects network health (and should count as a
    /// failed sample for the health monitor).
    pub fn is_network_failure(&self) -> bool {
        match self {
            FetchError::Timeout { .. }
            | FetchError::Connection { .. }
            | FetchError::Stream { .. } => true,
            FetchError::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Build a write error from an I/O error.
    pub fn write(path: impl Into<PathBuf>, source: io::Error) -> Self {
        FetchError::Write {
            path: path.into(),
            reason: source.to_string(),
        }
    }

    /// Classify a reqwest error for the given URL.
    pub fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout {
                url: url.to_string(),
            }
        } else if let Some(status) = err.status() {
            FetchError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            }
        } else if err.is_body() || err.is_decode() {
            FetchError::Stream {
                url: url.to_string(),
                reason: err.to_string(),
            }
        } else {
            FetchError::Connection {
                url: url.to_string(),
                reason: err.to_string(),
            }
        }
    }
}
