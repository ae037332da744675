//! CLI error type.

use std::process::ExitCode;

use pkgmirror::audit::AuditError;
use pkgmirror::config::ConfigError;
use pkgmirror::logging::LoggingError;
use pkgmirror::mirror::MirrorError;
use thiserror::Error;

/// Errors surfaced to the user by the `pkgmirror` binary.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    ConfigFile(#[from] ConfigError),

    #[error("Logging setup failed: {0}")]
    Logging(#[from] LoggingError),

    #[error("Failed to start async runtime: {0}")]
    Runtime(#[source] std::io::Error),

    #[error(transparent)]
    Mirror(#[from] MirrorError),

    #[error(transparent)]
    Audit(#[from] AuditError),

    /// The run finished but left work undone.
    #[error("{0}")]
    Incomplete(String),
}

impl CliError {
    /// Process exit code for this error.
    ///
    /// Incomplete runs exit with 2 so scripts can tell them apart from hard
    /// failures.
    pub fn exit_code(&self) -> ExitCode {
        match self {
            CliError::Incomplete(_) => ExitCode::from(2),
            _ => ExitCode::FAILURE,
        }
    }
}
