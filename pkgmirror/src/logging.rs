//! Logging setup.
//!
//! Library code only emits `tracing` events. Binaries call [`init_logging`]
//! once at startup and hold the returned guard until exit; dropping it
//! flushes the background writer.
//!
//! `RUST_LOG` overrides the configured level, e.g.
//! `RUST_LOG=pkgmirror::fetch=debug`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::{self, time::LocalTime};
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Prefix of the daily log files (`pkgmirror.log.YYYY-MM-DD`).
pub const LOG_FILE_PREFIX: &str = "pkgmirror.log";

/// Errors raised while installing the subscriber.
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("failed to create log directory {}: {source}", path.display())]
    CreateDir { path: PathBuf, source: io::Error },

    #[error("invalid log level '{0}'")]
    InvalidLevel(String),

    #[error("failed to install subscriber: {0}")]
    Init(String),
}

/// Install the global subscriber.
///
/// Events at `level` and above go to a daily rolling file in `directory`.
/// With `echo_stderr` set, warnings and errors are also printed to stderr.
pub fn init_logging(
    directory: &Path,
    level: &str,
    echo_stderr: bool,
) -> Result<WorkerGuard, LoggingError> {
    fs::create_dir_all(directory).map_err(|source| LoggingError::CreateDir {
        path: directory.to_path_buf(),
        source,
    })?;

    let filter = build_filter(level)?;
    let appender = tracing_appender::rolling::daily(directory, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let file_layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true)
        .with_timer(LocalTime::new(Rfc3339))
        .with_filter(filter);

    let stderr_layer = echo_stderr.then(|| {
        fmt::layer()
            .with_writer(io::stderr)
            .without_time()
            .compact()
            .with_filter(LevelFilter::WARN)
    });

    tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer)
        .try_init()
        .map_err(|e| LoggingError::Init(e.to_string()))?;

    tracing::info!(
        directory = %directory.display(),
        level,
        version = crate::VERSION,
        "Logging initialized"
    );
    Ok(guard)
}

/// `RUST_LOG` when set and valid, otherwise `level` for this crate and
/// `warn` for dependencies.
fn build_filter(level: &str) -> Result<EnvFilter, LoggingError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    let level = level.trim().to_ascii_lowercase();
    if !matches!(level.as_str(), "trace" | "debug" | "info" | "warn" | "error" | "off") {
        return Err(LoggingError::InvalidLevel(level));
    }
    EnvFilter::try_new(format!("warn,pkgmirror={}", level))
        .map_err(|_| LoggingError::InvalidLevel(level))
}
