//! Shared setup for commands that touch the network or the mirror tree.

use std::future::Future;

use pkgmirror::config::ConfigFile;
use pkgmirror::logging::init_logging;
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;
use tracing_appender::non_blocking::WorkerGuard;

use crate::error::CliError;

/// Open-file limit requested at startup; every concurrent download holds a
/// socket and a file.
const NOFILE_TARGET: u64 = 8192;

/// Loaded configuration, logging, signal handling and the async runtime.
pub struct CliRunner {
    config: ConfigFile,
    runtime: Runtime,
    cancel: CancellationToken,
    _log_guard: WorkerGuard,
}

impl CliRunner {
    /// Load configuration and install logging plus the Ctrl-C handler.
    pub fn new(verbose: bool) -> Result<Self, CliError> {
        let (config, config_error) = match ConfigFile::load() {
            Ok(config) => (config, None),
            Err(e) => (ConfigFile::default(), Some(e)),
        };
        let log_guard = init_logging(&config.logging.directory, &config.logging.level, verbose)?;
        if let Some(e) = config_error {
            eprintln!("Warning: {}; using defaults", e);
            tracing::warn!(error = %e, "Unreadable config file, using defaults");
        }

        raise_open_file_limit();

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        ctrlc::set_handler(move || {
            if token.is_cancelled() {
                eprintln!("\nForced exit.");
                std::process::exit(130);
            }
            eprintln!("\nCancelling, waiting for in-flight downloads (Ctrl-C again to force)...");
            tracing::warn!("Cancellation requested");
            token.cancel();
        })
        .map_err(|e| CliError::Config(format!("Failed to set signal handler: {}", e)))?;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(CliError::Runtime)?;

        Ok(Self {
            config,
            runtime,
            cancel,
            _log_guard: log_guard,
        })
    }

    /// Configuration loaded from disk (defaults when absent).
    pub fn config(&self) -> &ConfigFile {
        &self.config
    }

    /// Token cancelled by Ctrl-C.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Log the command being run.
    pub fn log_startup(&self, command: &str) {
        tracing::info!(
            command,
            version = pkgmirror::VERSION,
            registry = %self.config.registry.url,
            "pkgmirror starting"
        );
    }

    /// Drive a future to completion on the runtime.
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }
}

#[cfg(unix)]
fn raise_open_file_limit() {
    match rlimit::increase_nofile_limit(NOFILE_TARGET) {
        Ok(limit) => tracing::debug!(limit, "Open file limit"),
        Err(e) => tracing::warn!(error = %e, "Could not raise open file limit"),
    }
}

#[cfg(not(unix))]
fn raise_open_file_limit() {
    let _ = NOFILE_TARGET;
}
