//! Common types and utilities shared across CLI commands.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use pkgmirror::config::ConfigFile;
use pkgmirror::fetch::{FetchProgress, ProgressCallback};
use pkgmirror::mirror::{MirrorConfig, MirrorSummary};

use crate::error::CliError;

/// Options shared by commands that download.
#[derive(Debug, Clone, Default, Args)]
pub struct RunOptions {
    /// Mirror root directory [config: mirror.directory]
    #[arg(short, long)]
    pub root: Option<PathBuf>,

    /// Registry base URL [config: registry.url]
    #[arg(long)]
    pub registry: Option<String>,

    /// Concurrent downloads in the main pass [config: mirror.concurrency]
    #[arg(short = 'j', long)]
    pub concurrency: Option<usize>,

    /// Concurrent downloads in retry rounds [config: mirror.retry_concurrency]
    #[arg(long)]
    pub retry_concurrency: Option<usize>,

    /// HTTP timeout in seconds [config: registry.timeout]
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Only mirror the versions named, without the newest of each major line
    #[arg(long)]
    pub no_majors: bool,
}

impl RunOptions {
    /// Build the run configuration: CLI flags first, then the config file.
    pub fn mirror_config(&self, config: &ConfigFile) -> Result<MirrorConfig, CliError> {
        let mut mirror = MirrorConfig::from(config);

        if let Some(root) = &self.root {
            mirror.root = expand_tilde(root);
        }
        if let Some(url) = &self.registry {
            if url.trim().is_empty() {
                return Err(CliError::Config("--registry must not be empty".to_string()));
            }
            mirror = mirror.with_registry_url(url.trim());
        }
        if let Some(n) = self.concurrency {
            mirror = mirror.with_concurrency(positive("--concurrency", n)?);
        }
        if let Some(n) = self.retry_concurrency {
            mirror = mirror.with_retry_concurrency(positive("--retry-concurrency", n)?);
        }
        if let Some(secs) = self.timeout {
            mirror = mirror.with_timeout(Duration::from_secs(secs.max(1)));
        }
        if self.no_majors {
            mirror = mirror.with_all_majors(false);
        }
        Ok(mirror)
    }
}

fn positive(flag: &str, value: usize) -> Result<usize, CliError> {
    if value == 0 {
        return Err(CliError::Config(format!("{} must be at least 1", flag)));
    }
    Ok(value)
}

/// Expand a leading `~` to the home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| path.to_path_buf()),
        Err(_) => path.to_path_buf(),
    }
}

/// Print the run banner.
pub fn print_banner(title: &str, config: &MirrorConfig) {
    println!("{} v{}", style(title).bold(), pkgmirror::VERSION);
    println!("Mirror:      {}", config.root.display());
    println!("Registry:    {}", config.registry_url);
    println!(
        "Concurrency: {} (retry {})",
        config.concurrency, config.retry_concurrency
    );
    println!(
        "Majors:      {}",
        if config.all_majors { "newest of each" } else { "as listed" }
    );
    println!();
}

/// Progress bar fed by fetch progress callbacks.
///
/// Each batch (main pass, retry rounds) reports its own total, so the bar is
/// resized on every update.
pub fn progress_bar() -> (ProgressBar, ProgressCallback) {
    let bar = ProgressBar::new(0);
    let style = ProgressStyle::with_template(
        "[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("=> ");
    bar.set_style(style);
    bar.enable_steady_tick(Duration::from_millis(200));

    let handle = bar.clone();
    let callback: ProgressCallback = Arc::new(move |progress: FetchProgress| {
        handle.set_length(progress.total as u64);
        handle.set_position(progress.finished() as u64);
        if progress.failed > 0 {
            handle.set_message(format!("{} ({} failed)", progress.label, progress.failed));
        } else {
            handle.set_message(progress.label);
        }
    });
    (bar, callback)
}

/// Print a run summary.
pub fn print_summary(summary: &MirrorSummary) {
    println!();
    println!("{}", style("Summary").bold().underlined());
    if summary.previously_failed > 0 {
        println!("  Failed last run: {}", summary.previously_failed);
    }
    println!("  Scheduled:   {}", summary.total);
    if summary.expanded > 0 {
        println!("  Expanded:    {}", summary.expanded);
    }
    if !summary.unexpanded.is_empty() {
        println!(
            "  Not expanded: {} ({})",
            style(summary.unexpanded.len()).yellow(),
            summary.unexpanded.join(", ")
        );
    }
    println!("  Downloaded:  {}", style(summary.downloaded).green());
    println!("  Up to date:  {}", summary.skipped_existing);
    if summary.rounds > 0 {
        println!("  Retry rounds: {}", summary.rounds);
    }
    if summary.failed > 0 {
        println!("  Failed:      {}", style(summary.failed).red().bold());
    }
    if summary.cancelled > 0 {
        println!("  Cancelled:   {}", style(summary.cancelled).yellow());
    }
    if let Some(path) = &summary.failure_manifest {
        println!();
        println!("Failed packages written to {}", path.display());
    }
}

/// Turn an incomplete run into an error for the exit code.
pub fn require_complete(summary: &MirrorSummary) -> Result<(), CliError> {
    if summary.cancelled > 0 {
        return Err(CliError::Incomplete(format!(
            "Cancelled with {} package(s) not mirrored",
            summary.cancelled
        )));
    }
    if summary.failed > 0 {
        return Err(CliError::Incomplete(format!(
            "{} package(s) could not be mirrored",
            summary.failed
        )));
    }
    if !summary.unexpanded.is_empty() {
        return Err(CliError::Incomplete(format!(
            "Major release lines of {} package(s) could not be looked up",
            summary.unexpanded.len()
        )));
    }
    println!();
    println!("{}", style("Mirror complete.").green().bold());
    Ok(())
}
