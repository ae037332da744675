//! Package command - mirror a single package by name.

use pkgmirror::mirror::MirrorSession;

use super::common::{print_banner, print_summary, progress_bar, require_complete, RunOptions};
use crate::error::CliError;
use crate::runner::CliRunner;

/// Run the package command.
pub fn run(
    runner: &CliRunner,
    name: &str,
    version: Option<&str>,
    options: &RunOptions,
) -> Result<(), CliError> {
    runner.log_startup("package");
    let config = options.mirror_config(runner.config())?;

    print_banner("pkgmirror", &config);
    println!("Package:     {}@{}", name, version.unwrap_or("latest"));
    println!();

    let (bar, callback) = progress_bar();
    let session = MirrorSession::connect(config)?
        .with_cancellation(runner.cancellation_token())
        .with_progress(callback);

    let result = runner.block_on(session.mirror_package(name, version));
    bar.finish_and_clear();

    let summary = result?;
    print_summary(&summary);
    require_complete(&summary)
}
