//! Mirror command - download everything a lock document references.

use std::path::PathBuf;

use pkgmirror::lockfile::FileLockSource;
use pkgmirror::mirror::MirrorSession;

use super::common::{
    expand_tilde, print_banner, print_summary, progress_bar, require_complete, RunOptions,
};
use crate::error::CliError;
use crate::runner::CliRunner;

/// Run the mirror command.
pub fn run(runner: &CliRunner, lock: PathBuf, options: &RunOptions) -> Result<(), CliError> {
    runner.log_startup("mirror");
    let config = options.mirror_config(runner.config())?;
    let lock = expand_tilde(&lock);

    print_banner("pkgmirror", &config);
    println!("Lock file:   {}", lock.display());
    println!();

    let (bar, callback) = progress_bar();
    let session = MirrorSession::connect(config)?
        .with_cancellation(runner.cancellation_token())
        .with_progress(callback);

    let result = runner.block_on(session.mirror_source(&FileLockSource::new(lock)));
    bar.finish_and_clear();

    let summary = result?;
    print_summary(&summary);
    require_complete(&summary)
}
