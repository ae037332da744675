//! Audit command - check the mirror tree and optionally fill version gaps.

use console::style;
use pkgmirror::audit::{self, AuditOptions, IntegrityReport, IssueCategory, RepairSummary};
use pkgmirror::mirror::MirrorSession;

use super::common::{print_summary, progress_bar, RunOptions};
use crate::error::CliError;
use crate::runner::CliRunner;

/// Issues listed individually before the output is truncated.
const MAX_LISTED: usize = 25;

/// Arguments for the audit command.
pub struct AuditArgs {
    pub fix: bool,
    pub verify: bool,
    pub options: RunOptions,
}

/// Run the audit command.
pub fn run(runner: &CliRunner, args: AuditArgs) -> Result<(), CliError> {
    runner.log_startup("audit");
    let config = args.options.mirror_config(runner.config())?;
    let root = config.root.clone();
    let options = AuditOptions::default().with_verify_archives(args.verify);

    println!("Auditing {}", root.display());
    let mut report = audit::audit(&root, &options)?;
    print_report(&report);

    if args.fix && !report.version_gaps.is_empty() {
        println!();
        println!("Repairing {} version gap(s)...", report.version_gaps.len());

        let (bar, callback) = progress_bar();
        let session = MirrorSession::connect(config)?
            .with_cancellation(runner.cancellation_token())
            .with_progress(callback);
        let result = runner.block_on(audit::repair(&report, &session));
        bar.finish_and_clear();

        print_repair(&result?);

        report = audit::audit(&root, &options)?;
        println!();
        println!("After repair:");
        print_report(&report);
    }

    let snapshot = report.write_snapshot(&root)?;
    println!();
    println!("Snapshot written to {}", snapshot.display());

    if report.is_clean() {
        println!("{}", style("Mirror is complete.").green().bold());
        Ok(())
    } else {
        Err(CliError::Incomplete(format!(
            "{} package(s) incomplete",
            report.incomplete.len()
        )))
    }
}

fn print_report(report: &IntegrityReport) {
    println!("  Packages scanned: {}", report.total_scanned);
    for category in [
        IssueCategory::MissingArchive,
        IssueCategory::MissingManifest,
        IssueCategory::VersionGap,
        IssueCategory::CorruptArchive,
    ] {
        let count = report.count(category);
        if count > 0 {
            println!("  {:<17} {}", format!("{}:", category.as_str()), style(count).yellow());
        }
    }
    if !report.errors.is_empty() {
        println!("  Unreadable:       {}", style(report.errors.len()).red());
    }

    for issue in report.incomplete.iter().take(MAX_LISTED) {
        let missing: Vec<&str> = issue.missing.iter().map(|c| c.as_str()).collect();
        println!(
            "    {} {} [{}]",
            style(&issue.name).bold(),
            issue.path,
            missing.join(", ")
        );
    }
    if report.incomplete.len() > MAX_LISTED {
        println!("    ... and {} more", report.incomplete.len() - MAX_LISTED);
    }
}

fn print_repair(summary: &RepairSummary) {
    println!("  Versions scheduled: {}", summary.scheduled);
    if !summary.unresolved.is_empty() {
        println!(
            "  Not in registry:    {}",
            style(summary.unresolved.join(", ")).red()
        );
    }
    if let Some(mirror) = &summary.mirror {
        print_summary(mirror);
    }
}
