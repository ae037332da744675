//! Version-gap remediation.

use std::collections::BTreeSet;

use futures::stream::{self, StreamExt};
use semver::Version;
use serde::Serialize;

use super::report::{IntegrityReport, VersionGap};
use crate::lockfile::PackageDescriptor;
use crate::mirror::{MirrorResult, MirrorSession, MirrorSummary};
use crate::registry::HttpClient;
use crate::version::{highest, plan_missing, VersionCatalog};

/// Outcome of [`repair`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct RepairSummary {
    /// Version gaps considered.
    pub gaps: usize,
    /// Supplementary descriptors scheduled.
    pub scheduled: usize,
    /// Packages that could not be planned.
    pub unresolved: Vec<String>,
    /// Download outcome, when anything was scheduled.
    pub mirror: Option<MirrorSummary>,
}

/// Fetch the missing planned versions of every package with a version gap.
///
/// Packages without any archive and directories without a manifest are left
/// alone. Downloads go through the session's retry rounds and failure
/// manifest like any mirror run.
pub async fn repair<C: HttpClient>(
    report: &IntegrityReport,
    session: &MirrorSession<C>,
) -> MirrorResult<RepairSummary> {
    let (descriptors, unresolved) = plan_repairs(
        &report.version_gaps,
        session.catalog(),
        session.config().concurrency,
    )
    .await;

    let mut summary = RepairSummary {
        gaps: report.version_gaps.len(),
        scheduled: descriptors.len(),
        unresolved,
        mirror: None,
    };

    if descriptors.is_empty() {
        tracing::info!(gaps = summary.gaps, "Nothing to repair");
        return Ok(summary);
    }

    tracing::info!(
        gaps = summary.gaps,
        scheduled = summary.scheduled,
        "Repairing version gaps"
    );
    summary.mirror = Some(session.download_with_retries(descriptors).await?);
    Ok(summary)
}

/// Supplementary descriptors for the missing planned versions of each gap,
/// plus the names that could not be planned.
pub async fn plan_repairs<C: HttpClient>(
    gaps: &[VersionGap],
    catalog: &VersionCatalog<C>,
    concurrency: usize,
) -> (Vec<PackageDescriptor>, Vec<String>) {
    let lookups: Vec<_> = stream::iter(gaps)
        .map(|gap| async move { (gap, catalog.get(&gap.name).await) })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    let registry = catalog.registry();
    let mut seen = BTreeSet::new();
    let mut descriptors = Vec::new();
    let mut unresolved = BTreeSet::new();

    for (gap, result) in lookups {
        let package = match result {
            Ok(package) => package,
            Err(e) => {
                tracing::warn!(package = %gap.name, error = %e, "Cannot plan repair");
                unresolved.insert(gap.name.clone());
                continue;
            }
        };

        let current = if Version::parse(&gap.declared).is_ok() {
            gap.declared.clone()
        } else {
            match highest(&gap.present) {
                Some(v) => v,
                None => {
                    tracing::warn!(package = %gap.name, declared = %gap.declared, "No valid version to plan from");
                    unresolved.insert(gap.name.clone());
                    continue;
                }
            }
        };

        for version in plan_missing(&current, &package.versions, &gap.present) {
            if !seen.insert((gap.path.clone(), version.clone())) {
                continue;
            }
            let archive_url = package
                .tarball(&version)
                .map(str::to_string)
                .unwrap_or_else(|| registry.archive_url(&gap.name, &version));
            descriptors.push(
                PackageDescriptor::new(gap.name.as_str(), version, archive_url, gap.path.as_str())
                    .supplementary(),
            );
        }
    }

    descriptors.sort_by(|a, b| a.local_path.cmp(&b.local_path));
    (descriptors, unresolved.into_iter().collect())
}
