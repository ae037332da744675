//! Major-line expansion.
//!
//! For every package name in the lock graph, add the newest release of
//! each major line at every install path where the package lives, so an
//! offline install can satisfy ranges the lock graph did not pin.

use std::collections::{BTreeMap, BTreeSet};

use futures::stream::{self, StreamExt};

use crate::lockfile::PackageDescriptor;
use crate::registry::HttpClient;
use crate::version::{plan, VersionCatalog};

/// Result of [`expand_major_lines`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MajorLineExpansion {
    /// Supplementary descriptors to mirror.
    pub added: Vec<PackageDescriptor>,
    /// Packages whose catalog could not be fetched, sorted by name.
    pub skipped: Vec<String>,
}

/// Supplementary descriptors for planned versions missing from `descriptors`.
///
/// Catalog lookups run at most `concurrency` at a time. A package whose
/// catalog cannot be fetched after the catalog's retries is left unexpanded
/// and listed in [`MajorLineExpansion::skipped`].
pub async fn expand_major_lines<C: HttpClient>(
    descriptors: &[PackageDescriptor],
    catalog: &VersionCatalog<C>,
    concurrency: usize,
) -> MajorLineExpansion {
    // name -> install path -> versions already at that path
    let mut placements: BTreeMap<&str, BTreeMap<&str, BTreeSet<&str>>> = BTreeMap::new();
    for d in descriptors {
        placements
            .entry(d.name.as_str())
            .or_default()
            .entry(d.local_path.as_str())
            .or_default()
            .insert(d.version.as_str());
    }

    // Only names with a primary descriptor are expanded; `current` at each
    // path is the primary version there.
    let mut primaries: BTreeMap<&str, Vec<&PackageDescriptor>> = BTreeMap::new();
    for d in descriptors.iter().filter(|d| d.is_primary()) {
        primaries.entry(d.name.as_str()).or_default().push(d);
    }

    let catalogs: Vec<_> = stream::iter(primaries.keys().copied())
        .map(|name| async move { (name, catalog.get(name).await) })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    let registry = catalog.registry();
    let mut added = Vec::new();
    let mut skipped = Vec::new();
    for (name, result) in catalogs {
        let package = match result {
            Ok(package) => package,
            Err(e) => {
                tracing::warn!(package = name, error = %e, "Skipping major-line expansion");
                skipped.push(name.to_string());
                continue;
            }
        };

        for primary in primaries.get(name).into_iter().flatten() {
            let present = placements
                .get(name)
                .and_then(|paths| paths.get(primary.local_path.as_str()));

            for version in plan(&primary.version, &package.versions) {
                if present.is_some_and(|p| p.contains(version.as_str())) {
                    continue;
                }
                if added.iter().any(|d: &PackageDescriptor| {
                    d.name == name && d.version == version && d.local_path == primary.local_path
                }) {
                    continue;
                }
                let archive_url = package
                    .tarball(&version)
                    .map(str::to_string)
                    .unwrap_or_else(|| registry.archive_url(name, &version));
                added.push(
                    PackageDescriptor::new(name, version, archive_url, primary.local_path.as_str())
                        .supplementary(),
                );
            }
        }
    }

    skipped.sort();
    tracing::info!(
        packages = primaries.len(),
        added = added.len(),
        skipped = skipped.len(),
        "Expanded major release lines"
    );
    MajorLineExpansion { added, skipped }
}
