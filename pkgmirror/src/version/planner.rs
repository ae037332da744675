//! Target version set planning.
//!
//! For each package the mirror keeps the requested version plus the newest
//! release of every major line, so an offline install can satisfy any
//! caret range a consumer is likely to ask for.

use std::collections::{BTreeMap, BTreeSet};

use semver::Version;

/// Compute the versions worth mirroring for one package.
///
/// Valid versions are grouped by major; the maximum of each group (by semver
/// precedence, never string order) is kept, together with `current`. Invalid
/// inputs, including an invalid `current`, never appear in the output. The
/// result is duplicate-free and sorted ascending.
///
/// ```
/// use pkgmirror::version::plan;
///
/// let all = ["1.0.0", "1.2.0", "2.0.0", "2.1.0"];
/// assert_eq!(plan("1.2.0", &all), vec!["1.2.0", "2.1.0"]);
/// ```
pub fn plan<S: AsRef<str>>(current: &str, all_versions: &[S]) -> Vec<String> {
    planned_set(current, all_versions)
        .into_iter()
        .map(|v| v.to_string())
        .collect()
}

/// Planned versions that are not already present.
///
/// `present` entries that are not valid semver are ignored.
pub fn plan_missing<S: AsRef<str>, P: AsRef<str>>(
    current: &str,
    all_versions: &[S],
    present: &[P],
) -> Vec<String> {
    let present: BTreeSet<Version> = present
        .iter()
        .filter_map(|v| Version::parse(v.as_ref()).ok())
        .collect();

    planned_set(current, all_versions)
        .into_iter()
        .filter(|v| !present.contains(v))
        .map(|v| v.to_string())
        .collect()
}

/// Highest valid version in a list.
pub fn highest<S: AsRef<str>>(versions: &[S]) -> Option<String> {
    versions
        .iter()
        .filter_map(|v| Version::parse(v.as_ref()).ok())
        .max()
        .map(|v| v.to_string())
}

fn planned_set<S: AsRef<str>>(current: &str, all_versions: &[S]) -> BTreeSet<Version> {
    let mut newest_per_major: BTreeMap<u64, Version> = BTreeMap::new();
    for version in all_versions
        .iter()
        .filter_map(|v| Version::parse(v.as_ref()).ok())
    {
        match newest_per_major.get(&version.major) {
            Some(existing) if *existing >= version => {}
            _ => {
                newest_per_major.insert(version.major, version);
            }
        }
    }

    let mut planned: BTreeSet<Version> = newest_per_major.into_values().collect();
    if let Ok(current) = Version::parse(current) {
        planned.insert(current);
    }
    planned
}
