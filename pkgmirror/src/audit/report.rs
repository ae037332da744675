//! Audit report types and the incomplete-packages snapshot.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::error::{AuditError, AuditResult};

/// Snapshot file name in the mirror root.
pub const SNAPSHOT_FILE: &str = "incomplete-packages.json";

/// Kind of problem found in a package directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IssueCategory {
    /// Manifest present, no archive at all.
    MissingArchive,
    /// Archives present, no readable manifest.
    MissingManifest,
    /// The declared version has no archive.
    VersionGap,
    /// An archive failed gzip decoding.
    CorruptArchive,
}

impl IssueCategory {
    /// Short label for display.
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueCategory::MissingArchive => "missing-archive",
            IssueCategory::MissingManifest => "missing-manifest",
            IssueCategory::VersionGap => "version-gap",
            IssueCategory::CorruptArchive => "corrupt-archive",
        }
    }
}

/// One package directory with at least one problem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageIssue {
    /// Package name from the manifest, or the directory name without one.
    pub name: String,
    /// Slash-delimited path relative to the mirror root.
    pub path: String,
    /// Version declared by the manifest.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub declared_version: Option<String>,
    /// Versions with an archive present.
    #[serde(default)]
    pub archive_versions: Vec<String>,
    /// Archive file names that failed verification.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub corrupt_archives: Vec<String>,
    /// Problems found.
    pub missing: Vec<IssueCategory>,
}

impl PackageIssue {
    /// Whether this issue carries a category.
    pub fn has(&self, category: IssueCategory) -> bool {
        self.missing.contains(&category)
    }
}

/// A package whose declared version has no archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionGap {
    /// Package name.
    pub name: String,
    /// Slash-delimited path relative to the mirror root.
    pub path: String,
    /// Version declared by the manifest.
    pub declared: String,
    /// Versions with an archive present.
    pub present: Vec<String>,
    /// Versions targeted for this package in report-only mode.
    pub targets: Vec<String>,
}

/// A directory entry the scan could not read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanError {
    /// Path that failed.
    pub path: PathBuf,
    /// Reason.
    pub reason: String,
}

/// Result of one audit.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IntegrityReport {
    /// Package directories examined.
    pub total_scanned: usize,
    /// Packages with at least one problem.
    pub incomplete: Vec<PackageIssue>,
    /// Declared versions without an archive.
    pub version_gaps: Vec<VersionGap>,
    /// Entries that could not be read.
    pub errors: Vec<ScanError>,
}

/// One entry of the persisted snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    /// Package name, with scope.
    pub name: String,
    /// Package directory relative to the mirror root.
    pub path: String,
    /// Problems found in that directory.
    pub missing: Vec<IssueCategory>,
}

impl IntegrityReport {
    /// Whether the mirror is complete and readable.
    pub fn is_clean(&self) -> bool {
        self.incomplete.is_empty() && self.errors.is_empty()
    }

    /// Packages carrying a category.
    pub fn count(&self, category: IssueCategory) -> usize {
        self.incomplete.iter().filter(|i| i.has(category)).count()
    }

    /// Write `incomplete-packages.json` into `root`.
    pub fn write_snapshot(&self, root: &Path) -> AuditResult<PathBuf> {
        let entries: Vec<SnapshotEntry> = self
            .incomplete
            .iter()
            .map(|issue| SnapshotEntry {
                name: issue.name.clone(),
                path: issue.path.clone(),
                missing: issue.missing.clone(),
            })
            .collect();

        let path = snapshot_path(root);
        let json = serde_json::to_vec_pretty(&entries)?;
        fs::write(&path, json).map_err(|source| AuditError::Snapshot {
            path: path.clone(),
            source,
        })?;

        tracing::info!(path = %path.display(), entries = entries.len(), "Wrote audit snapshot");
        Ok(path)
    }
}

/// `<root>/incomplete-packages.json`
pub fn snapshot_path(root: &Path) -> PathBuf {
    root.join(SNAPSHOT_FILE)
}

/// Read a previously written snapshot. Missing or corrupt files yield an
/// empty list.
pub fn load_snapshot(root: &Path) -> Vec<SnapshotEntry> {
    let path = snapshot_path(root);
    let Ok(bytes) = fs::read(&path) else {
        return Vec::new();
    };
    serde_json::from_slice(&bytes).unwrap_or_else(|e| {
        tracing::warn!(path = %path.display(), error = %e, "Ignoring corrupt audit snapshot");
        Vec::new()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn issue(name: &str, missing: Vec<IssueCategory>) -> PackageIssue {
        PackageIssue {
            name: name.to_string(),
            path: format!("node_modules/{}", name),
            declared_version: Some("1.0.0".into()),
            archive_versions: vec![],
            corrupt_archives: vec![],
            missing,
        }
    }

    #[test]
    fn test_counts() {
        let report = IntegrityReport {
            total_scanned: 3,
            incomplete: vec![
                issue("a", vec![IssueCategory::MissingArchive]),
                issue("b", vec![IssueCategory::VersionGap, IssueCategory::CorruptArchive]),
            ],
            ..Default::default()
        };
        assert!(!report.is_clean());
        assert_eq!(report.count(IssueCategory::VersionGap), 1);
        assert_eq!(report.count(IssueCategory::MissingManifest), 0);
    }

    #[test]
    fn test_snapshot_round_trip() {
        let temp = TempDir::new().unwrap();
        let report = IntegrityReport {
            total_scanned: 1,
            incomplete: vec![issue("a", vec![IssueCategory::VersionGap])],
            ..Default::default()
        };

        let path = report.write_snapshot(temp.path()).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"version-gap\""));

        let entries = load_snapshot(temp.path());
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].missing, vec![IssueCategory::VersionGap]);
    }

    #[test]
    fn test_corrupt_snapshot_is_empty() {
        let temp = TempDir::new().unwrap();
        fs::write(snapshot_path(temp.path()), "[{").unwrap();
        assert!(load_snapshot(temp.path()).is_empty());
        assert!(load_snapshot(&temp.path().join("absent")).is_empty());
    }
}
