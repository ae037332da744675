//! Mirror tree scan.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use semver::Version;
use serde::Deserialize;

use super::error::{AuditError, AuditResult};
use super::report::{IntegrityReport, IssueCategory, PackageIssue, ScanError, VersionGap};
use crate::failures::STATE_DIR;
use crate::fetch::MANIFEST_FILE;
use crate::lockfile::package_basename;

const ARCHIVE_EXTENSIONS: [&str; 2] = [".tgz", ".tar.gz"];

/// Options for [`audit`].
#[derive(Debug, Clone, Default)]
pub struct AuditOptions {
    /// Decompress every archive to detect corruption.
    pub verify_archives: bool,
}

impl AuditOptions {
    /// Enable archive verification (builder pattern).
    pub fn with_verify_archives(mut self, verify: bool) -> Self {
        self.verify_archives = verify;
        self
    }
}

#[derive(Debug, Deserialize)]
struct ManifestHead {
    name: Option<String>,
    version: Option<String>,
}

/// Files of one directory relevant to the audit.
struct Listing {
    manifest: Option<PathBuf>,
    archives: Vec<String>,
}

/// Scan the mirror tree rooted at `root`.
///
/// Hidden directories (including the state directory) are skipped and
/// symlinks are not followed. Entries that cannot be read are collected in
/// the report; only an unusable root is an error.
pub fn audit(root: &Path, options: &AuditOptions) -> AuditResult<IntegrityReport> {
    if !root.is_dir() {
        return Err(AuditError::RootNotFound(root.to_path_buf()));
    }
    fs::read_dir(root).map_err(|source| AuditError::RootUnreadable {
        path: root.to_path_buf(),
        source,
    })?;

    let mut report = IntegrityReport::default();
    let mut stack = vec![root.to_path_buf()];

    while let Some(dir) = stack.pop() {
        let listing = match list_directory(&dir, &mut stack) {
            Ok(listing) => listing,
            Err(e) => {
                report.errors.push(ScanError {
                    path: dir,
                    reason: e.to_string(),
                });
                continue;
            }
        };
        inspect(root, &dir, listing, options, &mut report);
    }

    report.incomplete.sort_by(|a, b| a.path.cmp(&b.path));
    report.version_gaps.sort_by(|a, b| a.path.cmp(&b.path));

    tracing::info!(
        root = %root.display(),
        scanned = report.total_scanned,
        incomplete = report.incomplete.len(),
        gaps = report.version_gaps.len(),
        errors = report.errors.len(),
        "Audit finished"
    );
    Ok(report)
}

fn list_directory(dir: &Path, stack: &mut Vec<PathBuf>) -> io::Result<Listing> {
    let mut listing = Listing {
        manifest: None,
        archives: Vec::new(),
    };

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };

        if file_type.is_dir() {
            if !name.starts_with('.') && name != STATE_DIR {
                stack.push(entry.path());
            }
        } else if file_type.is_file() {
            if name == MANIFEST_FILE {
                listing.manifest = Some(entry.path());
            } else if is_archive_name(name) {
                listing.archives.push(name.to_string());
            }
        }
    }

    listing.archives.sort();
    Ok(listing)
}

fn inspect(
    root: &Path,
    dir: &Path,
    listing: Listing,
    options: &AuditOptions,
    report: &mut IntegrityReport,
) {
    let head = listing
        .manifest
        .as_deref()
        .and_then(|path| match read_manifest(path) {
            Ok(head) => head,
            Err(reason) => {
                report.errors.push(ScanError {
                    path: path.to_path_buf(),
                    reason,
                });
                None
            }
        });

    if head.is_none() && listing.archives.is_empty() {
        return;
    }
    report.total_scanned += 1;

    let path = relative_path(root, dir);
    let mut issue = match &head {
        Some((name, version)) => PackageIssue {
            name: name.clone(),
            path: path.clone(),
            declared_version: Some(version.clone()),
            archive_versions: Vec::new(),
            corrupt_archives: Vec::new(),
            missing: Vec::new(),
        },
        None => PackageIssue {
            name: name_from_path(&path),
            path: path.clone(),
            declared_version: None,
            archive_versions: Vec::new(),
            corrupt_archives: Vec::new(),
            missing: vec![IssueCategory::MissingManifest],
        },
    };

    let basename = head.as_ref().map(|(name, _)| package_basename(name));
    for file in &listing.archives {
        let Some((base, version)) = split_archive_name(file) else {
            continue;
        };
        if basename.is_some_and(|b| b != base) {
            continue;
        }
        issue.archive_versions.push(version.to_string());

        if options.verify_archives {
            if let Err(e) = verify_archive(&dir.join(file)) {
                tracing::debug!(archive = %dir.join(file).display(), error = %e, "Corrupt archive");
                issue.corrupt_archives.push(file.clone());
            }
        }
    }
    issue.archive_versions.sort_by(|a, b| compare_versions(a, b));
    issue.archive_versions.dedup();

    if let Some((name, declared)) = &head {
        if issue.archive_versions.is_empty() {
            issue.missing.push(IssueCategory::MissingArchive);
        } else if !issue.archive_versions.iter().any(|v| same_version(v, declared)) {
            issue.missing.push(IssueCategory::VersionGap);
            report.version_gaps.push(VersionGap {
                name: name.clone(),
                path,
                declared: declared.clone(),
                present: issue.archive_versions.clone(),
                targets: vec![declared.clone()],
            });
        }
    }
    if !issue.corrupt_archives.is_empty() {
        issue.missing.push(IssueCategory::CorruptArchive);
    }

    if !issue.missing.is_empty() {
        report.incomplete.push(issue);
    }
}

/// `Ok(None)` for a manifest without a name or version.
fn read_manifest(path: &Path) -> Result<Option<(String, String)>, String> {
    let bytes = fs::read(path).map_err(|e| e.to_string())?;
    let head: ManifestHead = serde_json::from_slice(&bytes).map_err(|e| e.to_string())?;
    Ok(match (head.name, head.version) {
        (Some(name), Some(version)) if !name.is_empty() && !version.is_empty() => {
            Some((name, version))
        }
        _ => None,
    })
}

fn verify_archive(path: &Path) -> io::Result<()> {
    let file = File::open(path)?;
    if file.metadata()?.len() == 0 {
        return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "empty archive"));
    }
    let mut decoder = GzDecoder::new(file);
    io::copy(&mut decoder, &mut io::sink())?;
    Ok(())
}

fn is_archive_name(name: &str) -> bool {
    ARCHIVE_EXTENSIONS.iter().any(|ext| name.ends_with(ext))
}

/// Split `<basename>-<version>.<ext>` at the first dash that leaves a valid
/// semantic version.
pub(crate) fn split_archive_name(file: &str) -> Option<(&str, &str)> {
    let stem = ARCHIVE_EXTENSIONS
        .iter()
        .find_map(|ext| file.strip_suffix(ext))?;

    stem.match_indices('-').find_map(|(i, _)| {
        let (base, version) = (&stem[..i], &stem[i + 1..]);
        (!base.is_empty() && Version::parse(version).is_ok()).then_some((base, version))
    })
}

fn same_version(a: &str, b: &str) -> bool {
    match (Version::parse(a), Version::parse(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

fn compare_versions(a: &str, b: &str) -> std::cmp::Ordering {
    match (Version::parse(a), Version::parse(b)) {
        (Ok(a), Ok(b)) => a.cmp(&b),
        _ => a.cmp(b),
    }
}

fn relative_path(root: &Path, dir: &Path) -> String {
    dir.strip_prefix(root)
        .unwrap_or(dir)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Package name implied by an install path, keeping a `@scope/` parent.
fn name_from_path(path: &str) -> String {
    let mut segments = path.rsplit('/');
    let last = segments.next().unwrap_or_default();
    match segments.next() {
        Some(scope) if scope.starts_with('@') => format!("{}/{}", scope, last),
        _ => last.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use tempfile::TempDir;

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn package(root: &Path, path: &str, name: &str, version: &str, archives: &[&str]) -> PathBuf {
        let dir = root.join(path);
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join(MANIFEST_FILE),
            format!(r#"{{"name":"{}","version":"{}"}}"#, name, version),
        )
        .unwrap();
        for archive in archives {
            fs::write(dir.join(archive), gzip(b"contents")).unwrap();
        }
        dir
    }

    #[test]
    fn test_split_archive_name() {
        assert_eq!(split_archive_name("a-1.0.0.tgz"), Some(("a", "1.0.0")));
        assert_eq!(split_archive_name("left-pad-1.3.0.tgz"), Some(("left-pad", "1.3.0")));
        assert_eq!(
            split_archive_name("x-2.0.0-beta.1.tar.gz"),
            Some(("x", "2.0.0-beta.1"))
        );
        assert_eq!(split_archive_name("a-latest.tgz"), None);
        assert_eq!(split_archive_name("a-1.0.0.zip"), None);
    }

    #[test]
    fn test_complete_mirror_is_clean() {
        let temp = TempDir::new().unwrap();
        package(temp.path(), "node_modules/a", "a", "1.0.0", &["a-1.0.0.tgz", "a-2.0.0.tgz"]);
        package(
            temp.path(),
            "node_modules/@s/core",
            "@s/core",
            "3.1.0",
            &["core-3.1.0.tar.gz"],
        );

        let report = audit(temp.path(), &AuditOptions::default().with_verify_archives(true)).unwrap();
        assert_eq!(report.total_scanned, 2);
        assert!(report.is_clean(), "{:?}", report);
    }

    #[test]
    fn test_detects_version_gap_and_missing_archive() {
        let temp = TempDir::new().unwrap();
        package(temp.path(), "node_modules/x", "x", "2.0.0", &["x-1.0.0.tgz"]);
        package(temp.path(), "node_modules/y", "y", "1.0.0", &[]);

        let report = audit(temp.path(), &AuditOptions::default()).unwrap();
        assert_eq!(report.total_scanned, 2);
        assert_eq!(report.version_gaps.len(), 1);

        let gap = &report.version_gaps[0];
        assert_eq!(gap.name, "x");
        assert_eq!(gap.path, "node_modules/x");
        assert_eq!(gap.present, vec!["1.0.0"]);
        assert_eq!(gap.targets, vec!["2.0.0"]);

        let y = report.incomplete.iter().find(|i| i.name == "y").unwrap();
        assert_eq!(y.missing, vec![IssueCategory::MissingArchive]);
        assert_eq!(report.count(IssueCategory::VersionGap), 1);
    }

    #[test]
    fn test_archives_without_manifest() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("node_modules").join("@s").join("orphan");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("orphan-1.0.0.tgz"), gzip(b"x")).unwrap();

        let report = audit(temp.path(), &AuditOptions::default()).unwrap();
        assert_eq!(report.incomplete.len(), 1);
        let issue = &report.incomplete[0];
        assert_eq!(issue.name, "@s/orphan");
        assert_eq!(issue.missing, vec![IssueCategory::MissingManifest]);
        assert!(report.version_gaps.is_empty());
    }

    #[test]
    fn test_corrupt_archive_only_when_verifying() {
        let temp = TempDir::new().unwrap();
        let dir = package(temp.path(), "node_modules/a", "a", "1.0.0", &[]);
        fs::write(dir.join("a-1.0.0.tgz"), b"not gzip").unwrap();

        let quick = audit(temp.path(), &AuditOptions::default()).unwrap();
        assert!(quick.is_clean());

        let full = audit(temp.path(), &AuditOptions::default().with_verify_archives(true)).unwrap();
        let issue = &full.incomplete[0];
        assert_eq!(issue.missing, vec![IssueCategory::CorruptArchive]);
        assert_eq!(issue.corrupt_archives, vec!["a-1.0.0.tgz"]);
    }

    #[test]
    fn test_skips_hidden_and_state_directories() {
        let temp = TempDir::new().unwrap();
        package(temp.path(), ".pkgmirror/node_modules/a", "a", "1.0.0", &[]);
        package(temp.path(), "node_modules/.cache/b", "b", "1.0.0", &[]);

        let report = audit(temp.path(), &AuditOptions::default()).unwrap();
        assert_eq!(report.total_scanned, 0);
        assert!(report.is_clean());
    }

    #[test]
    fn test_nested_install_paths() {
        let temp = TempDir::new().unwrap();
        package(temp.path(), "node_modules/a", "a", "1.0.0", &["a-1.0.0.tgz"]);
        package(
            temp.path(),
            "node_modules/a/node_modules/b",
            "b",
            "2.0.0",
            &["b-1.0.0.tgz"],
        );

        let report = audit(temp.path(), &AuditOptions::default()).unwrap();
        assert_eq!(report.total_scanned, 2);
        assert_eq!(report.version_gaps[0].path, "node_modules/a/node_modules/b");
    }

    #[test]
    fn test_unparsable_manifest_is_reported() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("node_modules").join("a");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(MANIFEST_FILE), "{oops").unwrap();
        fs::write(dir.join("a-1.0.0.tgz"), gzip(b"x")).unwrap();

        let report = audit(temp.path(), &AuditOptions::default()).unwrap();
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.incomplete[0].missing, vec![IssueCategory::MissingManifest]);
    }

    #[test]
    fn test_missing_root() {
        let temp = TempDir::new().unwrap();
        let err = audit(&temp.path().join("absent"), &AuditOptions::default()).unwrap_err();
        assert!(matches!(err, AuditError::RootNotFound(_)));
    }
}
