//! Package descriptor types produced by lock graph extraction.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Default archive extension used when the archive URL carries none.
pub const DEFAULT_ARCHIVE_EXTENSION: &str = "tgz";

/// How a descriptor entered the work list.
///
/// Controls manifest ownership when several descriptors share one install
/// path: the primary descriptor always writes `package.json`, supplementary
/// ones only fill it in when it is missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DescriptorRole {
    /// Version recorded in the lock graph (or requested explicitly).
    #[default]
    Primary,
    /// Extra version added by major-line expansion or repair.
    Supplementary,
}

/// A single unit of mirroring work: one archive of one package version at
/// one install path.
///
/// Identity is `(name, version, local_path)`. The same package name may
/// appear several times with different versions or install paths.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackageDescriptor {
    /// Package name, including scope (`@scope/name`) when present.
    pub name: String,

    /// Exact semantic version.
    pub version: String,

    /// Archive (tarball) URL.
    pub archive_url: String,

    /// Slash-delimited install path relative to the mirror root,
    /// e.g. `node_modules/a/node_modules/b`.
    pub local_path: String,

    /// Whether this descriptor owns the manifest at its install path.
    #[serde(default)]
    pub role: DescriptorRole,
}

impl PackageDescriptor {
    /// Create a primary descriptor.
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        archive_url: impl Into<String>,
        local_path: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            archive_url: archive_url.into(),
            local_path: local_path.into(),
            role: DescriptorRole::Primary,
        }
    }

    /// Mark this descriptor as supplementary (builder pattern).
    pub fn supplementary(mut self) -> Self {
        self.role = DescriptorRole::Supplementary;
        self
    }

    /// Failure-tracking key, `name@version`.
    pub fn key(&self) -> String {
        format!("{}@{}", self.name, self.version)
    }

    /// Package name without its scope.
    ///
    /// Registry archives are named after the unscoped part, so this is what
    /// archive file names embed.
    pub fn basename(&self) -> &str {
        package_basename(&self.name)
    }

    /// Archive extension derived from the archive URL.
    pub fn archive_extension(&self) -> &str {
        archive_extension(&self.archive_url)
    }

    /// File name of the archive inside the destination directory.
    pub fn archive_file_name(&self) -> String {
        format!(
            "{}-{}.{}",
            self.basename(),
            self.version,
            self.archive_extension()
        )
    }

    /// Destination directory under the given mirror root.
    pub fn destination(&self, root: &Path) -> PathBuf {
        self.local_path
            .split('/')
            .filter(|segment| !segment.is_empty() && *segment != "." && *segment != "..")
            .fold(root.to_path_buf(), |path, segment| path.join(segment))
    }

    /// Whether this descriptor owns the manifest at its install path.
    pub fn is_primary(&self) -> bool {
        self.role == DescriptorRole::Primary
    }
}

impl fmt::Display for PackageDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}

/// Strip the `@scope/` prefix from a package name.
pub fn package_basename(name: &str) -> &str {
    match name.rsplit_once('/') {
        Some((_, base)) if name.starts_with('@') => base,
        _ => name,
    }
}

/// Archive extension of a URL: `tar.gz` and `tgz` are recognised, anything
/// else falls back to [`DEFAULT_ARCHIVE_EXTENSION`].
pub fn archive_extension(url: &str) -> &str {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    if path.ends_with(".tar.gz") {
        "tar.gz"
    } else {
        DEFAULT_ARCHIVE_EXTENSION
    }
}

/// Derive the install path `node_modules/<name>` used for a top-level package.
pub fn top_level_path(name: &str) -> String {
    format!("node_modules/{}", name)
}
