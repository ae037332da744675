//! Registry document types.

use std::collections::BTreeMap;

use serde::Deserialize;

/// Dist-tag pointing at the default release.
pub const LATEST_TAG: &str = "latest";

/// Full package document returned by `GET {registry}/{name}`.
///
/// Only the fields the mirror needs are deserialized.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Packument {
    /// Package name.
    #[serde(default)]
    pub name: Option<String>,

    /// Every published version.
    #[serde(default)]
    pub versions: BTreeMap<String, PackumentVersion>,

    /// Named release pointers (`latest`, `next`, ...).
    #[serde(rename = "dist-tags", default)]
    pub dist_tags: BTreeMap<String, String>,
}

impl Packument {
    /// Version the `latest` dist-tag points at.
    pub fn latest(&self) -> Option<&str> {
        self.dist_tags.get(LATEST_TAG).map(String::as_str)
    }

    /// Archive URL published for a version.
    pub fn tarball(&self, version: &str) -> Option<&str> {
        self.versions
            .get(version)
            .and_then(|v| v.dist.as_ref())
            .map(|d| d.tarball.as_str())
    }
}

/// One entry of [`Packument::versions`], also the shape of
/// `GET {registry}/{name}/{version}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PackumentVersion {
    /// Distribution info.
    #[serde(default)]
    pub dist: Option<Dist>,
}

/// Distribution block of a version manifest.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Dist {
    /// Archive URL.
    pub tarball: String,

    /// Legacy SHA-1 checksum, hex encoded.
    #[serde(default)]
    pub shasum: Option<String>,

    /// Subresource integrity string.
    #[serde(default)]
    pub integrity: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const PACKUMENT: &str = r#"{
        "name": "left-pad",
        "dist-tags": {"latest": "1.3.0"},
        "versions": {
            "1.0.0": {"name": "left-pad", "version": "1.0.0",
                      "dist": {"tarball": "https://r/left-pad/-/left-pad-1.0.0.tgz", "shasum": "abc"}},
            "1.3.0": {"dist": {"tarball": "https://r/left-pad/-/left-pad-1.3.0.tgz"}},
            "0.0.1": {}
        },
        "time": {"created": "2014-01-01"}
    }"#;

    #[test]
    fn test_parse_packument() {
        let doc: Packument = serde_json::from_str(PACKUMENT).unwrap();
        assert_eq!(doc.name.as_deref(), Some("left-pad"));
        assert_eq!(doc.latest(), Some("1.3.0"));
        assert_eq!(doc.versions.len(), 3);
        assert_eq!(
            doc.tarball("1.0.0"),
            Some("https://r/left-pad/-/left-pad-1.0.0.tgz")
        );
        assert_eq!(doc.tarball("0.0.1"), None);
        assert_eq!(doc.tarball("9.9.9"), None);
    }

    #[test]
    fn test_parse_minimal_packument() {
        let doc: Packument = serde_json::from_str("{}").unwrap();
        assert!(doc.versions.is_empty());
        assert_eq!(doc.latest(), None);
    }
}
