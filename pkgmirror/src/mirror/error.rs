//! Error types for mirror runs.

use thiserror::Error;

use crate::fetch::FetchError;
use crate::lockfile::LockfileError;

/// Result type for mirror runs.
pub type MirrorResult<T> = Result<T, MirrorError>;

/// Errors that abort a mirror run.
///
/// Individual package failures do not surface here; they are counted in the
/// run summary and listed in the failure manifest.
#[derive(Debug, Error)]
pub enum MirrorError {
    /// The lock document could not be loaded or understood.
    #[error(transparent)]
    Lockfile(#[from] LockfileError),

    /// A setup fault (unwritable mirror root, client construction).
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// The registry has no usable versions for a package.
    #[error("package '{name}' not found in registry")]
    PackageNotFound { name: String },

    /// The requested version is not published.
    #[error("version {version} of '{name}' not found in registry")]
    VersionNotFound { name: String, version: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = MirrorError::VersionNotFound {
            name: "a".into(),
            version: "9.9.9".into(),
        };
        assert_eq!(err.to_string(), "version 9.9.9 of 'a' not found in registry");

        let err: MirrorError = LockfileError::MalformedDocument("bad".into()).into();
        assert_eq!(err.to_string(), "malformed lock document: bad");
    }
}
