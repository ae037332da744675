//! Lock document sources.
//!
//! Producing a lock document (running a package manager against a manifest)
//! happens outside this crate. A [`LockSource`] hands over the resulting
//! document text.

use std::fs;
use std::path::{Path, PathBuf};

use super::error::{LockfileError, LockfileResult};

/// Supplies the text of an already-resolved lock document.
pub trait LockSource: Send + Sync {
    /// Load the document text.
    fn load(&self) -> LockfileResult<String>;

    /// Human-readable description for logging.
    fn describe(&self) -> String;
}

/// Reads a lock document from a file on disk.
#[derive(Debug, Clone)]
pub struct FileLockSource {
    path: PathBuf,
}

impl FileLockSource {
    /// Create a source for the given lock file.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LockSource for FileLockSource {
    fn load(&self) -> LockfileResult<String> {
        fs::read_to_string(&self.path).map_err(|source| LockfileError::Read {
            path: self.path.clone(),
            source,
        })
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// In-memory lock document, used when the document is already at hand.
#[derive(Debug, Clone)]
pub struct InlineLockSource(pub String);

impl LockSource for InlineLockSource {
    fn load(&self) -> LockfileResult<String> {
        Ok(self.0.clone())
    }

    fn describe(&self) -> String {
        format!("inline document ({} bytes)", self.0.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_source_reads_document() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("package-lock.json");
        fs::write(&path, "{}").unwrap();

        let source = FileLockSource::new(&path);
        assert_eq!(source.load().unwrap(), "{}");
        assert_eq!(source.path(), path.as_path());
    }

    #[test]
    fn test_file_source_missing_file() {
        let source = FileLockSource::new("/nonexistent/package-lock.json");
        assert!(matches!(source.load(), Err(LockfileError::Read { .. })));
    }

    #[test]
    fn test_inline_source() {
        let source = InlineLockSource("{\"packages\":{}}".to_string());
        assert!(source.load().unwrap().contains("packages"));
        assert!(source.describe().contains("bytes"));
    }
}
