//! Mirror file writes.
//!
//! Archives stream into a `.partial` file beside their destination and are
//! renamed into place only after the whole body arrived, so a reader never
//! sees a truncated archive. Temporary names embed the package version,
//! which keeps concurrent tasks that share a directory from colliding.

use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use super::error::{FetchError, FetchResult};
use crate::lockfile::PackageDescriptor;
use crate::registry::MonitoredStream;

/// Manifest file name inside each package directory.
pub const MANIFEST_FILE: &str = "package.json";

/// Suffix of in-progress files.
pub const PARTIAL_SUFFIX: &str = "partial";

/// Whether a path exists, treating errors as absence.
pub async fn exists(path: &Path) -> bool {
    fs::try_exists(path).await.unwrap_or(false)
}

/// Whether a descriptor's destination already holds both its manifest and
/// its archive.
pub async fn is_satisfied(root: &Path, descriptor: &PackageDescriptor) -> bool {
    let dest = descriptor.destination(root);
    exists(&dest.join(MANIFEST_FILE)).await
        && exists(&dest.join(descriptor.archive_file_name())).await
}

/// Temporary path for a file being written on behalf of `version`.
pub fn partial_path(target: &Path, version: &str) -> PathBuf {
    let file_name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    target.with_file_name(format!(".{}.{}.{}", file_name, version, PARTIAL_SUFFIX))
}

/// Write `contents` to `target` through a temporary file and rename.
pub async fn write_atomic(target: &Path, version: &str, contents: &[u8]) -> FetchResult<()> {
    let temp = partial_path(target, version);
    let result = async {
        fs::write(&temp, contents)
            .await
            .map_err(|e| FetchError::write(&temp, e))?;
        fs::rename(&temp, target)
            .await
            .map_err(|e| FetchError::write(target, e))
    }
    .await;

    if result.is_err() {
        remove_quietly(&temp).await;
    }
    result
}

/// Stream a response body into `target`.
///
/// Returns the number of bytes written. On any error, including
/// cancellation, the partial file is removed and `target` is untouched.
pub async fn stream_to_file(
    mut stream: MonitoredStream,
    target: &Path,
    version: &str,
    cancel: &CancellationToken,
) -> FetchResult<u64> {
    let temp = partial_path(target, version);
    let result = copy_stream(&mut stream, &temp, target, cancel).await;
    stream.settle(&result);

    if result.is_err() {
        remove_quietly(&temp).await;
    }
    result
}

async fn copy_stream(
    stream: &mut MonitoredStream,
    temp: &Path,
    target: &Path,
    cancel: &CancellationToken,
) -> FetchResult<u64> {
    let mut file = fs::File::create(temp)
        .await
        .map_err(|e| FetchError::write(temp, e))?;
    let mut written = 0u64;

    loop {
        let chunk = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(FetchError::Cancelled),
            chunk = stream.next_chunk() => chunk,
        };
        match chunk {
            Some(Ok(bytes)) => {
                file.write_all(&bytes)
                    .await
                    .map_err(|e| FetchError::write(temp, e))?;
                written += bytes.len() as u64;
            }
            Some(Err(e)) => return Err(e),
            None => break,
        }
    }

    file.flush().await.map_err(|e| FetchError::write(temp, e))?;
    drop(file);
    fs::rename(temp, target)
        .await
        .map_err(|e| FetchError::write(target, e))?;
    Ok(written)
}

/// Remove a file, ignoring a missing one.
pub async fn remove_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove file");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_partial_path_embeds_version() {
        let path = partial_path(Path::new("/m/a/a-1.0.0.tgz"), "1.0.0");
        assert_eq!(path, PathBuf::from("/m/a/.a-1.0.0.tgz.1.0.0.partial"));

        let manifest = partial_path(Path::new("/m/a/package.json"), "2.0.0");
        assert_eq!(manifest, PathBuf::from("/m/a/.package.json.2.0.0.partial"));
    }

    #[tokio::test]
    async fn test_write_atomic_replaces_target() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join(MANIFEST_FILE);
        std::fs::write(&target, "old").unwrap();

        write_atomic(&target, "1.0.0", b"new").await.unwrap();
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "new");
        assert!(!partial_path(&target, "1.0.0").exists());
    }

    #[tokio::test]
    async fn test_is_satisfied_needs_both_files() {
        let temp = TempDir::new().unwrap();
        let d = PackageDescriptor::new("a", "1.0.0", "https://r/a/-/a-1.0.0.tgz", "node_modules/a");
        let dest = d.destination(temp.path());
        std::fs::create_dir_all(&dest).unwrap();

        assert!(!is_satisfied(temp.path(), &d).await);
        std::fs::write(dest.join("a-1.0.0.tgz"), "x").unwrap();
        assert!(!is_satisfied(temp.path(), &d).await);
        std::fs::write(dest.join(MANIFEST_FILE), "{}").unwrap();
        assert!(is_satisfied(temp.path(), &d).await);
    }

    #[tokio::test]
    async fn test_remove_quietly_ignores_missing() {
        let temp = TempDir::new().unwrap();
        remove_quietly(&temp.path().join("nothing")).await;
    }
}
