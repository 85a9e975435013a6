//! Output-file abstraction.
//!
//! File I/O is, like the metadata/stream client, treated as an external
//! collaborator: [`FileSink`] is the trait the worker depends on, with a
//! real [`TokioFileSink`] and an in-memory [`mock::FakeFileSink`] for tests
//! that need to assert a partial file was removed without touching disk.

pub mod mock;

use std::path::{Path, PathBuf};
use std::pin::Pin;

use async_trait::async_trait;
use tokio::io::AsyncWrite;

use crate::error::YtdlResult;

/// Opens and removes output files for a worker.
///
/// A worker creates at most one file per attempt and either finishes
/// writing it (success) or removes it (failure/cancellation): a partial
/// output file is never left behind.
#[async_trait]
pub trait FileSink: Send + Sync {
    /// Creates (or truncates) the file at `path`, including parent
    /// directories.
    async fn create(&self, path: &Path) -> YtdlResult<Pin<Box<dyn AsyncWrite + Send>>>;

    /// Removes the file at `path` if it exists; a no-op if it does not.
    async fn remove(&self, path: &Path) -> YtdlResult<()>;
}

/// Writes to real files on disk via `tokio::fs`.
pub struct TokioFileSink;

#[async_trait]
impl FileSink for TokioFileSink {
    async fn create(&self, path: &Path) -> YtdlResult<Pin<Box<dyn AsyncWrite + Send>>> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| crate::error::YtdlError::Config(format!("failed to create {}: {e}", parent.display())))?;
        }
        let file = tokio::fs::File::create(path)
            .await
            .map_err(|e| crate::error::YtdlError::Config(format!("failed to create {}: {e}", path.display())))?;
        Ok(Box::pin(file))
    }

    async fn remove(&self, path: &Path) -> YtdlResult<()> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(crate::error::YtdlError::Config(format!("failed to remove {}: {e}", path.display()))),
        }
    }
}

/// Joins an output directory with a resolved, sanitized filename.
#[must_use]
pub fn resolve_path(output_dir: &Path, file_name: &str) -> PathBuf {
    output_dir.join(file_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn create_writes_through_nested_directories_and_remove_deletes_it() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("video.mp4");

        let sink = TokioFileSink;
        let mut handle = sink.create(&path).await.unwrap();
        handle.write_all(b"hello world").await.unwrap();
        handle.shutdown().await.unwrap();
        drop(handle);

        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"hello world");

        sink.remove(&path).await.unwrap();
        assert!(tokio::fs::metadata(&path).await.is_err());
    }

    #[tokio::test]
    async fn remove_on_missing_path_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("never-created.mp4");
        let sink = TokioFileSink;
        assert!(sink.remove(&path).await.is_ok());
    }
}
