//! In-memory [`FileSink`] for tests.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::AsyncWrite;

use crate::error::YtdlResult;

use super::FileSink;

type Table = Arc<Mutex<HashMap<PathBuf, Vec<u8>>>>;

/// Records every byte written per path, and whether the path was later
/// removed. Lets tests assert "partial output file is removed" without
/// touching disk.
#[derive(Clone, Default)]
pub struct FakeFileSink {
    files: Table,
}

impl FakeFileSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current contents of `path`, if it was created and not removed.
    #[must_use]
    pub fn contents(&self, path: &Path) -> Option<Vec<u8>> {
        self.files.lock().get(path).cloned()
    }

    /// Whether `path` currently exists in this fake filesystem.
    #[must_use]
    pub fn exists(&self, path: &Path) -> bool {
        self.files.lock().contains_key(path)
    }
}

#[async_trait]
impl FileSink for FakeFileSink {
    async fn create(&self, path: &Path) -> YtdlResult<Pin<Box<dyn AsyncWrite + Send>>> {
        self.files.lock().insert(path.to_path_buf(), Vec::new());
        Ok(Box::pin(FakeFileHandle {
            path: path.to_path_buf(),
            files: self.files.clone(),
        }))
    }

    async fn remove(&self, path: &Path) -> YtdlResult<()> {
        self.files.lock().remove(path);
        Ok(())
    }
}

/// Handle returned by [`FakeFileSink::create`]; writes accumulate into the
/// sink's table until dropped or shut down.
struct FakeFileHandle {
    path: PathBuf,
    files: Table,
}

impl AsyncWrite for FakeFileHandle {
    fn poll_write(self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &[u8]) -> Poll<std::io::Result<usize>> {
        self.files.lock().entry(self.path.clone()).or_default().extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn create_then_remove_clears_contents() {
        let sink = FakeFileSink::new();
        let path = PathBuf::from("/out/video.mp4");
        let mut handle = sink.create(&path).await.unwrap();
        handle.write_all(b"hello").await.unwrap();
        assert_eq!(sink.contents(&path), Some(b"hello".to_vec()));

        sink.remove(&path).await.unwrap();
        assert!(!sink.exists(&path));
    }
}
