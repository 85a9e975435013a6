//! External collaborator contracts: the metadata/stream client and the
//! playlist client.
//!
//! The real YouTube-facing implementations are out of scope; this
//! module defines only the interfaces [`crate::worker::DownloadWorker`] and
//! [`crate::scheduler::Scheduler`] consume, following the same trait +
//! production-impl-elsewhere + test-double pattern as [`crate::encoder`].

pub mod http;
pub mod mock;

use std::collections::HashMap;
use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;

use crate::domain::{DownloadOptions, PlaylistItem, VideoFormat, VideoInfo};
use crate::error::YtdlResult;

/// Response headers observed once per byte stream, before any data arrives.
#[derive(Debug, Clone, Default)]
pub struct ResponseInfo {
    pub headers: HashMap<String, String>,
}

impl ResponseInfo {
    /// Parses the `content-length` header, if present and well-formed.
    #[must_use]
    pub fn content_length(&self) -> Option<u64> {
        self.headers.get("content-length").and_then(|v| v.parse().ok())
    }
}

/// One signal from a byte stream: `info` once, `response` once,
/// `data` repeatedly. Stream exhaustion (`None`) is the `end` signal; a
/// terminal `Err` item is the `error` signal.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    Info { info: VideoInfo, format: VideoFormat },
    Response(ResponseInfo),
    Data(Bytes),
}

/// A byte-producing stream annotated with the `info`/`response`/`data`
/// signal sequence.
pub type ByteEventStream = Pin<Box<dyn Stream<Item = YtdlResult<StreamEvent>> + Send>>;

/// Fetches video metadata for a single URL.
#[async_trait]
pub trait MetadataClient: Send + Sync {
    async fn get_info(&self, url: &str) -> YtdlResult<VideoInfo>;
}

/// Opens a byte stream for a video, given its already-fetched info.
#[async_trait]
pub trait StreamClient: Send + Sync {
    async fn download_from_info(&self, info: &VideoInfo, opts: &DownloadOptions) -> YtdlResult<ByteEventStream>;
}

/// Resolves a playlist reference to its ordered items.
#[async_trait]
pub trait PlaylistClient: Send + Sync {
    fn validate_id(&self, url_or_id: &str) -> bool;
    fn get_playlist_id(&self, url: &str) -> YtdlResult<String>;
    async fn resolve(&self, id: &str, opts: &DownloadOptions) -> YtdlResult<Vec<PlaylistItem>>;
}
