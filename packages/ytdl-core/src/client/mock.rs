//! Scripted test doubles for [`MetadataClient`], [`StreamClient`], and
//! [`PlaylistClient`], used throughout the worker/scheduler test suites.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use futures::{stream, StreamExt};
use parking_lot::Mutex;

use crate::domain::{DownloadOptions, PlaylistItem, VideoInfo};
use crate::error::{YtdlError, YtdlResult};

use super::{ByteEventStream, MetadataClient, PlaylistClient, StreamClient, StreamEvent};

/// One scripted outcome for a single `download_from_info` call.
pub enum ScriptedAttempt {
    /// Emits `events` in order, then ends normally.
    Succeed(Vec<StreamEvent>),
    /// Emits `events` in order, then never ends (simulates a stalled
    /// upstream for inactivity-timeout tests).
    Stall(Vec<StreamEvent>),
    /// Emits a single terminal error.
    Fail(YtdlError),
}

/// Returns a script whose byte stream fails immediately, for exercising the
/// Scheduler's retry ladder without simulating real transfer progress.
#[must_use]
pub fn immediate_failure(message: impl Into<String>) -> ScriptedAttempt {
    ScriptedAttempt::Fail(YtdlError::Stream(message.into()))
}

/// In-memory [`MetadataClient`] returning pre-registered [`VideoInfo`]s or
/// errors, keyed by URL.
#[derive(Default)]
pub struct FakeMetadataClient {
    infos: Mutex<HashMap<String, YtdlResult<VideoInfo>>>,
}

impl FakeMetadataClient {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, url: impl Into<String>, info: VideoInfo) {
        self.infos.lock().insert(url.into(), Ok(info));
    }

    pub fn set_error(&self, url: impl Into<String>, error: YtdlError) {
        self.infos.lock().insert(url.into(), Err(error));
    }

    /// Registers a URL whose `get_info` never resolves, for bounded-wait
    /// timeout tests. Implemented by returning a `Metadata` error lazily is
    /// not enough to simulate a hang, so callers needing a real stall should
    /// drive [`MetadataClient::get_info`] against a future that never
    /// completes instead; this fake only ever returns immediately.
    pub fn set_missing(&self, url: impl Into<String>) {
        self.infos
            .lock()
            .insert(url.into(), Err(YtdlError::Metadata("no fake info registered".to_string())));
    }
}

#[async_trait]
impl MetadataClient for FakeMetadataClient {
    async fn get_info(&self, url: &str) -> YtdlResult<VideoInfo> {
        self.infos
            .lock()
            .get(url)
            .cloned()
            .unwrap_or_else(|| Err(YtdlError::Metadata(format!("no fake info registered for {url}"))))
    }
}

/// In-memory [`StreamClient`] that plays back a queue of [`ScriptedAttempt`]s
/// per video id, popping one per call — the natural way to script "fails
/// twice then succeeds".
#[derive(Default)]
pub struct FakeStreamClient {
    scripts: Mutex<HashMap<String, VecDeque<ScriptedAttempt>>>,
}

impl FakeStreamClient {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `attempts` for `video_id`, consumed front-to-back on
    /// successive `download_from_info` calls.
    pub fn script(&self, video_id: impl Into<String>, attempts: Vec<ScriptedAttempt>) {
        self.scripts.lock().insert(video_id.into(), VecDeque::from(attempts));
    }
}

#[async_trait]
impl StreamClient for FakeStreamClient {
    async fn download_from_info(&self, info: &VideoInfo, _opts: &DownloadOptions) -> YtdlResult<ByteEventStream> {
        let video_id = info.video_details.video_id.clone();
        let attempt = self.scripts.lock().get_mut(&video_id).and_then(VecDeque::pop_front);

        match attempt {
            Some(ScriptedAttempt::Succeed(events)) => {
                Ok(Box::pin(stream::iter(events.into_iter().map(Ok))))
            }
            Some(ScriptedAttempt::Stall(events)) => {
                let head = stream::iter(events.into_iter().map(Ok));
                Ok(Box::pin(head.chain(stream::pending())))
            }
            Some(ScriptedAttempt::Fail(error)) => Ok(Box::pin(stream::iter(vec![Err(error)]))),
            None => Err(YtdlError::Stream(format!("no scripted attempt left for {video_id}"))),
        }
    }
}

/// Static [`PlaylistClient`] that resolves to a fixed item list regardless
/// of the requested id.
pub struct FakePlaylistClient {
    items: Vec<PlaylistItem>,
}

impl FakePlaylistClient {
    #[must_use]
    pub fn new(items: Vec<PlaylistItem>) -> Self {
        Self { items }
    }
}

#[async_trait]
impl PlaylistClient for FakePlaylistClient {
    fn validate_id(&self, _url_or_id: &str) -> bool {
        true
    }

    fn get_playlist_id(&self, url: &str) -> YtdlResult<String> {
        Ok(url.to_string())
    }

    async fn resolve(&self, _id: &str, _opts: &DownloadOptions) -> YtdlResult<Vec<PlaylistItem>> {
        Ok(self.items.clone())
    }
}
