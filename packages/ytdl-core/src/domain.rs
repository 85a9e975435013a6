//! Core data model: playlist items, download/encode options, and the
//! Scheduler's configuration.
//!
//! Types here are intentionally plain data — they carry no behavior beyond
//! small, pure helper methods (`DownloadOptions::matches`, validation).
//! Orchestration lives in [`crate::scheduler`] and [`crate::worker`].

use std::collections::HashMap;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// A video's author, as reported by the metadata client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub name: String,
    pub channel_id: String,
}

/// One entry in a resolved playlist.
///
/// Immutable for the item's lifetime; the core only reads these fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistItem {
    pub id: String,
    pub title: String,
    pub url: String,
    pub author: Author,
    pub index: usize,
}

/// Preferred quality, as a single token or an ordered list of fallbacks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Quality {
    Single(String),
    Preferences(Vec<String>),
}

impl Default for Quality {
    fn default() -> Self {
        Self::Single("highest".to_string())
    }
}

/// Inclusive byte range for a partial download.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ByteRange {
    pub start: Option<u64>,
    pub end: Option<u64>,
}

/// Mutually exclusive basic stream-type filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FilterKind {
    Video,
    VideoOnly,
    Audio,
    AudioOnly,
    VideoAndAudio,
}

/// Format-selection options threaded through to the stream client and used
/// by the worker to decide which [`VideoFormat`] to request.
///
/// Composition rule: a format is accepted iff it matches every positive
/// filter AND no negative filter; the basic `filter` enum combines with the
/// field filters by conjunction. See [`DownloadOptions::matches`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DownloadOptions {
    #[serde(default)]
    pub quality: Option<Quality>,
    #[serde(default)]
    pub range: Option<ByteRange>,
    #[serde(default)]
    pub filter: Option<FilterKind>,
    #[serde(default)]
    pub filter_container: Option<String>,
    #[serde(default)]
    pub unfilter_container: Option<String>,
    #[serde(default)]
    pub filter_resolution: Option<String>,
    #[serde(default)]
    pub unfilter_resolution: Option<String>,
    #[serde(default)]
    pub filter_codecs: Option<String>,
    #[serde(default)]
    pub unfilter_codecs: Option<String>,
    /// Opaque passthrough fields the core does not interpret (e.g. the CLI's
    /// `--begin` flag).
    #[serde(default)]
    pub flags: HashMap<String, String>,
}

impl DownloadOptions {
    /// Returns true iff `format` matches every configured positive filter
    /// and no configured negative filter.
    pub fn matches(&self, format: &VideoFormat) -> bool {
        if let Some(kind) = self.filter {
            if !basic_filter_matches(kind, format) {
                return false;
            }
        }
        if let Some(pattern) = &self.filter_container {
            if !regex_matches(pattern, &format.container) {
                return false;
            }
        }
        if let Some(pattern) = &self.unfilter_container {
            if regex_matches(pattern, &format.container) {
                return false;
            }
        }
        if let Some(pattern) = &self.filter_resolution {
            let label = format.quality_label.as_deref().unwrap_or("");
            if !regex_matches(pattern, label) {
                return false;
            }
        }
        if let Some(pattern) = &self.unfilter_resolution {
            let label = format.quality_label.as_deref().unwrap_or("");
            if regex_matches(pattern, label) {
                return false;
            }
        }
        if let Some(pattern) = &self.filter_codecs {
            if !regex_matches(pattern, &format.codecs) {
                return false;
            }
        }
        if let Some(pattern) = &self.unfilter_codecs {
            if regex_matches(pattern, &format.codecs) {
                return false;
            }
        }
        true
    }
}

fn regex_matches(pattern: &str, value: &str) -> bool {
    Regex::new(pattern).map(|re| re.is_match(value)).unwrap_or(false)
}

fn basic_filter_matches(kind: FilterKind, format: &VideoFormat) -> bool {
    let has_video = format.bitrate.is_some();
    let has_audio = format.audio_bitrate.is_some();
    match kind {
        FilterKind::Video => has_video,
        FilterKind::VideoOnly => has_video && !has_audio,
        FilterKind::Audio => has_audio,
        FilterKind::AudioOnly => has_audio && !has_video,
        FilterKind::VideoAndAudio => has_video && has_audio,
    }
}

/// Requested transcode, or `None` to write source bytes verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncodeOptions {
    pub format: String,
    #[serde(default)]
    pub audio_codec: Option<String>,
    #[serde(default)]
    pub video_codec: Option<String>,
    #[serde(default)]
    pub audio_bitrate: Option<String>,
    #[serde(default)]
    pub video_bitrate: Option<String>,
}

/// Video details the core reads from the metadata client's opaque
/// `VideoInfo` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoDetails {
    pub title: String,
    pub author: Author,
    pub length_seconds: u64,
    pub description: Option<String>,
    pub video_id: String,
}

/// Metadata for a playable video, as returned by the metadata client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoInfo {
    pub video_details: VideoDetails,
    pub formats: Vec<VideoFormat>,
}

/// A single selectable stream format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoFormat {
    pub itag: u32,
    pub container: String,
    pub quality_label: Option<String>,
    pub codecs: String,
    pub bitrate: Option<u64>,
    pub audio_bitrate: Option<u64>,
    pub content_length: Option<u64>,
    pub is_live: bool,
    pub is_hls: bool,
    pub is_dash_mpd: bool,
    /// The direct (possibly signed) media URL, when the client resolves
    /// one up front. Not read by the core's own logic; carried through for
    /// production [`crate::client::StreamClient`] implementations that
    /// need it to open the byte stream.
    #[serde(default)]
    pub url: Option<String>,
}

impl VideoFormat {
    /// Whether this format is an unbounded live stream (no known total size).
    #[must_use]
    pub fn is_live_stream(&self) -> bool {
        self.is_live || self.is_hls || self.is_dash_mpd
    }
}

/// Scheduler-wide configuration.
///
/// Mirrors the CLI's `download:playlist` flags; every field has the default
/// the Scheduler and worker emit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub playlist_id: String,
    pub output: String,
    pub maxconnections: usize,
    pub retries: u32,
    pub timeout_ms: u64,
    pub download_options: DownloadOptions,
    pub encoder_options: Option<EncodeOptions>,
    /// Opaque CLI flags carried through to each worker's `DownloadOptions`.
    pub flags: HashMap<String, String>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            playlist_id: String::new(),
            output: "{videoDetails.title}".to_string(),
            maxconnections: 5,
            retries: 5,
            timeout_ms: 120_000,
            download_options: DownloadOptions::default(),
            encoder_options: None,
            flags: HashMap::new(),
        }
    }
}

impl SchedulerConfig {
    /// Validates the configuration, mirroring the defaults/invariants
    /// at least one connection, and a
    /// non-empty output template.
    pub fn validate(&self) -> Result<(), String> {
        if self.maxconnections == 0 {
            return Err("maxconnections must be >= 1".to_string());
        }
        if self.output.trim().is_empty() {
            return Err("output template must not be empty".to_string());
        }
        Ok(())
    }
}

/// Terminal outcome for one playlist item, emitted once per input item by
/// the Scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerResult {
    pub item: PlaylistItem,
    /// 0 on success, nonzero on terminal failure.
    pub code: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SchedulerResult {
    #[must_use]
    pub fn success(item: PlaylistItem) -> Self {
        Self { item, code: 0, error: None }
    }

    #[must_use]
    pub fn failure(item: PlaylistItem, error: impl Into<String>) -> Self {
        Self { item, code: 1, error: Some(error.into()) }
    }
}

/// Scheduler-private retry counter for one item.
#[derive(Debug, Clone)]
pub struct RetryState {
    pub item: PlaylistItem,
    pub left: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(container: &str, codecs: &str, video: bool, audio: bool) -> VideoFormat {
        VideoFormat {
            itag: 1,
            container: container.to_string(),
            quality_label: Some("720p".to_string()),
            codecs: codecs.to_string(),
            bitrate: video.then_some(1_000_000),
            audio_bitrate: audio.then_some(128_000),
            content_length: Some(1024),
            is_live: false,
            is_hls: false,
            is_dash_mpd: false,
            url: None,
        }
    }

    #[test]
    fn basic_filter_audioonly_excludes_muxed_formats() {
        let opts = DownloadOptions {
            filter: Some(FilterKind::AudioOnly),
            ..Default::default()
        };
        assert!(!opts.matches(&format("mp4", "avc1,mp4a", true, true)));
        assert!(opts.matches(&format("webm", "opus", false, true)));
    }

    #[test]
    fn positive_and_negative_container_filters_compose() {
        let opts = DownloadOptions {
            filter_container: Some("mp4|webm".to_string()),
            unfilter_container: Some("webm".to_string()),
            ..Default::default()
        };
        assert!(opts.matches(&format("mp4", "avc1", true, true)));
        assert!(!opts.matches(&format("webm", "vp9", true, true)));
        assert!(!opts.matches(&format("3gp", "mp4v", true, true)));
    }

    #[test]
    fn live_format_without_content_length_is_unbounded() {
        let mut fmt = format("mp4", "avc1", true, true);
        fmt.is_hls = true;
        fmt.content_length = None;
        assert!(fmt.is_live_stream());
    }

    #[test]
    fn scheduler_config_rejects_zero_connections() {
        let cfg = SchedulerConfig {
            maxconnections: 0,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }
}
