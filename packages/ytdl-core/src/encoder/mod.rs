//! Transcoding pipeline contract.
//!
//! [`Encoder`] validates a requested [`EncodeOptions`] against a capability
//! probe and wires an input byte stream through an external transcoder into
//! an output sink. [`process::ProcessEncoderAdapter`] is the production
//! implementation (shells out to `ffmpeg`); [`mock::FakeEncoder`] is a
//! pass-through test double, following the trait + production impl + test
//! double split the crate uses throughout (see [`crate::runtime`]).

pub mod mock;
pub mod process;

use std::collections::HashMap;
use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use tokio::io::AsyncWrite;

use crate::domain::{EncodeOptions, VideoDetails, VideoFormat};
use crate::error::{YtdlError, YtdlResult};

pub use process::ProcessEncoderAdapter;

/// A byte-producing stream, as consumed/produced throughout the crate.
pub type ByteStream = Pin<Box<dyn Stream<Item = YtdlResult<Bytes>> + Send>>;

/// A byte-consuming sink (a file, typically).
pub type OutputSink = Pin<Box<dyn AsyncWrite + Send>>;

/// One muxer's capabilities, as reported by [`Encoder::available_formats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FormatCapability {
    pub can_mux: bool,
    pub can_demux: bool,
}

/// One codec's capabilities, as reported by [`Encoder::available_codecs`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CodecCapability {
    pub can_encode: bool,
}

/// Metadata tags attached to the transcoded output: title,
/// author (also set as `artist`), description (also as `comment`), video id
/// (as `episode_id`), and a fixed `network=YouTube`. Also carries the
/// source's bitrates, used as a fallback when `EncodeOptions` omits one.
#[derive(Debug, Clone)]
pub struct EncoderMetadata {
    pub title: String,
    pub author: String,
    pub description: Option<String>,
    pub video_id: String,
    pub source_audio_bitrate: Option<String>,
    pub source_video_bitrate: Option<String>,
}

impl EncoderMetadata {
    /// Builds metadata from the video's details and the chosen source format.
    #[must_use]
    pub fn new(details: &VideoDetails, format: &VideoFormat) -> Self {
        Self {
            title: details.title.clone(),
            author: details.author.name.clone(),
            description: details.description.clone(),
            video_id: details.video_id.clone(),
            source_audio_bitrate: format.audio_bitrate.map(|b| b.to_string()),
            source_video_bitrate: format.bitrate.map(|b| b.to_string()),
        }
    }
}

/// Handle to a running transcoder pipeline.
pub struct EncoderHandle {
    /// The transcoder's output, already being piped into the sink the
    /// caller supplied to [`Encoder::create`]; consuming this to exhaustion
    /// (and checking for an `Err` item) is how a caller observes completion
    /// or failure.
    pub stream: ByteStream,
    /// Human-readable description of the spawned command, for error
    /// messages and logging.
    pub command: String,
}

/// Contract by which a worker hands its byte stream to an external
/// transcoder.
#[async_trait]
pub trait Encoder: Send + Sync {
    /// Queries the transcoder for available output containers.
    async fn available_formats(&self) -> YtdlResult<HashMap<String, FormatCapability>>;

    /// Queries the transcoder for available codecs.
    async fn available_codecs(&self) -> YtdlResult<HashMap<String, CodecCapability>>;

    /// Returns true iff `opts.format` reports `can_mux` and every named
    /// codec reports `can_encode`.
    async fn validate(&self, opts: &EncodeOptions) -> YtdlResult<bool> {
        let formats = self.available_formats().await?;
        if !formats.get(&opts.format).is_some_and(|f| f.can_mux) {
            return Ok(false);
        }
        let codecs = self.available_codecs().await?;
        for codec in [opts.audio_codec.as_ref(), opts.video_codec.as_ref()].into_iter().flatten() {
            if !codecs.get(codec).is_some_and(|c| c.can_encode) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Establishes a transcoder pipeline from `input` into `output`. Fails
    /// with [`YtdlError::Encoder`] if `opts` does not validate.
    async fn create(
        &self,
        input: ByteStream,
        output: OutputSink,
        opts: &EncodeOptions,
        metadata: &EncoderMetadata,
    ) -> YtdlResult<EncoderHandle>;
}

pub(crate) fn invalid_encode_options() -> YtdlError {
    YtdlError::Encoder("InvalidEncodeOptions".to_string())
}
