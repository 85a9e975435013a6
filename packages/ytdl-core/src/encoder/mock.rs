//! Test double for [`Encoder`]: a pass-through copy that always validates
//! unless told to reject a specific container, for exercising the
//! `InvalidEncodeOptions` path (scenario 6) without a real `ffmpeg`.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::domain::EncodeOptions;
use crate::error::{YtdlError, YtdlResult};

use super::{invalid_encode_options, ByteStream, CodecCapability, Encoder, EncoderHandle, EncoderMetadata, FormatCapability, OutputSink};

/// Always-available fake transcoder that copies input bytes to the output
/// sink verbatim, optionally rejecting a configured set of container names.
#[derive(Default)]
pub struct FakeEncoder {
    rejected_formats: Mutex<HashSet<String>>,
}

impl FakeEncoder {
    /// Builds a `FakeEncoder` that validates every request.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a `FakeEncoder` whose `validate` reports `can_mux: false` for
    /// `format`.
    #[must_use]
    pub fn rejecting(format: impl Into<String>) -> Self {
        let encoder = Self::default();
        encoder.rejected_formats.lock().insert(format.into());
        encoder
    }
}

#[async_trait]
impl Encoder for FakeEncoder {
    async fn available_formats(&self) -> YtdlResult<HashMap<String, FormatCapability>> {
        Ok(HashMap::new())
    }

    async fn available_codecs(&self) -> YtdlResult<HashMap<String, CodecCapability>> {
        Ok(HashMap::new())
    }

    async fn validate(&self, opts: &EncodeOptions) -> YtdlResult<bool> {
        Ok(!self.rejected_formats.lock().contains(&opts.format))
    }

    async fn create(
        &self,
        input: ByteStream,
        mut output: OutputSink,
        opts: &EncodeOptions,
        _metadata: &EncoderMetadata,
    ) -> YtdlResult<EncoderHandle> {
        if !self.validate(opts).await? {
            return Err(invalid_encode_options());
        }

        let (tx, rx) = mpsc::unbounded_channel::<YtdlResult<Bytes>>();
        tokio::spawn(async move {
            let mut input = input;
            while let Some(chunk) = input.next().await {
                match chunk {
                    Ok(bytes) => {
                        if output.write_all(&bytes).await.is_err() {
                            let _ = tx.send(Err(YtdlError::Encoder("output sink closed".to_string())));
                            break;
                        }
                        if tx.send(Ok(bytes)).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(Err(e));
                        break;
                    }
                }
            }
            let _ = output.shutdown().await;
        });

        Ok(EncoderHandle {
            stream: Box::pin(UnboundedReceiverStream::new(rx)),
            command: "fake-encoder passthrough".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use futures::stream;

    fn metadata() -> EncoderMetadata {
        EncoderMetadata {
            title: "t".to_string(),
            author: "a".to_string(),
            description: None,
            video_id: "id".to_string(),
            source_audio_bitrate: None,
            source_video_bitrate: None,
        }
    }

    #[tokio::test]
    async fn rejecting_encoder_fails_create_with_invalid_encode_options() {
        let encoder = FakeEncoder::rejecting("flv");
        let opts = EncodeOptions {
            format: "flv".to_string(),
            audio_codec: None,
            video_codec: None,
            audio_bitrate: None,
            video_bitrate: None,
        };
        let input: ByteStream = Box::pin(stream::empty());
        let output: OutputSink = Box::pin(Vec::new());

        let err = encoder.create(input, output, &opts, &metadata()).await.unwrap_err();
        assert_eq!(err.code(), "encoder_error");
    }

    #[tokio::test]
    async fn passthrough_encoder_copies_bytes_to_sink_and_stream() {
        let encoder = FakeEncoder::new();
        let opts = EncodeOptions {
            format: "mp4".to_string(),
            audio_codec: None,
            video_codec: None,
            audio_bitrate: None,
            video_bitrate: None,
        };
        let chunks = vec![Ok(Bytes::from_static(b"hello ")), Ok(Bytes::from_static(b"world"))];
        let input: ByteStream = Box::pin(stream::iter(chunks));
        let sink = Vec::new();
        let output: OutputSink = Box::pin(sink);

        let mut handle = encoder.create(input, output, &opts, &metadata()).await.unwrap();
        let mut forwarded = Vec::new();
        while let Some(chunk) = handle.stream.next().await {
            forwarded.extend_from_slice(&chunk.unwrap());
        }
        assert_eq!(forwarded, b"hello world");
    }
}
