//! `ffmpeg`-backed [`Encoder`] implementation.

use std::collections::HashMap;
use std::process::Stdio;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::sync::{mpsc, OnceCell};
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::domain::EncodeOptions;
use crate::error::{YtdlError, YtdlResult};

use super::{invalid_encode_options, ByteStream, CodecCapability, Encoder, EncoderHandle, EncoderMetadata, FormatCapability, OutputSink};

const READ_BUF_SIZE: usize = 64 * 1024;

/// Shells out to `ffmpeg` for probing and transcoding.
///
/// Probe results (`-muxers`, `-encoders`) are cached for the adapter's
/// lifetime; `ffmpeg`'s capability set does not change between invocations.
pub struct ProcessEncoderAdapter {
    binary: String,
    formats_cache: OnceCell<HashMap<String, FormatCapability>>,
    codecs_cache: OnceCell<HashMap<String, CodecCapability>>,
}

impl ProcessEncoderAdapter {
    /// Builds an adapter that invokes `ffmpeg` from `PATH`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_binary("ffmpeg")
    }

    /// Builds an adapter that invokes a specific `ffmpeg` binary path.
    #[must_use]
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            formats_cache: OnceCell::new(),
            codecs_cache: OnceCell::new(),
        }
    }

    async fn probe(&self, arg: &str) -> YtdlResult<String> {
        let output = Command::new(&self.binary)
            .args(["-hide_banner", arg])
            .output()
            .await
            .map_err(|e| YtdlError::Encoder(format!("failed to run {} {arg}: {e}", self.binary)))?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Default for ProcessEncoderAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Encoder for ProcessEncoderAdapter {
    async fn available_formats(&self) -> YtdlResult<HashMap<String, FormatCapability>> {
        if let Some(cached) = self.formats_cache.get() {
            return Ok(cached.clone());
        }
        let raw = self.probe("-muxers").await?;
        let parsed = parse_muxers(&raw);
        Ok(self.formats_cache.get_or_init(|| async { parsed }).await.clone())
    }

    async fn available_codecs(&self) -> YtdlResult<HashMap<String, CodecCapability>> {
        if let Some(cached) = self.codecs_cache.get() {
            return Ok(cached.clone());
        }
        let raw = self.probe("-encoders").await?;
        let parsed = parse_encoders(&raw);
        Ok(self.codecs_cache.get_or_init(|| async { parsed }).await.clone())
    }

    async fn create(
        &self,
        input: ByteStream,
        mut output: OutputSink,
        opts: &EncodeOptions,
        metadata: &EncoderMetadata,
    ) -> YtdlResult<EncoderHandle> {
        if !self.validate(opts).await? {
            return Err(invalid_encode_options());
        }

        let args = build_args(opts, metadata);
        let command = format!("{} {}", self.binary, args.join(" "));

        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| YtdlError::Encoder(format!("failed to spawn {}: {e}", self.binary)))?;

        let mut child_stdin = child
            .stdin
            .take()
            .ok_or_else(|| YtdlError::Encoder("ffmpeg stdin not piped".to_string()))?;
        let mut child_stdout = child
            .stdout
            .take()
            .ok_or_else(|| YtdlError::Encoder("ffmpeg stdout not piped".to_string()))?;

        tokio::spawn(async move {
            let mut input = input;
            while let Some(chunk) = input.next().await {
                let Ok(bytes) = chunk else { break };
                if child_stdin.write_all(&bytes).await.is_err() {
                    break;
                }
            }
            let _ = child_stdin.shutdown().await;
        });

        let (tx, rx) = mpsc::unbounded_channel::<YtdlResult<Bytes>>();
        tokio::spawn(async move {
            let mut buf = vec![0u8; READ_BUF_SIZE];
            loop {
                match child_stdout.read(&mut buf).await {
                    Ok(0) => break,
                    Ok(n) => {
                        let chunk = Bytes::copy_from_slice(&buf[..n]);
                        if output.write_all(&chunk).await.is_err() {
                            let _ = tx.send(Err(YtdlError::Encoder("output sink closed".to_string())));
                            break;
                        }
                        if tx.send(Ok(chunk)).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(Err(YtdlError::Encoder(format!("ffmpeg stdout read error: {e}"))));
                        break;
                    }
                }
            }
            let _ = output.shutdown().await;
            match child.wait().await {
                Ok(status) if !status.success() => {
                    let _ = tx.send(Err(YtdlError::Encoder(format!("ffmpeg exited with {status}"))));
                }
                Err(e) => {
                    let _ = tx.send(Err(YtdlError::Encoder(format!("ffmpeg wait failed: {e}"))));
                }
                Ok(_) => {}
            }
        });

        Ok(EncoderHandle {
            stream: Box::pin(UnboundedReceiverStream::new(rx)),
            command,
        })
    }
}

fn build_args(opts: &EncodeOptions, metadata: &EncoderMetadata) -> Vec<String> {
    let mut args = vec![
        "-y".to_string(),
        "-i".to_string(),
        "pipe:0".to_string(),
    ];

    if let Some(codec) = &opts.video_codec {
        args.push("-c:v".to_string());
        args.push(codec.clone());
    }
    if let Some(codec) = &opts.audio_codec {
        args.push("-c:a".to_string());
        args.push(codec.clone());
    }

    let video_bitrate = opts.video_bitrate.clone().or_else(|| metadata.source_video_bitrate.clone());
    if let Some(bitrate) = video_bitrate {
        args.push("-b:v".to_string());
        args.push(bitrate);
    }
    let audio_bitrate = opts.audio_bitrate.clone().or_else(|| metadata.source_audio_bitrate.clone());
    if let Some(bitrate) = audio_bitrate {
        args.push("-b:a".to_string());
        args.push(bitrate);
    }

    args.push("-f".to_string());
    args.push(opts.format.clone());

    args.push("-metadata".to_string());
    args.push(format!("title={}", metadata.title));
    args.push("-metadata".to_string());
    args.push(format!("artist={}", metadata.author));
    if let Some(description) = &metadata.description {
        args.push("-metadata".to_string());
        args.push(format!("comment={description}"));
    }
    args.push("-metadata".to_string());
    args.push(format!("episode_id={}", metadata.video_id));
    args.push("-metadata".to_string());
    args.push("network=YouTube".to_string());

    args.push("pipe:1".to_string());
    args
}

/// Parses `ffmpeg -muxers` output into a capability map.
///
/// Expected line shape: ` DE mp4             MP4 (MPEG-4 Part 14)` where the
/// first column is `D` (demuxing) and/or `.`, the second `E` (muxing) or `.`.
fn parse_muxers(raw: &str) -> HashMap<String, FormatCapability> {
    let mut out = HashMap::new();
    for line in raw.lines() {
        let line = line.trim_start();
        let mut chars = line.chars();
        let demux = chars.next();
        let mux = chars.next();
        let (Some(demux), Some(mux)) = (demux, mux) else { continue };
        if !matches!(demux, 'D' | '.') || !matches!(mux, 'E' | '.') {
            continue;
        }
        let mut fields = line[2..].split_whitespace();
        let Some(name) = fields.next() else { continue };
        out.insert(
            name.to_string(),
            FormatCapability {
                can_mux: mux == 'E',
                can_demux: demux == 'D',
            },
        );
    }
    out
}

/// Parses `ffmpeg -encoders` output into a capability map.
///
/// Expected line shape: ` V..... libx264             libx264 H.264 / AVC...`
/// where the leading six-character flag column is media-type/threading/
/// experimental markers, not capability flags — every listed line is an
/// encoder `ffmpeg` can actually use.
fn parse_encoders(raw: &str) -> HashMap<String, CodecCapability> {
    let mut out = HashMap::new();
    for line in raw.lines() {
        let line = line.trim_start();
        if line.len() < 8 {
            continue;
        }
        let flags = &line[..6];
        if !flags.chars().all(|c| c.is_ascii_uppercase() || c == '.') {
            continue;
        }
        let mut fields = line[6..].trim_start().split_whitespace();
        let Some(name) = fields.next() else { continue };
        out.insert(name.to_string(), CodecCapability { can_encode: true });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_MUXERS: &str = "\
Muxers:
 D. = Demuxing supported
 .E = Muxing supported
 --
 DE mp4             MP4 (MPEG-4 Part 14)
 DE webm            WebM
 D  flv             FLV (Flash Video)
";

    const SAMPLE_ENCODERS: &str = "\
Encoders:
 V..... = Video
 A..... = Audio
 ------
 V..... libx264             libx264 H.264 / AVC / MPEG-4 AVC / MPEG-4 part 10 (codecs: h264)
 A..... aac                 AAC (Advanced Audio Coding)
";

    #[test]
    fn parses_muxer_capability_rows() {
        let formats = parse_muxers(SAMPLE_MUXERS);
        assert_eq!(formats["mp4"], FormatCapability { can_mux: true, can_demux: true });
        assert_eq!(formats["flv"], FormatCapability { can_mux: false, can_demux: true });
        assert!(!formats.contains_key("Muxers:"));
    }

    #[test]
    fn parses_encoder_rows_as_available() {
        let codecs = parse_encoders(SAMPLE_ENCODERS);
        assert!(codecs["libx264"].can_encode);
        assert!(codecs["aac"].can_encode);
        assert_eq!(codecs.len(), 2);
    }

    #[tokio::test]
    async fn validate_rejects_unlisted_container() {
        let adapter = ProcessEncoderAdapterForTest::from_samples();
        let opts = EncodeOptions {
            format: "flv".to_string(),
            audio_codec: None,
            video_codec: None,
            audio_bitrate: None,
            video_bitrate: None,
        };
        assert!(!adapter.validate_raw(&opts));
    }

    /// Exercises the pure capability-matching logic in [`Encoder::validate`]
    /// without spawning a real `ffmpeg`, by pre-seeding the parsed maps.
    struct ProcessEncoderAdapterForTest {
        formats: HashMap<String, FormatCapability>,
        codecs: HashMap<String, CodecCapability>,
    }

    impl ProcessEncoderAdapterForTest {
        fn from_samples() -> Self {
            Self {
                formats: parse_muxers(SAMPLE_MUXERS),
                codecs: parse_encoders(SAMPLE_ENCODERS),
            }
        }

        fn validate_raw(&self, opts: &EncodeOptions) -> bool {
            let format_ok = self.formats.get(&opts.format).is_some_and(|f| f.can_mux);
            if !format_ok {
                return false;
            }
            [opts.audio_codec.as_ref(), opts.video_codec.as_ref()]
                .into_iter()
                .flatten()
                .all(|codec| self.codecs.get(codec).is_some_and(|c| c.can_encode))
        }
    }
}
