//! Per-item download state machine.
//!
//! [`DownloadWorker::run`] drives one playlist item from metadata fetch
//! through a terminal event, per the state machine documented on
//! [`DownloadWorker`]. It is a plain async function rather than a spawned
//! thread-per-state: each arrow in the state diagram is an `await` point,
//! with [`WorkerState`] recorded only for diagnostics/tests.

use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::client::{ByteEventStream, MetadataClient, StreamClient, StreamEvent};
use crate::domain::{DownloadOptions, EncodeOptions, PlaylistItem, VideoFormat};
use crate::encoder::{ByteStream as EncoderByteStream, Encoder, EncoderMetadata};
use crate::error::{YtdlError, YtdlResult};
use crate::events::{MessageDetails, SchedulerMessage, SchedulerMessageType};
use crate::sink::FileSink;
use crate::template::resolve_filename;
use crate::timeout_stream::{TimeoutStream, TimeoutStreamEvent};

/// Progress reporting cadence.
const PROGRESS_INTERVAL: Duration = Duration::from_millis(100);
/// Elapsed-time reporting cadence.
const ELAPSED_INTERVAL: Duration = Duration::from_millis(1000);
/// Worker-level default inactivity timeout.
pub const DEFAULT_WORKER_TIMEOUT_MS: u64 = 120_000;

/// State recorded for diagnostics/tests; not consulted by the control flow,
/// which is expressed directly as a sequence of `await` points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    MetaKnown,
    Streaming,
    Measured,
    Unmeasured,
    Done,
    Failed,
}

/// Inbound control-plane message, base64-encoded JSON on the wire even
/// though the channel carries typed Rust values end to end inside this
/// process (the framing is preserved for compatibility with external tooling).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ControlMessage {
    Kill,
}

impl ControlMessage {
    /// Decodes a base64-encoded JSON control message.
    pub fn decode(encoded: &str) -> YtdlResult<Self> {
        let bytes = BASE64
            .decode(encoded)
            .map_err(|e| YtdlError::Config(format!("invalid control message encoding: {e}")))?;
        serde_json::from_slice(&bytes).map_err(|e| YtdlError::Config(format!("invalid control message payload: {e}")))
    }

    /// Encodes this message as base64-encoded JSON.
    #[must_use]
    pub fn encode(&self) -> String {
        let json = serde_json::to_vec(self).expect("ControlMessage always serializes");
        BASE64.encode(json)
    }
}

/// Constructor inputs for a [`DownloadWorker`].
pub struct DownloadWorkerConfig {
    pub item: PlaylistItem,
    pub output: String,
    pub timeout: Duration,
    pub download_options: DownloadOptions,
    pub encoder_options: Option<EncodeOptions>,
    pub output_dir: PathBuf,
}

impl Default for DownloadWorkerConfig {
    fn default() -> Self {
        Self {
            item: PlaylistItem {
                id: String::new(),
                title: String::new(),
                url: String::new(),
                author: crate::domain::Author { name: String::new(), channel_id: String::new() },
                index: 0,
            },
            output: "{videoDetails.title}".to_string(),
            timeout: Duration::from_millis(DEFAULT_WORKER_TIMEOUT_MS),
            download_options: DownloadOptions::default(),
            encoder_options: None,
            output_dir: PathBuf::from("."),
        }
    }
}

/// Executes one playlist item's full download lifecycle.
pub struct DownloadWorker {
    config: DownloadWorkerConfig,
    metadata_client: Arc<dyn MetadataClient>,
    stream_client: Arc<dyn StreamClient>,
    encoder: Option<Arc<dyn Encoder>>,
    file_sink: Arc<dyn FileSink>,
    events: mpsc::UnboundedSender<SchedulerMessage>,
    control: mpsc::Receiver<String>,
}

impl DownloadWorker {
    #[must_use]
    pub fn new(
        config: DownloadWorkerConfig,
        metadata_client: Arc<dyn MetadataClient>,
        stream_client: Arc<dyn StreamClient>,
        encoder: Option<Arc<dyn Encoder>>,
        file_sink: Arc<dyn FileSink>,
        events: mpsc::UnboundedSender<SchedulerMessage>,
        control: mpsc::Receiver<String>,
    ) -> Self {
        Self { config, metadata_client, stream_client, encoder, file_sink, events, control }
    }

    /// Runs this worker's lifecycle to completion, emitting events along the
    /// way, and returns its exit code: 0 on success, 1 on any failure.
    pub async fn run(self) -> i32 {
        let DownloadWorker {
            config,
            metadata_client,
            stream_client,
            encoder,
            file_sink,
            events,
            mut control,
        } = self;

        let item = config.item.clone();
        let mut created_path: Option<PathBuf> = None;

        let outcome = execute(
            &config,
            &item,
            &metadata_client,
            &stream_client,
            encoder.as_ref(),
            &file_sink,
            &events,
            &mut control,
            &mut created_path,
        )
        .await;

        match outcome {
            Ok(()) => {
                let _ = events.send(SchedulerMessage::worker(SchedulerMessageType::End, item.clone(), None));
                0
            }
            Err(err) => {
                if let Some(path) = created_path {
                    let _ = file_sink.remove(&path).await;
                }
                let message_type = if err.kind() == "timeout" {
                    SchedulerMessageType::Timeout
                } else {
                    SchedulerMessageType::Error
                };
                let _ = events.send(SchedulerMessage::worker_error(message_type, item, err));
                1
            }
        }
    }
}

/// Drains a lookahead-buffered [`StreamEvent`] stream down to its `Data`
/// chunks, discarding stray `Info`/`Response` events that might still
/// arrive out of order.
struct DataOnly {
    inner: ByteEventStream,
    buffered: Option<Bytes>,
}

impl Stream for DataOnly {
    type Item = YtdlResult<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if let Some(bytes) = this.buffered.take() {
            return Poll::Ready(Some(Ok(bytes)));
        }
        loop {
            match this.inner.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(StreamEvent::Data(bytes)))) => return Poll::Ready(Some(Ok(bytes))),
                Poll::Ready(Some(Ok(_))) => continue,
                Poll::Ready(Some(Err(e))) => return Poll::Ready(Some(Err(e))),
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

/// Where transferred bytes go: straight to a file, or into an encoder's
/// input channel.
enum TransferSink {
    File(Pin<Box<dyn AsyncWrite + Send>>),
    Encoder(mpsc::UnboundedSender<YtdlResult<Bytes>>),
}

impl TransferSink {
    async fn write(&mut self, bytes: Bytes) -> YtdlResult<()> {
        match self {
            TransferSink::File(writer) => writer
                .write_all(&bytes)
                .await
                .map_err(|e| YtdlError::Stream(format!("sink write failed: {e}"))),
            TransferSink::Encoder(tx) => tx
                .send(Ok(bytes))
                .map_err(|_| YtdlError::Encoder("encoder input channel closed".to_string())),
        }
    }

    async fn finish(self) {
        match self {
            TransferSink::File(mut writer) => {
                let _ = writer.shutdown().await;
            }
            TransferSink::Encoder(_tx) => {
                // Dropping the sender closes the encoder's input stream,
                // signalling `end` to the transcoder.
            }
        }
    }
}

async fn tick(interval: &mut Option<tokio::time::Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

#[allow(clippy::too_many_arguments)]
async fn execute(
    config: &DownloadWorkerConfig,
    item: &PlaylistItem,
    metadata_client: &Arc<dyn MetadataClient>,
    stream_client: &Arc<dyn StreamClient>,
    encoder: Option<&Arc<dyn Encoder>>,
    file_sink: &Arc<dyn FileSink>,
    events: &mpsc::UnboundedSender<SchedulerMessage>,
    control: &mut mpsc::Receiver<String>,
    created_path: &mut Option<PathBuf>,
) -> YtdlResult<()> {
    // Step 2-3: bounded-wait metadata fetch.
    let info = match tokio::time::timeout(config.timeout, metadata_client.get_info(&item.url)).await {
        Ok(Ok(info)) => info,
        Ok(Err(e)) => return Err(e),
        Err(_) => return Err(YtdlError::Metadata("getInfoTimeout".to_string())),
    };
    let _ = events.send(SchedulerMessage::worker(SchedulerMessageType::VideoInfo, item.clone(), None));

    // Step 4: open the byte stream.
    let mut raw = stream_client.download_from_info(&info, &config.download_options).await?;

    // Step 5: await the stream's `info(info, format)` event.
    let format: VideoFormat = loop {
        match raw.next().await {
            Some(Ok(StreamEvent::Info { format, .. })) => break format,
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(e),
            None => return Err(YtdlError::Metadata("videoInfo or videoFormat missing".to_string())),
        }
    };
    let _ = events.send(SchedulerMessage::worker(SchedulerMessageType::Info, item.clone(), None));

    // Step 6: determine size.
    let mut lookahead: Option<Bytes> = None;
    let size: Option<u64> = if format.is_live_stream() && format.content_length.is_none() {
        None
    } else if let Some(len) = format.content_length {
        Some(len)
    } else {
        loop {
            match raw.next().await {
                Some(Ok(StreamEvent::Response(response))) => break response.content_length(),
                Some(Ok(StreamEvent::Data(bytes))) => {
                    lookahead = Some(bytes);
                    break None;
                }
                Some(Ok(StreamEvent::Info { .. })) => continue,
                Some(Err(e)) => return Err(e),
                None => break None,
            }
        }
    };

    // Step 7: progress/elapsed cadence, only when size is known.
    if let Some(len) = size {
        let _ = events.send(SchedulerMessage::scheduler_with_details(
            SchedulerMessageType::ContentLength,
            Some(item.clone()),
            MessageDetails::ContentLength { content_length: len },
        ));
    }
    let mut progress_interval = size.map(|_| tokio::time::interval(PROGRESS_INTERVAL));
    let mut elapsed_interval = size.map(|_| tokio::time::interval(ELAPSED_INTERVAL));

    // Step 8: attach the inactivity watchdog.
    let (timeout_tx, mut timeout_rx) = mpsc::unbounded_channel();
    let mut timed = TimeoutStream::new(DataOnly { inner: raw, buffered: lookahead }, config.timeout, timeout_tx);

    // Step 9: open the output sink (raw file, or via the encoder).
    let output_path = resolve_output_path(config, &info.video_details, &format);
    let mut transfer_sink = if let Some(encode_opts) = &config.encoder_options {
        let encoder = encoder
            .cloned()
            .ok_or_else(|| YtdlError::Config("encoderOptions set without an encoder configured".to_string()))?;
        let output = file_sink.create(&output_path).await?;
        *created_path = Some(output_path.clone());
        let metadata = EncoderMetadata::new(&info.video_details, &format);
        let (input_tx, input_rx) = mpsc::unbounded_channel::<YtdlResult<Bytes>>();
        let input_stream: EncoderByteStream = Box::pin(UnboundedReceiverStream::new(input_rx));
        let handle = encoder.create(input_stream, output, encode_opts, &metadata).await?;
        EncodedTransfer::Encoder(TransferSink::Encoder(input_tx), handle)
    } else {
        let output = file_sink.create(&output_path).await?;
        *created_path = Some(output_path.clone());
        EncodedTransfer::Direct(TransferSink::File(output))
    };

    let start = Instant::now();
    let mut transferred: u64 = 0;

    loop {
        tokio::select! {
            biased;
            maybe_raw = control.recv() => {
                if let Some(raw) = maybe_raw {
                    if let Ok(ControlMessage::Kill) = ControlMessage::decode(&raw) {
                        return Err(YtdlError::Cancelled("kill".to_string()));
                    }
                }
            }
            chunk = timed.next() => {
                match chunk {
                    Some(Ok(bytes)) => {
                        transferred += bytes.len() as u64;
                        transfer_sink_mut(&mut transfer_sink).write(bytes).await?;
                    }
                    Some(Err(e)) => return Err(e),
                    None => {
                        match timeout_rx.try_recv() {
                            Ok(TimeoutStreamEvent::Timeout) => {
                                return Err(YtdlError::Timeout(format!("no bytes for {}ms", config.timeout.as_millis())));
                            }
                            _ => break,
                        }
                    }
                }
            }
            _ = tick(&mut progress_interval) => {
                if let Some(len) = size {
                    let elapsed_s = start.elapsed().as_secs_f64().max(0.001);
                    let speed = transferred as f64 / elapsed_s;
                    let remaining = len.saturating_sub(transferred);
                    let eta = if speed > 0.0 { Some(remaining as f64 / speed) } else { None };
                    let percentage = (transferred as f64 / len as f64) * 100.0;
                    let _ = events.send(SchedulerMessage::scheduler_with_details(
                        SchedulerMessageType::Progress,
                        Some(item.clone()),
                        MessageDetails::Progress { transferred, eta, percentage, speed },
                    ));
                }
            }
            _ = tick(&mut elapsed_interval) => {
                let _ = events.send(SchedulerMessage::scheduler_with_details(
                    SchedulerMessageType::Elapsed,
                    Some(item.clone()),
                    MessageDetails::Elapsed { elapsed_seconds: timed.elapsed() },
                ));
            }
        }
    }

    finish_transfer(transfer_sink).await
}

/// Tags which sink a transfer loop is feeding, since the raw-file and
/// encoder paths need different completion handling.
enum EncodedTransfer {
    Direct(TransferSink),
    Encoder(TransferSink, crate::encoder::EncoderHandle),
}

fn transfer_sink_mut(transfer: &mut EncodedTransfer) -> &mut TransferSink {
    match transfer {
        EncodedTransfer::Direct(sink) | EncodedTransfer::Encoder(sink, _) => sink,
    }
}

async fn finish_transfer(transfer: EncodedTransfer) -> YtdlResult<()> {
    match transfer {
        EncodedTransfer::Direct(sink) => {
            sink.finish().await;
            Ok(())
        }
        EncodedTransfer::Encoder(sink, mut handle) => {
            sink.finish().await;
            while let Some(item) = handle.stream.next().await {
                item?;
            }
            Ok(())
        }
    }
}

fn resolve_output_path(
    config: &DownloadWorkerConfig,
    details: &crate::domain::VideoDetails,
    format: &VideoFormat,
) -> PathBuf {
    let ext = config
        .encoder_options
        .as_ref()
        .map(|opts| opts.format.clone())
        .unwrap_or_else(|| format.container.clone());
    let file_name = resolve_filename(&config.output, details, format, &ext);
    crate::sink::resolve_path(&config.output_dir, &file_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::mock::{FakeMetadataClient, FakeStreamClient, ScriptedAttempt};
    use crate::client::ResponseInfo;
    use crate::domain::{Author, VideoDetails, VideoInfo};
    use crate::sink::mock::FakeFileSink;
    use std::collections::HashMap;

    fn item(id: &str) -> PlaylistItem {
        PlaylistItem {
            id: id.to_string(),
            title: format!("title-{id}"),
            url: format!("https://example.invalid/{id}"),
            author: Author { name: "author".to_string(), channel_id: "UC1".to_string() },
            index: 0,
        }
    }

    fn info(video_id: &str) -> VideoInfo {
        VideoInfo {
            video_details: VideoDetails {
                title: "My Video".to_string(),
                author: Author { name: "author".to_string(), channel_id: "UC1".to_string() },
                length_seconds: 10,
                description: None,
                video_id: video_id.to_string(),
            },
            formats: Vec::new(),
        }
    }

    fn format() -> VideoFormat {
        VideoFormat {
            itag: 18,
            container: "mp4".to_string(),
            quality_label: Some("360p".to_string()),
            codecs: "avc1, mp4a".to_string(),
            bitrate: Some(500_000),
            audio_bitrate: Some(128_000),
            content_length: Some(11),
            is_live: false,
            is_hls: false,
            is_dash_mpd: false,
            url: None,
        }
    }

    fn worker(
        video_id: &str,
        metadata: Arc<FakeMetadataClient>,
        stream: Arc<FakeStreamClient>,
        sink: Arc<FakeFileSink>,
    ) -> (DownloadWorker, mpsc::UnboundedReceiver<SchedulerMessage>, mpsc::Sender<String>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (control_tx, control_rx) = mpsc::channel(4);
        let config = DownloadWorkerConfig {
            item: item(video_id),
            output: "{videoDetails.videoId}".to_string(),
            timeout: Duration::from_millis(500),
            download_options: DownloadOptions::default(),
            encoder_options: None,
            output_dir: PathBuf::from("/out"),
        };
        let w = DownloadWorker::new(config, metadata, stream, None, sink, events_tx, control_rx);
        (w, events_rx, control_tx)
    }

    #[tokio::test]
    async fn successful_download_writes_all_bytes_and_ends_with_code_zero() {
        let metadata = Arc::new(FakeMetadataClient::new());
        metadata.set(format!("https://example.invalid/{}", "A"), info("A"));

        let stream = Arc::new(FakeStreamClient::new());
        stream.script(
            "A",
            vec![ScriptedAttempt::Succeed(vec![
                StreamEvent::Info { info: info("A"), format: format() },
                StreamEvent::Response(ResponseInfo { headers: HashMap::new() }),
                StreamEvent::Data(Bytes::from_static(b"hello world")),
            ])],
        );

        let sink = Arc::new(FakeFileSink::new());
        let (w, mut events, _control) = worker("A", metadata, stream, sink.clone());

        let code = w.run().await;
        assert_eq!(code, 0);

        let path = PathBuf::from("/out/A.mp4");
        assert_eq!(sink.contents(&path), Some(b"hello world".to_vec()));

        let mut saw_end = false;
        while let Ok(msg) = events.try_recv() {
            if matches!(msg.message_type, SchedulerMessageType::End) {
                saw_end = true;
            }
        }
        assert!(saw_end);
    }

    #[tokio::test]
    async fn failed_stream_removes_partial_file_and_emits_error() {
        let metadata = Arc::new(FakeMetadataClient::new());
        metadata.set(format!("https://example.invalid/{}", "B"), info("B"));

        let stream = Arc::new(FakeStreamClient::new());
        stream.script(
            "B",
            vec![ScriptedAttempt::Fail(YtdlError::Stream("connection reset".to_string()))],
        );

        let sink = Arc::new(FakeFileSink::new());
        let (w, mut events, _control) = worker("B", metadata, stream, sink.clone());

        let code = w.run().await;
        assert_eq!(code, 1);
        assert!(!sink.exists(&PathBuf::from("/out/B.mp4")));

        let mut saw_error = false;
        while let Ok(msg) = events.try_recv() {
            if matches!(msg.message_type, SchedulerMessageType::Error) {
                saw_error = true;
            }
        }
        assert!(saw_error);
    }
}
