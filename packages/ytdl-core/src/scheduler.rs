//! Playlist-wide orchestration: resolves items, fans them out across a
//! bounded pool of concurrent [`crate::worker::DownloadWorker`]s, and
//! retries failed items per a per-item retry ladder.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::client::{MetadataClient, PlaylistClient, StreamClient};
use crate::domain::{PlaylistItem, RetryState, SchedulerConfig, SchedulerResult};
use crate::encoder::Encoder;
use crate::error::{YtdlError, YtdlResult};
use crate::events::{EventEmitter, MessageDetails, SchedulerMessage, SchedulerMessageType};
use crate::runtime::TaskSpawner;
use crate::sink::FileSink;
use crate::worker::{ControlMessage, DownloadWorker, DownloadWorkerConfig};

/// The collaborators a [`Scheduler`] needs, grouped so constructing one
/// doesn't take a dozen positional arguments.
pub struct SchedulerDeps {
    pub playlist_client: Arc<dyn PlaylistClient>,
    pub metadata_client: Arc<dyn MetadataClient>,
    pub stream_client: Arc<dyn StreamClient>,
    pub encoder: Option<Arc<dyn Encoder>>,
    pub file_sink: Arc<dyn FileSink>,
    pub spawner: Arc<dyn TaskSpawner>,
    pub emitter: Arc<dyn EventEmitter>,
}

/// Drives one playlist through to completion: resolve, queue, fan out,
/// retry, collect.
pub struct Scheduler {
    config: SchedulerConfig,
    output_dir: PathBuf,
    deps: SchedulerDeps,
    cancel: CancellationToken,
}

impl Scheduler {
    #[must_use]
    pub fn new(config: SchedulerConfig, output_dir: PathBuf, deps: SchedulerDeps) -> Self {
        Self { config, output_dir, deps, cancel: CancellationToken::new() }
    }

    /// Requests cooperative shutdown: in-flight workers are sent a `kill`
    /// control message and the queue stops being drained, but already
    /// in-flight items still report a terminal [`SchedulerResult`].
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Resolves the configured playlist and downloads every item, retrying
    /// failures per item up to `config.retries` times, across at most
    /// `config.maxconnections` concurrent workers.
    pub async fn download(&self) -> YtdlResult<Vec<SchedulerResult>> {
        self.config.validate().map_err(YtdlError::Config)?;

        let items = self
            .deps
            .playlist_client
            .resolve(&self.config.playlist_id, &self.config.download_options)
            .await?;

        self.deps.emitter.emit(SchedulerMessage::scheduler_with_details(
            SchedulerMessageType::PlaylistItems,
            None,
            MessageDetails::PlaylistItems { playlist_items: items.clone() },
        ));

        if items.is_empty() {
            self.deps.emitter.emit(SchedulerMessage::scheduler_with_details(
                SchedulerMessageType::Exit,
                None,
                MessageDetails::ExitCode { code: 0 },
            ));
            return Ok(Vec::new());
        }

        let retry_state: Arc<DashMap<String, RetryState>> = Arc::new(DashMap::new());
        for item in &items {
            retry_state.insert(item.id.clone(), RetryState { item: item.clone(), left: self.config.retries });
        }

        let queue = Arc::new(Mutex::new(VecDeque::from(items.clone())));
        let (results_tx, mut results_rx) = mpsc::unbounded_channel::<SchedulerResult>();
        let (scheduler_events_tx, mut scheduler_events_rx) = mpsc::unbounded_channel::<SchedulerMessage>();

        let emitter = self.deps.emitter.clone();
        self.deps.spawner.spawn(async move {
            while let Some(msg) = scheduler_events_rx.recv().await {
                emitter.emit(msg);
            }
        });

        let consumers = self.config.maxconnections.min(items.len()).max(1);
        for _ in 0..consumers {
            let queue = queue.clone();
            let retry_state = retry_state.clone();
            let results_tx = results_tx.clone();
            let events_tx = scheduler_events_tx.clone();
            let cancel = self.cancel.clone();
            let metadata_client = self.deps.metadata_client.clone();
            let stream_client = self.deps.stream_client.clone();
            let encoder = self.deps.encoder.clone();
            let file_sink = self.deps.file_sink.clone();
            let output = self.config.output.clone();
            let timeout = Duration::from_millis(self.config.timeout_ms);
            let download_options = self.config.download_options.clone();
            let encoder_options = self.config.encoder_options.clone();
            let output_dir = self.output_dir.clone();

            self.deps.spawner.spawn(async move {
                run_consumer(ConsumerContext {
                    queue,
                    retry_state,
                    results_tx,
                    events_tx,
                    cancel,
                    metadata_client,
                    stream_client,
                    encoder,
                    file_sink,
                    output,
                    timeout,
                    download_options,
                    encoder_options,
                    output_dir,
                })
                .await;
            });
        }
        drop(results_tx);
        drop(scheduler_events_tx);

        let mut results = Vec::with_capacity(items.len());
        while let Some(result) = results_rx.recv().await {
            results.push(result);
        }

        let exit_code = if results.iter().all(|r| r.code == 0) { 0 } else { 1 };
        self.deps.emitter.emit(SchedulerMessage::scheduler_with_details(
            SchedulerMessageType::Exit,
            None,
            MessageDetails::ExitCode { code: exit_code },
        ));

        Ok(results)
    }
}

struct ConsumerContext {
    queue: Arc<Mutex<VecDeque<PlaylistItem>>>,
    retry_state: Arc<DashMap<String, RetryState>>,
    results_tx: mpsc::UnboundedSender<SchedulerResult>,
    events_tx: mpsc::UnboundedSender<SchedulerMessage>,
    cancel: CancellationToken,
    metadata_client: Arc<dyn MetadataClient>,
    stream_client: Arc<dyn StreamClient>,
    encoder: Option<Arc<dyn Encoder>>,
    file_sink: Arc<dyn FileSink>,
    output: String,
    timeout: Duration,
    download_options: crate::domain::DownloadOptions,
    encoder_options: Option<crate::domain::EncodeOptions>,
    output_dir: PathBuf,
}

/// One worker-pool slot: pulls items off the shared queue until it is
/// empty or shutdown is requested, running each through its retry ladder.
async fn run_consumer(ctx: ConsumerContext) {
    loop {
        if ctx.cancel.is_cancelled() {
            break;
        }
        let item = {
            let mut queue = ctx.queue.lock().await;
            queue.pop_front()
        };
        let Some(item) = item else { break };

        let result = run_item_with_retries(&ctx, &item).await;
        let _ = ctx.results_tx.send(result);
        let _ = ctx
            .events_tx
            .send(SchedulerMessage::scheduler(SchedulerMessageType::WorkerTerminated, Some(item)));
    }
}

/// Runs fresh [`DownloadWorker`] attempts for `item` until one succeeds or
/// the retry ladder is exhausted. Each retry gets a brand-new worker rather
/// than reusing worker state across attempts.
async fn run_item_with_retries(ctx: &ConsumerContext, item: &PlaylistItem) -> SchedulerResult {
    loop {
        let (control_tx, control_rx) = mpsc::channel(4);
        let config = DownloadWorkerConfig {
            item: item.clone(),
            output: ctx.output.clone(),
            timeout: ctx.timeout,
            download_options: ctx.download_options.clone(),
            encoder_options: ctx.encoder_options.clone(),
            output_dir: ctx.output_dir.clone(),
        };
        let worker = DownloadWorker::new(
            config,
            ctx.metadata_client.clone(),
            ctx.stream_client.clone(),
            ctx.encoder.clone(),
            ctx.file_sink.clone(),
            ctx.events_tx.clone(),
            control_rx,
        );

        let _ = ctx
            .events_tx
            .send(SchedulerMessage::scheduler(SchedulerMessageType::Online, Some(item.clone())));

        let run_fut = worker.run();
        tokio::pin!(run_fut);
        let code = tokio::select! {
            code = &mut run_fut => code,
            () = ctx.cancel.cancelled() => {
                let _ = control_tx.send(ControlMessage::Kill.encode()).await;
                run_fut.await
            }
        };

        if code == 0 {
            return SchedulerResult::success(item.clone());
        }

        if ctx.cancel.is_cancelled() {
            return SchedulerResult::failure(item.clone(), "cancelled");
        }

        let left = match ctx.retry_state.get_mut(&item.id) {
            Some(mut entry) if entry.left > 0 => {
                let left = entry.left;
                entry.left -= 1;
                Some(left)
            }
            _ => None,
        };

        match left {
            Some(left) => {
                let _ = ctx.events_tx.send(SchedulerMessage::scheduler_with_details(
                    SchedulerMessageType::Retry,
                    Some(item.clone()),
                    MessageDetails::Retry { left },
                ));
            }
            None => {
                return SchedulerResult::failure(item.clone(), YtdlError::RetryExhausted(item.id.clone()).to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::mock::{FakeMetadataClient, FakePlaylistClient, FakeStreamClient, ScriptedAttempt};
    use crate::client::{ResponseInfo, StreamEvent};
    use crate::domain::{Author, DownloadOptions, VideoDetails, VideoInfo};
    use crate::events::NoopEventEmitter;
    use crate::runtime::TokioSpawner;
    use crate::sink::mock::FakeFileSink;
    use bytes::Bytes;
    use std::collections::HashMap;

    fn item(id: &str, index: usize) -> PlaylistItem {
        PlaylistItem {
            id: id.to_string(),
            title: format!("title-{id}"),
            url: format!("https://example.invalid/{id}"),
            author: Author { name: "author".to_string(), channel_id: "UC1".to_string() },
            index,
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

    fn format() -> crate::domain::VideoFormat {
        crate::domain::VideoFormat {
            itag: 18,
            container: "mp4".to_string(),
            quality_label: Some("360p".to_string()),
            codecs: "avc1, mp4a".to_string(),
            bitrate: Some(500_000),
            audio_bitrate: Some(128_000),
            content_length: Some(5),
            is_live: false,
            is_hls: false,
            is_dash_mpd: false,
            url: None,
        }
    }

    fn succeed_events(video_id: &str) -> ScriptedAttempt {
        ScriptedAttempt::Succeed(vec![
            StreamEvent::Info { info: info(video_id), format: format() },
            StreamEvent::Response(ResponseInfo { headers: HashMap::new() }),
            StreamEvent::Data(Bytes::from_static(b"hello")),
        ])
    }

    fn scheduler_with(
        items: Vec<PlaylistItem>,
        metadata: Arc<FakeMetadataClient>,
        stream: Arc<FakeStreamClient>,
        retries: u32,
        maxconnections: usize,
    ) -> Scheduler {
        scheduler_with_emitter(items, metadata, stream, retries, maxconnections, Arc::new(NoopEventEmitter))
    }

    fn scheduler_with_emitter(
        items: Vec<PlaylistItem>,
        metadata: Arc<FakeMetadataClient>,
        stream: Arc<FakeStreamClient>,
        retries: u32,
        maxconnections: usize,
        emitter: Arc<dyn EventEmitter>,
    ) -> Scheduler {
        for it in &items {
            metadata.set(it.url.clone(), info(&it.id));
        }
        let deps = SchedulerDeps {
            playlist_client: Arc::new(FakePlaylistClient::new(items)),
            metadata_client: metadata,
            stream_client: stream,
            encoder: None,
            file_sink: Arc::new(FakeFileSink::new()),
            spawner: Arc::new(TokioSpawner::current()),
            emitter,
        };
        let config = SchedulerConfig {
            playlist_id: "PL1".to_string(),
            output: "{videoDetails.videoId}".to_string(),
            maxconnections,
            retries,
            timeout_ms: 200,
            download_options: DownloadOptions::default(),
            encoder_options: None,
            flags: HashMap::new(),
        };
        Scheduler::new(config, PathBuf::from("/out"), deps)
    }

    /// Records every emitted message's `{type, left}` pair, in emission order,
    /// for asserting the retry ladder's reported `left` values.
    #[derive(Default)]
    struct RecordingEventEmitter {
        retries: parking_lot::Mutex<Vec<u32>>,
    }

    impl EventEmitter for RecordingEventEmitter {
        fn emit(&self, message: SchedulerMessage) {
            if let (SchedulerMessageType::Retry, Some(MessageDetails::Retry { left })) =
                (message.message_type, &message.details)
            {
                self.retries.lock().push(*left);
            }
        }
    }

    #[tokio::test]
    async fn every_item_downloads_successfully_with_no_retries_needed() {
        let items = vec![item("A", 0), item("B", 1)];
        let stream = Arc::new(FakeStreamClient::new());
        stream.script("A", vec![succeed_events("A")]);
        stream.script("B", vec![succeed_events("B")]);

        let scheduler = scheduler_with(items, Arc::new(FakeMetadataClient::new()), stream, 3, 2);
        let results = scheduler.download().await.unwrap();

        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.code == 0));
    }

    #[tokio::test]
    async fn item_that_fails_then_succeeds_is_retried_to_completion() {
        let items = vec![item("A", 0)];
        let stream = Arc::new(FakeStreamClient::new());
        stream.script(
            "A",
            vec![
                ScriptedAttempt::Fail(YtdlError::Stream("first attempt reset".to_string())),
                ScriptedAttempt::Fail(YtdlError::Stream("second attempt reset".to_string())),
                succeed_events("A"),
            ],
        );

        let scheduler = scheduler_with(items, Arc::new(FakeMetadataClient::new()), stream, 3, 1);
        let results = scheduler.download().await.unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].code, 0);
    }

    #[tokio::test]
    async fn retry_events_report_left_before_decrementing_per_spec_scenario_2() {
        // Scenario 2: retries=5, two failing attempts then success. The two
        // `retry` events must carry `left` 5 then 4 (the count *before* each
        // decrement), not 4 then 3.
        let items = vec![item("A", 0)];
        let stream = Arc::new(FakeStreamClient::new());
        stream.script(
            "A",
            vec![
                ScriptedAttempt::Fail(YtdlError::Stream("first attempt reset".to_string())),
                ScriptedAttempt::Fail(YtdlError::Stream("second attempt reset".to_string())),
                succeed_events("A"),
            ],
        );

        let emitter = Arc::new(RecordingEventEmitter::default());
        let scheduler =
            scheduler_with_emitter(items, Arc::new(FakeMetadataClient::new()), stream, 5, 1, emitter.clone());
        let results = scheduler.download().await.unwrap();

        assert_eq!(results[0].code, 0);
        assert_eq!(*emitter.retries.lock(), vec![5, 4]);
    }

    #[tokio::test]
    async fn item_that_always_fails_reports_retry_exhausted_after_ladder_runs_out() {
        let items = vec![item("A", 0)];
        let stream = Arc::new(FakeStreamClient::new());
        stream.script(
            "A",
            vec![
                ScriptedAttempt::Fail(YtdlError::Stream("x".to_string())),
                ScriptedAttempt::Fail(YtdlError::Stream("x".to_string())),
            ],
        );

        let scheduler = scheduler_with(items, Arc::new(FakeMetadataClient::new()), stream, 1, 1);
        let results = scheduler.download().await.unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].code, 1);
        assert!(results[0].error.as_ref().unwrap().contains("Retries exhausted"));
    }

    #[tokio::test]
    async fn retry_events_report_left_per_spec_scenario_3_before_exhaustion() {
        // Scenario 3: retries=2, every attempt fails. Two `retry` events must
        // carry `left` 2 then 1; no third retry event follows.
        let items = vec![item("A", 0)];
        let stream = Arc::new(FakeStreamClient::new());
        stream.script(
            "A",
            vec![
                ScriptedAttempt::Fail(YtdlError::Stream("x".to_string())),
                ScriptedAttempt::Fail(YtdlError::Stream("x".to_string())),
            ],
        );

        let emitter = Arc::new(RecordingEventEmitter::default());
        let scheduler =
            scheduler_with_emitter(items, Arc::new(FakeMetadataClient::new()), stream, 2, 1, emitter.clone());
        let results = scheduler.download().await.unwrap();

        assert_eq!(results[0].code, 1);
        assert_eq!(*emitter.retries.lock(), vec![2, 1]);
    }

    #[tokio::test]
    async fn empty_playlist_returns_no_results() {
        let scheduler = scheduler_with(
            Vec::new(),
            Arc::new(FakeMetadataClient::new()),
            Arc::new(FakeStreamClient::new()),
            0,
            1,
        );
        let results = scheduler.download().await.unwrap();
        assert!(results.is_empty());
    }
}
