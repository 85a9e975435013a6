//! ytdl - command-line YouTube video/playlist downloader.
//!
//! This binary is a thin shell around [`ytdl_core`]: argument parsing,
//! config loading, logging setup, and process exit-code mapping. The
//! bounded-concurrency scheduler and per-item download worker live in the
//! library; this binary only wires real collaborators — an HTTP-backed
//! YouTube client, an `ffmpeg`-backed encoder, and a filesystem sink — to
//! them, and renders the resulting events/results to the terminal.

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;
use ytdl_core::{
    Author, ByteRange, ControlMessage, DownloadOptions, DownloadWorker, DownloadWorkerConfig, EncodeOptions,
    Encoder, ErrorCode, EventEmitter, FilterKind, MessageDetails, NoopEventEmitter, PlaylistClient, PlaylistItem,
    ProcessEncoderAdapter, Quality, Scheduler, SchedulerConfig, SchedulerDeps, SchedulerMessage, SchedulerMessageType,
    SchedulerResult, TaskSpawner, TokioFileSink, TokioSpawner, YoutubeHttpClient, YtdlError,
};

use crate::config::CliConfig;

/// ytdl - download YouTube videos and playlists, with optional transcoding.
#[derive(Parser, Debug)]
#[command(name = "ytdl")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Path to the configuration file (YAML).
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "YTDL_LOG_LEVEL", global = true)]
    log_level: log::LevelFilter,

    /// Emit a single JSON summary on stdout instead of human-readable output.
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Download a single video.
    Download(DownloadArgs),
    /// Download every item in a playlist with bounded concurrency.
    #[command(name = "download-playlist")]
    DownloadPlaylist(DownloadPlaylistArgs),
    /// Search YouTube for videos.
    Search(SearchArgs),
}

/// Format-selection flags shared by `download` and `download-playlist`.
#[derive(Args, Debug, Clone)]
struct FormatFlags {
    /// Preferred quality: a single token, or a comma-separated ordered list
    /// of fallbacks (e.g. `1080p,720p,highest`).
    #[arg(long)]
    quality: Option<String>,

    /// Inclusive byte range, `START-END`. Either side may be omitted.
    #[arg(long)]
    range: Option<String>,

    /// Mutually exclusive basic stream-type filter.
    #[arg(long, value_enum)]
    filter: Option<CliFilterKind>,

    #[arg(long = "filter-container")]
    filter_container: Option<String>,
    #[arg(long = "unfilter-container")]
    unfilter_container: Option<String>,
    #[arg(long = "filter-resolution")]
    filter_resolution: Option<String>,
    #[arg(long = "unfilter-resolution")]
    unfilter_resolution: Option<String>,
    #[arg(long = "filter-codecs")]
    filter_codecs: Option<String>,
    #[arg(long = "unfilter-codecs")]
    unfilter_codecs: Option<String>,

    /// Opaque passthrough, not consumed by the core; carried through on
    /// `DownloadOptions::flags`.
    #[arg(long)]
    begin: Option<String>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
#[clap(rename_all = "kebab-case")]
enum CliFilterKind {
    Video,
    VideoOnly,
    Audio,
    AudioOnly,
    VideoAndAudio,
}

impl From<CliFilterKind> for FilterKind {
    fn from(value: CliFilterKind) -> Self {
        match value {
            CliFilterKind::Video => FilterKind::Video,
            CliFilterKind::VideoOnly => FilterKind::VideoOnly,
            CliFilterKind::Audio => FilterKind::Audio,
            CliFilterKind::AudioOnly => FilterKind::AudioOnly,
            CliFilterKind::VideoAndAudio => FilterKind::VideoAndAudio,
        }
    }
}

/// Transcode flags, present on both download commands; omitting `--format`
/// means "write source bytes verbatim".
#[derive(Args, Debug, Clone)]
struct EncodeFlags {
    /// Output container; presence of this flag is what turns on transcoding.
    #[arg(long = "encode-format")]
    format: Option<String>,
    #[arg(long = "audio-codec")]
    audio_codec: Option<String>,
    #[arg(long = "video-codec")]
    video_codec: Option<String>,
    #[arg(long = "audio-bitrate")]
    audio_bitrate: Option<String>,
    #[arg(long = "video-bitrate")]
    video_bitrate: Option<String>,
}

#[derive(Args, Debug)]
struct DownloadArgs {
    /// The video's URL.
    #[arg(long)]
    url: String,

    #[command(flatten)]
    format: FormatFlags,
    #[command(flatten)]
    encode: EncodeFlags,

    /// Print the resolved direct media URL instead of downloading.
    #[arg(long)]
    urlonly: bool,

    /// Output filename template.
    #[arg(long)]
    output: Option<String>,
}

#[derive(Args, Debug)]
struct DownloadPlaylistArgs {
    /// The playlist's URL or id.
    #[arg(long)]
    url: String,

    #[command(flatten)]
    format: FormatFlags,
    #[command(flatten)]
    encode: EncodeFlags,

    /// Maximum concurrent downloads.
    #[arg(long)]
    maxconnections: Option<usize>,
    /// Retry budget per item.
    #[arg(long)]
    retries: Option<u32>,
    /// Inactivity timeout, in milliseconds.
    #[arg(long)]
    timeout: Option<u64>,
    /// Output filename template.
    #[arg(long)]
    output: Option<String>,
}

#[derive(Args, Debug)]
struct SearchArgs {
    #[arg(long)]
    query: String,
    /// Maximum number of results. Omit for the effectively unbounded default.
    #[arg(long)]
    limit: Option<u64>,
    #[arg(long = "safe-search")]
    safe_search: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(cli.log_level)
        .format_timestamp_millis()
        .init();

    let config = CliConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;

    let code = match &cli.command {
        Command::Download(args) => run_download(args, &config, cli.json).await,
        Command::DownloadPlaylist(args) => run_download_playlist(args, &config, cli.json).await,
        Command::Search(args) => run_search(args, cli.json).await,
    };

    std::process::exit(code);
}

fn parse_quality(raw: &str) -> Quality {
    let tokens: Vec<String> = raw.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect();
    match tokens.len() {
        0 | 1 => Quality::Single(raw.trim().to_string()),
        _ => Quality::Preferences(tokens),
    }
}

fn parse_range(raw: &str) -> ByteRange {
    match raw.split_once('-') {
        Some((start, end)) => ByteRange {
            start: start.trim().parse().ok(),
            end: end.trim().parse().ok(),
        },
        None => ByteRange { start: raw.trim().parse().ok(), end: None },
    }
}

fn build_download_options(flags: &FormatFlags) -> DownloadOptions {
    let mut opts = DownloadOptions {
        quality: flags.quality.as_deref().map(parse_quality),
        range: flags.range.as_deref().map(parse_range),
        filter: flags.filter.map(Into::into),
        filter_container: flags.filter_container.clone(),
        unfilter_container: flags.unfilter_container.clone(),
        filter_resolution: flags.filter_resolution.clone(),
        unfilter_resolution: flags.unfilter_resolution.clone(),
        filter_codecs: flags.filter_codecs.clone(),
        unfilter_codecs: flags.unfilter_codecs.clone(),
        flags: Default::default(),
    };
    if let Some(begin) = &flags.begin {
        opts.flags.insert("begin".to_string(), begin.clone());
    }
    opts
}

fn build_encode_options(flags: &EncodeFlags) -> Option<EncodeOptions> {
    let format = flags.format.clone()?;
    Some(EncodeOptions {
        format,
        audio_codec: flags.audio_codec.clone(),
        video_codec: flags.video_codec.clone(),
        audio_bitrate: flags.audio_bitrate.clone(),
        video_bitrate: flags.video_bitrate.clone(),
    })
}

/// Prints a human-readable line per event; swapped out for [`NoopEventEmitter`]
/// under `--json`, where only the final summary goes to stdout.
struct TerminalEmitter;

impl EventEmitter for TerminalEmitter {
    fn emit(&self, message: SchedulerMessage) {
        let title = message.source.as_ref().map(|s| s.title.as_str()).unwrap_or("playlist");
        match (message.message_type, &message.details) {
            (SchedulerMessageType::PlaylistItems, Some(MessageDetails::PlaylistItems { playlist_items })) => {
                println!("resolved {} item(s)", playlist_items.len());
            }
            (SchedulerMessageType::VideoInfo, _) => println!("{title}: fetched video info"),
            (SchedulerMessageType::Info, _) => println!("{title}: format selected"),
            (SchedulerMessageType::ContentLength, Some(MessageDetails::ContentLength { content_length })) => {
                println!("{title}: size {content_length} bytes");
            }
            (SchedulerMessageType::Progress, Some(MessageDetails::Progress { percentage, speed, .. })) => {
                println!("{title}: {percentage:.1}% ({speed:.0} B/s)");
            }
            (SchedulerMessageType::End, _) => println!("{title}: done"),
            (SchedulerMessageType::Retry, Some(MessageDetails::Retry { left })) => {
                println!("{title}: retrying ({left} attempt(s) left)");
            }
            (SchedulerMessageType::Timeout, _) => println!("{title}: timed out"),
            (SchedulerMessageType::Error, _) => {
                if let Some(err) = &message.error {
                    eprintln!("ERROR {title}: {err}");
                }
            }
            _ => {}
        }
    }
}

/// Wraps another [`EventEmitter`], additionally recording the last error
/// event's error for the final `--json` summary, since [`DownloadWorker::run`]
/// itself only returns an exit code.
struct CapturingEmitter {
    inner: Arc<dyn EventEmitter>,
    last_error: Arc<Mutex<Option<YtdlError>>>,
}

impl EventEmitter for CapturingEmitter {
    fn emit(&self, message: SchedulerMessage) {
        if let Some(err) = &message.error {
            *self.last_error.lock() = Some(err.clone());
        }
        self.inner.emit(message);
    }
}

fn terminal_or_noop(json: bool) -> Arc<dyn EventEmitter> {
    if json {
        Arc::new(NoopEventEmitter)
    } else {
        Arc::new(TerminalEmitter)
    }
}

#[derive(Serialize)]
struct JsonError {
    status: i32,
    message: String,
    name: String,
    stack: String,
}

impl JsonError {
    fn new(err: &YtdlError) -> Self {
        Self {
            status: 1,
            message: err.to_string(),
            name: err.code().to_string(),
            stack: format!("{err:?}"),
        }
    }
}

fn print_error(json: bool, command_id: &str, err: &YtdlError) -> i32 {
    if json {
        println!("{}", serde_json::to_string(&JsonError::new(err)).expect("JsonError always serializes"));
    } else {
        eprintln!("ERROR {command_id}: {err}");
    }
    1
}

async fn run_download(args: &DownloadArgs, cfg: &CliConfig, json: bool) -> i32 {
    let client = Arc::new(YoutubeHttpClient::default());
    let metadata_client: Arc<dyn ytdl_core::MetadataClient> = client.clone();
    let stream_client: Arc<dyn ytdl_core::StreamClient> = client.clone();

    if args.urlonly {
        return match metadata_client.get_info(&args.url).await {
            Ok(info) => {
                println!("{}", info.video_details.video_id);
                0
            }
            Err(err) => print_error(json, "download", &err),
        };
    }

    let download_options = build_download_options(&args.format);
    let encode_options = build_encode_options(&args.encode);
    let output = args.output.clone().unwrap_or_else(|| cfg.output.clone());

    let encoder: Option<Arc<dyn Encoder>> =
        encode_options.is_some().then(|| Arc::new(ProcessEncoderAdapter::new()) as Arc<dyn Encoder>);
    let file_sink: Arc<dyn ytdl_core::FileSink> = Arc::new(TokioFileSink);

    let item = PlaylistItem {
        id: args.url.clone(),
        title: args.url.clone(),
        url: args.url.clone(),
        author: Author { name: String::new(), channel_id: String::new() },
        index: 0,
    };

    let worker_config = DownloadWorkerConfig {
        item,
        output,
        timeout: std::time::Duration::from_millis(cfg.timeout_ms),
        download_options,
        encoder_options: encode_options,
        output_dir: cfg.output_dir.clone(),
    };

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let last_error = Arc::new(Mutex::new(None));
    let emitter = Arc::new(CapturingEmitter { inner: terminal_or_noop(json), last_error: last_error.clone() });
    let drain = tokio::spawn(async move {
        let mut rx = events_rx;
        while let Some(msg) = rx.recv().await {
            emitter.emit(msg);
        }
    });

    let (control_tx, control_rx) = mpsc::channel(4);
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = control_tx.send(ControlMessage::Kill.encode()).await;
        }
    });

    let worker = DownloadWorker::new(worker_config, metadata_client, stream_client, encoder, file_sink, events_tx, control_rx);
    let code = worker.run().await;
    ctrl_c.abort();
    let _ = drain.await;

    if code == 0 {
        if json {
            println!("{}", serde_json::json!({"status": 0}));
        }
        0
    } else {
        let err = last_error.lock().clone().unwrap_or_else(|| YtdlError::Stream("download failed".to_string()));
        print_error(json, "download", &err)
    }
}

async fn run_download_playlist(args: &DownloadPlaylistArgs, cfg: &CliConfig, json: bool) -> i32 {
    let client = Arc::new(YoutubeHttpClient::default());
    let playlist_client: Arc<dyn PlaylistClient> = client.clone();
    let metadata_client: Arc<dyn ytdl_core::MetadataClient> = client.clone();
    let stream_client: Arc<dyn ytdl_core::StreamClient> = client.clone();

    let playlist_id = match playlist_client.get_playlist_id(&args.url) {
        Ok(id) => id,
        Err(err) => return print_error(json, "download-playlist", &err),
    };

    let download_options = build_download_options(&args.format);
    let encode_options = build_encode_options(&args.encode);

    let encoder: Option<Arc<dyn Encoder>> =
        encode_options.is_some().then(|| Arc::new(ProcessEncoderAdapter::new()) as Arc<dyn Encoder>);
    let file_sink: Arc<dyn ytdl_core::FileSink> = Arc::new(TokioFileSink);
    let spawner: Arc<dyn TaskSpawner> = Arc::new(TokioSpawner::current());
    let emitter = terminal_or_noop(json);

    let config = SchedulerConfig {
        playlist_id,
        output: args.output.clone().unwrap_or_else(|| cfg.output.clone()),
        maxconnections: args.maxconnections.unwrap_or(cfg.maxconnections),
        retries: args.retries.unwrap_or(cfg.retries),
        timeout_ms: args.timeout.unwrap_or(cfg.timeout_ms),
        download_options,
        encoder_options: encode_options,
        flags: Default::default(),
    };

    let deps = SchedulerDeps { playlist_client, metadata_client, stream_client, encoder, file_sink, spawner, emitter };
    let scheduler = Scheduler::new(config, cfg.output_dir.clone(), deps);

    let download_fut = scheduler.download();
    tokio::pin!(download_fut);
    let result = loop {
        tokio::select! {
            res = &mut download_fut => break res,
            _ = tokio::signal::ctrl_c() => {
                log::info!("received interrupt, requesting graceful shutdown");
                scheduler.shutdown();
            }
        }
    };

    match result {
        Ok(results) => report_playlist_results(json, &results),
        Err(err) => print_error(json, "download-playlist", &err),
    }
}

#[derive(Serialize)]
struct JsonPlaylistSummary {
    status: i32,
    result: Vec<SchedulerResult>,
}

fn report_playlist_results(json: bool, results: &[SchedulerResult]) -> i32 {
    let exit_code = if results.iter().all(|r| r.code == 0) { 0 } else { 1 };
    if json {
        let summary = JsonPlaylistSummary { status: exit_code, result: results.to_vec() };
        println!("{}", serde_json::to_string(&summary).expect("JsonPlaylistSummary always serializes"));
    } else {
        for result in results {
            if result.code == 0 {
                println!("{}: ok", result.item.title);
            } else {
                eprintln!(
                    "ERROR {}: {}",
                    result.item.title,
                    result.error.as_deref().unwrap_or("unknown error")
                );
            }
        }
        println!("{}/{} succeeded", results.iter().filter(|r| r.code == 0).count(), results.len());
    }
    exit_code
}

async fn run_search(args: &SearchArgs, json: bool) -> i32 {
    let client = YoutubeHttpClient::default();
    let limit = args.limit.unwrap_or(100).min(10_000) as usize;

    match client.search(&args.query, limit, args.safe_search).await {
        Ok(items) => {
            if json {
                println!("{}", serde_json::json!({"status": 0, "result": items}));
            } else {
                for item in &items {
                    println!("{}\t{}", item.id, item.title);
                }
            }
            0
        }
        Err(err) => print_error(json, "search", &err),
    }
}
