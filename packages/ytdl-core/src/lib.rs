//! ytdl-core - the playlist download core.
//!
//! This crate provides the bounded-concurrency scheduler and per-item
//! download worker that drive a YouTube playlist download, independent of
//! the CLI surface, the terminal renderer, and the real YouTube metadata
//! client.
//!
//! # Architecture
//!
//! - [`domain`]: the data model (`PlaylistItem`, `DownloadOptions`,
//!   `EncodeOptions`, `VideoInfo`, `VideoFormat`, `SchedulerConfig`,
//!   `SchedulerResult`).
//! - [`scheduler`]: bounded-concurrency dispatch over a playlist, retry
//!   ladder, event fan-in, cancellation.
//! - [`worker`]: one item's download lifecycle, from metadata fetch to a
//!   terminal event.
//! - [`timeout_stream`]: the inactivity watchdog wrapped around a worker's
//!   byte stream.
//! - [`encoder`]: the transcoding pipeline contract and its `ffmpeg`-backed
//!   implementation.
//! - [`client`]: the metadata/stream/playlist client contracts the worker
//!   and Scheduler consume, plus a `reqwest`-backed production adapter and
//!   scripted test doubles.
//! - [`sink`]: the output-file abstraction.
//! - [`template`]: output filename templating and sanitization.
//! - [`events`]: the tagged-union event system streamed back to a
//!   controller.
//! - [`error`]: the error taxonomy shared by every module.
//! - [`runtime`]: task-spawning abstraction for runtime independence.
//!
//! # Abstraction Traits
//!
//! The crate defines traits at every external seam so the core can be
//! exercised without real network access:
//!
//! - [`runtime::TaskSpawner`]: spawning worker-pool tasks.
//! - [`events::EventEmitter`]: emitting `SchedulerMessage`s.
//! - [`client::MetadataClient`] / [`client::StreamClient`] /
//!   [`client::PlaylistClient`]: the YouTube-facing collaborators.
//! - [`encoder::Encoder`]: the transcoder collaborator.
//! - [`sink::FileSink`]: output file creation/removal.

#![warn(clippy::all)]

pub mod client;
pub mod domain;
pub mod encoder;
pub mod error;
pub mod events;
pub mod runtime;
pub mod scheduler;
pub mod sink;
pub mod template;
pub mod timeout_stream;
pub mod worker;

pub use domain::{
    Author, ByteRange, DownloadOptions, EncodeOptions, FilterKind, PlaylistItem, Quality,
    RetryState, SchedulerConfig, SchedulerResult, VideoDetails, VideoFormat, VideoInfo,
};
pub use client::http::YoutubeHttpClient;
pub use client::{MetadataClient, PlaylistClient, StreamClient};
pub use encoder::{Encoder, ProcessEncoderAdapter};
pub use error::{ErrorCode, YtdlError, YtdlResult};
pub use events::{
    EventEmitter, LoggingEventEmitter, MessageDetails, NoopEventEmitter, SchedulerMessage, SchedulerMessageType,
};
pub use runtime::{TaskSpawner, TokioSpawner};
pub use scheduler::{Scheduler, SchedulerDeps};
pub use sink::{FileSink, TokioFileSink};
pub use worker::{ControlMessage, DownloadWorker, DownloadWorkerConfig};
