//! Event system for streaming worker/scheduler activity back to a controller.
//!
//! This module provides:
//! - [`SchedulerMessage`], the tagged-union event every worker and the
//!   Scheduler itself emit.
//! - [`EventEmitter`] trait for domain code to emit messages without knowing
//!   the transport (terminal renderer, `--json` collector, tests).
//!
//! The real transport (stdout rendering, a `--json` summary) lives in
//! `apps/cli`.

mod emitter;

pub use emitter::{EventEmitter, LoggingEventEmitter, NoopEventEmitter};

use serde::Serialize;

use crate::domain::PlaylistItem;
use crate::error::YtdlError;

/// The `type` tag of a [`SchedulerMessage`].
///
/// Matches the known message types in the data model:
/// `playlistItems`, `videoInfo`, `info`, `contentLength`, `progress`,
/// `elapsed`, `end`, `timeout`, `retry`, `online`, `exit`,
/// `workerTerminated`, `error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SchedulerMessageType {
    PlaylistItems,
    VideoInfo,
    Info,
    ContentLength,
    Progress,
    Elapsed,
    End,
    Timeout,
    Retry,
    Online,
    Exit,
    WorkerTerminated,
    Error,
}

/// The `details` payload carried by some [`SchedulerMessage`] variants.
///
/// Each variant corresponds 1:1 to the `details` shape documented for its
/// message type.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum MessageDetails {
    PlaylistItems { playlist_items: Vec<PlaylistItem> },
    ContentLength { content_length: u64 },
    Progress {
        transferred: u64,
        eta: Option<f64>,
        percentage: f64,
        speed: f64,
    },
    Elapsed { elapsed_seconds: u64 },
    Retry { left: u32 },
    ExitCode { code: i32 },
}

/// One event observed by the Scheduler's subscribers: `{ type, source,
/// details?, error? }`.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerMessage {
    #[serde(rename = "type")]
    pub message_type: SchedulerMessageType,
    pub source: Option<PlaylistItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<MessageDetails>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<YtdlError>,
}

impl SchedulerMessage {
    /// Builds a worker-sourced message (every type except `playlistItems`
    /// carries a `source` item in practice).
    pub fn worker(
        message_type: SchedulerMessageType,
        source: PlaylistItem,
        details: Option<MessageDetails>,
    ) -> Self {
        Self {
            message_type,
            source: Some(source),
            details,
            error: None,
        }
    }

    /// Builds a worker-sourced error/timeout message.
    pub fn worker_error(message_type: SchedulerMessageType, source: PlaylistItem, error: YtdlError) -> Self {
        Self {
            message_type,
            source: Some(source),
            details: None,
            error: Some(error),
        }
    }

    /// Builds a Scheduler-level message with no per-item source (e.g.
    /// `playlistItems`), or with an optional source (`online`, `retry`,
    /// `workerTerminated`).
    pub fn scheduler(message_type: SchedulerMessageType, source: Option<PlaylistItem>) -> Self {
        Self {
            message_type,
            source,
            details: None,
            error: None,
        }
    }

    /// Builds a Scheduler-level message carrying `details`.
    pub fn scheduler_with_details(
        message_type: SchedulerMessageType,
        source: Option<PlaylistItem>,
        details: MessageDetails,
    ) -> Self {
        Self {
            message_type,
            source,
            details: Some(details),
            error: None,
        }
    }
}
