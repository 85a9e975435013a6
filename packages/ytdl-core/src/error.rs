//! Centralized error types for the playlist download core.
//!
//! This module provides a unified error handling system that:
//! - Defines structured error kinds using `thiserror`
//! - Classifies each kind as transient (retryable) or terminal
//! - Maps each kind to a machine-readable code for `--json` output

use serde::Serialize;
use thiserror::Error;

/// Trait for error types that provide machine-readable error codes.
///
/// Implement this trait to provide consistent error codes across different
/// error conversion paths.
pub trait ErrorCode {
    /// Returns a machine-readable error code for CLI/JSON output.
    fn code(&self) -> &'static str;
}

/// Application-wide error type for the playlist download core.
///
/// Variants mirror the taxonomy of kinds (not Rust types): `ConfigError`,
/// `MetadataError`, `StreamError`, `TimeoutError`, `EncoderError`,
/// `CancelledError`, `RetryExhaustedError`.
#[derive(Debug, Error, Clone, Serialize)]
#[serde(tag = "type", content = "details")]
pub enum YtdlError {
    /// Invalid flag shape, invalid encode options, invalid playlist url.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Info fetch failure, missing format, unresolvable playlist.
    #[error("Metadata error: {0}")]
    Metadata(String),

    /// Byte stream error signal from the metadata/stream client.
    #[error("Stream error: {0}")]
    Stream(String),

    /// Inactivity timeout fired on a worker's byte stream.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Transcoder command error, or unsupported output format/codec.
    #[error("Encoder error: {0}")]
    Encoder(String),

    /// A `kill` control message was received.
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// All configured retry attempts were consumed without success.
    #[error("Retries exhausted: {0}")]
    RetryExhausted(String),
}

impl ErrorCode for YtdlError {
    fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => "config_error",
            Self::Metadata(_) => "metadata_error",
            Self::Stream(_) => "stream_error",
            Self::Timeout(_) => "timeout_error",
            Self::Encoder(_) => "encoder_error",
            Self::Cancelled(_) => "cancelled_error",
            Self::RetryExhausted(_) => "retry_exhausted_error",
        }
    }
}

impl YtdlError {
    /// Returns the short kind name used in outbound worker events
    /// (`{type: kind, source: item, error}` per the worker's failure path).
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "timeout",
            _ => "error",
        }
    }

    /// Whether the Scheduler should retry a worker that failed with this error.
    ///
    /// `RetryExhausted` is a terminal classification produced by the
    /// Scheduler itself once the retry ladder is spent, so it is never fed
    /// back into the ladder. Every other kind is transient from the
    /// Scheduler's point of view; `Config`/`Metadata` failures at playlist
    /// resolution time never reach a worker (they abort `download()`
    /// directly), so in practice only `Stream`, `Timeout`, `Encoder`, and
    /// `Cancelled` worker failures are retried.
    #[must_use]
    pub fn transient(&self) -> bool {
        !matches!(self, Self::RetryExhausted(_))
    }
}

/// Convenient Result alias for core operations.
pub type YtdlResult<T> = Result<T, YtdlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_error_reports_timeout_kind_and_code() {
        let err = YtdlError::Timeout("no bytes for 120000ms".into());
        assert_eq!(err.kind(), "timeout");
        assert_eq!(err.code(), "timeout_error");
        assert!(err.transient());
    }

    #[test]
    fn stream_and_encoder_errors_report_error_kind() {
        assert_eq!(YtdlError::Stream("boom".into()).kind(), "error");
        assert_eq!(YtdlError::Encoder("boom".into()).kind(), "error");
    }

    #[test]
    fn retry_exhausted_is_not_transient() {
        let err = YtdlError::RetryExhausted("retries exhausted".into());
        assert!(!err.transient());
        assert_eq!(err.code(), "retry_exhausted_error");
    }
}
