//! Inactivity watchdog over a byte-producing stream.
//!
//! [`TimeoutStream`] tees a byte stream: every item it forwards resets an
//! idle timer, and if the timer fires before the upstream ends the wrapper
//! stops forwarding and reports a [`TimeoutStreamEvent::Timeout`] on its
//! companion channel.

use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use bytes::Bytes;
use futures::Stream;
use tokio::sync::mpsc;

use crate::error::YtdlResult;

/// Default inactivity timeout when a caller does not specify one.
pub const DEFAULT_TIMEOUT_MS: u64 = 5_000;

/// Out-of-band signal raised by a [`TimeoutStream`], alongside the data it
/// forwards unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutStreamEvent {
    /// The idle timer fired before the upstream produced another item or ended.
    Timeout,
    /// The upstream ended without the idle timer firing.
    End,
}

/// Wraps a byte stream with an idle timer, forwarding every item unchanged
/// and resetting the timer on each one.
pub struct TimeoutStream<S> {
    inner: S,
    timeout: Duration,
    sleep: Pin<Box<tokio::time::Sleep>>,
    attached_at: Option<Instant>,
    fired: bool,
    ended: bool,
    events: mpsc::UnboundedSender<TimeoutStreamEvent>,
}

impl<S> TimeoutStream<S>
where
    S: Stream<Item = YtdlResult<Bytes>> + Unpin,
{
    /// Builds a new watchdog over `inner`. The timer is armed on first poll,
    /// not at construction.
    pub fn new(inner: S, timeout: Duration, events: mpsc::UnboundedSender<TimeoutStreamEvent>) -> Self {
        Self {
            inner,
            timeout,
            sleep: Box::pin(tokio::time::sleep(timeout)),
            attached_at: None,
            fired: false,
            ended: false,
            events,
        }
    }

    /// Builds a new watchdog using [`DEFAULT_TIMEOUT_MS`], for callers that
    /// have no timeout of their own to pass down (the worker always has one
    /// and calls [`Self::new`] directly).
    pub fn with_default_timeout(inner: S, events: mpsc::UnboundedSender<TimeoutStreamEvent>) -> Self {
        Self::new(inner, Duration::from_millis(DEFAULT_TIMEOUT_MS), events)
    }

    /// (Re-)attaches to the upstream, recording the current time as the base
    /// for [`Self::elapsed`] and arming the idle timer. Idempotent: calling
    /// this a second time replaces the base time.
    pub fn attach(&mut self) {
        self.attached_at = Some(Instant::now());
        self.sleep.as_mut().reset(tokio::time::Instant::now() + self.timeout);
    }

    /// Seconds (truncated) since the first attachment, or 0 if never attached.
    #[must_use]
    pub fn elapsed(&self) -> u64 {
        self.attached_at.map_or(0, |t| t.elapsed().as_secs())
    }
}

impl<S> Stream for TimeoutStream<S>
where
    S: Stream<Item = YtdlResult<Bytes>> + Unpin,
{
    type Item = YtdlResult<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.attached_at.is_none() {
            self.attach();
        }
        if self.fired || self.ended {
            return Poll::Ready(None);
        }

        match Pin::new(&mut self.inner).poll_next(cx) {
            Poll::Ready(Some(item)) => {
                let timeout = self.timeout;
                self.sleep.as_mut().reset(tokio::time::Instant::now() + timeout);
                return Poll::Ready(Some(item));
            }
            Poll::Ready(None) => {
                self.ended = true;
                let _ = self.events.send(TimeoutStreamEvent::End);
                return Poll::Ready(None);
            }
            Poll::Pending => {}
        }

        match self.sleep.as_mut().poll(cx) {
            Poll::Ready(()) => {
                self.fired = true;
                let _ = self.events.send(TimeoutStreamEvent::Timeout);
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use tokio::sync::mpsc::unbounded_channel;

    fn chunk(n: u8) -> YtdlResult<Bytes> {
        Ok(Bytes::from(vec![n]))
    }

    #[tokio::test]
    async fn elapsed_is_zero_before_first_poll() {
        let (tx, _rx) = unbounded_channel();
        let s = TimeoutStream::new(stream::iter(vec![chunk(1)]), Duration::from_millis(50), tx);
        assert_eq!(s.elapsed(), 0);
    }

    #[tokio::test]
    async fn with_default_timeout_applies_default_timeout_ms() {
        let (tx, _rx) = unbounded_channel();
        let s = TimeoutStream::with_default_timeout(stream::iter(vec![chunk(1)]), tx);
        assert_eq!(s.timeout, Duration::from_millis(DEFAULT_TIMEOUT_MS));
    }

    #[tokio::test]
    async fn forwards_items_and_emits_end_on_upstream_completion() {
        let (tx, mut rx) = unbounded_channel();
        let mut s = TimeoutStream::new(
            stream::iter(vec![chunk(1), chunk(2)]),
            Duration::from_millis(200),
            tx,
        );

        let mut collected = Vec::new();
        use futures::StreamExt;
        while let Some(item) = s.next().await {
            collected.push(item.unwrap());
        }
        assert_eq!(collected, vec![Bytes::from(vec![1]), Bytes::from(vec![2])]);
        assert_eq!(rx.recv().await, Some(TimeoutStreamEvent::End));
    }

    #[tokio::test(start_paused = true)]
    async fn fires_timeout_once_when_upstream_stalls() {
        let (tx, mut rx) = unbounded_channel();
        let pending = stream::pending::<YtdlResult<Bytes>>();
        let mut s = TimeoutStream::new(pending, Duration::from_millis(50), tx);

        use futures::StreamExt;
        let item = s.next().await;
        assert!(item.is_none());
        assert_eq!(rx.recv().await, Some(TimeoutStreamEvent::Timeout));
        assert!(s.next().await.is_none(), "single-shot: stream stays exhausted");
    }

    #[tokio::test]
    async fn reattaching_replaces_base_time() {
        let (tx, _rx) = unbounded_channel();
        let mut s = TimeoutStream::new(stream::iter(vec![chunk(1)]), Duration::from_millis(50), tx);
        s.attach();
        let first = s.attached_at;
        tokio::time::sleep(Duration::from_millis(5)).await;
        s.attach();
        assert_ne!(first, s.attached_at);
    }
}
