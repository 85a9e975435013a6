//! Event emitter abstraction for decoupling the Scheduler from transport.
//!
//! Callers depend on the [`EventEmitter`] trait rather than a concrete
//! channel, enabling testing and alternative transports (terminal renderer,
//! JSON line output, a `--json` summary collector).

use super::SchedulerMessage;

/// Trait for emitting [`SchedulerMessage`]s without knowledge of transport.
///
/// # Example
///
/// ```ignore
/// struct MyRenderer {
///     emitter: Arc<dyn EventEmitter>,
/// }
///
/// impl MyRenderer {
///     fn on_message(&self, msg: SchedulerMessage) {
///         self.emitter.emit(msg);
///     }
/// }
/// ```
pub trait EventEmitter: Send + Sync {
    /// Emits one scheduler/worker message.
    fn emit(&self, message: SchedulerMessage);
}

/// No-op emitter for testing or headless use where events are not needed.
pub struct NoopEventEmitter;

impl EventEmitter for NoopEventEmitter {
    fn emit(&self, _message: SchedulerMessage) {}
}

/// Logging emitter for debugging and development.
///
/// Logs every message at debug level via the `log` crate.
pub struct LoggingEventEmitter;

impl EventEmitter for LoggingEventEmitter {
    fn emit(&self, message: SchedulerMessage) {
        log::debug!("{message:?}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::SchedulerMessageType;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingEventEmitter {
        count: AtomicUsize,
    }

    impl EventEmitter for CountingEventEmitter {
        fn emit(&self, _message: SchedulerMessage) {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn counting_emitter_tracks_messages() {
        let emitter = Arc::new(CountingEventEmitter {
            count: AtomicUsize::new(0),
        });

        emitter.emit(SchedulerMessage::scheduler(SchedulerMessageType::Online, None));
        emitter.emit(SchedulerMessage::scheduler(SchedulerMessageType::Exit, None));

        assert_eq!(emitter.count.load(Ordering::SeqCst), 2);
    }
}
