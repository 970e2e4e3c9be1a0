//! Ordered event stream (C5): the single-producer/single-consumer channel
//! that carries iteration, code-result, and completion events out of a
//! running `Rlm::completion` call to an SSE handler or any other consumer.
//!
//! Ported from `original_source/server/stream_logger.py`'s `StreamLogger`.

use crate::educational::Education;
use crate::types::{Event, ReplResult, RlmIteration, RlmMetadata};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;

/// Emits [`Event`]s onto an unbounded channel. Cheap to clone and share
/// across the worker thread that runs the completion loop.
#[derive(Clone)]
pub struct StreamLogger {
    tx: Sender<Event>,
    metadata_logged: Arc<AtomicBool>,
}

impl StreamLogger {
    pub fn new() -> (Self, Receiver<Event>) {
        let (tx, rx) = mpsc::channel();
        (Self { tx, metadata_logged: Arc::new(AtomicBool::new(false)) }, rx)
    }

    /// Log run-start metadata. Idempotent: only the first call has an
    /// effect, since a run has exactly one start.
    pub fn log_metadata(&self, metadata: RlmMetadata) {
        if self.metadata_logged.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.tx.send(Event::Metadata {
            timestamp: time::OffsetDateTime::now_utc(),
            metadata,
        });
    }

    pub fn log_token(&self, iteration: u32, content: String) {
        let _ = self.tx.send(Event::Token { iteration, content });
    }

    pub fn log_code_result(&self, iteration: u32, code: String, result: ReplResult) {
        let _ = self.tx.send(Event::CodeResult { iteration, code, result });
    }

    pub fn log_iteration(&self, iteration: RlmIteration, education: Option<Education>) {
        let _ = self.tx.send(Event::Iteration { iteration, education });
    }

    pub fn log_error(&self, error: impl Into<String>) {
        let _ = self.tx.send(Event::Error {
            timestamp: time::OffsetDateTime::now_utc(),
            error: error.into(),
        });
    }

    pub fn signal_complete(&self) {
        let _ = self.tx.send(Event::Complete);
    }
}

/// Run `work` on a background thread, handing it a [`StreamLogger`] to emit
/// events through, and return the receiving half. Any panic in `work`
/// becomes an [`Event::Error`]; `Event::Complete` is always sent last,
/// whether `work` succeeded, errored, or panicked.
pub fn stream_iterations<F>(work: F) -> Receiver<Event>
where
    F: FnOnce(&StreamLogger) + Send + 'static,
{
    let (logger, rx) = StreamLogger::new();
    std::thread::spawn(move || {
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| work(&logger)));
        if let Err(panic) = result {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "RLM worker thread panicked".to_string());
            logger.log_error(message);
        }
        logger.signal_complete();
    });
    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn metadata_is_logged_once() {
        let (logger, rx) = StreamLogger::new();
        let meta = RlmMetadata {
            model: "gpt-4o".to_string(),
            provider: "openai".to_string(),
            environment: "test".to_string(),
            max_iterations: 10,
            start_time: time::OffsetDateTime::UNIX_EPOCH,
        };
        logger.log_metadata(meta.clone());
        logger.log_metadata(meta);
        drop(logger);

        let events: Vec<_> = rx.iter().collect();
        let metadata_count = events.iter().filter(|e| matches!(e, Event::Metadata { .. })).count();
        assert_eq!(metadata_count, 1);
    }

    #[test]
    fn stream_iterations_always_signals_complete() {
        let rx = stream_iterations(|logger| {
            logger.log_token(1, "hello".to_string());
        });
        let events: Vec<_> = rx.iter().collect();
        assert!(matches!(events.last(), Some(Event::Complete)));
    }

    #[test]
    fn panic_in_worker_becomes_error_event_and_still_completes() {
        let rx = stream_iterations(|_logger| {
            panic!("boom");
        });
        let events: Vec<_> = rx.iter().collect();
        assert!(events.iter().any(|e| matches!(e, Event::Error { .. })));
        assert!(matches!(events.last(), Some(Event::Complete)));
    }

    #[test]
    fn events_arrive_in_send_order() {
        let rx = stream_iterations(|logger| {
            logger.log_token(1, "a".to_string());
            std::thread::sleep(Duration::from_millis(1));
            logger.log_token(1, "b".to_string());
        });
        let events: Vec<_> = rx.iter().collect();
        let tokens: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                Event::Token { content, .. } => Some(content.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(tokens, vec!["a".to_string(), "b".to_string()]);
    }
}
