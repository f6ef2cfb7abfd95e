use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::{debug, error, warn};

use crate::batch_writer::BatchKey;
use crate::WriteError;

const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Outcome of one dispatched batch, published by a [`WriteApi`](crate::WriteApi).
#[derive(Debug, Clone)]
pub enum WriteEvent {
    /// The payload was accepted by the server.
    Success {
        key: BatchKey,
        line_protocol: Arc<str>,
    },
    /// The payload was dropped after a terminal or exhausted failure.
    Error {
        key: BatchKey,
        line_protocol: Arc<str>,
        cause: Arc<WriteError>,
    },
    /// The payload failed and will be sent again after `retry_in`.
    RetryableError {
        key: BatchKey,
        line_protocol: Arc<str>,
        cause: Arc<WriteError>,
        retry_in: Duration,
    },
    /// Unexpected failure inside the write pipeline itself.
    RuntimeFault {
        cause: String,
    },
}

impl WriteEvent {
    pub fn key(&self) -> Option<&BatchKey> {
        match self {
            WriteEvent::Success { key, .. }
            | WriteEvent::Error { key, .. }
            | WriteEvent::RetryableError { key, .. } => Some(key),
            WriteEvent::RuntimeFault { .. } => None,
        }
    }

    pub fn line_protocol(&self) -> Option<&str> {
        match self {
            WriteEvent::Success { line_protocol, .. }
            | WriteEvent::Error { line_protocol, .. }
            | WriteEvent::RetryableError { line_protocol, .. } => Some(line_protocol),
            WriteEvent::RuntimeFault { .. } => None,
        }
    }

    fn log(&self) {
        match self {
            WriteEvent::Success { key, .. } => {
                debug!(org = %key.org, bucket = %key.bucket, precision = %key.precision, "The data was successfully written");
            }
            WriteEvent::Error { key, cause, .. } => {
                error!(org = %key.org, bucket = %key.bucket, "The error occurred during writing of data: {cause}");
            }
            WriteEvent::RetryableError { key, cause, retry_in, .. } => {
                warn!(org = %key.org, bucket = %key.bucket, retry_in_ms = retry_in.as_millis() as u64, "The retryable error occurred during writing of data: {cause}");
            }
            WriteEvent::RuntimeFault { cause } => {
                error!("Unexpected failure in the write pipeline: {cause}");
            }
        }
    }
}

pub trait WriteEventListener: Send + Sync {
    fn on_event(&self, event: &WriteEvent);
}

impl<F> WriteEventListener for F
where
    F: Fn(&WriteEvent) + Send + Sync,
{
    fn on_event(&self, event: &WriteEvent) {
        self(event)
    }
}

/// Fans events out to registered listeners and broadcast subscribers.
///
/// A panicking listener is logged and skipped; a lagging subscriber only
/// loses its own events.
pub(crate) struct EventNotifier {
    listeners: RwLock<Vec<Arc<dyn WriteEventListener>>>,
    sender: broadcast::Sender<WriteEvent>,
}

impl EventNotifier {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            listeners: RwLock::new(Vec::new()),
            sender,
        }
    }

    pub fn add_listener(&self, listener: Arc<dyn WriteEventListener>) {
        self.listeners.write().push(listener);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WriteEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: WriteEvent) {
        event.log();

        // Listeners may register further listeners, so never call them under the lock.
        let listeners = self.listeners.read().clone();
        for listener in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener.on_event(&event))).is_err() {
                error!("Write event listener panicked");
            }
        }

        let _ = self.sender.send(event);
    }
}
