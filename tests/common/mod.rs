//! In-memory transport shared by the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use http::StatusCode;
use influxdb_writer::{BatchKey, WriteError, WriteEvent, WriteTransport};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::time::Instant;

/// Scripted outcome of one `write` call. Calls beyond the script succeed.
pub enum Reply {
    Ok,
    Fail(WriteError),
    Panic,
}

#[derive(Default)]
pub struct MockTransport {
    requests: Mutex<Vec<(BatchKey, String)>>,
    sent_at: Mutex<Vec<Instant>>,
    script: Mutex<VecDeque<Reply>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn scripted(replies: impl IntoIterator<Item = Reply>) -> Arc<Self> {
        let transport = Self::default();
        transport.script.lock().extend(replies);
        Arc::new(transport)
    }

    /// Every request received so far, in call order.
    pub fn requests(&self) -> Vec<(BatchKey, String)> {
        self.requests.lock().clone()
    }

    /// When each request was received, in call order.
    pub fn sent_at(&self) -> Vec<Instant> {
        self.sent_at.lock().clone()
    }

    pub fn bodies(&self) -> Vec<String> {
        self.requests.lock().iter().map(|(_, body)| body.clone()).collect()
    }
}

#[async_trait]
impl WriteTransport for MockTransport {
    async fn write(&self, key: &BatchKey, line_protocol: &str) -> Result<(), WriteError> {
        self.requests.lock().push((key.clone(), line_protocol.to_string()));
        self.sent_at.lock().push(Instant::now());
        let reply = self.script.lock().pop_front().unwrap_or(Reply::Ok);
        match reply {
            Reply::Ok => Ok(()),
            Reply::Fail(error) => Err(error),
            Reply::Panic => panic!("transport exploded"),
        }
    }
}

pub fn http_error(status: StatusCode) -> WriteError {
    WriteError::Http {
        status,
        retry_after: None,
        message: status.to_string(),
    }
}

/// Everything published so far on `events`.
pub fn received(events: &mut broadcast::Receiver<WriteEvent>) -> Vec<WriteEvent> {
    let mut received = Vec::new();
    while let Ok(event) = events.try_recv() {
        received.push(event);
    }
    received
}

pub fn count<F>(events: &[WriteEvent], predicate: F) -> usize
where
    F: Fn(&WriteEvent) -> bool,
{
    events.iter().filter(|event| predicate(event)).count()
}
