//! Asynchronous, batching write pipeline.
//!
//! Producers encode points on their own thread and hand the lines to a worker
//! task through an unbounded channel, so writing never blocks on I/O. The
//! worker owns the pending batch and flushes it when `batch_size` lines are
//! queued, when `flush_interval` has passed since the oldest pending line, on
//! [`WriteApi::flush`] and on [`WriteApi::close`]. Every flush yields one
//! payload per (org, bucket, precision) which is sent by its own task: a
//! random jitter delay first, then the retry loop. Outcomes are reported as
//! [`WriteEvent`]s.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::FutureExt as _;
use rand::Rng as _;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::{JoinError, JoinSet};
use tokio::time::{Instant, sleep, sleep_until};
use tracing::{debug, info, trace, warn};

use crate::batch_writer::{BatchKey, Batcher, DispatchUnit};
use crate::default_tags::{DefaultTags, TagResolver, env_resolver};
use crate::events::{EventNotifier, WriteEvent, WriteEventListener};
use crate::retry::send_with_retry;
use crate::transport::WriteTransport;
use crate::util::check_non_empty;
use crate::{Point, TimestampPrecision, ToPoint, WriteError, WriteOptions};

/// Drain budget used when a `WriteApi` is dropped without calling `close`.
const DROP_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

enum Command {
    Write(BatchKey, String),
    Flush,
    Close {
        timeout: Duration,
        done: oneshot::Sender<()>,
    },
}

pub struct WriteApi {
    sender: mpsc::UnboundedSender<Command>,
    notifier: Arc<EventNotifier>,
    closed: AtomicBool,
    default_tags: DefaultTags,
    tag_resolver: TagResolver,
}

impl WriteApi {
    /// Starts the pipeline on the current Tokio runtime.
    pub fn new(transport: Arc<dyn WriteTransport>, options: WriteOptions) -> Result<Self, WriteError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| WriteError::Other(format!("WriteApi requires a Tokio runtime: {e}")))?;

        let (sender, receiver) = mpsc::unbounded_channel();
        let notifier = Arc::new(EventNotifier::new());
        let worker = Worker {
            transport,
            notifier: notifier.clone(),
            options: Arc::new(options),
        };
        runtime.spawn(worker.run(receiver));

        Ok(Self {
            sender,
            notifier,
            closed: AtomicBool::new(false),
            default_tags: DefaultTags::default(),
            tag_resolver: Arc::new(env_resolver),
        })
    }

    pub fn with_default_tags(mut self, default_tags: DefaultTags) -> Self {
        self.default_tags = default_tags;
        self
    }

    pub fn with_tag_resolver(mut self, tag_resolver: TagResolver) -> Self {
        self.tag_resolver = tag_resolver;
        self
    }

    /// Registers a callback invoked for every published event.
    pub fn add_listener<L>(&self, listener: L)
    where
        L: WriteEventListener + 'static,
    {
        self.notifier.add_listener(Arc::new(listener));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WriteEvent> {
        self.notifier.subscribe()
    }

    /// Queues one line protocol record. Empty records are ignored.
    pub fn write_record(&self, org: &str, bucket: &str, precision: TimestampPrecision, record: &str) -> Result<(), WriteError> {
        let key = destination(org, bucket, precision)?;
        self.enqueue(key, record.to_string());
        Ok(())
    }

    pub fn write_records<I, S>(&self, org: &str, bucket: &str, precision: TimestampPrecision, records: I) -> Result<(), WriteError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let key = destination(org, bucket, precision)?;
        for record in records {
            self.enqueue(key.clone(), record.as_ref().to_string());
        }
        Ok(())
    }

    /// Queues a point under its own precision. Points without fields are ignored.
    pub fn write_point(&self, org: &str, bucket: &str, point: &Point) -> Result<(), WriteError> {
        let key = destination(org, bucket, point.precision())?;
        self.enqueue_point(key, point);
        Ok(())
    }

    pub fn write_points<'a, I>(&self, org: &str, bucket: &str, points: I) -> Result<(), WriteError>
    where
        I: IntoIterator<Item = &'a Point>,
    {
        check_non_empty(org, "Organization")?;
        check_non_empty(bucket, "Bucket")?;
        for point in points {
            self.enqueue_point(BatchKey::new(org, bucket, point.precision()), point);
        }
        Ok(())
    }

    pub fn write_measurement<T>(&self, org: &str, bucket: &str, precision: TimestampPrecision, measurement: T) -> Result<(), WriteError>
    where
        T: ToPoint,
    {
        let point = measurement.to_point(precision)?;
        self.write_point(org, bucket, &point)
    }

    pub fn write_measurements<T, I>(&self, org: &str, bucket: &str, precision: TimestampPrecision, measurements: I) -> Result<(), WriteError>
    where
        T: ToPoint,
        I: IntoIterator<Item = T>,
    {
        for measurement in measurements {
            self.write_measurement(org, bucket, precision, measurement)?;
        }
        Ok(())
    }

    /// Flushes everything queued so far without waiting for delivery.
    pub fn flush(&self) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        if self.sender.send(Command::Flush).is_err() {
            warn!("Write pipeline has stopped, flush ignored");
        }
    }

    /// Flushes pending lines and waits up to `timeout` for all in-flight
    /// writes, retries included. Later writes are dropped; calling `close`
    /// again does nothing.
    pub async fn close(&self, timeout: Duration) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("Flushing batches before shutdown");
        let (done, finished) = oneshot::channel();
        if self.sender.send(Command::Close { timeout, done }).is_ok() {
            let _ = finished.await;
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn enqueue_point(&self, key: BatchKey, point: &Point) {
        let line = if self.default_tags.is_empty() {
            point.to_line_protocol(None)
        } else {
            let resolved = self.default_tags.resolve(&*self.tag_resolver);
            point.to_line_protocol(Some(&resolved))
        };
        if line.is_empty() {
            trace!(measurement = point.get_measurement(), "Point has no fields, nothing to write");
            return;
        }
        self.enqueue(key, line);
    }

    fn enqueue(&self, key: BatchKey, line: String) {
        if self.closed.load(Ordering::Acquire) {
            warn!(org = %key.org, bucket = %key.bucket, "WriteApi is closed, dropping record");
            return;
        }
        if self.sender.send(Command::Write(key, line)).is_err() {
            warn!("Write pipeline has stopped, dropping record");
        }
    }
}

fn destination(org: &str, bucket: &str, precision: TimestampPrecision) -> Result<BatchKey, WriteError> {
    check_non_empty(org, "Organization")?;
    check_non_empty(bucket, "Bucket")?;
    Ok(BatchKey::new(org, bucket, precision))
}

struct Worker {
    transport: Arc<dyn WriteTransport>,
    notifier: Arc<EventNotifier>,
    options: Arc<WriteOptions>,
}

impl Worker {
    async fn run(self, mut receiver: mpsc::UnboundedReceiver<Command>) {
        debug!(batch_size = self.options.batch_size, flush_interval_ms = self.options.flush_interval.as_millis() as u64, "Write pipeline started");

        let mut batcher = Batcher::new(self.options.batch_size);
        let mut in_flight = JoinSet::new();

        loop {
            // Without a deadline the timer branch is disabled and `wake_at` is never awaited.
            let deadline = batcher.deadline(self.options.flush_interval);
            let wake_at = deadline.unwrap_or_else(Instant::now);

            tokio::select! {
                command = receiver.recv() => match command {
                    Some(Command::Write(key, line)) => {
                        if batcher.add_line(key, line, Instant::now()) {
                            self.flush(&mut batcher, &mut in_flight);
                        }
                    }
                    Some(Command::Flush) => self.flush(&mut batcher, &mut in_flight),
                    Some(Command::Close { timeout, done }) => {
                        self.flush(&mut batcher, &mut in_flight);
                        self.drain(&mut in_flight, timeout).await;
                        let _ = done.send(());
                        break;
                    }
                    None => {
                        self.flush(&mut batcher, &mut in_flight);
                        self.drain(&mut in_flight, DROP_DRAIN_TIMEOUT).await;
                        break;
                    }
                },
                _ = sleep_until(wake_at), if deadline.is_some() => {
                    trace!("Flush interval elapsed");
                    self.flush(&mut batcher, &mut in_flight);
                }
                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => self.reap(joined),
            }
        }

        info!("Write pipeline stopped");
    }

    fn flush(&self, batcher: &mut Batcher, in_flight: &mut JoinSet<()>) {
        if batcher.is_empty() {
            return;
        }
        let lines = batcher.len();
        let units = batcher.finalize();
        debug!(lines, units = units.len(), "Flushing batch");

        for unit in units {
            in_flight.spawn(dispatch(
                unit,
                self.transport.clone(),
                self.notifier.clone(),
                self.options.clone(),
            ));
        }
    }

    async fn drain(&self, in_flight: &mut JoinSet<()>, timeout: Duration) {
        let all_done = tokio::time::timeout(timeout, async {
            while let Some(joined) = in_flight.join_next().await {
                self.reap(joined);
            }
        })
        .await
        .is_ok();

        if !all_done {
            warn!(remaining = in_flight.len(), "Shutdown timeout elapsed, abandoning in-flight writes");
            in_flight.abort_all();
        }
    }

    fn reap(&self, joined: Result<(), JoinError>) {
        if let Err(e) = joined {
            if e.is_panic() {
                self.notifier.publish(WriteEvent::RuntimeFault {
                    cause: panic_message(e.into_panic()),
                });
            }
        }
    }
}

/// Runs one dispatch unit: jitter, then send with retries. A panic anywhere
/// below is reported as a runtime fault instead of unwinding into the worker.
async fn dispatch(
    unit: DispatchUnit,
    transport: Arc<dyn WriteTransport>,
    notifier: Arc<EventNotifier>,
    options: Arc<WriteOptions>,
) {
    let jitter = jitter_delay(options.jitter_interval);
    if !jitter.is_zero() {
        trace!(jitter_ms = jitter.as_millis() as u64, "Delaying batch by jitter");
        sleep(jitter).await;
    }

    let outcome = AssertUnwindSafe(send_with_retry(unit, transport, notifier.clone(), options))
        .catch_unwind()
        .await;
    if let Err(panic) = outcome {
        notifier.publish(WriteEvent::RuntimeFault {
            cause: panic_message(panic),
        });
    }
}

/// Uniformly random delay in `[0, interval]`, millisecond resolution.
fn jitter_delay(interval: Duration) -> Duration {
    let max = interval.as_millis() as u64;
    if max == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(0..=max))
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jitter_stays_within_interval() {
        assert_eq!(jitter_delay(Duration::ZERO), Duration::ZERO);
        for _ in 0..100 {
            assert!(jitter_delay(Duration::from_millis(250)) <= Duration::from_millis(250));
        }
    }

    #[test]
    fn panic_messages() {
        assert_eq!(panic_message(Box::new("static")), "static");
        assert_eq!(panic_message(Box::new(String::from("owned"))), "owned");
        assert_eq!(panic_message(Box::new(42u8)), "unknown panic");
    }

    #[test]
    fn requires_runtime() {
        struct Unreachable;

        #[async_trait::async_trait]
        impl WriteTransport for Unreachable {
            async fn write(&self, _key: &BatchKey, _line_protocol: &str) -> Result<(), WriteError> {
                unreachable!()
            }
        }

        let result = WriteApi::new(Arc::new(Unreachable), WriteOptions::default());
        assert!(matches!(result, Err(WriteError::Other(_))));
    }

    #[tokio::test]
    async fn rejects_empty_destination() {
        struct Nothing;

        #[async_trait::async_trait]
        impl WriteTransport for Nothing {
            async fn write(&self, _key: &BatchKey, _line_protocol: &str) -> Result<(), WriteError> {
                Ok(())
            }
        }

        let api = WriteApi::new(Arc::new(Nothing), WriteOptions::default()).unwrap();
        let point = Point::measurement("h2o").unwrap().field("level", 1i64).unwrap();
        assert!(matches!(api.write_point("", "bucket", &point), Err(WriteError::InvalidArgument(_))));
        assert!(matches!(
            api.write_record("org", " ", TimestampPrecision::Seconds, "h2o level=1i"),
            Err(WriteError::InvalidArgument(_))
        ));
        api.close(Duration::from_secs(1)).await;
    }
}
