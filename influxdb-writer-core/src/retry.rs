use std::error::Error as StdError;
use std::io::ErrorKind;
use std::sync::Arc;
use std::time::Duration;

use http::StatusCode;
use tracing::{debug, trace, warn};

use crate::batch_writer::DispatchUnit;
use crate::events::{EventNotifier, WriteEvent};
use crate::transport::WriteTransport;
use crate::{WriteError, WriteOptions};

/// Whether a failed write may succeed when sent again unchanged.
///
/// Rate limiting and server side unavailability (429 and 5xx) are retryable,
/// every other HTTP status is not. Without a status the error chain is
/// searched for a timeout or connection failure.
pub fn is_retryable(error: &WriteError) -> bool {
    if let Some(status) = error.status() {
        return status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
    }

    let mut source: Option<&(dyn StdError + 'static)> = Some(error);
    while let Some(err) = source {
        if let Some(e) = err.downcast_ref::<reqwest::Error>() {
            if e.is_timeout() || e.is_connect() {
                return true;
            }
        }
        if let Some(e) = err.downcast_ref::<std::io::Error>() {
            if is_network_failure(e.kind()) {
                return true;
            }
        }
        source = err.source();
    }
    false
}

fn is_network_failure(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::TimedOut
            | ErrorKind::ConnectionRefused
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::NotConnected
            | ErrorKind::BrokenPipe
            | ErrorKind::UnexpectedEof
            | ErrorKind::AddrNotAvailable
    )
}

/// One failed attempt of a dispatch unit.
pub(crate) struct RetryAttempt<'a> {
    error: &'a WriteError,
    attempt: u32,
    options: &'a WriteOptions,
}

impl<'a> RetryAttempt<'a> {
    /// `attempt` is 1-based: the first send of a payload is attempt 1.
    pub fn new(error: &'a WriteError, attempt: u32, options: &'a WriteOptions) -> Self {
        Self { error, attempt, options }
    }

    pub fn is_retry(&self) -> bool {
        if self.attempt > self.options.max_retries {
            warn!(attempt = self.attempt, "Max write retries exceeded: {}", self.error);
            return false;
        }
        is_retryable(self.error)
    }

    /// Delay before the next attempt. A server `Retry-After` hint is used
    /// verbatim; otherwise the delay grows exponentially up to the configured cap.
    pub fn retry_interval(&self) -> Duration {
        if let Some(seconds) = self.error.retry_after() {
            return Duration::from_millis(seconds.saturating_mul(1000));
        }

        let exponent = self.attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let delay = self.options.retry_interval.as_millis() as f64 * self.options.exponential_base.powi(exponent);
        let max = self.options.max_retry_delay.as_millis() as f64;
        let delay = Duration::from_millis(delay.min(max) as u64);
        trace!(attempt = self.attempt, delay_ms = delay.as_millis() as u64, "No Retry-After hint, using computed backoff");
        delay
    }
}

/// Sends one unit until it succeeds, fails terminally or runs out of retries,
/// publishing an event for every outcome. The payload is never altered
/// between attempts.
pub(crate) async fn send_with_retry(
    unit: DispatchUnit,
    transport: Arc<dyn WriteTransport>,
    notifier: Arc<EventNotifier>,
    options: Arc<WriteOptions>,
) {
    let DispatchUnit { key, line_protocol } = unit;
    let mut attempt = 1;

    loop {
        debug!(org = %key.org, bucket = %key.bucket, attempt, bytes = line_protocol.len(), "Sending batch");
        let error = match transport.write(&key, &line_protocol).await {
            Ok(()) => {
                notifier.publish(WriteEvent::Success { key, line_protocol });
                return;
            }
            Err(error) => error,
        };

        let retry = RetryAttempt::new(&error, attempt, &options);
        if !retry.is_retry() {
            notifier.publish(WriteEvent::Error {
                key,
                line_protocol,
                cause: Arc::new(error),
            });
            return;
        }

        let retry_in = retry.retry_interval();
        notifier.publish(WriteEvent::RetryableError {
            key: key.clone(),
            line_protocol: line_protocol.clone(),
            cause: Arc::new(error),
            retry_in,
        });
        tokio::time::sleep(retry_in).await;
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use thiserror::Error as ThisError;

    use super::*;

    fn http(status: u16, retry_after: Option<u64>) -> WriteError {
        WriteError::Http {
            status: StatusCode::from_u16(status).unwrap(),
            retry_after,
            message: String::new(),
        }
    }

    #[derive(Debug, ThisError)]
    #[error("transport wrapper")]
    struct Wrapper(#[source] io::Error);

    #[test]
    fn classifies_status_codes() {
        for status in [429, 500, 502, 503, 504] {
            assert!(is_retryable(&http(status, None)), "{status} should be retryable");
        }
        for status in [400, 401, 403, 404, 413, 422, 428] {
            assert!(!is_retryable(&http(status, None)), "{status} should be terminal");
        }
    }

    #[test]
    fn classifies_network_failures() {
        assert!(is_retryable(&WriteError::IoError(io::Error::from(io::ErrorKind::TimedOut))));
        assert!(is_retryable(&WriteError::IoError(io::Error::from(io::ErrorKind::ConnectionRefused))));
        assert!(!is_retryable(&WriteError::IoError(io::Error::from(io::ErrorKind::PermissionDenied))));
        assert!(!is_retryable(&WriteError::invalid_argument("bad")));
        assert!(!is_retryable(&WriteError::Other("unknown".to_string())));
    }

    #[test]
    fn non_network_reqwest_errors_are_terminal() {
        let error = reqwest::Client::new().get("not a url").build().unwrap_err();
        assert!(!is_retryable(&WriteError::ReqwestError(error)));
    }

    #[test]
    fn finds_network_failure_in_error_chain() {
        let wrapped = io::Error::other(Wrapper(io::Error::from(io::ErrorKind::TimedOut)));
        assert!(is_retryable(&WriteError::IoError(wrapped)));

        let wrapped = io::Error::other(Wrapper(io::Error::from(io::ErrorKind::InvalidData)));
        assert!(!is_retryable(&WriteError::IoError(wrapped)));
    }

    #[test]
    fn max_retries_limits_attempts() {
        let options = WriteOptions::new().max_retries(5);
        let error = http(429, None);
        for attempt in 1..=5 {
            assert!(RetryAttempt::new(&error, attempt, &options).is_retry());
        }
        assert!(!RetryAttempt::new(&error, 6, &options).is_retry());

        let no_retries = WriteOptions::new().max_retries(0);
        assert!(!RetryAttempt::new(&error, 1, &no_retries).is_retry());
    }

    #[test]
    fn terminal_error_is_never_retried() {
        let options = WriteOptions::new();
        assert!(!RetryAttempt::new(&http(400, None), 1, &options).is_retry());
    }

    #[test]
    fn exponential_backoff() {
        let options = WriteOptions::new()
            .retry_interval(Duration::from_millis(5_000)).unwrap()
            .exponential_base(5.0).unwrap()
            .max_retry_delay(Duration::MAX);
        let error = http(429, None);

        let delays: Vec<u128> = (1..=6)
            .map(|attempt| RetryAttempt::new(&error, attempt, &options).retry_interval().as_millis())
            .collect();
        assert_eq!(delays, vec![5_000, 25_000, 125_000, 625_000, 3_125_000, 15_625_000]);
    }

    #[test]
    fn backoff_is_capped() {
        let options = WriteOptions::new()
            .retry_interval(Duration::from_millis(2_000)).unwrap()
            .exponential_base(2.0).unwrap()
            .max_retry_delay(Duration::from_millis(50_000));
        let error = http(503, None);

        assert_eq!(RetryAttempt::new(&error, 5, &options).retry_interval(), Duration::from_millis(32_000));
        assert_eq!(RetryAttempt::new(&error, 6, &options).retry_interval(), Duration::from_millis(50_000));
        assert_eq!(RetryAttempt::new(&error, 60, &options).retry_interval(), Duration::from_millis(50_000));
    }

    #[test]
    fn retry_after_header_has_priority() {
        let options = WriteOptions::new()
            .retry_interval(Duration::from_millis(5_000)).unwrap()
            .exponential_base(5.0).unwrap();

        let hinted = http(429, Some(10));
        assert_eq!(RetryAttempt::new(&hinted, 1, &options).retry_interval(), Duration::from_millis(10_000));
        assert_eq!(RetryAttempt::new(&hinted, 4, &options).retry_interval(), Duration::from_millis(10_000));

        let hinted = http(503, Some(3));
        assert_eq!(RetryAttempt::new(&hinted, 7, &options).retry_interval(), Duration::from_millis(3_000));
    }
}
