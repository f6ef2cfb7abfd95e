use std::time::Duration;

use chrono::{DateTime, TimeZone};
use serde::Deserialize;

use crate::error::WriteError;

const DEFAULT_BATCH_SIZE: usize = 1000;
const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(1000);
const DEFAULT_JITTER_INTERVAL: Duration = Duration::ZERO;
const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(5000);
const DEFAULT_MAX_RETRIES: u32 = 5;
const DEFAULT_MAX_RETRY_DELAY: Duration = Duration::from_millis(125_000);
const DEFAULT_EXPONENTIAL_BASE: f64 = 2.0;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "String")]
pub enum TimestampPrecision {
    #[default]
    Nanoseconds,
    Microseconds,
    Milliseconds,
    Seconds,
}

impl TimestampPrecision {
    /// Token used for the `precision` query parameter of the write endpoint.
    pub fn as_str(&self) -> &'static str {
        match self {
            TimestampPrecision::Nanoseconds => "ns",
            TimestampPrecision::Microseconds => "us",
            TimestampPrecision::Milliseconds => "ms",
            TimestampPrecision::Seconds => "s",
        }
    }

    fn units_per_second(&self) -> i128 {
        match self {
            TimestampPrecision::Nanoseconds => 1_000_000_000,
            TimestampPrecision::Microseconds => 1_000_000,
            TimestampPrecision::Milliseconds => 1_000,
            TimestampPrecision::Seconds => 1,
        }
    }

    /// Re-expresses `value`, counted in `from` units, in units of `self`.
    /// Going to a coarser precision truncates toward zero.
    pub fn convert(&self, value: i128, from: TimestampPrecision) -> i128 {
        let to = self.units_per_second();
        let from = from.units_per_second();
        if to >= from {
            value.saturating_mul(to / from)
        } else {
            value / (from / to)
        }
    }

    pub(crate) fn from_datetime<Tz>(&self, dt: &DateTime<Tz>) -> i128
    where
        Tz: TimeZone,
    {
        let nanos = dt.timestamp() as i128 * 1_000_000_000 + dt.timestamp_subsec_nanos() as i128;
        self.convert(nanos, TimestampPrecision::Nanoseconds)
    }

    pub(crate) fn from_duration(&self, since_epoch: Duration) -> i128 {
        self.convert(since_epoch.as_nanos() as i128, TimestampPrecision::Nanoseconds)
    }
}

impl std::fmt::Display for TimestampPrecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for TimestampPrecision {
    type Error = WriteError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "ns" | "n" | "nanosecond" => Ok(TimestampPrecision::Nanoseconds),
            "us" | "u" | "microsecond" => Ok(TimestampPrecision::Microseconds),
            "ms" | "millisecond" => Ok(TimestampPrecision::Milliseconds),
            "s" | "second" => Ok(TimestampPrecision::Seconds),
            _ => Err(WriteError::InvalidTimestampPrecision(value.to_string())),
        }
    }
}

impl TryFrom<String> for TimestampPrecision {
    type Error = WriteError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        TimestampPrecision::try_from(value.as_str())
    }
}

/// Batching and retry settings of a [`WriteApi`](crate::WriteApi).
///
/// Durations deserialize from integer milliseconds.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawWriteOptions")]
pub struct WriteOptions {
    pub(crate) batch_size: usize,
    pub(crate) flush_interval: Duration,
    pub(crate) jitter_interval: Duration,
    pub(crate) retry_interval: Duration,
    pub(crate) max_retries: u32,
    pub(crate) max_retry_delay: Duration,
    pub(crate) exponential_base: f64,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            jitter_interval: DEFAULT_JITTER_INTERVAL,
            retry_interval: DEFAULT_RETRY_INTERVAL,
            max_retries: DEFAULT_MAX_RETRIES,
            max_retry_delay: DEFAULT_MAX_RETRY_DELAY,
            exponential_base: DEFAULT_EXPONENTIAL_BASE,
        }
    }
}

impl WriteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn batch_size(mut self, batch_size: usize) -> Result<Self, WriteError> {
        if batch_size == 0 {
            return Err(WriteError::InvalidParameter("batchSize".to_string(), batch_size.to_string()));
        }
        self.batch_size = batch_size;
        Ok(self)
    }

    pub fn flush_interval(mut self, flush_interval: Duration) -> Result<Self, WriteError> {
        if flush_interval.is_zero() {
            return Err(WriteError::InvalidParameter("flushInterval".to_string(), "0".to_string()));
        }
        self.flush_interval = flush_interval;
        Ok(self)
    }

    pub fn jitter_interval(mut self, jitter_interval: Duration) -> Self {
        self.jitter_interval = jitter_interval;
        self
    }

    pub fn retry_interval(mut self, retry_interval: Duration) -> Result<Self, WriteError> {
        if retry_interval.is_zero() {
            return Err(WriteError::InvalidParameter("retryInterval".to_string(), "0".to_string()));
        }
        self.retry_interval = retry_interval;
        Ok(self)
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn max_retry_delay(mut self, max_retry_delay: Duration) -> Self {
        self.max_retry_delay = max_retry_delay;
        self
    }

    pub fn exponential_base(mut self, exponential_base: f64) -> Result<Self, WriteError> {
        if !(exponential_base > 1.0) || !exponential_base.is_finite() {
            return Err(WriteError::InvalidParameter("exponentialBase".to_string(), exponential_base.to_string()));
        }
        self.exponential_base = exponential_base;
        Ok(self)
    }

    pub fn get_batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn get_flush_interval(&self) -> Duration {
        self.flush_interval
    }

    pub fn get_jitter_interval(&self) -> Duration {
        self.jitter_interval
    }

    pub fn get_retry_interval(&self) -> Duration {
        self.retry_interval
    }

    pub fn get_max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn get_max_retry_delay(&self) -> Duration {
        self.max_retry_delay
    }

    pub fn get_exponential_base(&self) -> f64 {
        self.exponential_base
    }
}

#[derive(Deserialize)]
#[serde(default)]
struct RawWriteOptions {
    batch_size: usize,
    flush_interval: u64,
    jitter_interval: u64,
    retry_interval: u64,
    max_retries: u32,
    max_retry_delay: u64,
    exponential_base: f64,
}

impl Default for RawWriteOptions {
    fn default() -> Self {
        let defaults = WriteOptions::default();
        Self {
            batch_size: defaults.batch_size,
            flush_interval: defaults.flush_interval.as_millis() as u64,
            jitter_interval: defaults.jitter_interval.as_millis() as u64,
            retry_interval: defaults.retry_interval.as_millis() as u64,
            max_retries: defaults.max_retries,
            max_retry_delay: defaults.max_retry_delay.as_millis() as u64,
            exponential_base: defaults.exponential_base,
        }
    }
}

impl TryFrom<RawWriteOptions> for WriteOptions {
    type Error = WriteError;

    fn try_from(raw: RawWriteOptions) -> Result<Self, Self::Error> {
        Ok(WriteOptions::new()
            .batch_size(raw.batch_size)?
            .flush_interval(Duration::from_millis(raw.flush_interval))?
            .jitter_interval(Duration::from_millis(raw.jitter_interval))
            .retry_interval(Duration::from_millis(raw.retry_interval))?
            .max_retries(raw.max_retries)
            .max_retry_delay(Duration::from_millis(raw.max_retry_delay))
            .exponential_base(raw.exponential_base)?)
    }
}
