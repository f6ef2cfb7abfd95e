use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::TimestampPrecision;

/// Destination of a line: lines are only ever joined with lines of the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BatchKey {
    pub org: String,
    pub bucket: String,
    pub precision: TimestampPrecision,
}

impl BatchKey {
    pub fn new(org: impl Into<String>, bucket: impl Into<String>, precision: TimestampPrecision) -> Self {
        Self {
            org: org.into(),
            bucket: bucket.into(),
            precision,
        }
    }
}

/// One request body: the newline joined lines of a single key.
#[derive(Debug, Clone)]
pub(crate) struct DispatchUnit {
    pub key: BatchKey,
    pub line_protocol: Arc<str>,
}

/// Pending lines of the current flush window, in arrival order.
pub(crate) struct Batcher {
    entries: Vec<(BatchKey, String)>,
    opened_at: Option<Instant>,
    batch_size: usize,
}

impl Batcher {
    pub fn new(batch_size: usize) -> Self {
        Batcher {
            entries: Vec::new(),
            opened_at: None,
            batch_size,
        }
    }

    /// Queues a line; returns `true` once the window holds `batch_size` lines.
    pub fn add_line(&mut self, key: BatchKey, line: String, now: Instant) -> bool {
        if line.is_empty() {
            return false;
        }
        self.opened_at.get_or_insert(now);
        self.entries.push((key, line));
        self.entries.len() >= self.batch_size
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// When the current window must be flushed at the latest. `None` when
    /// nothing is pending or the interval reaches past the clock's range.
    pub fn deadline(&self, flush_interval: Duration) -> Option<Instant> {
        self.opened_at.and_then(|opened| opened.checked_add(flush_interval))
    }

    /// Closes the window, producing one unit per key in order of first arrival.
    pub fn finalize(&mut self) -> Vec<DispatchUnit> {
        self.opened_at = None;

        let mut groups: Vec<(BatchKey, String)> = Vec::new();
        let mut index: HashMap<BatchKey, usize> = HashMap::new();
        for (key, line) in self.entries.drain(..) {
            match index.get(&key) {
                Some(&i) => {
                    let body = &mut groups[i].1;
                    body.push('\n');
                    body.push_str(&line);
                }
                None => {
                    index.insert(key.clone(), groups.len());
                    groups.push((key, line));
                }
            }
        }

        groups
            .into_iter()
            .map(|(key, body)| DispatchUnit {
                key,
                line_protocol: Arc::from(body),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(precision: TimestampPrecision) -> BatchKey {
        BatchKey::new("my-org", "my-bucket", precision)
    }

    #[test]
    fn groups_by_key_preserving_arrival_order() {
        let now = Instant::now();
        let mut batcher = Batcher::new(100);
        let ns = key(TimestampPrecision::Nanoseconds);
        let s = key(TimestampPrecision::Seconds);

        batcher.add_line(ns.clone(), "a v=1i".to_string(), now);
        batcher.add_line(s.clone(), "b v=2i".to_string(), now);
        batcher.add_line(ns.clone(), "c v=3i".to_string(), now);
        batcher.add_line(BatchKey::new("my-org", "other", TimestampPrecision::Nanoseconds), "d v=4i".to_string(), now);

        let units = batcher.finalize();
        assert_eq!(units.len(), 3);
        assert_eq!(units[0].key, ns);
        assert_eq!(&*units[0].line_protocol, "a v=1i\nc v=3i");
        assert_eq!(units[1].key, s);
        assert_eq!(&*units[1].line_protocol, "b v=2i");
        assert_eq!(units[2].key.bucket, "other");
        assert!(batcher.is_empty());
    }

    #[test]
    fn empty_lines_do_not_count() {
        let now = Instant::now();
        let mut batcher = Batcher::new(2);
        let k = key(TimestampPrecision::Nanoseconds);

        assert!(!batcher.add_line(k.clone(), String::new(), now));
        assert!(batcher.deadline(Duration::from_secs(1)).is_none());
        assert!(!batcher.add_line(k.clone(), "a v=1i".to_string(), now));
        assert!(!batcher.add_line(k.clone(), String::new(), now));
        assert!(batcher.add_line(k, "b v=1i".to_string(), now));
        assert_eq!(batcher.len(), 2);
    }

    #[test]
    fn deadline_follows_oldest_entry() {
        let start = Instant::now();
        let mut batcher = Batcher::new(10);
        let k = key(TimestampPrecision::Milliseconds);

        batcher.add_line(k.clone(), "a v=1i".to_string(), start);
        batcher.add_line(k, "b v=1i".to_string(), start + Duration::from_millis(300));
        assert_eq!(batcher.deadline(Duration::from_secs(1)), Some(start + Duration::from_secs(1)));

        batcher.finalize();
        assert!(batcher.deadline(Duration::from_secs(1)).is_none());
    }

    #[test]
    fn unbounded_interval_has_no_deadline() {
        let mut batcher = Batcher::new(10);
        batcher.add_line(key(TimestampPrecision::Seconds), "a v=1i".to_string(), Instant::now());
        assert!(batcher.deadline(Duration::MAX).is_none());
    }
}
