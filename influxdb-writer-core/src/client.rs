use std::sync::Arc;

use tracing::debug;

use crate::batch_writer::BatchKey;
use crate::default_tags::{DefaultTags, TagResolver};
use crate::util::check_non_empty;
use crate::{ClientBuilder, Point, TimestampPrecision, ToPoint, WriteApi, WriteError, WriteOptions, WriteTransport};

pub struct Client {
    pub(crate) org: String,
    pub(crate) bucket: String,
    pub(crate) precision: TimestampPrecision,

    pub(crate) write_options: WriteOptions,
    pub(crate) default_tags: DefaultTags,
    pub(crate) tag_resolver: TagResolver,

    pub(crate) transport: Arc<dyn WriteTransport>,
}

impl Client {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    pub fn org(&self) -> &str {
        &self.org
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Starts a batching [`WriteApi`] with the client's write options and default tags.
    pub fn write_api(&self) -> Result<WriteApi, WriteError> {
        self.write_api_with_options(self.write_options.clone())
    }

    pub fn write_api_with_options(&self, options: WriteOptions) -> Result<WriteApi, WriteError> {
        Ok(WriteApi::new(self.transport.clone(), options)?
            .with_default_tags(self.default_tags.clone())
            .with_tag_resolver(self.tag_resolver.clone()))
    }

    /// Writes one record right away to the client's org and bucket.
    /// Errors are returned to the caller and never retried.
    pub async fn write_record(&self, record: &str) -> Result<(), WriteError> {
        self.write_records([record]).await
    }

    pub async fn write_records<I, S>(&self, records: I) -> Result<(), WriteError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let lines: Vec<String> = records.into_iter()
            .map(|r| r.as_ref().to_string())
            .filter(|r| !r.is_empty())
            .collect();
        self.send(self.precision, lines).await
    }

    pub async fn write_point(&self, point: &Point) -> Result<(), WriteError> {
        self.write_points([point]).await
    }

    /// Writes points right away, one request per timestamp precision.
    pub async fn write_points<'a, I>(&self, points: I) -> Result<(), WriteError>
    where
        I: IntoIterator<Item = &'a Point>,
    {
        let resolved = self.default_tags.resolve(&*self.tag_resolver);
        let default_tags = (!resolved.is_empty()).then_some(&resolved);

        let mut groups: Vec<(TimestampPrecision, Vec<String>)> = Vec::new();
        for point in points {
            let line = point.to_line_protocol(default_tags);
            if line.is_empty() {
                continue;
            }
            match groups.iter_mut().find(|(precision, _)| *precision == point.precision()) {
                Some((_, lines)) => lines.push(line),
                None => groups.push((point.precision(), vec![line])),
            }
        }

        for (precision, lines) in groups {
            self.send(precision, lines).await?;
        }
        Ok(())
    }

    pub async fn write_measurement<T>(&self, measurement: T) -> Result<(), WriteError>
    where
        T: ToPoint,
    {
        self.write_measurements([measurement]).await
    }

    pub async fn write_measurements<T, I>(&self, measurements: I) -> Result<(), WriteError>
    where
        T: ToPoint,
        I: IntoIterator<Item = T>,
    {
        let points = measurements.into_iter()
            .map(|m| m.to_point(self.precision))
            .collect::<Result<Vec<_>, _>>()?;
        self.write_points(&points).await
    }

    async fn send(&self, precision: TimestampPrecision, lines: Vec<String>) -> Result<(), WriteError> {
        check_non_empty(&self.org, "Organization")?;
        check_non_empty(&self.bucket, "Bucket")?;
        if lines.is_empty() {
            return Ok(());
        }
        let key = BatchKey::new(self.org.as_str(), self.bucket.as_str(), precision);
        debug!(org = %key.org, bucket = %key.bucket, lines = lines.len(), "Writing records");
        self.transport.write(&key, &lines.join("\n")).await
    }
}
