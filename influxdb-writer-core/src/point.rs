use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Offset as _, TimeZone};
use tracing::warn;

use crate::default_tags::ResolvedTags;
use crate::util::check_non_empty;
use crate::{Encode, FieldValue, TimestampPrecision, WriteError, line_protocol};

/// One sample to be written.
///
/// Points are values: every setter returns a new `Point` and leaves the
/// receiver untouched, so a point may be shared with the writer while further
/// points are derived from it.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    measurement_name: String,
    tags: BTreeMap<String, String>,
    fields: BTreeMap<String, FieldValue>,
    time: Option<i128>,
    precision: TimestampPrecision,
}

impl Point {
    pub fn measurement(measurement_name: &str) -> Result<Self, WriteError> {
        check_non_empty(measurement_name, "Measurement name")?;
        Ok(Self {
            measurement_name: measurement_name.to_string(),
            tags: BTreeMap::new(),
            fields: BTreeMap::new(),
            time: None,
            precision: TimestampPrecision::Nanoseconds,
        })
    }

    pub fn builder(measurement_name: &str) -> PointBuilder {
        PointBuilder::measurement(measurement_name)
    }

    pub fn get_measurement(&self) -> &str {
        &self.measurement_name
    }

    /// Sets a tag. A value that is empty after trimming removes the tag.
    pub fn tag(&self, key: &str, value: &str) -> Result<Point, WriteError> {
        let mut point = self.clone();
        put_tag(&mut point.tags, &point.measurement_name, key, value)?;
        Ok(point)
    }

    pub fn remove_tag(&self, key: &str) -> Point {
        let mut point = self.clone();
        point.tags.remove(key);
        point
    }

    pub fn get_tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    pub fn has_tag(&self, key: &str) -> bool {
        self.tags.contains_key(key)
    }

    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }

    pub fn field<T>(&self, key: &str, value: T) -> Result<Point, WriteError>
    where
        T: Encode,
    {
        let mut point = self.clone();
        put_field(&mut point.fields, key, value.encode())?;
        Ok(point)
    }

    pub fn remove_field(&self, key: &str) -> Point {
        let mut point = self.clone();
        point.fields.remove(key);
        point
    }

    pub fn get_field(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    pub fn fields(&self) -> &BTreeMap<String, FieldValue> {
        &self.fields
    }

    /// Whether at least one field survives encoding.
    pub fn has_fields(&self) -> bool {
        self.fields.values().any(FieldValue::is_defined)
    }

    /// Sets the timestamp as a count of `precision` units since the epoch.
    pub fn timestamp(&self, time: i128, precision: TimestampPrecision) -> Point {
        let mut point = self.clone();
        point.time = Some(time);
        point.precision = precision;
        point
    }

    pub fn timestamp_duration(&self, since_epoch: Duration, precision: TimestampPrecision) -> Point {
        self.timestamp(precision.from_duration(since_epoch), precision)
    }

    /// Sets the timestamp from a date time, which must carry a UTC offset.
    pub fn timestamp_datetime<Tz>(&self, time: &DateTime<Tz>, precision: TimestampPrecision) -> Result<Point, WriteError>
    where
        Tz: TimeZone,
    {
        Ok(self.timestamp(utc_timestamp(time, precision)?, precision))
    }

    pub fn get_timestamp(&self) -> Option<i128> {
        self.time
    }

    /// Precision of the timestamp; also selects the batch the point is written with.
    pub fn precision(&self) -> TimestampPrecision {
        self.precision
    }

    pub fn to_line_protocol(&self, default_tags: Option<&ResolvedTags>) -> String {
        line_protocol::encode(self, self.precision, default_tags)
    }
}

/// Mutable counterpart of [`Point`] for building a point in one pass.
///
/// Validation errors are kept and reported by [`PointBuilder::build`].
#[derive(Debug)]
pub struct PointBuilder {
    measurement_name: String,
    tags: BTreeMap<String, String>,
    fields: BTreeMap<String, FieldValue>,
    time: Option<i128>,
    precision: TimestampPrecision,
    error: Option<WriteError>,
}

impl PointBuilder {
    pub fn measurement(measurement_name: &str) -> Self {
        Self {
            measurement_name: measurement_name.to_string(),
            tags: BTreeMap::new(),
            fields: BTreeMap::new(),
            time: None,
            precision: TimestampPrecision::Nanoseconds,
            error: check_non_empty(measurement_name, "Measurement name").err(),
        }
    }

    fn record(&mut self, result: Result<(), WriteError>) {
        if let Err(e) = result {
            self.error.get_or_insert(e);
        }
    }

    pub fn tag(mut self, key: &str, value: &str) -> Self {
        let result = put_tag(&mut self.tags, &self.measurement_name, key, value);
        self.record(result);
        self
    }

    pub fn field<T>(mut self, key: &str, value: T) -> Self
    where
        T: Encode,
    {
        let result = put_field(&mut self.fields, key, value.encode());
        self.record(result);
        self
    }

    pub fn timestamp(mut self, time: i128, precision: TimestampPrecision) -> Self {
        self.time = Some(time);
        self.precision = precision;
        self
    }

    pub fn timestamp_duration(self, since_epoch: Duration, precision: TimestampPrecision) -> Self {
        self.timestamp(precision.from_duration(since_epoch), precision)
    }

    pub fn timestamp_datetime<Tz>(mut self, time: &DateTime<Tz>, precision: TimestampPrecision) -> Self
    where
        Tz: TimeZone,
    {
        match utc_timestamp(time, precision) {
            Ok(time) => self.timestamp(time, precision),
            Err(e) => {
                self.record(Err(e));
                self
            }
        }
    }

    pub fn has_fields(&self) -> bool {
        self.fields.values().any(FieldValue::is_defined)
    }

    pub fn build(self) -> Result<Point, WriteError> {
        if let Some(e) = self.error {
            return Err(e);
        }
        Ok(Point {
            measurement_name: self.measurement_name,
            tags: self.tags,
            fields: self.fields,
            time: self.time,
            precision: self.precision,
        })
    }
}

fn put_tag(tags: &mut BTreeMap<String, String>, measurement: &str, key: &str, value: &str) -> Result<(), WriteError> {
    check_non_empty(key, "Tag name")?;
    if value.trim().is_empty() {
        if tags.remove(key).is_some() {
            warn!(tag = key, measurement, "Empty tag value removes the tag");
        } else {
            warn!(tag = key, measurement, "Empty tag value has no effect");
        }
        return Ok(());
    }
    tags.insert(key.to_string(), value.to_string());
    Ok(())
}

fn put_field(fields: &mut BTreeMap<String, FieldValue>, key: &str, value: FieldValue) -> Result<(), WriteError> {
    check_non_empty(key, "Field name")?;
    fields.insert(key.to_string(), value);
    Ok(())
}

fn utc_timestamp<Tz>(time: &DateTime<Tz>, precision: TimestampPrecision) -> Result<i128, WriteError>
where
    Tz: TimeZone,
{
    if time.offset().fix().local_minus_utc() != 0 {
        return Err(WriteError::invalid_argument(format!(
            "Timestamps must be specified as UTC, got offset {}",
            time.offset().fix()
        )));
    }
    Ok(precision.from_datetime(time))
}

/// Conversion of a user type into a [`Point`].
pub trait ToPoint {
    /// `precision` is the precision any timestamp of the value is expressed in.
    fn to_point(self, precision: TimestampPrecision) -> Result<Point, WriteError>;
}

/// A point already carries its precision; the argument is ignored.
impl ToPoint for Point {
    fn to_point(self, _precision: TimestampPrecision) -> Result<Point, WriteError> {
        Ok(self)
    }
}
