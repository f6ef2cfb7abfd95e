//! Line protocol serialization.
//!
//! `<measurement>[,<tag_key>=<tag_value>...] <field_key>=<field_value>[,...] [<timestamp>]`

use crate::default_tags::ResolvedTags;
use crate::{Point, TimestampPrecision};

/// Escapes a measurement name (`escape_equals == false`) or a tag key, tag
/// value or field key (`escape_equals == true`).
pub(crate) fn escape_key(buf: &mut String, key: &str, escape_equals: bool) {
    for c in key.chars() {
        match c {
            '\n' => buf.push_str("\\n"),
            '\r' => buf.push_str("\\r"),
            '\t' => buf.push_str("\\t"),
            ' ' | ',' => {
                buf.push('\\');
                buf.push(c);
            }
            '=' if escape_equals => buf.push_str("\\="),
            _ => buf.push(c),
        }
    }
}

pub(crate) fn escape_string_value(buf: &mut String, value: &str) {
    for c in value.chars() {
        if c == '\\' || c == '"' {
            buf.push('\\');
        }
        buf.push(c);
    }
}

/// Encodes `point` with its timestamp expressed in `precision`.
///
/// Returns an empty string when the point has no field left after dropping
/// nulls and non-finite floats. Default tags only fill keys the point does not
/// carry itself.
pub fn encode(point: &Point, precision: TimestampPrecision, default_tags: Option<&ResolvedTags>) -> String {
    let mut buf = String::with_capacity(64);

    escape_key(&mut buf, point.get_measurement(), false);

    let own_tags = point.tags();
    let defaults = default_tags
        .into_iter()
        .flat_map(|tags| tags.iter())
        .filter(|(key, _)| !own_tags.contains_key(*key));

    let mut merged: Vec<(&str, &str)> = own_tags
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .chain(defaults.map(|(k, v)| (k.as_str(), v.as_str())))
        .filter(|(k, v)| !k.is_empty() && !v.is_empty())
        .collect();
    merged.sort_unstable_by(|a, b| a.0.cmp(b.0));

    for (key, value) in merged {
        buf.push(',');
        escape_key(&mut buf, key, true);
        buf.push('=');
        escape_key(&mut buf, value, true);
    }
    buf.push(' ');

    let mut appended = false;
    for (key, value) in point.fields().iter().filter(|(_, v)| v.is_defined()) {
        if appended {
            buf.push(',');
        }
        escape_key(&mut buf, key, true);
        buf.push('=');
        value.serialize(&mut buf);
        appended = true;
    }
    if !appended {
        return String::new();
    }

    if let Some(time) = point.get_timestamp() {
        buf.push(' ');
        buf.push_str(&precision.convert(time, point.precision()).to_string());
    }

    buf
}
