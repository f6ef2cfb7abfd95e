#![cfg(feature = "derive")]

use chrono::{DateTime, Utc};
use influxdb_writer::{TimestampPrecision, ToPoint, WriteError};

#[derive(ToPoint)]
#[influxdb(measurement = "weather")]
struct Reading {
    #[influxdb(tag)]
    location: String,
    #[influxdb(tag, rename = "sensor")]
    sensor_id: u32,
    temperature: f64,
    #[influxdb(rename = "rh")]
    humidity: Option<i64>,
    #[influxdb(ignore)]
    #[allow(dead_code)]
    note: String,
    time: DateTime<Utc>,
}

#[derive(ToPoint)]
struct CpuLoad {
    #[influxdb(tag)]
    host: &'static str,
    load: f32,
    #[influxdb(time)]
    taken_at: DateTime<Utc>,
    time: i64,
}

#[derive(ToPoint)]
struct Heartbeat {
    alive: bool,
}

fn at(seconds: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(seconds, 0).unwrap()
}

#[test]
fn derives_tags_fields_and_time() {
    let reading = Reading {
        location: "north field".to_string(),
        sensor_id: 7,
        temperature: 21.5,
        humidity: Some(40),
        note: "not written".to_string(),
        time: at(1_700_000_000),
    };

    let point = reading.to_point(TimestampPrecision::Seconds).unwrap();

    assert_eq!(point.precision(), TimestampPrecision::Seconds);
    assert_eq!(
        point.to_line_protocol(None),
        "weather,location=north\\ field,sensor=7 rh=40i,temperature=21.5 1700000000"
    );
}

#[test]
fn explicit_time_attribute_wins_over_time_name() {
    let load = CpuLoad {
        host: "server-1",
        load: 0.25,
        taken_at: at(2),
        time: 99,
    };

    let point = load.to_point(TimestampPrecision::Milliseconds).unwrap();

    assert_eq!(point.to_line_protocol(None), "cpu_load,host=server-1 load=0.25,time=99i 2000");
}

#[test]
fn measurement_without_time_has_no_timestamp() {
    let point = Heartbeat { alive: true }.to_point(TimestampPrecision::Nanoseconds).unwrap();

    assert_eq!(point.get_timestamp(), None);
    assert_eq!(point.to_line_protocol(None), "heartbeat alive=true");
}

#[test]
fn empty_tag_value_is_dropped() {
    let reading = Reading {
        location: String::new(),
        sensor_id: 1,
        temperature: 1.0,
        humidity: None,
        note: String::new(),
        time: at(0),
    };

    let point = reading.to_point(TimestampPrecision::Seconds).unwrap();

    assert!(!point.has_tag("location"));
    assert_eq!(point.to_line_protocol(None), "weather,sensor=1 temperature=1 0");
}

#[test]
fn converts_many_values() -> Result<(), WriteError> {
    let points = [Heartbeat { alive: false }, Heartbeat { alive: true }]
        .into_iter()
        .map(|h| h.to_point(TimestampPrecision::Seconds))
        .collect::<Result<Vec<_>, _>>()?;
    assert_eq!(points.len(), 2);
    Ok(())
}
