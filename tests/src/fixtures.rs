//! Shared fixtures: one item moving from location A to B with three readings
//! recorded in between.

use shared_types::time::{parse_rfc3339, Timestamp};
use shared_types::{EventRecord, RawReading, ReadingTags};

pub const LOC_A: &str = "urn:epc:id:sgln:A";
pub const LOC_B: &str = "urn:epc:id:sgln:B";
pub const LOC_C: &str = "urn:epc:id:sgln:C";
pub const ITEM: &str = "urn:epc:id:sgtin:0614141.107346.2017";

/// Digest of the three in-window readings of [`transit_readings`].
pub const TRANSIT_DIGEST: &str =
    "1e9284395d53986af769d03f768177658a7621ce1ee1db724a5c38eef542cd53";

pub fn ts(value: &str) -> Timestamp {
    parse_rfc3339(value).unwrap()
}

pub fn event(id: &str, location: &str, time: &str) -> EventRecord {
    EventRecord {
        event_id: id.into(),
        item_id: ITEM.into(),
        location_id: location.into(),
        event_time: ts(time),
    }
}

pub fn reading(
    location: &str,
    sensor: &str,
    make: &str,
    time: &str,
    temperature: f64,
    humidity: f64,
) -> RawReading {
    RawReading {
        timestamp: Some(ts(time)),
        location_id: Some(location.into()),
        sensor_id: Some(sensor.into()),
        sensor_make: Some(make.into()),
        temperature: Some(temperature),
        humidity: Some(humidity),
        tags: ReadingTags::default(),
        digest: None,
    }
}

/// Readings between A at 00:00 and B at 00:05, plus one after the window.
pub fn transit_readings() -> Vec<RawReading> {
    vec![
        reading(LOC_A, "s-1", "Bosch", "2024-01-01T00:01:00Z", 21.5, 40.25),
        reading(LOC_A, "s-1", "Bosch", "2024-01-01T00:02:00Z", 21.75, 41.0),
        reading(LOC_B, "s-2", "Sensirion", "2024-01-01T00:04:00Z", -3.125, 38.5),
        reading(LOC_B, "s-2", "Sensirion", "2024-01-01T00:06:00Z", 0.0, 0.0),
    ]
}
