//! # Core Domain Entities
//!
//! ## Clusters
//!
//! - **Events**: `EventRecord`, `Window`
//! - **Telemetry**: `RawReading`, `TelemetryReading`, `ReadingTags`
//! - **Audit**: `AuditRecord`, `AnchorStatus`, `AuditId`

use serde::{Deserialize, Serialize};

use crate::digest::Digest;
use crate::errors::{InvertedWindowError, MalformedReadingError, MalformedReason, ReadingField};
use crate::time::{format_millis, serde_millis, truncate_millis, Timestamp};

// =============================================================================
// CLUSTER A: EVENTS
// =============================================================================

/// An immutable fact about a tracked item crossing a location boundary.
///
/// Created upstream and read-only here. The record stored just before an
/// event of the same `item_id` is its predecessor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Document store identifier of the record.
    pub event_id: String,
    /// Stable identifier of the tracked entity (EPC).
    pub item_id: String,
    /// Business location where the event was observed.
    pub location_id: String,
    pub event_time: Timestamp,
}

/// Interval between two consecutive event records of one item.
///
/// Bounds are held at millisecond precision and are inclusive to the
/// millisecond: a reading at `05.000000500Z` belongs to a window ending at
/// `05.000Z`, one at `05.001Z` does not. `from_time <= to_time` always holds
/// for a constructed window.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Window {
    pub prev_location: String,
    pub present_location: String,
    #[serde(with = "serde_millis")]
    pub from_time: Timestamp,
    #[serde(with = "serde_millis")]
    pub to_time: Timestamp,
}

impl Window {
    /// Build a window, rejecting negative durations.
    pub fn new(
        prev_location: impl Into<String>,
        present_location: impl Into<String>,
        from_time: Timestamp,
        to_time: Timestamp,
    ) -> Result<Self, InvertedWindowError> {
        let from_time = truncate_millis(from_time);
        let to_time = truncate_millis(to_time);
        if from_time > to_time {
            return Err(InvertedWindowError { from_time, to_time });
        }
        Ok(Self {
            prev_location: prev_location.into(),
            present_location: present_location.into(),
            from_time,
            to_time,
        })
    }

    /// Window between a predecessor event and the event that follows it.
    pub fn between(
        predecessor: &EventRecord,
        current: &EventRecord,
    ) -> Result<Self, InvertedWindowError> {
        Self::new(
            predecessor.location_id.clone(),
            current.location_id.clone(),
            predecessor.event_time,
            current.event_time,
        )
    }

    /// Locations whose readings belong to this window, without duplicates.
    pub fn locations(&self) -> Vec<&str> {
        if self.prev_location == self.present_location {
            vec![self.prev_location.as_str()]
        } else {
            vec![self.prev_location.as_str(), self.present_location.as_str()]
        }
    }

    pub fn from_time_str(&self) -> String {
        format_millis(&self.from_time)
    }

    pub fn to_time_str(&self) -> String {
        format_millis(&self.to_time)
    }
}

// =============================================================================
// CLUSTER B: TELEMETRY
// =============================================================================

/// Descriptive tags carried through unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadingTags {
    pub city: Option<String>,
    pub country: Option<String>,
    pub company: Option<String>,
    pub site: Option<String>,
}

/// A row as returned by the time-series store. Every field may be absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawReading {
    pub timestamp: Option<Timestamp>,
    pub location_id: Option<String>,
    pub sensor_id: Option<String>,
    pub sensor_make: Option<String>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    #[serde(default)]
    pub tags: ReadingTags,
    /// Digest written back by an earlier run, if any.
    pub digest: Option<String>,
}

impl RawReading {
    /// Validate into a typed reading. `index` is the position in the fetched
    /// sequence and is reported on failure.
    pub fn validate(&self, index: usize) -> Result<TelemetryReading, MalformedReadingError> {
        let malformed = |field, reason| MalformedReadingError {
            index,
            field,
            reason,
        };
        let text = |value: &Option<String>, field| match value {
            None => Err(malformed(field, MalformedReason::Missing)),
            Some(v) if v.is_empty() => Err(malformed(field, MalformedReason::Empty)),
            Some(v) => Ok(v.clone()),
        };
        let number = |value: Option<f64>, field| match value {
            None => Err(malformed(field, MalformedReason::Missing)),
            Some(v) if !v.is_finite() => Err(malformed(field, MalformedReason::NonFinite)),
            Some(v) => Ok(v),
        };

        let timestamp = self
            .timestamp
            .ok_or_else(|| malformed(ReadingField::Timestamp, MalformedReason::Missing))?;

        Ok(TelemetryReading {
            timestamp,
            location_id: text(&self.location_id, ReadingField::LocationId)?,
            sensor_id: text(&self.sensor_id, ReadingField::SensorId)?,
            sensor_make: text(&self.sensor_make, ReadingField::SensorMake)?,
            temperature: number(self.temperature, ReadingField::Temperature)?,
            humidity: number(self.humidity, ReadingField::Humidity)?,
            tags: self.tags.clone(),
            digest: self.digest.clone(),
        })
    }
}

/// A validated point sample from a sensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryReading {
    pub timestamp: Timestamp,
    pub location_id: String,
    pub sensor_id: String,
    pub sensor_make: String,
    pub temperature: f64,
    pub humidity: f64,
    pub tags: ReadingTags,
    /// Digest field as currently stored. Not part of the canonical document.
    pub digest: Option<String>,
}

impl TelemetryReading {
    /// Natural key in the time-series store.
    pub fn natural_key(&self) -> (Timestamp, &str) {
        (self.timestamp, self.sensor_id.as_str())
    }

    /// Copy of this reading carrying `digest`, all other fields unchanged.
    pub fn with_digest(&self, digest: &Digest) -> Self {
        Self {
            digest: Some(digest.to_hex()),
            ..self.clone()
        }
    }
}

impl From<&TelemetryReading> for RawReading {
    fn from(reading: &TelemetryReading) -> Self {
        Self {
            timestamp: Some(reading.timestamp),
            location_id: Some(reading.location_id.clone()),
            sensor_id: Some(reading.sensor_id.clone()),
            sensor_make: Some(reading.sensor_make.clone()),
            temperature: Some(reading.temperature),
            humidity: Some(reading.humidity),
            tags: reading.tags.clone(),
            digest: reading.digest.clone(),
        }
    }
}

// =============================================================================
// CLUSTER C: AUDIT
// =============================================================================

/// Identifier assigned by the document store to an audit record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AuditId(pub String);

impl std::fmt::Display for AuditId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Whether the ledger acknowledged the digest when the record was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchorStatus {
    Anchored,
    /// Ledger unavailable or refused; digest preserved locally for resubmission.
    Skipped,
}

/// Persisted proof that a window's telemetry was hashed (and, if
/// `Anchored`, accepted by the ledger). Append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub item_id: String,
    pub digest: Digest,
    pub window: Window,
    pub anchor_status: AnchorStatus,
    pub recorded_at: Timestamp,
}

impl AuditRecord {
    /// Key under which duplicate records collapse.
    pub fn dedup_key(&self) -> (&str, &Digest) {
        (self.item_id.as_str(), &self.digest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::parse_rfc3339;

    fn event(location: &str, time: &str) -> EventRecord {
        EventRecord {
            event_id: format!("ev-{location}"),
            item_id: "urn:epc:id:sgtin:0614141.107346.2018".to_string(),
            location_id: location.to_string(),
            event_time: parse_rfc3339(time).unwrap(),
        }
    }

    fn complete_raw() -> RawReading {
        RawReading {
            timestamp: Some(parse_rfc3339("2024-01-01T00:01:00Z").unwrap()),
            location_id: Some("A".into()),
            sensor_id: Some("s-1".into()),
            sensor_make: Some("Bosch".into()),
            temperature: Some(21.5),
            humidity: Some(40.25),
            tags: ReadingTags {
                city: Some("Bremen".into()),
                ..Default::default()
            },
            digest: None,
        }
    }

    #[test]
    fn test_window_between_events() {
        let prev = event("A", "2024-01-01T00:00:00.000Z");
        let next = event("B", "2024-01-01T00:05:00.000Z");
        let window = Window::between(&prev, &next).unwrap();

        assert_eq!(window.prev_location, "A");
        assert_eq!(window.present_location, "B");
        assert_eq!(window.from_time_str(), "2024-01-01T00:00:00.000Z");
        assert_eq!(window.to_time_str(), "2024-01-01T00:05:00.000Z");
    }

    #[test]
    fn test_window_rejects_inversion() {
        let prev = event("A", "2024-01-01T00:05:00Z");
        let next = event("B", "2024-01-01T00:00:00Z");
        assert!(Window::between(&prev, &next).is_err());
    }

    #[test]
    fn test_window_zero_duration_allowed() {
        let prev = event("A", "2024-01-01T00:05:00Z");
        let next = event("A", "2024-01-01T00:05:00Z");
        let window = Window::between(&prev, &next).unwrap();
        assert_eq!(window.locations(), vec!["A"]);
    }

    #[test]
    fn test_window_serializes_millis() {
        let window = Window::between(
            &event("A", "2024-01-01T00:00:00Z"),
            &event("B", "2024-01-01T00:05:00Z"),
        )
        .unwrap();
        let json = serde_json::to_value(&window).unwrap();
        assert_eq!(json["from_time"], "2024-01-01T00:00:00.000Z");
        assert_eq!(json["to_time"], "2024-01-01T00:05:00.000Z");
    }

    #[test]
    fn test_raw_reading_validates() {
        let reading = complete_raw().validate(0).unwrap();
        assert_eq!(reading.sensor_id, "s-1");
        assert_eq!(reading.tags.city.as_deref(), Some("Bremen"));
    }

    #[test]
    fn test_raw_reading_missing_field() {
        let raw = RawReading {
            sensor_make: None,
            ..complete_raw()
        };
        let err = raw.validate(4).unwrap_err();
        assert_eq!(err.index, 4);
        assert_eq!(err.field, ReadingField::SensorMake);
        assert_eq!(err.reason, MalformedReason::Missing);
    }

    #[test]
    fn test_raw_reading_non_finite() {
        let raw = RawReading {
            temperature: Some(f64::NAN),
            ..complete_raw()
        };
        let err = raw.validate(0).unwrap_err();
        assert_eq!(err.field, ReadingField::Temperature);
        assert_eq!(err.reason, MalformedReason::NonFinite);
    }

    #[test]
    fn test_with_digest_preserves_fields() {
        let reading = complete_raw().validate(0).unwrap();
        let digest = Digest::sha256(b"doc");
        let stamped = reading.with_digest(&digest);
        assert_eq!(stamped.digest, Some(digest.to_hex()));
        assert_eq!(stamped.temperature, reading.temperature);
        assert_eq!(stamped.tags, reading.tags);
    }
}
