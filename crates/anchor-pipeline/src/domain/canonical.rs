//! # Canonicalizer
//!
//! Turns the readings of one window into the exact byte sequence that gets
//! hashed.
//!
//! ## Canonical Form
//!
//! A JSON array, no insignificant whitespace, one object per reading in
//! fetch order. Object keys appear in this fixed order:
//!
//! ```text
//! location_id, sensor_id, sensor_make, timestamp, humidity, temperature
//! ```
//!
//! - `timestamp` is RFC 3339 UTC at nanosecond precision with a `Z` suffix.
//! - Measurements use the shortest round-trip float representation.
//! - Tags and any previously written digest are excluded.
//!
//! Order is part of the document: the same readings in a different order
//! produce a different digest.

use serde::Serialize;
use shared_types::time::format_nanos;
use shared_types::{Digest, MalformedReadingError, RawReading, TelemetryReading};
use thiserror::Error;

/// One reading as it appears in the canonical document.
///
/// Field declaration order is the serialized key order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanonicalEntry {
    pub location_id: String,
    pub sensor_id: String,
    pub sensor_make: String,
    pub timestamp: String,
    pub humidity: f64,
    pub temperature: f64,
}

impl From<&TelemetryReading> for CanonicalEntry {
    fn from(reading: &TelemetryReading) -> Self {
        Self {
            location_id: reading.location_id.clone(),
            sensor_id: reading.sensor_id.clone(),
            sensor_make: reading.sensor_make.clone(),
            timestamp: format_nanos(&reading.timestamp),
            humidity: reading.humidity,
            temperature: reading.temperature,
        }
    }
}

/// Ordered canonical entries of one window.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct CanonicalDocument {
    entries: Vec<CanonicalEntry>,
}

impl CanonicalDocument {
    pub fn from_readings(readings: &[TelemetryReading]) -> Self {
        Self {
            entries: readings.iter().map(CanonicalEntry::from).collect(),
        }
    }

    pub fn entries(&self) -> &[CanonicalEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The exact bytes that are hashed.
    pub fn to_bytes(&self) -> Result<Vec<u8>, CanonicalizeError> {
        serde_json::to_vec(self).map_err(|e| CanonicalizeError::Encoding(e.to_string()))
    }

    /// SHA-256 of [`Self::to_bytes`].
    pub fn digest(&self) -> Result<Digest, CanonicalizeError> {
        self.to_bytes().map(|bytes| Digest::sha256(&bytes))
    }
}

/// Canonicalization failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CanonicalizeError {
    #[error(transparent)]
    Malformed(#[from] MalformedReadingError),

    #[error("{0}")]
    Encoding(String),
}

/// Validated readings plus their canonical document and digest.
#[derive(Debug, Clone, PartialEq)]
pub struct Canonicalized {
    pub readings: Vec<TelemetryReading>,
    pub document: CanonicalDocument,
    pub digest: Digest,
}

/// Validate every row, in order. The first malformed row fails the batch.
pub fn validate_readings(
    raw: &[RawReading],
) -> Result<Vec<TelemetryReading>, MalformedReadingError> {
    raw.iter()
        .enumerate()
        .map(|(index, row)| row.validate(index))
        .collect()
}

/// Canonicalize and hash the readings of one window.
///
/// Deterministic: identical input sequences always yield identical bytes and
/// digest. An empty slice yields the document `[]`.
pub fn canonicalize(raw: &[RawReading]) -> Result<Canonicalized, CanonicalizeError> {
    let readings = validate_readings(raw)?;
    let document = CanonicalDocument::from_readings(&readings);
    let digest = document.digest()?;
    Ok(Canonicalized {
        readings,
        document,
        digest,
    })
}
