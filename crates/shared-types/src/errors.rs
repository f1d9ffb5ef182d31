//! # Error Types
//!
//! Defines error types used across crates.

use std::fmt;
use thiserror::Error;

use crate::time::{format_millis, Timestamp};

/// A required field of a telemetry reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadingField {
    Timestamp,
    LocationId,
    SensorId,
    SensorMake,
    Temperature,
    Humidity,
}

impl ReadingField {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timestamp => "timestamp",
            Self::LocationId => "location_id",
            Self::SensorId => "sensor_id",
            Self::SensorMake => "sensor_make",
            Self::Temperature => "temperature",
            Self::Humidity => "humidity",
        }
    }
}

impl fmt::Display for ReadingField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a reading field failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MalformedReason {
    /// Field absent from the row.
    Missing,
    /// String field present but empty.
    Empty,
    /// NaN or infinite measurement.
    NonFinite,
}

impl fmt::Display for MalformedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing => f.write_str("missing"),
            Self::Empty => f.write_str("empty"),
            Self::NonFinite => f.write_str("not a finite number"),
        }
    }
}

/// A reading could not be turned into a canonical entry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed reading #{index}: field `{field}` is {reason}")]
pub struct MalformedReadingError {
    /// Position of the reading in the fetched sequence.
    pub index: usize,
    pub field: ReadingField,
    pub reason: MalformedReason,
}

/// Predecessor event is later than the triggering event.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "inverted window: from {} is after to {}",
    format_millis(.from_time),
    format_millis(.to_time)
)]
pub struct InvertedWindowError {
    pub from_time: Timestamp,
    pub to_time: Timestamp,
}

/// Failure talking to one of the external stores.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Store could not be reached or timed out. Worth retrying.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Store answered but refused the request.
    #[error("store rejected request: {0}")]
    Rejected(String),

    /// Stored document could not be decoded into a typed record.
    #[error("corrupt document: {0}")]
    Corrupt(String),

    /// Batch write stopped partway. Points already written keep their digest.
    #[error("partial batch write: {written} of {total} points persisted")]
    PartialWrite { written: usize, total: usize },
}

impl StoreError {
    /// Transient errors may succeed on a later attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Hex digest string could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DigestParseError {
    #[error("digest must be 64 hex chars, got {0}")]
    Length(usize),

    #[error("invalid hex: {0}")]
    Hex(String),
}
