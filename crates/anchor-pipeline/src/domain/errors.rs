//! # Domain Errors
//!
//! Error types for the anchoring pipeline.
//!
//! "Nothing to do" is not an error: a first sighting or an empty window is a
//! [`crate::domain::Stage::Skip`]. Everything here aborts the current run.

use shared_types::{InvertedWindowError, MalformedReadingError, StoreError};
use thiserror::Error;

use super::canonical::CanonicalizeError;

/// How an error should be treated by the orchestrator and the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Bad data in one event or window. Abort the run, log at error level.
    MalformedInput,
    /// Store or endpoint temporarily unreachable.
    Transient,
    /// Store refused the request or returned undecodable data.
    Fatal,
}

/// Errors that abort a single pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    #[error(transparent)]
    MalformedReading(#[from] MalformedReadingError),

    #[error(transparent)]
    InvertedWindow(#[from] InvertedWindowError),

    /// Canonical document could not be encoded.
    #[error("canonical encoding failed: {0}")]
    Encoding(String),

    /// Predecessor lookup failed.
    #[error("event store query failed: {0}")]
    EventStore(StoreError),

    /// Window telemetry query failed.
    #[error("telemetry query failed: {0}")]
    SensorQuery(StoreError),

    /// Digest could not be written onto the readings. No audit record exists.
    #[error("telemetry writeback failed: {0}")]
    Writeback(StoreError),

    /// Readings carry the digest but the audit record was not written.
    #[error("audit record insert failed: {0}")]
    AuditInsert(StoreError),

    #[error("audit log read failed: {0}")]
    AuditRead(StoreError),
}

impl From<CanonicalizeError> for PipelineError {
    fn from(err: CanonicalizeError) -> Self {
        match err {
            CanonicalizeError::Malformed(e) => Self::MalformedReading(e),
            CanonicalizeError::Encoding(msg) => Self::Encoding(msg),
        }
    }
}

impl PipelineError {
    /// Classify for logging and retry decisions.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::MalformedReading(_) | Self::InvertedWindow(_) => ErrorClass::MalformedInput,
            Self::Encoding(_) => ErrorClass::Fatal,
            Self::EventStore(e)
            | Self::SensorQuery(e)
            | Self::Writeback(e)
            | Self::AuditInsert(e)
            | Self::AuditRead(e) => {
                if e.is_transient() {
                    ErrorClass::Transient
                } else {
                    ErrorClass::Fatal
                }
            }
        }
    }

    /// Short machine-readable label.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MalformedReading(_) => "malformed_reading",
            Self::InvertedWindow(_) => "inverted_window",
            Self::Encoding(_) => "encoding",
            Self::EventStore(_) => "event_store",
            Self::SensorQuery(_) => "sensor_query",
            Self::Writeback(_) => "writeback",
            Self::AuditInsert(_) => "audit_insert",
            Self::AuditRead(_) => "audit_read",
        }
    }
}
