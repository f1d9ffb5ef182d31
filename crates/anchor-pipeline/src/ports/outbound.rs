//! # Outbound Ports (SPI)
//!
//! Dependencies the pipeline needs from its environment: the event store,
//! the time-series store, the audit log, the ledger and a clock.

use async_trait::async_trait;
use shared_types::time::{end_of_millis, Timestamp};
use shared_types::{
    AuditId, AuditRecord, Digest, EventRecord, RawReading, StoreError, TelemetryReading, Window,
};

/// Read access to event records.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Up to `limit` records of `event.item_id` stored before `event`, most
    /// recently stored first.
    ///
    /// The answer depends only on what was stored ahead of `event`, so a
    /// redelivered or replayed event sees the same records. When `event` is
    /// not stored yet, every record of the item counts as earlier.
    async fn find_preceding(
        &self,
        event: &EventRecord,
        limit: usize,
    ) -> Result<Vec<EventRecord>, StoreError>;
}

/// Window telemetry query.
///
/// Bounds are inclusive to the millisecond, like [`Window`]. Readings match
/// when their location is any of `locations`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryQuery {
    pub from_time: Timestamp,
    pub to_time: Timestamp,
    pub locations: Vec<String>,
}

impl TelemetryQuery {
    pub fn for_window(window: &Window) -> Self {
        Self {
            from_time: window.from_time,
            to_time: window.to_time,
            locations: window.locations().into_iter().map(String::from).collect(),
        }
    }

    pub fn matches(&self, timestamp: &Timestamp, location: &str) -> bool {
        *timestamp >= self.from_time
            && *timestamp <= end_of_millis(self.to_time)
            && self.locations.iter().any(|l| l == location)
    }
}

/// Time-series store holding the sensor readings.
#[async_trait]
pub trait SensorStore: Send + Sync {
    /// Readings in the window, ordered by timestamp ascending.
    async fn query_window(&self, query: &TelemetryQuery) -> Result<Vec<RawReading>, StoreError>;

    /// Upsert every reading with `digest` attached, all other fields
    /// unchanged. Returns the number of points written.
    async fn write_digest(
        &self,
        readings: &[TelemetryReading],
        digest: &Digest,
    ) -> Result<usize, StoreError>;
}

/// Append-only audit log.
#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn insert(&self, record: &AuditRecord) -> Result<AuditId, StoreError>;

    /// All records for one item, in insertion order.
    async fn find_by_item(&self, item_id: &str) -> Result<Vec<AuditRecord>, StoreError>;

    /// Every record, in insertion order.
    async fn scan(&self) -> Result<Vec<AuditRecord>, StoreError>;
}

/// Ledger response to one submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnchorAck {
    /// Ledger acknowledged the digest.
    Accepted,
    /// Ledger answered and refused. Not retried.
    Rejected { reason: String },
    /// Transport failure, timeout or server error. Retried with backoff.
    Unavailable { reason: String },
}

impl AnchorAck {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
            Self::Rejected { .. } => "rejected",
            Self::Unavailable { .. } => "unavailable",
        }
    }
}

/// External tamper-evident ledger.
#[async_trait]
pub trait LedgerAnchor: Send + Sync {
    /// Submit one digest. Never panics, never errors: every failure is an ack.
    async fn submit(&self, digest: &Digest) -> AnchorAck;
}

/// Abstract time source.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        chrono::Utc::now()
    }
}
