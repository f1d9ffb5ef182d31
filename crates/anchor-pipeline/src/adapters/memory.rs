//! # In-Memory Adapters
//!
//! Volatile implementations of every outbound port, for tests and local
//! runs. Failure injection hooks let tests exercise the error paths.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use shared_types::time::Timestamp;
use shared_types::{
    AuditId, AuditRecord, Digest, EventRecord, RawReading, StoreError, TelemetryReading,
};

use crate::ports::{
    AnchorAck, AuditStore, Clock, EventStore, LedgerAnchor, SensorStore, TelemetryQuery,
};

// =============================================================================
// EVENT STORE
// =============================================================================

/// Event records held in insertion order.
#[derive(Default)]
pub struct InMemoryEventStore {
    records: RwLock<Vec<EventRecord>>,
    unavailable: AtomicBool,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: EventRecord) {
        self.records.write().push(record);
    }

    /// Make every query fail with `StoreError::Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn find_preceding(
        &self,
        event: &EventRecord,
        limit: usize,
    ) -> Result<Vec<EventRecord>, StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("event store offline".into()));
        }

        let records = self.records.read();
        let history: Vec<&EventRecord> = records
            .iter()
            .filter(|r| r.item_id == event.item_id)
            .collect();
        let stored_at = history
            .iter()
            .position(|r| r.event_id == event.event_id)
            .unwrap_or(history.len());

        Ok(history[..stored_at]
            .iter()
            .rev()
            .take(limit)
            .map(|r| (*r).clone())
            .collect())
    }
}

// =============================================================================
// SENSOR STORE
// =============================================================================

/// Time-series rows with upsert on `(timestamp, sensor_id)`.
#[derive(Default)]
pub struct InMemorySensorStore {
    rows: RwLock<Vec<RawReading>>,
    queries: AtomicUsize,
    write_batches: AtomicUsize,
    /// Fail the next batch write after this many points.
    fail_write_after: Mutex<Option<usize>>,
    unavailable: AtomicBool,
}

impl InMemorySensorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a row as-is. Rows may be malformed.
    pub fn insert(&self, row: RawReading) {
        self.rows.write().push(row);
    }

    /// Snapshot of all rows.
    pub fn rows(&self) -> Vec<RawReading> {
        self.rows.read().clone()
    }

    /// Replace one row's temperature, simulating after-the-fact tampering.
    pub fn tamper(&self, sensor_id: &str, timestamp: Timestamp, temperature: f64) -> bool {
        let mut rows = self.rows.write();
        match rows.iter_mut().find(|r| {
            r.sensor_id.as_deref() == Some(sensor_id) && r.timestamp == Some(timestamp)
        }) {
            Some(row) => {
                row.temperature = Some(temperature);
                true
            }
            None => false,
        }
    }

    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    pub fn write_batch_count(&self) -> usize {
        self.write_batches.load(Ordering::SeqCst)
    }

    /// Make the next `write_digest` persist `points` points, then fail.
    pub fn fail_next_write_after(&self, points: usize) {
        *self.fail_write_after.lock() = Some(points);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn upsert(rows: &mut Vec<RawReading>, reading: &TelemetryReading) {
        let (timestamp, sensor_id) = reading.natural_key();
        let point = RawReading::from(reading);
        let existing = rows.iter_mut().find(|r| {
            r.timestamp == Some(timestamp) && r.sensor_id.as_deref() == Some(sensor_id)
        });
        match existing {
            Some(row) => *row = point,
            None => rows.push(point),
        }
    }
}

#[async_trait]
impl SensorStore for InMemorySensorStore {
    async fn query_window(&self, query: &TelemetryQuery) -> Result<Vec<RawReading>, StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("sensor store offline".into()));
        }
        self.queries.fetch_add(1, Ordering::SeqCst);

        let mut matching: Vec<RawReading> = self
            .rows
            .read()
            .iter()
            .filter(|r| match (&r.timestamp, &r.location_id) {
                (Some(ts), Some(location)) => query.matches(ts, location),
                _ => false,
            })
            .cloned()
            .collect();
        // Stable: rows sharing a timestamp keep insertion order.
        matching.sort_by_key(|r| r.timestamp);
        Ok(matching)
    }

    async fn write_digest(
        &self,
        readings: &[TelemetryReading],
        digest: &Digest,
    ) -> Result<usize, StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("sensor store offline".into()));
        }
        self.write_batches.fetch_add(1, Ordering::SeqCst);

        let fail_after = self.fail_write_after.lock().take();
        let mut rows = self.rows.write();
        for (written, reading) in readings.iter().enumerate() {
            if fail_after == Some(written) {
                return Err(StoreError::PartialWrite {
                    written,
                    total: readings.len(),
                });
            }
            Self::upsert(&mut rows, &reading.with_digest(digest));
        }
        Ok(readings.len())
    }
}

// =============================================================================
// AUDIT STORE
// =============================================================================

/// Append-only audit log.
#[derive(Default)]
pub struct InMemoryAuditStore {
    records: RwLock<Vec<(AuditId, AuditRecord)>>,
    reject_inserts: AtomicBool,
}

impl InMemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Make every insert fail with `StoreError::Rejected`.
    pub fn set_reject_inserts(&self, reject: bool) {
        self.reject_inserts.store(reject, Ordering::SeqCst);
    }
}

#[async_trait]
impl AuditStore for InMemoryAuditStore {
    async fn insert(&self, record: &AuditRecord) -> Result<AuditId, StoreError> {
        if self.reject_inserts.load(Ordering::SeqCst) {
            return Err(StoreError::Rejected("audit log is read-only".into()));
        }
        let mut records = self.records.write();
        let id = AuditId(format!("audit-{}", records.len() + 1));
        records.push((id.clone(), record.clone()));
        Ok(id)
    }

    async fn find_by_item(&self, item_id: &str) -> Result<Vec<AuditRecord>, StoreError> {
        Ok(self
            .records
            .read()
            .iter()
            .filter(|(_, r)| r.item_id == item_id)
            .map(|(_, r)| r.clone())
            .collect())
    }

    async fn scan(&self) -> Result<Vec<AuditRecord>, StoreError> {
        Ok(self.records.read().iter().map(|(_, r)| r.clone()).collect())
    }
}

// =============================================================================
// LEDGER
// =============================================================================

/// Ledger that replays scripted acknowledgements, then a fixed default.
pub struct ScriptedLedger {
    script: Mutex<VecDeque<AnchorAck>>,
    fallback: AnchorAck,
    submissions: Mutex<Vec<Digest>>,
}

impl ScriptedLedger {
    /// Accept everything.
    pub fn accepting() -> Self {
        Self::always(AnchorAck::Accepted)
    }

    /// Answer every submission with `ack`.
    pub fn always(ack: AnchorAck) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: ack,
            submissions: Mutex::new(Vec::new()),
        }
    }

    /// Answer with `script` in order, then with `fallback`.
    pub fn scripted(script: Vec<AnchorAck>, fallback: AnchorAck) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback,
            submissions: Mutex::new(Vec::new()),
        }
    }

    /// Digests submitted so far, in order.
    pub fn submissions(&self) -> Vec<Digest> {
        self.submissions.lock().clone()
    }
}

#[async_trait]
impl LedgerAnchor for ScriptedLedger {
    async fn submit(&self, digest: &Digest) -> AnchorAck {
        self.submissions.lock().push(*digest);
        self.script
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

// =============================================================================
// CLOCK
// =============================================================================

/// Clock frozen at one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub Timestamp);

impl Clock for FixedClock {
    fn now(&self) -> Timestamp {
        self.0
    }
}
