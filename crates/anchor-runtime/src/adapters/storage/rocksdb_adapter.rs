//! # RocksDB Document Store
//!
//! Persistent home of the event records, the audit log and the change-feed
//! resume token.
//!
//! ## Column Families
//!
//! - `events` - `seq (u64 BE)` → event record JSON. `seq` is the resume token.
//! - `item_index` - `item_id 0x00 seq (u64 BE)` → `seq`
//! - `event_ids` - `item_id 0x00 event_id` → `seq` of its first append
//! - `audit` - `seq (u64 BE)` → audit record JSON
//! - `meta` - resume token
//!
//! Appends are serialized so sequence numbers become visible in order, which
//! is what lets the change feed tail `events` with a simple cursor.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rocksdb::{
    BlockBasedOptions, Cache, ColumnFamily, ColumnFamilyDescriptor, DBCompressionType, Direction,
    IteratorMode, Options, WriteBatch, WriteOptions, DB,
};
use tokio::sync::watch;

use anchor_pipeline::{AuditStore, EventStore};
use shared_bus::{FeedError, ResumeToken, ResumeTokenStore};
use shared_types::{AuditId, AuditRecord, EventRecord, StoreError};

/// Column family names
pub const CF_EVENTS: &str = "events";
pub const CF_ITEM_INDEX: &str = "item_index";
pub const CF_EVENT_IDS: &str = "event_ids";
pub const CF_AUDIT: &str = "audit";
pub const CF_META: &str = "meta";

/// All column families used by the store
pub const COLUMN_FAMILIES: &[&str] = &[CF_EVENTS, CF_ITEM_INDEX, CF_EVENT_IDS, CF_AUDIT, CF_META];

const META_RESUME_TOKEN: &[u8] = b"resume_token";

/// RocksDB configuration
#[derive(Debug, Clone)]
pub struct RocksDbConfig {
    /// Path to the database directory
    pub path: String,
    /// Block cache size in bytes (default: 64MB)
    pub block_cache_size: usize,
    /// Write buffer size in bytes (default: 16MB)
    pub write_buffer_size: usize,
    /// fsync after each write
    pub sync_writes: bool,
}

impl Default for RocksDbConfig {
    fn default() -> Self {
        Self {
            path: "./data/documents".to_string(),
            block_cache_size: 64 * 1024 * 1024, // 64MB
            write_buffer_size: 16 * 1024 * 1024, // 16MB
            sync_writes: true,
        }
    }
}

impl RocksDbConfig {
    /// Create config for testing (smaller buffers, no sync)
    pub fn for_testing(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            block_cache_size: 8 * 1024 * 1024,  // 8MB
            write_buffer_size: 4 * 1024 * 1024, // 4MB
            sync_writes: false,
        }
    }
}

/// One entry of the event log as read back for the change feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEvent {
    pub token: ResumeToken,
    /// Decoded record, or the decode error message.
    pub document: Result<EventRecord, String>,
}

/// RocksDB-backed document store.
pub struct RocksDocumentStore {
    db: Arc<DB>,
    config: RocksDbConfig,
    /// Next event sequence number. Held while appending.
    next_event: Mutex<u64>,
    /// Next audit sequence number. Held while inserting.
    next_audit: Mutex<u64>,
    /// Last appended event sequence, for feed wake-ups.
    head: watch::Sender<u64>,
}

fn io_error(context: &str, e: rocksdb::Error) -> StoreError {
    StoreError::Unavailable(format!("{context}: {e}"))
}

fn seq_key(seq: u64) -> [u8; 8] {
    seq.to_be_bytes()
}

fn decode_seq(bytes: &[u8]) -> Result<u64, StoreError> {
    let array: [u8; 8] = bytes
        .try_into()
        .map_err(|_| StoreError::Corrupt(format!("sequence of {} bytes", bytes.len())))?;
    Ok(u64::from_be_bytes(array))
}

fn item_prefix(item_id: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(item_id.len() + 9);
    key.extend_from_slice(item_id.as_bytes());
    key.push(0);
    key
}

fn item_seq_key(item_id: &str, seq: u64) -> Vec<u8> {
    let mut key = item_prefix(item_id);
    key.extend_from_slice(&seq_key(seq));
    key
}

fn event_id_key(record: &EventRecord) -> Vec<u8> {
    let mut key = item_prefix(&record.item_id);
    key.extend_from_slice(record.event_id.as_bytes());
    key
}

impl RocksDocumentStore {
    /// Open or create the store.
    pub fn open(config: RocksDbConfig) -> Result<Self, StoreError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);
        opts.set_write_buffer_size(config.write_buffer_size);
        opts.set_compression_type(DBCompressionType::Snappy);

        let mut block_opts = BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false);
        block_opts.set_block_cache(&Cache::new_lru_cache(config.block_cache_size));
        opts.set_block_based_table_factory(&block_opts);

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = COLUMN_FAMILIES
            .iter()
            .map(|name| {
                let mut cf_opts = Options::default();
                cf_opts.set_compression_type(DBCompressionType::Snappy);
                ColumnFamilyDescriptor::new(*name, cf_opts)
            })
            .collect();

        let db = DB::open_cf_descriptors(&opts, &config.path, cf_descriptors)
            .map_err(|e| io_error("failed to open RocksDB", e))?;

        let last_event = Self::last_seq(&db, CF_EVENTS)?;
        let last_audit = Self::last_seq(&db, CF_AUDIT)?;

        tracing::info!(
            path = %config.path,
            events = last_event,
            audit_records = last_audit,
            "document store opened"
        );

        let (head, _) = watch::channel(last_event);
        Ok(Self {
            db: Arc::new(db),
            config,
            next_event: Mutex::new(last_event + 1),
            next_audit: Mutex::new(last_audit + 1),
            head,
        })
    }

    /// Open at `path` with default tuning.
    pub fn open_default(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::open(RocksDbConfig {
            path: path.as_ref().to_string_lossy().to_string(),
            ..Default::default()
        })
    }

    fn last_seq(db: &DB, family: &str) -> Result<u64, StoreError> {
        let cf = db
            .cf_handle(family)
            .ok_or_else(|| StoreError::Corrupt(format!("missing column family {family}")))?;
        match db.iterator_cf(cf, IteratorMode::End).next() {
            None => Ok(0),
            Some(Ok((key, _))) => decode_seq(&key),
            Some(Err(e)) => Err(io_error("failed to read last key", e)),
        }
    }

    fn cf(&self, family: &str) -> Result<&ColumnFamily, StoreError> {
        self.db
            .cf_handle(family)
            .ok_or_else(|| StoreError::Corrupt(format!("missing column family {family}")))
    }

    fn write_opts(&self) -> WriteOptions {
        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(self.config.sync_writes);
        write_opts
    }

    /// Append an event record and index it under its item.
    ///
    /// A repeated `event_id` is appended again but keeps the position of its
    /// first append for predecessor lookups.
    pub fn append_event(&self, record: &EventRecord) -> Result<ResumeToken, StoreError> {
        if record.item_id.contains('\0') {
            return Err(StoreError::Rejected("item_id contains NUL".into()));
        }
        let document =
            serde_json::to_vec(record).map_err(|e| StoreError::Rejected(e.to_string()))?;
        let id_key = event_id_key(record);

        let mut next = self.next_event.lock();
        let seq = *next;
        let known = self.stored_seq(&id_key)?.is_some();

        let mut batch = WriteBatch::default();
        batch.put_cf(self.cf(CF_EVENTS)?, seq_key(seq), &document);
        batch.put_cf(
            self.cf(CF_ITEM_INDEX)?,
            item_seq_key(&record.item_id, seq),
            seq_key(seq),
        );
        if !known {
            batch.put_cf(self.cf(CF_EVENT_IDS)?, &id_key, seq_key(seq));
        }
        self.db
            .write_opt(batch, &self.write_opts())
            .map_err(|e| io_error("event append failed", e))?;

        *next = seq + 1;
        drop(next);

        self.head.send_replace(seq);
        Ok(ResumeToken(seq))
    }

    /// Append an undecodable document, as a broken upstream producer would.
    #[cfg(test)]
    pub(crate) fn append_raw_event(&self, document: &[u8]) -> Result<ResumeToken, StoreError> {
        let mut next = self.next_event.lock();
        let seq = *next;
        self.db
            .put_cf_opt(self.cf(CF_EVENTS)?, seq_key(seq), document, &self.write_opts())
            .map_err(|e| io_error("event append failed", e))?;
        *next = seq + 1;
        drop(next);
        self.head.send_replace(seq);
        Ok(ResumeToken(seq))
    }

    /// Up to `limit` events with a token greater than `after`, in token order.
    pub fn events_after(
        &self,
        after: Option<ResumeToken>,
        limit: usize,
    ) -> Result<Vec<StoredEvent>, StoreError> {
        let start = seq_key(after.map_or(0, |t| t.0.saturating_add(1)));
        let iter = self
            .db
            .iterator_cf(self.cf(CF_EVENTS)?, IteratorMode::From(&start, Direction::Forward));

        let mut events = Vec::new();
        for item in iter.take(limit) {
            let (key, value) = item.map_err(|e| io_error("event scan failed", e))?;
            events.push(StoredEvent {
                token: ResumeToken(decode_seq(&key)?),
                document: serde_json::from_slice(&value).map_err(|e| e.to_string()),
            });
        }
        Ok(events)
    }

    /// Number of events ever appended.
    pub fn event_count(&self) -> u64 {
        *self.head.borrow()
    }

    /// Receiver notified with the latest sequence after every append.
    pub fn subscribe_head(&self) -> watch::Receiver<u64> {
        self.head.subscribe()
    }

    /// Sequence number under which an event id was first appended.
    fn stored_seq(&self, id_key: &[u8]) -> Result<Option<u64>, StoreError> {
        self.db
            .get_cf(self.cf(CF_EVENT_IDS)?, id_key)
            .map_err(|e| io_error("event id lookup failed", e))?
            .map(|bytes| decode_seq(&bytes))
            .transpose()
    }

    fn read_event(&self, seq: u64) -> Result<EventRecord, StoreError> {
        let bytes = self
            .db
            .get_cf(self.cf(CF_EVENTS)?, seq_key(seq))
            .map_err(|e| io_error("event read failed", e))?
            .ok_or_else(|| StoreError::Corrupt(format!("index points at missing event {seq}")))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| StoreError::Corrupt(format!("event {seq}: {e}")))
    }

    fn scan_audit(&self) -> Result<Vec<AuditRecord>, StoreError> {
        let mut records = Vec::new();
        for item in self.db.iterator_cf(self.cf(CF_AUDIT)?, IteratorMode::Start) {
            let (key, value) = item.map_err(|e| io_error("audit scan failed", e))?;
            let record = serde_json::from_slice(&value).map_err(|e| {
                StoreError::Corrupt(format!("audit record {}: {e}", decode_seq(&key).unwrap_or(0)))
            })?;
            records.push(record);
        }
        Ok(records)
    }
}

#[async_trait]
impl EventStore for RocksDocumentStore {
    async fn find_preceding(
        &self,
        event: &EventRecord,
        limit: usize,
    ) -> Result<Vec<EventRecord>, StoreError> {
        let prefix = item_prefix(&event.item_id);
        // Last index key the scan may return.
        let upper = match self.stored_seq(&event_id_key(event))? {
            Some(seq) => item_seq_key(&event.item_id, seq.saturating_sub(1)),
            None => item_seq_key(&event.item_id, u64::MAX),
        };

        let iter = self.db.iterator_cf(
            self.cf(CF_ITEM_INDEX)?,
            IteratorMode::From(&upper, Direction::Reverse),
        );

        let mut records = Vec::with_capacity(limit);
        for item in iter {
            if records.len() >= limit {
                break;
            }
            let (key, value) = item.map_err(|e| io_error("index scan failed", e))?;
            if !key.starts_with(&prefix) {
                break;
            }
            records.push(self.read_event(decode_seq(&value)?)?);
        }
        Ok(records)
    }
}

#[async_trait]
impl AuditStore for RocksDocumentStore {
    async fn insert(&self, record: &AuditRecord) -> Result<AuditId, StoreError> {
        let document =
            serde_json::to_vec(record).map_err(|e| StoreError::Rejected(e.to_string()))?;

        let mut next = self.next_audit.lock();
        let seq = *next;
        self.db
            .put_cf_opt(self.cf(CF_AUDIT)?, seq_key(seq), &document, &self.write_opts())
            .map_err(|e| io_error("audit insert failed", e))?;
        *next = seq + 1;

        Ok(AuditId(format!("audit-{seq}")))
    }

    async fn find_by_item(&self, item_id: &str) -> Result<Vec<AuditRecord>, StoreError> {
        Ok(self
            .scan_audit()?
            .into_iter()
            .filter(|r| r.item_id == item_id)
            .collect())
    }

    async fn scan(&self) -> Result<Vec<AuditRecord>, StoreError> {
        self.scan_audit()
    }
}

#[async_trait]
impl ResumeTokenStore for RocksDocumentStore {
    async fn load(&self) -> Result<Option<ResumeToken>, FeedError> {
        let cf = self
            .cf(CF_META)
            .map_err(|e| FeedError::TokenStorage(e.to_string()))?;
        let bytes = self
            .db
            .get_cf(cf, META_RESUME_TOKEN)
            .map_err(|e| FeedError::TokenStorage(e.to_string()))?;
        bytes
            .map(|b| decode_seq(&b).map(ResumeToken))
            .transpose()
            .map_err(|e| FeedError::TokenStorage(e.to_string()))
    }

    async fn save(&self, token: ResumeToken) -> Result<(), FeedError> {
        let cf = self
            .cf(CF_META)
            .map_err(|e| FeedError::TokenStorage(e.to_string()))?;
        self.db
            .put_cf_opt(cf, META_RESUME_TOKEN, seq_key(token.0), &self.write_opts())
            .map_err(|e| FeedError::TokenStorage(e.to_string()))
    }
}
