//! # Adapters Layer
//!
//! - `memory`: in-process implementations of every outbound port
//! - `http_anchor`: HTTP ledger client
//! - `influx`: InfluxDB 1.x sensor store

pub mod http_anchor;
pub mod influx;
pub mod memory;

pub use http_anchor::{AnchorEncoding, HttpAnchorError, HttpLedgerAnchor};
pub use influx::{InfluxSchema, InfluxSensorStore, InfluxSettings};
pub use memory::{
    FixedClock, InMemoryAuditStore, InMemoryEventStore, InMemorySensorStore, ScriptedLedger,
};
