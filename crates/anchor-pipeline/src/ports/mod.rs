//! # Ports Layer
//!
//! - **Inbound**: `AnchorPipelineApi`, driven by the dispatcher and the CLI
//! - **Outbound**: `EventStore`, `SensorStore`, `AuditStore`, `LedgerAnchor`, `Clock`

pub mod inbound;
pub mod outbound;

pub use inbound::{AnchorPipelineApi, ReanchorSummary, Verification};
pub use outbound::{
    AnchorAck, AuditStore, Clock, EventStore, LedgerAnchor, SensorStore, SystemClock,
    TelemetryQuery,
};
