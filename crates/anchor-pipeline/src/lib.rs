//! # Anchor Pipeline
//!
//! Correlates a tracked item's location events with the environmental
//! telemetry recorded while it was in transit, hashes that telemetry into a
//! digest, submits the digest to an external ledger and stamps the readings
//! with it.
//!
//! ## Flow
//!
//! ```text
//! EventRecord inserted
//!       │
//!       ↓
//! [Window Resolver] ──no predecessor──→ Done
//!       │ Window(prev → present)
//!       ↓
//! [Telemetry Fetcher] ──no readings──→ Done
//!       │ readings + canonical document + digest
//!       ↓
//! [Anchor Client] ──unavailable after retries──┐
//!       │ Anchored                              │ AnchorSkipped
//!       ↓                                       ↓
//! [Writeback Coordinator]: digest onto every reading, then audit record
//! ```
//!
//! ## Domain Invariants
//!
//! | Invariant | Enforcement | Location |
//! |-----------|-------------|----------|
//! | Deterministic digest | Fixed key order, RFC 3339 nanos, shortest floats | `domain/canonical.rs` |
//! | Order-sensitive digest | Readings hashed in fetch order | `domain/canonical.rs` |
//! | No negative windows | `Window::new` rejects `from > to` | `shared-types` |
//! | Audit implies stamped readings | Audit insert only after batch write | `service/writeback.rs` |
//! | No ledger call for empty windows | Fetcher short-circuits | `service/fetcher.rs` |
//! | Run isolation | `run` never returns an error | `service/mod.rs` |
//!
//! ## Hexagonal Architecture
//!
//! - **Domain Layer** (`domain/`): canonicalizer, window selection, run outcomes
//! - **Ports Layer** (`ports/`): `AnchorPipelineApi` inbound, store/ledger SPI outbound
//! - **Service Layer** (`service/`): the orchestrator and its stage components
//! - **Adapters Layer** (`adapters/`): in-memory, HTTP ledger and InfluxDB adapters

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod service;

// Re-export main types for convenience
pub use domain::{
    canonicalize, dedup_audit_records, pending_anchors, resolve_window, CanonicalDocument,
    CanonicalEntry, Canonicalized, CanonicalizeError, ErrorClass, PipelineError, PipelineState,
    RetryPolicy, RunOutcome, RunReport, SkipReason, Stage, StateTrace,
};
pub use ports::{
    AnchorAck, AnchorPipelineApi, AuditStore, Clock, EventStore, LedgerAnchor, ReanchorSummary,
    SensorStore, SystemClock, TelemetryQuery, Verification,
};
pub use service::anchoring::{anchor, anchor_with_retry, AnchorAttempt};
pub use service::{AnchorPipeline, PipelineConfig, PipelineDependencies};
