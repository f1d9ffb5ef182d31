//! # Domain Layer
//!
//! Pure pipeline logic: canonical hashing, window selection, audit trail
//! rules and run outcomes. No I/O.

pub mod audit;
pub mod canonical;
pub mod errors;
pub mod outcome;
pub mod retry;
pub mod window;

pub use audit::{dedup_audit_records, pending_anchors};
pub use canonical::{
    canonicalize, validate_readings, CanonicalDocument, CanonicalEntry, Canonicalized,
    CanonicalizeError,
};
pub use errors::{ErrorClass, PipelineError};
pub use outcome::{PipelineState, RunOutcome, RunReport, SkipReason, Stage, StateTrace};
pub use retry::RetryPolicy;
pub use window::{resolve_window, select_predecessor, PREDECESSOR_LOOKUP_LIMIT};
