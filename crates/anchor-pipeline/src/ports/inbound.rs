//! # Inbound Ports (Driving Ports)
//!
//! Public API of the anchoring pipeline, driven by the change feed dispatcher
//! and the operator CLI.

use async_trait::async_trait;
use shared_types::{AuditRecord, Digest, EventRecord};

use crate::domain::{PipelineError, RunReport};

/// Result of re-checking an audit record against the time-series store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    /// Readings in the window still hash to the recorded digest.
    Intact { readings: usize },
    /// Readings changed since the digest was recorded.
    Tampered { expected: Digest, actual: Digest },
    /// The window no longer holds any reading.
    Missing,
}

impl Verification {
    pub fn is_intact(&self) -> bool {
        matches!(self, Self::Intact { .. })
    }
}

/// Outcome of resubmitting digests that were never anchored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReanchorSummary {
    /// Pending digests found in the audit log.
    pub pending: usize,
    /// Of those, digests the ledger accepted this time.
    pub anchored: usize,
}

impl ReanchorSummary {
    pub fn still_pending(&self) -> usize {
        self.pending - self.anchored
    }
}

/// Primary API of the pipeline.
#[async_trait]
pub trait AnchorPipelineApi: Send + Sync {
    /// Run the pipeline for one newly inserted event record.
    ///
    /// Never returns an error: failures are reported in
    /// [`RunReport::outcome`] and affect only this run.
    async fn run(&self, event: &EventRecord) -> RunReport;

    /// Recompute the digest of a recorded window and compare.
    async fn verify(&self, record: &AuditRecord) -> Result<Verification, PipelineError>;

    /// Resubmit every digest recorded with `AnchorStatus::Skipped` that has
    /// no `Anchored` record yet.
    async fn reanchor_pending(&self) -> Result<ReanchorSummary, PipelineError>;

    /// Deduplicated audit trail of one item.
    async fn audit_trail(&self, item_id: &str) -> Result<Vec<AuditRecord>, PipelineError>;
}
