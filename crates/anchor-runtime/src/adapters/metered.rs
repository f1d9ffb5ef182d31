//! Ledger decorator counting submissions by acknowledgement.

use std::sync::Arc;

use anchor_pipeline::{AnchorAck, LedgerAnchor};
use anchor_telemetry::ANCHOR_SUBMISSIONS;
use async_trait::async_trait;
use shared_types::Digest;

/// Wraps a ledger and records every submission in `ANCHOR_SUBMISSIONS`.
pub struct MeteredLedger {
    inner: Arc<dyn LedgerAnchor>,
}

impl MeteredLedger {
    pub fn new(inner: Arc<dyn LedgerAnchor>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl LedgerAnchor for MeteredLedger {
    async fn submit(&self, digest: &Digest) -> AnchorAck {
        let ack = self.inner.submit(digest).await;
        ANCHOR_SUBMISSIONS.with_label_values(&[ack.label()]).inc();
        if !ack.is_accepted() {
            tracing::debug!(digest = %digest.short(), result = ack.label(), "ledger did not accept digest");
        }
        ack
    }
}
