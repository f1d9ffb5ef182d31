//! Anchor Client: digest submission with bounded retry.

use shared_types::{AnchorStatus, Digest};

use crate::domain::RetryPolicy;
use crate::ports::{AnchorAck, LedgerAnchor};

/// Result of submitting one digest under a retry policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnchorAttempt {
    pub status: AnchorStatus,
    pub attempts: u32,
    /// Last acknowledgement received.
    pub last_ack: AnchorAck,
}

/// Single submission. True only on an explicit success acknowledgement.
///
/// Every other answer, transport failures included, is `false`. Used where
/// the caller owns retries, like the re-anchoring pass.
pub async fn anchor(ledger: &dyn LedgerAnchor, digest: &Digest) -> bool {
    let ack = ledger.submit(digest).await;
    tracing::debug!(digest = %digest.short(), result = ack.label(), "digest submitted");
    ack.is_accepted()
}

/// Submit `digest`, retrying `Unavailable` acks with exponential backoff.
///
/// A `Rejected` ack stops immediately. Exhausting the policy yields
/// `AnchorStatus::Skipped`.
pub async fn anchor_with_retry(
    ledger: &dyn LedgerAnchor,
    digest: &Digest,
    policy: &RetryPolicy,
) -> AnchorAttempt {
    let max_attempts = policy.attempts();
    let mut attempt = 0;

    loop {
        attempt += 1;
        let ack = ledger.submit(digest).await;

        if ack.is_accepted() {
            tracing::info!(digest = %digest.short(), attempt, "digest anchored");
            return AnchorAttempt {
                status: AnchorStatus::Anchored,
                attempts: attempt,
                last_ack: ack,
            };
        }

        let reason = match &ack {
            AnchorAck::Unavailable { reason } | AnchorAck::Rejected { reason } => reason.clone(),
            AnchorAck::Accepted => String::new(),
        };

        if ack.is_transient() && attempt < max_attempts {
            let delay = policy.backoff_after(attempt);
            tracing::warn!(
                digest = %digest.short(),
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                %reason,
                "ledger unavailable, retrying"
            );
            tokio::time::sleep(delay).await;
            continue;
        }

        tracing::warn!(
            digest = %digest.short(),
            attempt,
            result = ack.label(),
            %reason,
            "digest not anchored"
        );
        return AnchorAttempt {
            status: AnchorStatus::Skipped,
            attempts: attempt,
            last_ack: ack,
        };
    }
}
