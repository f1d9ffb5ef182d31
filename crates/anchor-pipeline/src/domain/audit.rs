//! # Audit Trail Rules
//!
//! A re-delivered notification produces a second audit record with the same
//! `(item_id, digest)`. Readers collapse those; a `Skipped` record is pending
//! until an `Anchored` record with the same key exists.

use std::collections::{HashMap, HashSet};

use shared_types::{AnchorStatus, AuditRecord, Digest};

/// Collapse duplicate records by `(item_id, digest)`.
///
/// Keeps the first record per key in input order, except that an `Anchored`
/// record replaces a `Skipped` one for the same key.
pub fn dedup_audit_records(records: &[AuditRecord]) -> Vec<AuditRecord> {
    let mut position: HashMap<(&str, &Digest), usize> = HashMap::new();
    let mut out: Vec<AuditRecord> = Vec::new();

    for record in records {
        match position.get(&record.dedup_key()) {
            Some(&idx) => {
                if out[idx].anchor_status == AnchorStatus::Skipped
                    && record.anchor_status == AnchorStatus::Anchored
                {
                    out[idx] = record.clone();
                }
            }
            None => {
                position.insert(record.dedup_key(), out.len());
                out.push(record.clone());
            }
        }
    }
    out
}

/// Records whose digest never reached the ledger.
pub fn pending_anchors(records: &[AuditRecord]) -> Vec<AuditRecord> {
    let anchored: HashSet<(&str, &Digest)> = records
        .iter()
        .filter(|r| r.anchor_status == AnchorStatus::Anchored)
        .map(AuditRecord::dedup_key)
        .collect();

    dedup_audit_records(records)
        .into_iter()
        .filter(|r| !anchored.contains(&r.dedup_key()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::time::parse_rfc3339;
    use shared_types::Window;

    fn record(item: &str, payload: &[u8], status: AnchorStatus) -> AuditRecord {
        let t0 = parse_rfc3339("2024-01-01T00:00:00Z").unwrap();
        let t1 = parse_rfc3339("2024-01-01T00:05:00Z").unwrap();
        AuditRecord {
            item_id: item.into(),
            digest: Digest::sha256(payload),
            window: Window::new("L1", "L2", t0, t1).unwrap(),
            anchor_status: status,
            recorded_at: t1,
        }
    }

    #[test]
    fn test_dedup_collapses_redelivery() {
        let records = vec![
            record("a", b"x", AnchorStatus::Anchored),
            record("a", b"x", AnchorStatus::Anchored),
            record("b", b"x", AnchorStatus::Anchored),
        ];
        assert_eq!(dedup_audit_records(&records).len(), 2);
    }

    #[test]
    fn test_anchored_supersedes_skipped() {
        let records = vec![
            record("a", b"x", AnchorStatus::Skipped),
            record("a", b"x", AnchorStatus::Anchored),
        ];
        let deduped = dedup_audit_records(&records);
        assert_eq!(deduped.len(), 1);
        assert_eq!(deduped[0].anchor_status, AnchorStatus::Anchored);
    }

    #[test]
    fn test_pending_anchors() {
        let records = vec![
            record("a", b"x", AnchorStatus::Skipped),
            record("a", b"x", AnchorStatus::Anchored),
            record("b", b"y", AnchorStatus::Skipped),
            record("b", b"y", AnchorStatus::Skipped),
            record("c", b"z", AnchorStatus::Anchored),
        ];
        let pending = pending_anchors(&records);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].item_id, "b");
    }
}
