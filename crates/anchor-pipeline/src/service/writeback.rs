//! Writeback Coordinator: stamp readings, then append the audit record.

use shared_types::{AnchorStatus, AuditId, AuditRecord, Digest, TelemetryReading, Window};

use crate::domain::PipelineError;
use crate::ports::{AuditStore, Clock, SensorStore};

/// Everything one writeback needs.
pub struct WritebackRequest<'a> {
    pub item_id: &'a str,
    pub window: &'a Window,
    pub readings: &'a [TelemetryReading],
    pub digest: &'a Digest,
    pub anchor_status: AnchorStatus,
}

/// Attach `digest` to every reading, then insert the audit record.
///
/// The audit record is only written after the batch write succeeded, so an
/// audit record always implies stamped readings.
pub async fn writeback(
    sensors: &dyn SensorStore,
    audit: &dyn AuditStore,
    clock: &dyn Clock,
    request: WritebackRequest<'_>,
) -> Result<AuditId, PipelineError> {
    let written = sensors
        .write_digest(request.readings, request.digest)
        .await
        .map_err(PipelineError::Writeback)?;

    tracing::debug!(
        item_id = request.item_id,
        points = written,
        digest = %request.digest.short(),
        "digest written onto readings"
    );

    let record = AuditRecord {
        item_id: request.item_id.to_string(),
        digest: *request.digest,
        window: request.window.clone(),
        anchor_status: request.anchor_status,
        recorded_at: clock.now(),
    };

    audit
        .insert(&record)
        .await
        .map_err(PipelineError::AuditInsert)
}
