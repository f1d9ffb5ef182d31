//! Window Resolver: predecessor lookup against the event store.

use shared_types::{EventRecord, Window};

use crate::domain::{resolve_window, PipelineError, Stage, PREDECESSOR_LOOKUP_LIMIT};
use crate::ports::EventStore;

/// Find the window ending at `event`.
///
/// One query for the record stored just before `event`. `Skip(FirstSighting)`
/// when the item has no earlier record.
pub async fn resolve(
    events: &dyn EventStore,
    event: &EventRecord,
) -> Result<Stage<Window>, PipelineError> {
    let preceding = events
        .find_preceding(event, PREDECESSOR_LOOKUP_LIMIT)
        .await
        .map_err(PipelineError::EventStore)?;

    tracing::debug!(
        item_id = %event.item_id,
        records = preceding.len(),
        "predecessor lookup"
    );

    Ok(resolve_window(event, &preceding)?)
}
