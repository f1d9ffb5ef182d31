//! Telemetry Fetcher: window query plus canonical hashing.

use shared_types::Window;

use crate::domain::{canonicalize, Canonicalized, PipelineError, SkipReason, Stage};
use crate::ports::{SensorStore, TelemetryQuery};

/// Fetch the readings of `window` and compute their digest.
///
/// `Skip(NoTelemetry)` when the window is empty; nothing downstream runs.
pub async fn fetch(
    sensors: &dyn SensorStore,
    window: &Window,
) -> Result<Stage<Canonicalized>, PipelineError> {
    let query = TelemetryQuery::for_window(window);
    let rows = sensors
        .query_window(&query)
        .await
        .map_err(PipelineError::SensorQuery)?;

    if rows.is_empty() {
        return Ok(Stage::Skip(SkipReason::NoTelemetry));
    }

    Ok(Stage::Proceed(canonicalize(&rows)?))
}
