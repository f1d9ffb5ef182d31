//! # Window Resolution
//!
//! Pure selection of the predecessor event among the records stored before
//! the triggering event. The store lookup lives in
//! [`crate::service::resolver`].

use shared_types::{EventRecord, InvertedWindowError, Window};

use super::outcome::{SkipReason, Stage};

/// Records fetched per predecessor lookup.
pub const PREDECESSOR_LOOKUP_LIMIT: usize = 1;

/// Pick the predecessor of `current` from `preceding`.
///
/// `preceding` holds the records of the item stored before `current`, most
/// recently stored first, so the predecessor is its first entry. Records of
/// `current` itself are never a predecessor.
pub fn select_predecessor<'a>(
    current: &EventRecord,
    preceding: &'a [EventRecord],
) -> Option<&'a EventRecord> {
    preceding.iter().find(|r| r.event_id != current.event_id)
}

/// Resolve the window ending at `current`.
///
/// Returns `Skip(FirstSighting)` when nothing was stored before `current`.
/// A predecessor stored earlier but timestamped later than `current` (an
/// out-of-order insert) is an [`InvertedWindowError`].
pub fn resolve_window(
    current: &EventRecord,
    preceding: &[EventRecord],
) -> Result<Stage<Window>, InvertedWindowError> {
    match select_predecessor(current, preceding) {
        None => Ok(Stage::Skip(SkipReason::FirstSighting)),
        Some(predecessor) => Window::between(predecessor, current).map(Stage::Proceed),
    }
}
