//! # Acknowledgement Watermark
//!
//! Runs for different tokens complete out of order. The position that may be
//! persisted is the highest token below which every dispatched run has
//! finished; anything at or above the oldest unfinished run must be delivered
//! again after a restart.

use crate::events::ResumeToken;
use std::collections::BTreeSet;

/// Tracks in-flight tokens and the highest safely acknowledged position.
#[derive(Debug, Default)]
pub struct AckWatermark {
    /// Tokens dispatched but not yet completed.
    in_flight: BTreeSet<ResumeToken>,

    /// Highest token ever dispatched or skipped.
    highest_seen: Option<ResumeToken>,

    /// Last position handed out by [`Self::advance`].
    committed: Option<ResumeToken>,
}

impl AckWatermark {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a previously persisted position.
    #[must_use]
    pub fn resuming_from(token: Option<ResumeToken>) -> Self {
        Self {
            in_flight: BTreeSet::new(),
            highest_seen: token,
            committed: token,
        }
    }

    /// A run for `token` was dispatched.
    pub fn begin(&mut self, token: ResumeToken) {
        self.in_flight.insert(token);
        self.highest_seen = self.highest_seen.max(Some(token));
    }

    /// The run for `token` finished (successfully or not).
    pub fn complete(&mut self, token: ResumeToken) {
        self.in_flight.remove(&token);
    }

    /// `token` needs no run (e.g. malformed document); acknowledge it as-is.
    pub fn skip(&mut self, token: ResumeToken) {
        self.begin(token);
        self.complete(token);
    }

    /// Number of unfinished runs.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Highest position that is safe to persist right now.
    #[must_use]
    pub fn safe_position(&self) -> Option<ResumeToken> {
        let candidate = match self.in_flight.first() {
            None => self.highest_seen,
            Some(oldest) => oldest.predecessor(),
        };
        candidate.max(self.committed)
    }

    /// Returns the new safe position if it moved past the last committed one.
    pub fn advance(&mut self) -> Option<ResumeToken> {
        let position = self.safe_position();
        if position > self.committed {
            self.committed = position;
            position
        } else {
            None
        }
    }

    /// Last position returned by [`Self::advance`].
    #[must_use]
    pub fn committed(&self) -> Option<ResumeToken> {
        self.committed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_watermark() {
        let mut wm = AckWatermark::new();
        assert_eq!(wm.safe_position(), None);
        assert_eq!(wm.advance(), None);
    }

    #[test]
    fn test_in_order_completion_advances() {
        let mut wm = AckWatermark::new();
        wm.begin(ResumeToken(1));
        wm.begin(ResumeToken(2));
        wm.complete(ResumeToken(1));
        assert_eq!(wm.advance(), Some(ResumeToken(1)));
        wm.complete(ResumeToken(2));
        assert_eq!(wm.advance(), Some(ResumeToken(2)));
    }

    #[test]
    fn test_out_of_order_completion_holds_back() {
        let mut wm = AckWatermark::new();
        wm.begin(ResumeToken(1));
        wm.begin(ResumeToken(2));
        wm.begin(ResumeToken(3));

        wm.complete(ResumeToken(3));
        wm.complete(ResumeToken(2));
        // Token 1 still running: nothing is safe yet.
        assert_eq!(wm.advance(), None);

        wm.complete(ResumeToken(1));
        assert_eq!(wm.advance(), Some(ResumeToken(3)));
    }

    #[test]
    fn test_gaps_are_jumped() {
        let mut wm = AckWatermark::new();
        wm.begin(ResumeToken(4));
        wm.begin(ResumeToken(9));
        wm.complete(ResumeToken(4));
        assert_eq!(wm.advance(), Some(ResumeToken(8)));
        wm.complete(ResumeToken(9));
        assert_eq!(wm.advance(), Some(ResumeToken(9)));
    }

    #[test]
    fn test_never_moves_backwards() {
        let mut wm = AckWatermark::resuming_from(Some(ResumeToken(10)));
        wm.begin(ResumeToken(11));
        assert_eq!(wm.safe_position(), Some(ResumeToken(10)));
        assert_eq!(wm.advance(), None);
        assert_eq!(wm.committed(), Some(ResumeToken(10)));
    }

    #[test]
    fn test_skip_acknowledges_immediately() {
        let mut wm = AckWatermark::new();
        wm.skip(ResumeToken(1));
        assert_eq!(wm.in_flight(), 0);
        assert_eq!(wm.advance(), Some(ResumeToken(1)));
    }
}
