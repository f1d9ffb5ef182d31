//! # Change Events
//!
//! Notifications emitted by a change feed. Each carries the full inserted
//! document and the token that identifies its position in the feed.

use serde::{Deserialize, Serialize};
use shared_types::EventRecord;
use std::fmt;
use thiserror::Error;

/// Position of a notification in the feed. Tokens grow monotonically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResumeToken(pub u64);

impl ResumeToken {
    /// The token immediately before this one, if any.
    #[must_use]
    pub fn predecessor(self) -> Option<Self> {
        self.0.checked_sub(1).map(Self)
    }
}

impl fmt::Display for ResumeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of change that produced a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    Insert,
    Update,
    Delete,
}

/// A single change-feed notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub token: ResumeToken,
    pub operation: OperationType,
    /// Full document after the change.
    pub document: EventRecord,
}

/// Selects which notifications a stream yields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeFilter {
    /// Accepted operation types. Empty accepts everything.
    pub operations: Vec<OperationType>,
}

impl Default for ChangeFilter {
    fn default() -> Self {
        Self::inserts()
    }
}

impl ChangeFilter {
    /// Only insertions.
    #[must_use]
    pub fn inserts() -> Self {
        Self {
            operations: vec![OperationType::Insert],
        }
    }

    /// Every operation.
    #[must_use]
    pub fn all() -> Self {
        Self {
            operations: Vec::new(),
        }
    }

    /// Check if a notification matches this filter.
    #[must_use]
    pub fn matches(&self, event: &ChangeEvent) -> bool {
        self.operations.is_empty() || self.operations.contains(&event.operation)
    }
}

/// Errors surfaced by a change feed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FeedError {
    /// The feed was closed.
    #[error("change feed closed")]
    Closed,

    /// Backing store could not be read.
    #[error("change feed unavailable: {0}")]
    Unavailable(String),

    /// A notification's document could not be decoded into an event record.
    /// The token is reported so the position can still be acknowledged.
    #[error("malformed document at token {token}: {message}")]
    Malformed { token: ResumeToken, message: String },

    /// Resume position could not be loaded or persisted.
    #[error("resume token storage failed: {0}")]
    TokenStorage(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn change(operation: OperationType) -> ChangeEvent {
        ChangeEvent {
            token: ResumeToken(1),
            operation,
            document: EventRecord {
                event_id: "ev-1".into(),
                item_id: "item".into(),
                location_id: "A".into(),
                event_time: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            },
        }
    }

    #[test]
    fn test_default_filter_accepts_inserts_only() {
        let filter = ChangeFilter::default();
        assert!(filter.matches(&change(OperationType::Insert)));
        assert!(!filter.matches(&change(OperationType::Update)));
        assert!(!filter.matches(&change(OperationType::Delete)));
    }

    #[test]
    fn test_all_filter() {
        let filter = ChangeFilter::all();
        assert!(filter.matches(&change(OperationType::Delete)));
    }

    #[test]
    fn test_token_predecessor() {
        assert_eq!(ResumeToken(5).predecessor(), Some(ResumeToken(4)));
        assert_eq!(ResumeToken(0).predecessor(), None);
    }

    #[test]
    fn test_malformed_error_reports_token() {
        let err = FeedError::Malformed {
            token: ResumeToken(9),
            message: "missing event_time".into(),
        };
        assert!(err.to_string().contains("token 9"));
    }
}
