//! # Change Feed
//!
//! Defines the producing side of the change feed and an in-memory
//! implementation with replay from a resume token.

use crate::events::{ChangeEvent, ChangeFilter, FeedError, OperationType, ResumeToken};
use crate::subscriber::{ChangeResult, ChangeStream};
use crate::DEFAULT_CHANNEL_CAPACITY;
use async_trait::async_trait;
use shared_types::EventRecord;
use std::sync::atomic::{AtomicU64, Ordering};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, warn};

/// Source of insertion notifications.
///
/// Implementations deliver every notification with a token greater than
/// `resume_after`, in token order, then keep streaming new ones until the
/// feed closes.
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    /// Open a stream positioned after `resume_after` (or at the start).
    async fn watch(
        &self,
        filter: ChangeFilter,
        resume_after: Option<ResumeToken>,
    ) -> Result<ChangeStream, FeedError>;
}

/// In-memory change feed.
///
/// Keeps the full notification log so streams can resume from any token, and
/// uses `tokio::sync::broadcast` to wake live streams. Suitable for tests and
/// single-process setups; durable deployments back the feed with the document
/// store.
pub struct InMemoryChangeFeed {
    /// Every notification ever published, in token order.
    log: Arc<RwLock<Vec<ChangeEvent>>>,

    /// Wakes live streams.
    sender: broadcast::Sender<ChangeEvent>,

    /// Set once the feed is closed.
    closed: watch::Sender<bool>,

    /// Next token to assign.
    next_token: AtomicU64,

    /// Per-stream channel capacity.
    capacity: usize,
}

impl InMemoryChangeFeed {
    /// Create a new feed with default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a new feed with specified per-stream capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        let (closed, _) = watch::channel(false);
        Self {
            log: Arc::new(RwLock::new(Vec::new())),
            sender,
            closed,
            next_token: AtomicU64::new(1),
            capacity,
        }
    }

    /// Publish an insertion of `document`. Returns its token.
    pub fn insert(&self, document: EventRecord) -> ResumeToken {
        self.publish(OperationType::Insert, document)
    }

    /// Publish a notification of any operation type.
    pub fn publish(&self, operation: OperationType, document: EventRecord) -> ResumeToken {
        let event = {
            // Token assignment and append happen under the same lock so the
            // log stays in token order.
            let mut log = self.log.write();
            let token = ResumeToken(self.next_token.fetch_add(1, Ordering::SeqCst));
            let event = ChangeEvent {
                token,
                operation,
                document,
            };
            log.push(event.clone());
            event
        };

        let token = event.token;
        match self.sender.send(event) {
            Ok(receivers) => debug!(%token, receivers, "Change published"),
            Err(_) => debug!(%token, "Change logged (no live streams)"),
        }
        token
    }

    /// Close the feed. Open streams drain what was published, then end.
    pub fn close(&self) {
        self.closed.send_replace(true);
    }

    /// Number of notifications published so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.log.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get the per-stream capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn backlog_after(log: &RwLock<Vec<ChangeEvent>>, after: Option<ResumeToken>) -> Vec<ChangeEvent> {
        log.read()
            .iter()
            .filter(|event| after.map_or(true, |after| event.token > after))
            .cloned()
            .collect()
    }
}

impl Default for InMemoryChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChangeFeed for InMemoryChangeFeed {
    async fn watch(
        &self,
        filter: ChangeFilter,
        resume_after: Option<ResumeToken>,
    ) -> Result<ChangeStream, FeedError> {
        // Subscribe before reading the backlog so nothing published in
        // between is missed; duplicates are dropped by token below.
        let mut live = self.sender.subscribe();
        let mut closed = self.closed.subscribe();
        let log = Arc::clone(&self.log);
        let (tx, rx) = mpsc::channel::<ChangeResult>(self.capacity);

        debug!(resume_after = ?resume_after, "Opening in-memory change stream");

        tokio::spawn(async move {
            let mut last = resume_after;

            macro_rules! forward {
                ($event:expr) => {{
                    let event: ChangeEvent = $event;
                    if last.map_or(true, |l| event.token > l) {
                        last = Some(event.token);
                        if tx.send(Ok(event)).await.is_err() {
                            return;
                        }
                    }
                }};
            }

            for event in Self::backlog_after(&log, last) {
                forward!(event);
            }

            loop {
                let is_closed = *closed.borrow();
                if is_closed {
                    for event in Self::backlog_after(&log, last) {
                        forward!(event);
                    }
                    return;
                }

                tokio::select! {
                    received = live.recv() => match received {
                        Ok(event) => forward!(event),
                        Err(broadcast::error::RecvError::Lagged(count)) => {
                            warn!(lagged = count, "Change stream lagged, replaying from log");
                            for event in Self::backlog_after(&log, last) {
                                forward!(event);
                            }
                        }
                        Err(broadcast::error::RecvError::Closed) => return,
                    },
                    changed = closed.changed() => {
                        if changed.is_err() {
                            return;
                        }
                    }
                }
            }
        });

        Ok(ChangeStream::new(rx, filter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::time::Duration;
    use tokio::time::timeout;

    fn record(n: u32) -> EventRecord {
        EventRecord {
            event_id: format!("ev-{n}"),
            item_id: "item".into(),
            location_id: "A".into(),
            event_time: Utc.with_ymd_and_hms(2024, 1, 1, 0, n, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_tokens_are_sequential() {
        let feed = InMemoryChangeFeed::new();
        assert_eq!(feed.insert(record(0)), ResumeToken(1));
        assert_eq!(feed.insert(record(1)), ResumeToken(2));
        assert_eq!(feed.len(), 2);
    }

    #[tokio::test]
    async fn test_watch_replays_backlog_then_live() {
        let feed = InMemoryChangeFeed::new();
        feed.insert(record(0));

        let mut stream = feed.watch(ChangeFilter::inserts(), None).await.unwrap();
        feed.insert(record(1));

        let first = timeout(Duration::from_millis(200), stream.next())
            .await
            .expect("timeout")
            .expect("event")
            .unwrap();
        let second = timeout(Duration::from_millis(200), stream.next())
            .await
            .expect("timeout")
            .expect("event")
            .unwrap();

        assert_eq!(first.token, ResumeToken(1));
        assert_eq!(second.token, ResumeToken(2));
    }

    #[tokio::test]
    async fn test_watch_resumes_after_token() {
        let feed = InMemoryChangeFeed::new();
        for n in 0..3 {
            feed.insert(record(n));
        }

        let mut stream = feed
            .watch(ChangeFilter::inserts(), Some(ResumeToken(2)))
            .await
            .unwrap();
        feed.close();

        let event = stream.next().await.expect("event").unwrap();
        assert_eq!(event.token, ResumeToken(3));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_close_ends_stream_after_drain() {
        let feed = InMemoryChangeFeed::new();
        let mut stream = feed.watch(ChangeFilter::inserts(), None).await.unwrap();
        feed.insert(record(0));
        feed.publish(OperationType::Update, record(0));
        feed.close();

        let mut tokens = Vec::new();
        while let Some(Ok(event)) = timeout(Duration::from_millis(200), stream.next())
            .await
            .expect("timeout")
        {
            tokens.push(event.token);
        }
        assert_eq!(tokens, vec![ResumeToken(1)]);
    }
}
