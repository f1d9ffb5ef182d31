//! # Change Stream
//!
//! Defines the consuming side of a change feed.

use crate::events::{ChangeEvent, ChangeFilter, FeedError};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_stream::Stream;
use tracing::trace;

/// Item yielded by a change stream.
pub type ChangeResult = Result<ChangeEvent, FeedError>;

/// A stream of change notifications, in token order.
///
/// Produced by [`crate::ChangeFeed::watch`]. Errors are yielded in-line so a
/// malformed document does not end the stream.
pub struct ChangeStream {
    /// Receiving half fed by the feed's producer task.
    receiver: mpsc::Receiver<ChangeResult>,

    /// Filter for this stream.
    filter: ChangeFilter,
}

impl ChangeStream {
    /// Create a stream from a producer channel.
    #[must_use]
    pub fn new(receiver: mpsc::Receiver<ChangeResult>, filter: ChangeFilter) -> Self {
        Self { receiver, filter }
    }

    /// Receive the next notification that matches the filter.
    ///
    /// # Returns
    ///
    /// - `Some(Ok(event))` - The next matching notification
    /// - `Some(Err(e))` - The producer reported an error for one position
    /// - `None` - The feed was closed
    ///
    /// Cancel safe: dropping the future before it resolves loses nothing.
    pub async fn next(&mut self) -> Option<ChangeResult> {
        loop {
            match self.receiver.recv().await? {
                Ok(event) if !self.filter.matches(&event) => {
                    trace!(token = %event.token, operation = ?event.operation, "Filtered change");
                }
                other => return Some(other),
            }
        }
    }

    /// Get the filter for this stream.
    #[must_use]
    pub fn filter(&self) -> &ChangeFilter {
        &self.filter
    }
}

impl Stream for ChangeStream {
    type Item = ChangeResult;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            match self.receiver.poll_recv(cx) {
                Poll::Ready(Some(Ok(event))) if !self.filter.matches(&event) => continue,
                other => return other,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{OperationType, ResumeToken};
    use chrono::{TimeZone, Utc};
    use shared_types::EventRecord;
    use tokio_stream::StreamExt;

    fn change(token: u64, operation: OperationType) -> ChangeEvent {
        ChangeEvent {
            token: ResumeToken(token),
            operation,
            document: EventRecord {
                event_id: format!("ev-{token}"),
                item_id: "item".into(),
                location_id: "A".into(),
                event_time: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            },
        }
    }

    #[tokio::test]
    async fn test_next_skips_filtered() {
        let (tx, rx) = mpsc::channel(8);
        let mut stream = ChangeStream::new(rx, ChangeFilter::inserts());

        tx.send(Ok(change(1, OperationType::Update))).await.unwrap();
        tx.send(Ok(change(2, OperationType::Insert))).await.unwrap();
        drop(tx);

        let received = stream.next().await.unwrap().unwrap();
        assert_eq!(received.token, ResumeToken(2));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_errors_pass_through() {
        let (tx, rx) = mpsc::channel(8);
        let mut stream = ChangeStream::new(rx, ChangeFilter::inserts());

        tx.send(Err(FeedError::Unavailable("disk".into()))).await.unwrap();
        tx.send(Ok(change(3, OperationType::Insert))).await.unwrap();

        assert!(matches!(stream.next().await, Some(Err(FeedError::Unavailable(_)))));
        assert!(matches!(stream.next().await, Some(Ok(_))));
    }

    #[tokio::test]
    async fn test_stream_impl_filters() {
        let (tx, rx) = mpsc::channel(8);
        let stream = ChangeStream::new(rx, ChangeFilter::inserts());

        tx.send(Ok(change(1, OperationType::Delete))).await.unwrap();
        tx.send(Ok(change(2, OperationType::Insert))).await.unwrap();
        tx.send(Ok(change(3, OperationType::Insert))).await.unwrap();
        drop(tx);

        let tokens: Vec<u64> = stream
            .filter_map(|item| item.ok())
            .map(|event| event.token.0)
            .collect()
            .await;
        assert_eq!(tokens, vec![2, 3]);
    }
}
