//! Change feed tailing the `events` column family.
//!
//! Event sequence numbers double as resume tokens. A stream reads everything
//! after its cursor in batches, then sleeps until the store reports a new
//! append or the poll interval elapses.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use shared_bus::{
    ChangeEvent, ChangeFeed, ChangeFilter, ChangeStream, FeedError, OperationType, ResumeToken,
    DEFAULT_CHANNEL_CAPACITY,
};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::rocksdb_adapter::RocksDocumentStore;

const READ_BATCH: usize = 256;

/// Durable change feed over a [`RocksDocumentStore`].
pub struct RocksChangeFeed {
    store: Arc<RocksDocumentStore>,
    poll_interval: Duration,
    capacity: usize,
}

impl RocksChangeFeed {
    pub fn new(store: Arc<RocksDocumentStore>, poll_interval: Duration) -> Self {
        Self {
            store,
            poll_interval,
            capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

#[async_trait]
impl ChangeFeed for RocksChangeFeed {
    async fn watch(
        &self,
        filter: ChangeFilter,
        resume_after: Option<ResumeToken>,
    ) -> Result<ChangeStream, FeedError> {
        let store = Arc::clone(&self.store);
        let poll_interval = self.poll_interval;
        let mut head = store.subscribe_head();
        let (tx, rx) = mpsc::channel(self.capacity);

        debug!(resume_after = ?resume_after, "Opening document store change stream");

        tokio::spawn(async move {
            let mut cursor = resume_after;

            loop {
                // Mark the head seen before reading so an append racing the
                // read still wakes the next wait.
                head.borrow_and_update();

                let batch = match store.events_after(cursor, READ_BATCH) {
                    Ok(batch) => batch,
                    Err(e) => {
                        warn!(error = %e, "Change stream read failed");
                        if tx.send(Err(FeedError::Unavailable(e.to_string()))).await.is_err() {
                            return;
                        }
                        Vec::new()
                    }
                };
                let drained = batch.len() < READ_BATCH;

                for stored in batch {
                    cursor = Some(stored.token);
                    let item = match stored.document {
                        Ok(document) => Ok(ChangeEvent {
                            token: stored.token,
                            operation: OperationType::Insert,
                            document,
                        }),
                        Err(message) => Err(FeedError::Malformed {
                            token: stored.token,
                            message,
                        }),
                    };
                    if tx.send(item).await.is_err() {
                        return;
                    }
                }

                if !drained {
                    continue;
                }

                tokio::select! {
                    _ = tx.closed() => return,
                    changed = head.changed() => {
                        if changed.is_err() {
                            return;
                        }
                    }
                    _ = tokio::time::sleep(poll_interval) => {}
                }
            }
        });

        Ok(ChangeStream::new(rx, filter))
    }
}
