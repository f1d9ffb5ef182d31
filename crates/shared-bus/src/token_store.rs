//! # Resume Token Storage
//!
//! Persists the last acknowledged feed position so a restart does not skip
//! insertions.

use crate::events::{FeedError, ResumeToken};
use async_trait::async_trait;
use parking_lot::RwLock;

/// Durable home of the acknowledged resume position.
#[async_trait]
pub trait ResumeTokenStore: Send + Sync {
    /// Last acknowledged token, or `None` when starting fresh.
    async fn load(&self) -> Result<Option<ResumeToken>, FeedError>;

    /// Persist `token` as acknowledged.
    async fn save(&self, token: ResumeToken) -> Result<(), FeedError>;
}

/// Volatile token store for tests.
#[derive(Default)]
pub struct InMemoryTokenStore {
    token: RwLock<Option<ResumeToken>>,
}

impl InMemoryTokenStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a given position.
    #[must_use]
    pub fn starting_at(token: ResumeToken) -> Self {
        Self {
            token: RwLock::new(Some(token)),
        }
    }

    /// Current value without going through the async trait.
    #[must_use]
    pub fn current(&self) -> Option<ResumeToken> {
        *self.token.read()
    }
}

#[async_trait]
impl ResumeTokenStore for InMemoryTokenStore {
    async fn load(&self) -> Result<Option<ResumeToken>, FeedError> {
        Ok(*self.token.read())
    }

    async fn save(&self, token: ResumeToken) -> Result<(), FeedError> {
        *self.token.write() = Some(token);
        Ok(())
    }
}
