//! # Shared Bus - Change Feed for Event Insertions
//!
//! Carries insertion notifications from the document store to the pipeline
//! dispatcher.
//!
//! ## Delivery Model
//!
//! ```text
//! ┌──────────────┐   watch(resume_after)   ┌──────────────┐
//! │ Document     │ ──────────────────────→ │ ChangeStream │ ──→ dispatcher
//! │ Store (feed) │     ChangeEvent{token}  │  (filtered)  │
//! └──────────────┘                         └──────────────┘
//!         ↑                                        │
//!         └──── ResumeTokenStore ←── AckWatermark ─┘
//! ```
//!
//! - **At-least-once:** a restart resumes after the last *acknowledged*
//!   token, so insertions whose runs had not finished are delivered again.
//! - **Ordered:** a stream yields events in token order.
//! - **Watermark:** runs finish out of order; [`AckWatermark`] only lets the
//!   persisted position advance past tokens whose runs are all done.

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod events;
pub mod publisher;
pub mod subscriber;
pub mod token_store;
pub mod watermark;

// Re-export main types
pub use events::{ChangeEvent, ChangeFilter, FeedError, OperationType, ResumeToken};
pub use publisher::{ChangeFeed, InMemoryChangeFeed};
pub use subscriber::ChangeStream;
pub use token_store::{InMemoryTokenStore, ResumeTokenStore};
pub use watermark::AckWatermark;

/// Maximum notifications buffered per stream before the producer waits.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;
