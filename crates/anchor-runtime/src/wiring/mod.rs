//! Change feed to pipeline wiring.

pub mod dispatcher;

pub use dispatcher::{DispatchError, DispatchSummary, DispatcherConfig, FeedDispatcher};
