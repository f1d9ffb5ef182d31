//! # Anchor Runtime Library
//!
//! Exposes the runtime's modules for testing. The main entry point is the
//! `anchor-runtime` binary.
//!
//! - `adapters`: RocksDB document store, its change feed, metered ledger
//! - `container`: configuration and wiring of the concrete adapters
//! - `wiring`: the dispatcher driving the pipeline from the change feed

#![allow(clippy::type_complexity)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod adapters;
pub mod container;
pub mod wiring;

pub use container::{AnchorConfig, AnchorContainer, ConfigError, ContainerError};
pub use wiring::{DispatchError, DispatchSummary, DispatcherConfig, FeedDispatcher};
