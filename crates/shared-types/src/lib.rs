//! # Shared Types Crate
//!
//! This crate contains the record shapes exchanged between the anchoring
//! pipeline and its external stores.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: Event records, windows, readings, digests and
//!   audit records are defined once, here.
//! - **Typed Store Boundary**: Rows coming back from the time-series store are
//!   loose (`RawReading`) until validated into a `TelemetryReading`. Nothing
//!   un-validated ever reaches the hash.
//! - **Fixed Wire Formats**: Timestamps and digests serialize to one textual
//!   form only (see [`time`] and [`Digest`]).

pub mod digest;
pub mod entities;
pub mod errors;
pub mod time;

pub use digest::Digest;
pub use entities::*;
pub use errors::*;
