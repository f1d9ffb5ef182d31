//! # Telemetry-Anchor Test Suite
//!
//! Cross-crate tests that wire real adapters together.
//!
//! ## Structure
//!
//! ```text
//! tests/
//! ├── benches/          # Criterion benchmarks (canonicalization, window resolution)
//! └── src/integration/
//!     ├── flows.rs      # Pipeline against InfluxDB and ledger HTTP mocks
//!     └── runtime.rs    # RocksDB store, change feed and dispatcher, restart
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p anchor-tests
//! cargo test -p anchor-tests integration::runtime::
//! cargo bench -p anchor-tests
//! ```

#![allow(dead_code)]

pub mod fixtures;
pub mod integration;
