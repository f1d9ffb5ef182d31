//! Runtime adapters: the RocksDB document store with its change feed, and
//! the metered ledger decorator.

pub mod metered;
pub mod storage;

pub use metered::MeteredLedger;
pub use storage::{RocksChangeFeed, RocksDbConfig, RocksDocumentStore};
