//! Storage adapters backed by RocksDB.

pub mod change_feed;
pub mod rocksdb_adapter;

pub use change_feed::RocksChangeFeed;
pub use rocksdb_adapter::{RocksDbConfig, RocksDocumentStore, StoredEvent};
