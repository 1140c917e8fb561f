//! Storage abstraction for the sidechain ledger.
//!
//! Provides a [`KvStore`](traits::KvStore) trait with memory, SQLite, and RocksDB
//! backends, plus [`LedgerStore`](ledger_store::LedgerStore), the per-height
//! commitment log and latest-state table written in one atomic batch per block.

pub mod error;
pub mod ledger_store;
pub mod memory;
pub mod rocksdb;
pub mod sqlite;
pub mod traits;
