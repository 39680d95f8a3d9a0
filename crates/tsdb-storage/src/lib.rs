//! tsdb storage - the shard store
//!
//! This crate provides the durable storage layer:
//! - WAL (write-ahead log) per shard with configurable durability
//! - Shard snapshots written on close
//! - Shards: series data, tag indexes and the tag-key catalog
//! - Store: shard lifecycle and write routing for one data directory

pub mod config;
pub mod error;
pub mod shard;
mod snapshot;
pub mod store;
pub mod wal;

pub use config::StoreConfig;
pub use error::{Result, StorageError};
pub use shard::{FieldSet, Record, ScanSeries, Shard};
pub use store::Store;
pub use wal::{WalDurability, WalEntry, WalReader, WalRecord, WalWriter};
