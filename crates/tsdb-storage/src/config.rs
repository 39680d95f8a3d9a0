//! Store configuration

use crate::wal::WalDurability;
use serde::{Deserialize, Serialize};

/// Default WAL file size before rotation (64MB)
pub const DEFAULT_WAL_MAX_FILE_SIZE: u64 = 64 * 1024 * 1024;

/// Store configuration, shared by every shard of the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// WAL durability mode
    pub wal_durability: WalDurability,
    /// Maximum WAL file size (bytes) before rotating to a new file
    pub wal_max_file_size: u64,
    /// Write a snapshot of each shard on close and drop the WAL files it covers
    pub snapshot_on_close: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            wal_durability: WalDurability::default(),
            wal_max_file_size: DEFAULT_WAL_MAX_FILE_SIZE,
            snapshot_on_close: true,
        }
    }
}
