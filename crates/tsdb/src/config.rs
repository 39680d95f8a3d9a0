//! Configuration loaded from `tsdb.yml`

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tsdb_query::ExecutorConfig;
use tsdb_storage::{StoreConfig, WalDurability};

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TsdbConfig {
    /// Storage configuration
    pub storage: StorageSettings,
    /// Query execution configuration
    pub query: QuerySettings,
    /// Logging configuration
    pub logging: LoggingSettings,
}

/// Storage settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Root directory of the store
    pub data_dir: PathBuf,
    /// WAL durability: "every_write", "periodic", "os_default", "none"
    pub wal_durability: String,
    /// Sync interval for periodic durability (milliseconds)
    pub wal_sync_interval_ms: u64,
    /// WAL file size before rotation (MB)
    pub wal_max_file_size_mb: u64,
    /// Snapshot shards on close
    pub snapshot_on_close: bool,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            wal_durability: "periodic".to_string(),
            wal_sync_interval_ms: 100,
            wal_max_file_size_mb: 64,
            snapshot_on_close: true,
        }
    }
}

/// Query execution settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuerySettings {
    /// Rows per result when a query asks for chunk size 0
    pub default_chunk_size: usize,
    /// Results buffered ahead of a slow consumer
    pub channel_capacity: usize,
    /// Authorize statements even when no user is supplied
    pub enforce_auth: bool,
}

impl Default for QuerySettings {
    fn default() -> Self {
        let defaults = ExecutorConfig::default();
        Self {
            default_chunk_size: defaults.default_chunk_size,
            channel_capacity: defaults.channel_capacity,
            enforce_auth: defaults.enforce_auth,
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Include target in logs
    pub show_target: bool,
    /// Include thread IDs in logs
    pub show_thread_ids: bool,
    /// Include file and line numbers
    pub show_location: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            show_target: true,
            show_thread_ids: false,
            show_location: false,
        }
    }
}

impl TsdbConfig {
    /// Load configuration from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: TsdbConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Write the default configuration to a file
    pub fn write_default(path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(&Self::default())?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Convert to StoreConfig
    pub fn to_store_config(&self) -> StoreConfig {
        let wal_durability = match self.storage.wal_durability.to_lowercase().as_str() {
            "every_write" | "every-write" | "every" => WalDurability::EveryWrite,
            "periodic" => WalDurability::Periodic {
                interval_ms: self.storage.wal_sync_interval_ms,
            },
            "os_default" | "os-default" | "os" => WalDurability::OsDefault,
            "none" => WalDurability::None,
            _ => WalDurability::default(),
        };

        StoreConfig {
            wal_durability,
            wal_max_file_size: self.storage.wal_max_file_size_mb * 1024 * 1024,
            snapshot_on_close: self.storage.snapshot_on_close,
        }
    }

    /// Convert to ExecutorConfig
    pub fn to_executor_config(&self) -> ExecutorConfig {
        ExecutorConfig {
            default_chunk_size: self.query.default_chunk_size,
            channel_capacity: self.query.channel_capacity,
            enforce_auth: self.query.enforce_auth,
        }
    }
}
