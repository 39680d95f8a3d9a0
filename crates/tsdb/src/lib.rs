//! tsdb - embedded time series database
//!
//! Ties the workspace crates together:
//! - [`TsdbConfig`]: YAML configuration for storage, query execution and logging
//! - [`telemetry::init_logging`]: tracing subscriber setup
//! - [`Tsdb`]: an opened store with a query executor bound to a MetaStore

pub mod config;
pub mod telemetry;

pub use config::{LoggingSettings, QuerySettings, StorageSettings, TsdbConfig};

pub use tsdb_core as model;
pub use tsdb_index as index;
pub use tsdb_meta as meta;
pub use tsdb_query as query;
pub use tsdb_storage as storage;

use anyhow::Context;
use std::sync::Arc;
use tracing::info;
use tsdb_meta::MetaStore;
use tsdb_query::QueryExecutor;
use tsdb_storage::Store;

/// An open store and the executor querying it
pub struct Tsdb {
    store: Arc<Store>,
    executor: QueryExecutor,
}

impl Tsdb {
    /// Open the store under `config.storage.data_dir` and bind an executor
    /// to it and `meta`
    pub fn open(config: &TsdbConfig, meta: Arc<dyn MetaStore>) -> anyhow::Result<Self> {
        let store = Arc::new(Store::with_config(
            &config.storage.data_dir,
            config.to_store_config(),
        ));
        store.open().with_context(|| {
            format!("failed to open store at {}", config.storage.data_dir.display())
        })?;

        let executor = QueryExecutor::with_config(store.clone(), config.to_executor_config());
        executor.set_meta_store(meta);

        info!(
            data_dir = %config.storage.data_dir.display(),
            shards = store.shard_count(),
            "tsdb opened"
        );
        Ok(Self { store, executor })
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn executor(&self) -> &QueryExecutor {
        &self.executor
    }

    /// Close every shard of the store
    pub fn close(&self) -> anyhow::Result<()> {
        self.store.close().context("failed to close store")?;
        info!("tsdb closed");
        Ok(())
    }
}
