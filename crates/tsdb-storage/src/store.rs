//! Store - owns the shards of one data directory
//!
//! Layout: `<path>/<database>/<retention_policy>/<shard_id>/`. `Store::new`
//! does no I/O; `open` walks the layout and opens every shard; `close`
//! closes every shard and leaves the store unusable until reopened.
//!
//! A data directory must be owned by a single store at a time.

use crate::config::StoreConfig;
use crate::error::{Result, StorageError};
use crate::shard::Shard;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use tsdb_core::Point;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    New,
    Open,
    Closed,
}

/// Shard store for one directory
pub struct Store {
    path: PathBuf,
    config: StoreConfig,
    shards: RwLock<HashMap<u64, Arc<Shard>>>,
    lifecycle: RwLock<Lifecycle>,
}

impl Store {
    /// Create a store over `path` with default configuration
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self::with_config(path, StoreConfig::default())
    }

    /// Create a store over `path`
    pub fn with_config(path: impl AsRef<Path>, config: StoreConfig) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            config,
            shards: RwLock::new(HashMap::new()),
            lifecycle: RwLock::new(Lifecycle::New),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn is_open(&self) -> bool {
        *self.lifecycle.read() == Lifecycle::Open
    }

    /// Open the store, loading every shard under the directory.
    /// Calling `open` on an open store is a no-op.
    pub fn open(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.write();
        if *lifecycle == Lifecycle::Open {
            return Ok(());
        }

        std::fs::create_dir_all(&self.path)?;
        let mut shards = HashMap::new();

        for db_dir in subdirectories(&self.path)? {
            let database = dir_name(&db_dir);
            for rp_dir in subdirectories(&db_dir)? {
                let retention_policy = dir_name(&rp_dir);
                for shard_dir in subdirectories(&rp_dir)? {
                    let Ok(id) = dir_name(&shard_dir).parse::<u64>() else {
                        warn!("Skipping non-shard directory {:?}", shard_dir);
                        continue;
                    };
                    if shards.contains_key(&id) {
                        return Err(StorageError::ShardExists(id));
                    }
                    let shard = Shard::open(
                        &shard_dir,
                        id,
                        database.clone(),
                        retention_policy.clone(),
                        self.config.clone(),
                    )?;
                    shards.insert(id, Arc::new(shard));
                }
            }
        }

        info!("Opened store at {:?} with {} shards", self.path, shards.len());
        *self.shards.write() = shards;
        *lifecycle = Lifecycle::Open;
        Ok(())
    }

    /// Create a new, empty shard
    pub fn create_shard(&self, database: &str, retention_policy: &str, shard_id: u64) -> Result<()> {
        let _lifecycle = self.ensure_open()?;

        let mut shards = self.shards.write();
        if shards.contains_key(&shard_id) {
            return Err(StorageError::ShardExists(shard_id));
        }

        let shard_path = self.shard_path(database, retention_policy, shard_id);
        let shard = Shard::open(
            &shard_path,
            shard_id,
            database,
            retention_policy,
            self.config.clone(),
        )?;
        shards.insert(shard_id, Arc::new(shard));

        info!(shard_id, database, retention_policy, "Created shard");
        Ok(())
    }

    /// Write a batch of points to a shard
    pub fn write_to_shard(&self, shard_id: u64, points: &[Point]) -> Result<()> {
        let shard = self.shard(shard_id)?;
        shard.write(points)?;
        debug!(shard_id, points = points.len(), "Wrote to shard");
        Ok(())
    }

    /// Handle to a shard
    pub fn shard(&self, shard_id: u64) -> Result<Arc<Shard>> {
        let _lifecycle = self.ensure_open()?;
        self.shards
            .read()
            .get(&shard_id)
            .cloned()
            .ok_or(StorageError::ShardNotFound(shard_id))
    }

    /// Sorted IDs of all shards
    pub fn shard_ids(&self) -> Result<Vec<u64>> {
        let _lifecycle = self.ensure_open()?;
        let mut ids: Vec<u64> = self.shards.read().keys().copied().collect();
        ids.sort_unstable();
        Ok(ids)
    }

    pub fn shard_count(&self) -> usize {
        self.shards.read().len()
    }

    /// Close a shard and remove its files
    pub fn delete_shard(&self, shard_id: u64) -> Result<()> {
        let _lifecycle = self.ensure_open()?;

        let shard = self
            .shards
            .write()
            .remove(&shard_id)
            .ok_or(StorageError::ShardNotFound(shard_id))?;
        shard.close()?;
        std::fs::remove_dir_all(shard.path())?;

        info!(shard_id, "Deleted shard");
        Ok(())
    }

    /// Close every shard. All later operations fail until the store is reopened.
    pub fn close(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.write();
        if *lifecycle != Lifecycle::Open {
            return Ok(());
        }
        *lifecycle = Lifecycle::Closed;

        let shards: Vec<Arc<Shard>> = self.shards.write().drain().map(|(_, s)| s).collect();
        let mut first_error = None;
        for shard in &shards {
            if let Err(e) = shard.close() {
                warn!(shard_id = shard.id(), "Failed to close shard: {}", e);
                first_error.get_or_insert(e);
            }
        }

        info!("Closed store at {:?}", self.path);
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn shard_path(&self, database: &str, retention_policy: &str, shard_id: u64) -> PathBuf {
        self.path
            .join(database)
            .join(retention_policy)
            .join(shard_id.to_string())
    }

    fn ensure_open(&self) -> Result<parking_lot::RwLockReadGuard<'_, Lifecycle>> {
        let lifecycle = self.lifecycle.read();
        if *lifecycle != Lifecycle::Open {
            return Err(StorageError::Closed);
        }
        Ok(lifecycle)
    }
}

fn subdirectories(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            dirs.push(entry.path());
        }
    }
    dirs.sort();
    Ok(dirs)
}

fn dir_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tsdb_core::ErrorKind;

    #[test]
    fn test_store_new_does_no_io() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data");
        let store = Store::new(&path);

        assert!(!path.exists());
        assert!(!store.is_open());
        assert!(matches!(store.shard_ids(), Err(StorageError::Closed)));
    }

    #[test]
    fn test_store_open_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = Store::new(dir.path());

        store.open().unwrap();
        store.create_shard("db", "rp", 1).unwrap();
        store.open().unwrap();

        assert_eq!(store.shard_ids().unwrap(), vec![1]);
    }

    #[test]
    fn test_store_create_shard_twice() {
        let dir = TempDir::new().unwrap();
        let store = Store::new(dir.path());
        store.open().unwrap();

        store.create_shard("db", "rp", 7).unwrap();
        let err = store.create_shard("other", "rp", 7).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
        assert!(dir.path().join("db").join("rp").join("7").exists());
    }

    #[test]
    fn test_store_write_unknown_shard() {
        let dir = TempDir::new().unwrap();
        let store = Store::new(dir.path());
        store.open().unwrap();

        let point = Point::builder("cpu").field("value", 1.0).build().unwrap();
        let err = store.write_to_shard(42, &[point]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_store_skips_non_shard_dirs() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("db").join("rp").join("not-a-shard")).unwrap();

        let store = Store::new(dir.path());
        store.open().unwrap();
        assert_eq!(store.shard_count(), 0);
    }

    #[test]
    fn test_store_delete_shard() {
        let dir = TempDir::new().unwrap();
        let store = Store::new(dir.path());
        store.open().unwrap();
        store.create_shard("db", "rp", 3).unwrap();

        store.delete_shard(3).unwrap();
        assert!(!dir.path().join("db").join("rp").join("3").exists());
        assert_eq!(store.delete_shard(3).unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_store_closed_rejects_operations() {
        let dir = TempDir::new().unwrap();
        let store = Store::new(dir.path());
        store.open().unwrap();
        store.create_shard("db", "rp", 1).unwrap();
        store.close().unwrap();

        let point = Point::builder("cpu").field("value", 1.0).build().unwrap();
        assert!(matches!(
            store.write_to_shard(1, &[point]),
            Err(StorageError::Closed)
        ));
        assert!(matches!(
            store.create_shard("db", "rp", 2),
            Err(StorageError::Closed)
        ));
        assert!(store.shard(1).is_err());
    }
}
