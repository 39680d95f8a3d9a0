//! Shard snapshot file
//!
//! Layout: 4-byte magic, 4-byte CRC32 of the payload, bincode payload.
//! Written to a temporary file and renamed into place.

use crate::error::{Result, StorageError};
use crate::shard::FieldSet;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::Path;
use tsdb_core::Timestamp;
use tsdb_index::SeriesMetadata;

pub(crate) const SNAPSHOT_FILE: &str = "shard.snapshot";
const SNAPSHOT_TMP_FILE: &str = "shard.snapshot.tmp";
const MAGIC: &[u8; 4] = b"TSS2";

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct SnapshotSeries {
    pub meta: SeriesMetadata,
    pub records: Vec<(Timestamp, FieldSet)>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct ShardSnapshot {
    /// First WAL sequence not covered by this snapshot
    pub next_sequence: u64,
    /// Series in first-seen order
    pub series: Vec<SnapshotSeries>,
    /// Tag-key catalog
    pub tag_keys: BTreeMap<String, BTreeSet<String>>,
    /// Field keys per measurement in first-written order
    pub field_keys: BTreeMap<String, Vec<String>>,
}

pub(crate) fn write(dir: &Path, snapshot: &ShardSnapshot) -> Result<()> {
    let payload = bincode::serialize(snapshot)?;
    let checksum = crc32fast::hash(&payload);

    let tmp = dir.join(SNAPSHOT_TMP_FILE);
    {
        let mut file = std::fs::File::create(&tmp)?;
        file.write_all(MAGIC)?;
        file.write_all(&checksum.to_le_bytes())?;
        file.write_all(&payload)?;
        file.sync_all()?;
    }
    std::fs::rename(&tmp, dir.join(SNAPSHOT_FILE))?;
    Ok(())
}

pub(crate) fn read(dir: &Path) -> Result<Option<ShardSnapshot>> {
    let path = dir.join(SNAPSHOT_FILE);
    if !path.exists() {
        return Ok(None);
    }

    let bytes = std::fs::read(&path)?;
    if bytes.len() < 8 || &bytes[0..4] != MAGIC {
        return Err(StorageError::SnapshotCorrupted(format!(
            "{:?}: bad header",
            path
        )));
    }

    let mut crc = [0u8; 4];
    crc.copy_from_slice(&bytes[4..8]);
    let expected = u32::from_le_bytes(crc);
    let payload = &bytes[8..];
    let computed = crc32fast::hash(payload);
    if computed != expected {
        return Err(StorageError::SnapshotCorrupted(format!(
            "{:?}: checksum mismatch: expected {:x}, got {:x}",
            path, expected, computed
        )));
    }

    Ok(Some(bincode::deserialize(payload)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tsdb_core::{FieldValue, Tag};

    fn sample() -> ShardSnapshot {
        let mut fields = FieldSet::new();
        fields.insert("value".to_string(), FieldValue::Float(1.0));
        ShardSnapshot {
            next_sequence: 3,
            series: vec![SnapshotSeries {
                meta: SeriesMetadata {
                    id: 7,
                    measurement: "cpu".to_string(),
                    tags: vec![Tag::new("host", "server")],
                    ordinal: 0,
                    first_seen: 10,
                    last_seen: 10,
                },
                records: vec![(10, fields)],
            }],
            tag_keys: BTreeMap::from([(
                "cpu".to_string(),
                BTreeSet::from(["host".to_string()]),
            )]),
            field_keys: BTreeMap::from([(
                "cpu".to_string(),
                vec!["value".to_string(), "idle".to_string()],
            )]),
        }
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let dir = TempDir::new().unwrap();
        assert!(read(dir.path()).unwrap().is_none());

        write(dir.path(), &sample()).unwrap();
        let loaded = read(dir.path()).unwrap().unwrap();

        assert_eq!(loaded.next_sequence, 3);
        assert_eq!(loaded.series.len(), 1);
        assert_eq!(loaded.series[0].meta.measurement, "cpu");
        assert!(loaded.tag_keys["cpu"].contains("host"));
        assert_eq!(loaded.field_keys["cpu"], vec!["value", "idle"]);
        assert!(!dir.path().join(SNAPSHOT_TMP_FILE).exists());
    }

    #[test]
    fn test_snapshot_corruption_detected() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), &sample()).unwrap();

        let path = dir.path().join(SNAPSHOT_FILE);
        let mut bytes = std::fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        std::fs::write(&path, bytes).unwrap();

        assert!(matches!(
            read(dir.path()),
            Err(StorageError::SnapshotCorrupted(_))
        ));
    }
}
