//! Write-Ahead Log implementation
//!
//! Every shard mutation is appended to the shard's WAL before it becomes
//! visible. Entries are framed by a 32-byte header carrying the sequence
//! number and a CRC32 over the header fields and the payload.

mod reader;
mod writer;

pub use reader::{WalEntry, WalReader};
pub use writer::{WalDurability, WalWriter};

use serde::{Deserialize, Serialize};
use tsdb_core::{Point, TagFilter};

/// A logged shard mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WalRecord {
    /// A batch of points written together
    Write(Vec<Point>),
    /// Removal of the series of a measurement matching all filters
    DropSeries {
        measurement: String,
        filters: Vec<TagFilter>,
    },
}

impl WalRecord {
    /// Number of points carried by the record
    pub fn point_count(&self) -> usize {
        match self {
            WalRecord::Write(points) => points.len(),
            WalRecord::DropSeries { .. } => 0,
        }
    }
}

/// Size of the entry header in bytes
pub(crate) const HEADER_SIZE: usize = 32;

pub(crate) fn wal_file_name(num: u64) -> String {
    format!("wal_{:08}.log", num)
}

pub(crate) fn parse_wal_file_name(name: &str) -> Option<u64> {
    name.strip_prefix("wal_")?
        .strip_suffix(".log")?
        .parse::<u64>()
        .ok()
}

/// CRC32 over the first 24 header bytes (everything but the checksum) and the payload
pub(crate) fn entry_checksum(header_fields: &[u8], data: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(header_fields);
    hasher.update(data);
    hasher.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wal_file_names() {
        assert_eq!(wal_file_name(7), "wal_00000007.log");
        assert_eq!(parse_wal_file_name("wal_00000007.log"), Some(7));
        assert_eq!(parse_wal_file_name("wal_x.log"), None);
        assert_eq!(parse_wal_file_name("shard.snapshot"), None);
    }
}
