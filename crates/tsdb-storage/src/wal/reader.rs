//! WAL reader implementation

use super::writer::WalEntryHeader;
use super::{entry_checksum, parse_wal_file_name, WalRecord, HEADER_SIZE};
use crate::error::{Result, StorageError};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// WAL entry
#[derive(Debug, Clone)]
pub struct WalEntry {
    /// Entry sequence number
    pub sequence: u64,
    /// Wall-clock time the entry was written
    pub timestamp: i64,
    /// Logged mutation
    pub record: WalRecord,
}

/// WAL reader for recovery
pub struct WalReader {
    dir: PathBuf,
}

impl WalReader {
    /// Create a new WAL reader
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    /// Read all entries from all WAL files, ordered by sequence
    pub fn read_all(&self) -> Result<Vec<WalEntry>> {
        let mut entries = Vec::new();

        for file_path in self.list_wal_files()? {
            entries.extend(self.read_file(&file_path)?);
        }

        entries.sort_by_key(|e| e.sequence);
        Ok(entries)
    }

    /// Read entries with a sequence number of at least `start_sequence`
    pub fn read_from(&self, start_sequence: u64) -> Result<Vec<WalEntry>> {
        Ok(self
            .read_all()?
            .into_iter()
            .filter(|e| e.sequence >= start_sequence)
            .collect())
    }

    /// Read a single WAL file. A torn entry at the end of the file is skipped.
    pub fn read_file(&self, path: &Path) -> Result<Vec<WalEntry>> {
        let mut reader = BufReader::new(File::open(path)?);
        let mut entries = Vec::new();

        loop {
            let mut header_bytes = [0u8; HEADER_SIZE];
            match reader.read_exact(&mut header_bytes) {
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            }

            let header = WalEntryHeader::from_bytes(&header_bytes);

            let mut data = vec![0u8; header.data_len as usize];
            match reader.read_exact(&mut data) {
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    warn!(
                        "Truncated WAL entry at sequence {} in {:?}",
                        header.sequence, path
                    );
                    break;
                }
                Err(e) => return Err(e.into()),
            }

            let computed = entry_checksum(&header.field_bytes(), &data);
            if computed != header.checksum {
                return Err(StorageError::WalCorrupted(format!(
                    "Checksum mismatch at sequence {} in {:?}: expected {:x}, got {:x}",
                    header.sequence, path, header.checksum, computed
                )));
            }

            let record: WalRecord = bincode::deserialize(&data)?;
            entries.push(WalEntry {
                sequence: header.sequence,
                timestamp: header.timestamp,
                record,
            });
        }

        Ok(entries)
    }

    /// List all WAL files in file-number order
    pub fn list_wal_files(&self) -> Result<Vec<PathBuf>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut files: Vec<(u64, PathBuf)> = std::fs::read_dir(&self.dir)?
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().map_or(false, |t| t.is_file()))
            .filter_map(|e| {
                let num = parse_wal_file_name(&e.file_name().to_string_lossy())?;
                Some((num, e.path()))
            })
            .collect();

        files.sort_by_key(|(num, _)| *num);
        Ok(files.into_iter().map(|(_, path)| path).collect())
    }

    /// Delete WAL files whose entries all have a sequence below `sequence`.
    /// Files without entries are deleted too. Returns the number removed.
    pub fn remove_before(&self, sequence: u64) -> Result<usize> {
        let mut removed = 0;

        for file_path in self.list_wal_files()? {
            let entries = self.read_file(&file_path)?;
            if entries.iter().all(|e| e.sequence < sequence) {
                std::fs::remove_file(&file_path)?;
                removed += 1;
            }
        }

        if removed > 0 {
            debug!("Removed {} WAL files below sequence {}", removed, sequence);
        }
        Ok(removed)
    }
}
