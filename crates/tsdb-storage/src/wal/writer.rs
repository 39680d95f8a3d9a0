//! WAL writer implementation

use super::{entry_checksum, parse_wal_file_name, wal_file_name, WalRecord, HEADER_SIZE};
use crate::error::Result;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, error};

/// WAL durability modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalDurability {
    /// fsync after every write (strongest durability, slowest)
    EveryWrite,
    /// fsync when the interval has elapsed since the last sync
    Periodic { interval_ms: u64 },
    /// Let the OS decide when to flush
    OsDefault,
    /// No fsync
    None,
}

impl Default for WalDurability {
    fn default() -> Self {
        WalDurability::Periodic { interval_ms: 100 }
    }
}

/// WAL entry header
#[derive(Debug, Clone)]
pub(crate) struct WalEntryHeader {
    /// Entry sequence number
    pub(crate) sequence: u64,
    /// Wall-clock time the entry was written
    pub(crate) timestamp: i64,
    /// Number of points in the record
    pub(crate) point_count: u32,
    /// Length of the serialized record
    pub(crate) data_len: u32,
    /// CRC32 of header fields (bytes 0-23) and data
    pub(crate) checksum: u32,
}

impl WalEntryHeader {
    /// Bytes 0-23, the part covered by the checksum
    pub(crate) fn field_bytes(&self) -> [u8; 24] {
        let mut bytes = [0u8; 24];
        bytes[0..8].copy_from_slice(&self.sequence.to_le_bytes());
        bytes[8..16].copy_from_slice(&self.timestamp.to_le_bytes());
        bytes[16..20].copy_from_slice(&self.point_count.to_le_bytes());
        bytes[20..24].copy_from_slice(&self.data_len.to_le_bytes());
        bytes
    }

    pub(crate) fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[0..24].copy_from_slice(&self.field_bytes());
        bytes[24..28].copy_from_slice(&self.checksum.to_le_bytes());
        // bytes[28..32] is padding
        bytes
    }

    pub(crate) fn from_bytes(bytes: &[u8; HEADER_SIZE]) -> Self {
        let u64_at = |at: usize| {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(&bytes[at..at + 8]);
            buf
        };
        let u32_at = |at: usize| {
            let mut buf = [0u8; 4];
            buf.copy_from_slice(&bytes[at..at + 4]);
            buf
        };
        Self {
            sequence: u64::from_le_bytes(u64_at(0)),
            timestamp: i64::from_le_bytes(u64_at(8)),
            point_count: u32::from_le_bytes(u32_at(16)),
            data_len: u32::from_le_bytes(u32_at(20)),
            checksum: u32::from_le_bytes(u32_at(24)),
        }
    }
}

/// BufWriter capacity
const DEFAULT_BUFFER_CAPACITY: usize = 64 * 1024;

/// Append-only WAL writer for one directory
pub struct WalWriter {
    /// Path to the WAL directory
    dir: PathBuf,
    /// Current WAL file
    file: Mutex<BufWriter<File>>,
    /// Next sequence number to assign
    sequence: AtomicU64,
    /// Durability mode
    durability: WalDurability,
    /// Last sync time
    last_sync: Mutex<Instant>,
    /// Current WAL file number
    file_num: AtomicU64,
    /// Maximum WAL file size (bytes)
    max_file_size: u64,
    /// Current file size
    current_size: AtomicU64,
}

impl WalWriter {
    /// Create a WAL writer. Appends go to a fresh file unless the newest
    /// existing file is empty, so a torn tail in an older file never sits
    /// in front of new entries.
    pub fn new(dir: impl AsRef<Path>, durability: WalDurability) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;

        let file_num = Self::find_next_file_num(&dir)?;
        let file = Self::open_file(&dir, file_num)?;

        Ok(Self {
            dir,
            file: Mutex::new(BufWriter::with_capacity(DEFAULT_BUFFER_CAPACITY, file)),
            sequence: AtomicU64::new(0),
            durability,
            last_sync: Mutex::new(Instant::now()),
            file_num: AtomicU64::new(file_num),
            max_file_size: crate::config::DEFAULT_WAL_MAX_FILE_SIZE,
            current_size: AtomicU64::new(0),
        })
    }

    /// Set custom max file size
    pub fn with_max_file_size(mut self, size: u64) -> Self {
        self.max_file_size = size;
        self
    }

    /// Continue numbering at `next` (the sequence after the last recovered entry)
    pub fn with_next_sequence(self, next: u64) -> Self {
        self.sequence.store(next, Ordering::SeqCst);
        self
    }

    /// Append a record, returning its sequence number.
    ///
    /// A failed append leaves the log as it was before the call: the file is
    /// cut back to its previous length and the sequence number is not used.
    /// Rotation happens before the next entry is written, so an entry is
    /// never reported as failed once it is on disk.
    pub fn append(&self, record: &WalRecord) -> Result<u64> {
        let data = bincode::serialize(record)?;
        let timestamp = tsdb_core::now_nanos();

        let mut file = self.file.lock();
        if self.current_size.load(Ordering::SeqCst) >= self.max_file_size {
            self.rotate(&mut file)?;
        }

        let sequence = self.sequence.load(Ordering::SeqCst);
        let mut header = WalEntryHeader {
            sequence,
            timestamp,
            point_count: record.point_count() as u32,
            data_len: data.len() as u32,
            checksum: 0,
        };
        header.checksum = entry_checksum(&header.field_bytes(), &data);

        let start = self.current_size.load(Ordering::SeqCst);
        if let Err(e) = self.write_entry(&mut file, &header, &data) {
            if let Err(rollback) = self.rollback(&mut file, start) {
                error!(
                    "Failed to roll back WAL entry {} in {}: {}",
                    sequence,
                    wal_file_name(self.file_num.load(Ordering::SeqCst)),
                    rollback
                );
            }
            return Err(e);
        }

        self.sequence.store(sequence + 1, Ordering::SeqCst);
        self.current_size
            .store(start + (HEADER_SIZE + data.len()) as u64, Ordering::SeqCst);
        Ok(sequence)
    }

    /// Force sync to disk
    pub fn sync(&self) -> Result<()> {
        let mut file = self.file.lock();
        file.flush()?;
        file.get_ref().sync_all()?;
        *self.last_sync.lock() = Instant::now();
        Ok(())
    }

    /// Next sequence number to be assigned
    pub fn sequence(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }

    /// Get the WAL directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Rotate to a new WAL file
    fn rotate(&self, file: &mut BufWriter<File>) -> Result<()> {
        let new_file_num = self.file_num.load(Ordering::SeqCst) + 1;
        let new_file = Self::open_file(&self.dir, new_file_num)?;

        file.flush()?;
        file.get_ref().sync_all()?;
        *file = BufWriter::with_capacity(DEFAULT_BUFFER_CAPACITY, new_file);

        self.file_num.store(new_file_num, Ordering::SeqCst);
        self.current_size.store(0, Ordering::SeqCst);
        debug!("Rotated WAL to {}", wal_file_name(new_file_num));
        Ok(())
    }

    fn write_entry(
        &self,
        file: &mut BufWriter<File>,
        header: &WalEntryHeader,
        data: &[u8],
    ) -> Result<()> {
        file.write_all(&header.to_bytes())?;
        file.write_all(data)?;
        self.maybe_sync(file)
    }

    /// Drop whatever is buffered and cut the current file back to `len` bytes
    fn rollback(&self, file: &mut BufWriter<File>, len: u64) -> Result<()> {
        let handle = file.get_ref().try_clone()?;
        let torn = std::mem::replace(
            file,
            BufWriter::with_capacity(DEFAULT_BUFFER_CAPACITY, handle),
        );
        // into_parts hands back the unwritten bytes instead of flushing them
        drop(torn.into_parts());
        file.get_ref().set_len(len)?;
        file.get_ref().sync_all()?;
        Ok(())
    }

    fn maybe_sync(&self, file: &mut BufWriter<File>) -> Result<()> {
        // Entries always reach the OS so readers in this process see them
        file.flush()?;
        match self.durability {
            WalDurability::EveryWrite => {
                file.get_ref().sync_all()?;
                *self.last_sync.lock() = Instant::now();
            }
            WalDurability::Periodic { interval_ms } => {
                let mut last_sync = self.last_sync.lock();
                if last_sync.elapsed() >= Duration::from_millis(interval_ms) {
                    file.get_ref().sync_all()?;
                    *last_sync = Instant::now();
                }
            }
            WalDurability::OsDefault | WalDurability::None => {}
        }
        Ok(())
    }

    fn open_file(dir: &Path, num: u64) -> Result<File> {
        Ok(OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(wal_file_name(num)))?)
    }

    fn find_next_file_num(dir: &Path) -> Result<u64> {
        let mut newest: Option<(u64, u64)> = None;

        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name();
            if let Some(num) = parse_wal_file_name(&name.to_string_lossy()) {
                if newest.map_or(true, |(n, _)| num > n) {
                    newest = Some((num, entry.metadata()?.len()));
                }
            }
        }

        Ok(match newest {
            None => 0,
            Some((num, 0)) => num,
            Some((num, _)) => num + 1,
        })
    }
}
