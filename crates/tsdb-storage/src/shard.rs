//! Shard - one unit of durable storage
//!
//! A shard holds the series written to it together with the indexes used to
//! find them:
//! - Series index (measurement -> series in first-seen order)
//! - Inverted tag index for predicate resolution and tag values
//! - Tag-key and field-key catalogs, which outlive the series they were
//!   built from
//!
//! Mutations are appended to the shard's WAL and applied to the in-memory
//! state under one write lock, so a batch is visible entirely or not at all.
//! On close the state is snapshotted and the covered WAL files are removed.

use crate::config::StoreConfig;
use crate::error::{Result, StorageError};
use crate::snapshot::{self, ShardSnapshot, SnapshotSeries};
use crate::wal::{WalReader, WalRecord, WalWriter};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};
use tsdb_core::{FieldValue, Point, SeriesId, Tag, TagFilter, TimeRange, Timestamp};
use tsdb_index::{FieldKeyCatalog, SeriesIndex, SeriesMetadata, TagIndex, TagKeyCatalog};

/// Field values of one record, keyed by field name
pub type FieldSet = BTreeMap<String, FieldValue>;

/// One timestamped record of a series
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub timestamp: Timestamp,
    pub fields: FieldSet,
}

/// Records of one series returned by a scan
#[derive(Debug, Clone, PartialEq)]
pub struct ScanSeries {
    pub id: SeriesId,
    pub measurement: String,
    /// Tags in canonical (sorted) order
    pub tags: Vec<Tag>,
    /// Records in ascending time order
    pub records: Vec<Record>,
}

/// In-memory shard state guarded by the shard lock
struct ShardState {
    series: SeriesIndex,
    tags: TagIndex,
    catalog: TagKeyCatalog,
    fields: FieldKeyCatalog,
    data: HashMap<SeriesId, BTreeMap<Timestamp, FieldSet>>,
}

impl ShardState {
    fn new() -> Self {
        Self {
            series: SeriesIndex::new(),
            tags: TagIndex::new(),
            catalog: TagKeyCatalog::new(),
            fields: FieldKeyCatalog::new(),
            data: HashMap::new(),
        }
    }

    fn from_snapshot(snapshot: ShardSnapshot) -> Result<Self> {
        let tags = TagIndex::new();
        let mut data = HashMap::with_capacity(snapshot.series.len());
        let mut metas = Vec::with_capacity(snapshot.series.len());

        for SnapshotSeries { meta, records } in snapshot.series {
            tags.index_series(meta.id, &meta.tags);
            data.insert(meta.id, records.into_iter().collect());
            metas.push(meta);
        }

        Ok(Self {
            series: SeriesIndex::from_entries(metas)?,
            tags,
            catalog: TagKeyCatalog::from_entries(snapshot.tag_keys),
            fields: FieldKeyCatalog::from_entries(snapshot.field_keys),
            data,
        })
    }

    fn snapshot(&self, next_sequence: u64) -> ShardSnapshot {
        let series = self
            .series
            .ordered()
            .into_iter()
            .map(|meta| {
                let records = self
                    .data
                    .get(&meta.id)
                    .map(|r| r.iter().map(|(ts, f)| (*ts, f.clone())).collect())
                    .unwrap_or_default();
                SnapshotSeries { meta, records }
            })
            .collect();

        ShardSnapshot {
            next_sequence,
            series,
            tag_keys: self.catalog.entries(),
            field_keys: self.fields.entries(),
        }
    }

    fn apply(&mut self, record: &WalRecord) -> Result<()> {
        match record {
            WalRecord::Write(points) => self.apply_points(points),
            WalRecord::DropSeries {
                measurement,
                filters,
            } => {
                let ids = self.matching_series(measurement, filters)?;
                self.remove_series(&ids);
            }
        }
        Ok(())
    }

    fn apply_points(&mut self, points: &[Point]) {
        for point in points {
            let id = point.series_id();
            if self
                .series
                .upsert(id, &point.measurement, &point.tags, point.timestamp)
            {
                self.tags.index_series(id, &point.tags);
            }
            self.catalog.record(&point.measurement, &point.tags);
            self.fields.record(&point.measurement, &point.fields);

            let fields = self
                .data
                .entry(id)
                .or_default()
                .entry(point.timestamp)
                .or_default();
            for field in &point.fields {
                fields.insert(field.key.clone(), field.value.clone());
            }
        }
    }

    /// Series of a measurement matching every filter, in first-seen order
    fn matching_series(
        &self,
        measurement: &str,
        filters: &[TagFilter],
    ) -> Result<Vec<SeriesId>> {
        let candidates = self.series.get_by_measurement(measurement);
        if candidates.is_empty() || filters.is_empty() {
            return Ok(candidates);
        }

        let mut bitmap = self.tags.series_to_bitmap(&candidates);
        for filter in filters {
            if let TagFilter::Equals { key, value } = filter {
                if !self.tags.intersect_with(key, value, &mut bitmap) {
                    return Ok(Vec::new());
                }
            }
        }
        let allowed: HashSet<SeriesId> = self.tags.bitmap_to_series(&bitmap).into_iter().collect();

        let mut matched = Vec::new();
        for id in candidates.into_iter().filter(|id| allowed.contains(id)) {
            if let Some(meta) = self.series.get(id) {
                if TagFilter::matches_all(filters, &meta.tags)? {
                    matched.push(id);
                }
            }
        }
        Ok(matched)
    }

    fn remove_series(&mut self, ids: &[SeriesId]) -> usize {
        let mut removed = 0;
        for id in ids {
            if let Some(meta) = self.series.remove(*id) {
                self.tags.remove_series(*id, &meta.tags);
                removed += 1;
            }
            self.data.remove(id);
        }
        removed
    }
}

/// A shard of the store
pub struct Shard {
    id: u64,
    database: String,
    retention_policy: String,
    path: PathBuf,
    config: StoreConfig,
    wal: WalWriter,
    state: RwLock<ShardState>,
    closed: AtomicBool,
}

impl Shard {
    /// Open the shard stored at `path`, creating an empty one if nothing is
    /// persisted there yet. Loads the snapshot and replays newer WAL entries.
    pub fn open(
        path: impl AsRef<Path>,
        id: u64,
        database: impl Into<String>,
        retention_policy: impl Into<String>,
        config: StoreConfig,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        std::fs::create_dir_all(&path)?;
        let wal_dir = path.join("wal");

        let (mut state, mut next_sequence) = match snapshot::read(&path)? {
            Some(snapshot) => {
                let next = snapshot.next_sequence;
                (ShardState::from_snapshot(snapshot)?, next)
            }
            None => (ShardState::new(), 0),
        };

        let entries = WalReader::new(&wal_dir).read_from(next_sequence)?;
        let replayed = entries.len();
        for entry in entries {
            state.apply(&entry.record)?;
            next_sequence = next_sequence.max(entry.sequence + 1);
        }

        let wal = WalWriter::new(&wal_dir, config.wal_durability)?
            .with_max_file_size(config.wal_max_file_size)
            .with_next_sequence(next_sequence);

        info!(
            shard_id = id,
            series = state.series.len(),
            replayed,
            "Opened shard at {:?}",
            path
        );

        Ok(Self {
            id,
            database: database.into(),
            retention_policy: retention_policy.into(),
            path,
            config,
            wal,
            state: RwLock::new(state),
            closed: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn retention_policy(&self) -> &str {
        &self.retention_policy
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write a batch of points. The whole batch is logged as one WAL entry
    /// and becomes visible to readers at once.
    pub fn write(&self, points: &[Point]) -> Result<()> {
        self.ensure_open()?;
        if points.is_empty() {
            return Ok(());
        }

        let mut batch = points.to_vec();
        for point in &mut batch {
            point.sort_tags();
            point.validate()?;
        }
        let record = WalRecord::Write(batch);

        let mut state = self.state.write();
        self.ensure_open()?;
        let sequence = self.wal.append(&record)?;
        state.apply(&record)?;

        debug!(shard_id = self.id, sequence, points = points.len(), "Wrote batch");
        Ok(())
    }

    /// Records of the measurement's series matching all filters within the
    /// time range. Series come in first-seen order; series without records
    /// in range are left out.
    pub fn scan(
        &self,
        measurement: &str,
        filters: &[TagFilter],
        time_range: &TimeRange,
    ) -> Result<Vec<ScanSeries>> {
        self.ensure_open()?;
        validate_filters(filters)?;
        if time_range.start >= time_range.end {
            return Ok(Vec::new());
        }

        let state = self.state.read();
        let mut out = Vec::new();

        for id in state.matching_series(measurement, filters)? {
            let Some(meta) = state.series.get(id) else {
                continue;
            };
            let records: Vec<Record> = state
                .data
                .get(&id)
                .map(|rows| {
                    rows.range(time_range.start..time_range.end)
                        .map(|(ts, fields)| Record {
                            timestamp: *ts,
                            fields: fields.clone(),
                        })
                        .collect()
                })
                .unwrap_or_default();

            if !records.is_empty() {
                out.push(ScanSeries {
                    id,
                    measurement: meta.measurement,
                    tags: meta.tags,
                    records,
                });
            }
        }

        Ok(out)
    }

    /// Remove the data of the measurement's series matching all filters.
    /// The tag-key catalog is left untouched. Returns the number removed.
    pub fn drop_series(&self, measurement: &str, filters: &[TagFilter]) -> Result<usize> {
        self.ensure_open()?;
        validate_filters(filters)?;

        let mut state = self.state.write();
        self.ensure_open()?;
        let ids = state.matching_series(measurement, filters)?;
        if ids.is_empty() {
            return Ok(0);
        }

        self.wal.append(&WalRecord::DropSeries {
            measurement: measurement.to_string(),
            filters: filters.to_vec(),
        })?;
        let removed = state.remove_series(&ids);

        info!(shard_id = self.id, measurement, removed, "Dropped series");
        Ok(removed)
    }

    /// Series metadata of a measurement in first-seen order
    pub fn series(&self, measurement: &str) -> Result<Vec<SeriesMetadata>> {
        self.ensure_open()?;
        let state = self.state.read();
        Ok(state
            .series
            .get_by_measurement(measurement)
            .into_iter()
            .filter_map(|id| state.series.get(id))
            .collect())
    }

    /// Sorted tag keys ever written for a measurement
    pub fn tag_keys(&self, measurement: &str) -> Result<Vec<String>> {
        self.ensure_open()?;
        Ok(self.state.read().catalog.keys(measurement))
    }

    /// Field keys ever written for a measurement, in first-written order
    pub fn field_keys(&self, measurement: &str) -> Result<Vec<String>> {
        self.ensure_open()?;
        Ok(self.state.read().fields.keys(measurement))
    }

    /// Sorted names of every measurement ever written to the shard
    pub fn measurements(&self) -> Result<Vec<String>> {
        self.ensure_open()?;
        Ok(self.state.read().catalog.measurements())
    }

    /// Sorted values of a tag key among the series currently stored,
    /// optionally restricted to one measurement
    pub fn tag_values(&self, measurement: Option<&str>, key: &str) -> Result<Vec<String>> {
        self.ensure_open()?;
        let state = self.state.read();
        Ok(match measurement {
            Some(m) => state
                .tags
                .tag_values_within(key, &state.series.get_by_measurement(m)),
            None => state.tags.tag_values(key),
        })
    }

    /// Number of series currently stored
    pub fn series_count(&self) -> usize {
        self.state.read().series.len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Flush the WAL, write a snapshot (if configured) and drop the WAL files
    /// it covers. Later operations on the shard fail.
    pub fn close(&self) -> Result<()> {
        let state = self.state.write();
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        self.wal.sync()?;
        if self.config.snapshot_on_close {
            let next_sequence = self.wal.sequence();
            snapshot::write(&self.path, &state.snapshot(next_sequence))?;
            WalReader::new(self.wal.dir()).remove_before(next_sequence)?;
        }

        info!(shard_id = self.id, series = state.series.len(), "Closed shard");
        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(StorageError::ShardClosed(self.id));
        }
        Ok(())
    }
}

fn validate_filters(filters: &[TagFilter]) -> Result<()> {
    for filter in filters {
        filter.validate()?;
    }
    Ok(())
}
