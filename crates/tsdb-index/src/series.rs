//! Series Index - SeriesId to metadata mapping
//!
//! Keeps the order in which series were first written so scans can return
//! them in first-encountered order, also across a snapshot round-trip.

use crate::error::{IndexError, Result};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tsdb_core::{SeriesId, Tag, Timestamp};

/// Series metadata stored in the index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesMetadata {
    /// Series ID
    pub id: SeriesId,
    /// Measurement name
    pub measurement: String,
    /// Tags for this series (sorted)
    pub tags: Vec<Tag>,
    /// Position in first-seen order within the shard
    pub ordinal: u64,
    /// Earliest timestamp written
    pub first_seen: Timestamp,
    /// Latest timestamp written
    pub last_seen: Timestamp,
}

/// Series index using DashMap for concurrent access
pub struct SeriesIndex {
    /// SeriesId -> Metadata
    series: DashMap<SeriesId, SeriesMetadata>,
    /// Measurement -> SeriesIds in first-seen order
    measurement_index: DashMap<String, Vec<SeriesId>>,
    /// Next ordinal to hand out
    next_ordinal: AtomicU64,
}

impl SeriesIndex {
    /// Create a new series index
    pub fn new() -> Self {
        Self {
            series: DashMap::new(),
            measurement_index: DashMap::new(),
            next_ordinal: AtomicU64::new(0),
        }
    }

    /// Insert or update a series. Returns true when the series is new.
    pub fn upsert(&self, id: SeriesId, measurement: &str, tags: &[Tag], timestamp: Timestamp) -> bool {
        let mut is_new = false;

        self.series
            .entry(id)
            .and_modify(|meta| {
                meta.last_seen = meta.last_seen.max(timestamp);
                meta.first_seen = meta.first_seen.min(timestamp);
            })
            .or_insert_with(|| {
                is_new = true;

                self.measurement_index
                    .entry(measurement.to_string())
                    .or_default()
                    .push(id);

                SeriesMetadata {
                    id,
                    measurement: measurement.to_string(),
                    tags: tags.to_vec(),
                    ordinal: self.next_ordinal.fetch_add(1, Ordering::Relaxed),
                    first_seen: timestamp,
                    last_seen: timestamp,
                }
            });

        is_new
    }

    /// Get series metadata
    pub fn get(&self, id: SeriesId) -> Option<SeriesMetadata> {
        self.series.get(&id).map(|r| r.value().clone())
    }

    /// All series IDs of a measurement, in first-seen order
    pub fn get_by_measurement(&self, measurement: &str) -> Vec<SeriesId> {
        self.measurement_index
            .get(measurement)
            .map(|r| r.value().clone())
            .unwrap_or_default()
    }

    /// Get series count
    pub fn len(&self) -> usize {
        self.series.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Remove a series
    pub fn remove(&self, id: SeriesId) -> Option<SeriesMetadata> {
        let (_, meta) = self.series.remove(&id)?;
        if let Some(mut series_ids) = self.measurement_index.get_mut(&meta.measurement) {
            series_ids.retain(|&sid| sid != id);
        }
        Some(meta)
    }

    /// All metadata in first-seen order
    pub fn ordered(&self) -> Vec<SeriesMetadata> {
        let mut entries: Vec<SeriesMetadata> =
            self.series.iter().map(|r| r.value().clone()).collect();
        entries.sort_by_key(|m| m.ordinal);
        entries
    }

    /// Rebuild an index from metadata, keeping the recorded ordinals
    pub fn from_entries(entries: Vec<SeriesMetadata>) -> Result<Self> {
        let index = Self::new();
        let mut entries = entries;
        entries.sort_by_key(|m| m.ordinal);

        let mut next = 0;
        for meta in entries {
            if index.series.contains_key(&meta.id) {
                return Err(IndexError::InvalidData(format!(
                    "duplicate series id {}",
                    meta.id
                )));
            }
            next = next.max(meta.ordinal + 1);
            index
                .measurement_index
                .entry(meta.measurement.clone())
                .or_default()
                .push(meta.id);
            index.series.insert(meta.id, meta);
        }
        index.next_ordinal.store(next, Ordering::Relaxed);

        Ok(index)
    }
}

impl Default for SeriesIndex {
    fn default() -> Self {
        Self::new()
    }
}
