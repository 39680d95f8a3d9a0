//! Tag Index - Inverted index for tag-based lookups
//!
//! Uses Roaring bitmaps for set operations. Only series currently present in
//! the shard are indexed; removing a series clears it from the bitmaps of
//! its own tags and frees its internal ID.

use dashmap::DashMap;
use parking_lot::RwLock;
use roaring::RoaringBitmap;
use std::collections::BTreeSet;
use tsdb_core::{SeriesId, Tag};

/// Tag key-value pair as index key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct TagKey {
    key: String,
    value: String,
}

impl TagKey {
    fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Internal ID slots. Slots freed by removed series are handed out again.
#[derive(Default)]
struct Slots {
    series: Vec<Option<SeriesId>>,
    free: Vec<u32>,
}

/// Tag index using an inverted index with Roaring bitmaps
pub struct TagIndex {
    /// Tag (key=value) -> bitmap of internal series IDs
    index: DashMap<TagKey, RoaringBitmap>,
    /// SeriesId (u64) -> internal ID (u32) for Roaring
    series_to_internal: DashMap<SeriesId, u32>,
    /// Internal ID (u32) -> SeriesId (u64)
    internal_to_series: RwLock<Slots>,
}

impl TagIndex {
    /// Create a new tag index
    pub fn new() -> Self {
        Self {
            index: DashMap::new(),
            series_to_internal: DashMap::new(),
            internal_to_series: RwLock::new(Slots::default()),
        }
    }

    /// Index tags for a series
    pub fn index_series(&self, series_id: SeriesId, tags: &[Tag]) {
        let internal_id = self.get_or_create_internal_id(series_id);

        for tag in tags {
            self.index
                .entry(TagKey::new(&tag.key, &tag.value))
                .or_default()
                .insert(internal_id);
        }
    }

    /// Intersect an existing bitmap with a tag's bitmap.
    /// Returns false if the tag is not indexed (the bitmap is cleared).
    pub fn intersect_with(&self, key: &str, value: &str, bitmap: &mut RoaringBitmap) -> bool {
        match self.index.get(&TagKey::new(key, value)) {
            Some(tag_bitmap) => {
                *bitmap &= tag_bitmap.value();
                true
            }
            None => {
                bitmap.clear();
                false
            }
        }
    }

    /// Sorted distinct values of a tag key across indexed series
    pub fn tag_values(&self, key: &str) -> Vec<String> {
        let values: BTreeSet<String> = self
            .index
            .iter()
            .filter(|e| e.key().key == key && !e.value().is_empty())
            .map(|e| e.key().value.clone())
            .collect();
        values.into_iter().collect()
    }

    /// Sorted distinct values of a tag key restricted to the given series
    pub fn tag_values_within(&self, key: &str, series_ids: &[SeriesId]) -> Vec<String> {
        let scope = self.series_to_bitmap(series_ids);
        let values: BTreeSet<String> = self
            .index
            .iter()
            .filter(|e| e.key().key == key && !e.value().is_disjoint(&scope))
            .map(|e| e.key().value.clone())
            .collect();
        values.into_iter().collect()
    }

    /// Convert a slice of series IDs to a bitmap of internal IDs
    pub fn series_to_bitmap(&self, series_ids: &[SeriesId]) -> RoaringBitmap {
        let mut bitmap = RoaringBitmap::new();
        for series_id in series_ids {
            if let Some(internal_id) = self.series_to_internal.get(series_id) {
                bitmap.insert(*internal_id);
            }
        }
        bitmap
    }

    /// Convert a bitmap of internal IDs to SeriesIds
    pub fn bitmap_to_series(&self, bitmap: &RoaringBitmap) -> Vec<SeriesId> {
        let slots = self.internal_to_series.read();
        bitmap
            .iter()
            .filter_map(|id| slots.series.get(id as usize).copied().flatten())
            .collect()
    }

    /// Remove a series indexed under `tags`. Only the bitmaps of those tags
    /// are touched; the series' internal ID becomes free for reuse.
    pub fn remove_series(&self, series_id: SeriesId, tags: &[Tag]) {
        let Some((_, internal_id)) = self.series_to_internal.remove(&series_id) else {
            return;
        };

        for tag in tags {
            let key = TagKey::new(&tag.key, &tag.value);
            let emptied = match self.index.get_mut(&key) {
                Some(mut bitmap) => {
                    bitmap.remove(internal_id);
                    bitmap.is_empty()
                }
                None => false,
            };
            if emptied {
                self.index.remove_if(&key, |_, bitmap| bitmap.is_empty());
            }
        }

        let mut guard = self.internal_to_series.write();
        let slots = &mut *guard;
        if let Some(slot) = slots.series.get_mut(internal_id as usize) {
            *slot = None;
            slots.free.push(internal_id);
        }
    }

    fn get_or_create_internal_id(&self, series_id: SeriesId) -> u32 {
        *self.series_to_internal.entry(series_id).or_insert_with(|| {
            let mut slots = self.internal_to_series.write();
            match slots.free.pop() {
                Some(id) => {
                    slots.series[id as usize] = Some(series_id);
                    id
                }
                None => {
                    let id = slots.series.len() as u32;
                    slots.series.push(Some(series_id));
                    id
                }
            }
        })
    }

    #[cfg(test)]
    fn slot_count(&self) -> usize {
        self.internal_to_series.read().series.len()
    }
}

impl Default for TagIndex {
    fn default() -> Self {
        Self::new()
    }
}
