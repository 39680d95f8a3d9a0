//! Measurement catalogs - schema of each measurement
//!
//! [`TagKeyCatalog`] records every tag key ever written per measurement and
//! [`FieldKeyCatalog`] every field key, in the order the keys were first
//! written. Dropping series touches neither; they only go away together
//! with their shard.

use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use tsdb_core::{Field, Tag};

/// Measurement -> tag keys
#[derive(Debug, Default)]
pub struct TagKeyCatalog {
    keys: RwLock<BTreeMap<String, BTreeSet<String>>>,
}

impl TagKeyCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the tag keys of a write. Returns true if anything was added.
    pub fn record(&self, measurement: &str, tags: &[Tag]) -> bool {
        {
            let keys = self.keys.read();
            if let Some(known) = keys.get(measurement) {
                if tags.iter().all(|t| known.contains(&t.key)) {
                    return false;
                }
            }
        }

        let mut keys = self.keys.write();
        let known = keys.entry(measurement.to_string()).or_default();
        let mut added = known.is_empty() && tags.is_empty();
        for tag in tags {
            added |= known.insert(tag.key.clone());
        }
        added
    }

    /// Sorted tag keys of a measurement
    pub fn keys(&self, measurement: &str) -> Vec<String> {
        self.keys
            .read()
            .get(measurement)
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Sorted names of every measurement ever written
    pub fn measurements(&self) -> Vec<String> {
        self.keys.read().keys().cloned().collect()
    }

    /// Copy of the full catalog
    pub fn entries(&self) -> BTreeMap<String, BTreeSet<String>> {
        self.keys.read().clone()
    }

    pub fn from_entries(entries: BTreeMap<String, BTreeSet<String>>) -> Self {
        Self {
            keys: RwLock::new(entries),
        }
    }
}

/// Measurement -> field keys in first-written order
#[derive(Debug, Default)]
pub struct FieldKeyCatalog {
    keys: RwLock<BTreeMap<String, Vec<String>>>,
}

impl FieldKeyCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the field keys of a write not seen before for the measurement.
    /// Returns true if anything was added.
    pub fn record(&self, measurement: &str, fields: &[Field]) -> bool {
        {
            let keys = self.keys.read();
            if let Some(known) = keys.get(measurement) {
                if fields.iter().all(|f| known.contains(&f.key)) {
                    return false;
                }
            }
        }

        let mut keys = self.keys.write();
        let known = keys.entry(measurement.to_string()).or_default();
        let mut added = false;
        for field in fields {
            if !known.contains(&field.key) {
                known.push(field.key.clone());
                added = true;
            }
        }
        added
    }

    /// Field keys of a measurement in first-written order
    pub fn keys(&self, measurement: &str) -> Vec<String> {
        self.keys
            .read()
            .get(measurement)
            .cloned()
            .unwrap_or_default()
    }

    /// Copy of the full catalog
    pub fn entries(&self) -> BTreeMap<String, Vec<String>> {
        self.keys.read().clone()
    }

    pub fn from_entries(entries: BTreeMap<String, Vec<String>>) -> Self {
        Self {
            keys: RwLock::new(entries),
        }
    }
}
