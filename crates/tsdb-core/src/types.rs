//! Core data types for the tsdb store

use crate::error::{CoreError, Result};
use fxhash::FxHasher;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

/// Nanosecond-precision Unix epoch timestamp
pub type Timestamp = i64;

/// Identifier of a series (hash of measurement + sorted tags)
pub type SeriesId = u64;

/// A tag is a key-value pair used for series identification.
/// Tags are indexed and used for filtering.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

impl Tag {
    /// Create a new tag
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Validate the tag
    pub fn validate(&self) -> Result<()> {
        if self.key.is_empty() {
            return Err(CoreError::EmptyTagKey);
        }
        Ok(())
    }
}

impl PartialOrd for Tag {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Tag {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.key.cmp(&other.key) {
            Ordering::Equal => self.value.cmp(&other.value),
            other => other,
        }
    }
}

/// Field value types supported by the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    /// 64-bit floating point
    Float(f64),
    /// 64-bit signed integer
    Integer(i64),
    /// 64-bit unsigned integer
    UnsignedInteger(u64),
    /// UTF-8 string
    String(String),
    /// Boolean value
    Boolean(bool),
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Integer(v)
    }
}

impl From<u64> for FieldValue {
    fn from(v: u64) -> Self {
        FieldValue::UnsignedInteger(v)
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::String(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::String(v.to_string())
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Boolean(v)
    }
}

/// A field is a named value in a point. Fields are not indexed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub key: String,
    pub value: FieldValue,
}

impl Field {
    /// Create a new field
    pub fn new(key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Validate the field
    pub fn validate(&self) -> Result<()> {
        if self.key.is_empty() {
            return Err(CoreError::EmptyFieldKey);
        }
        Ok(())
    }
}

/// A point is a single measurement at a specific time.
///
/// Tags are kept sorted by key so that the tag set has one canonical form;
/// the `(measurement, tags)` pair identifies the series the point belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// The measurement name
    pub measurement: String,
    /// Timestamp in nanoseconds since Unix epoch
    pub timestamp: Timestamp,
    /// Tags for series identification (sorted by key)
    pub tags: Vec<Tag>,
    /// Field values
    pub fields: Vec<Field>,
}

impl Point {
    /// Create a validated point from its parts
    pub fn new(
        measurement: impl Into<String>,
        tags: Vec<Tag>,
        fields: Vec<Field>,
        timestamp: Timestamp,
    ) -> Result<Self> {
        let mut point = Point {
            measurement: measurement.into(),
            timestamp,
            tags,
            fields,
        };
        point.sort_tags();
        point.validate()?;
        Ok(point)
    }

    /// Create a new point builder
    pub fn builder(measurement: impl Into<String>) -> PointBuilder {
        PointBuilder::new(measurement)
    }

    /// Validate the point
    pub fn validate(&self) -> Result<()> {
        if self.measurement.is_empty() {
            return Err(CoreError::EmptyMeasurement);
        }
        if self.fields.is_empty() {
            return Err(CoreError::NoFields);
        }
        for tag in &self.tags {
            tag.validate()?;
        }
        for pair in self.tags.windows(2) {
            if pair[0].key == pair[1].key {
                return Err(CoreError::DuplicateTagKey(pair[0].key.clone()));
            }
        }
        for field in &self.fields {
            field.validate()?;
        }
        Ok(())
    }

    /// Compute the series ID for this point
    pub fn series_id(&self) -> SeriesId {
        compute_series_id(&self.measurement, &self.tags)
    }

    /// Sort tags by key (required for a consistent series ID)
    pub fn sort_tags(&mut self) {
        self.tags.sort();
    }
}

/// Builder for constructing Points
pub struct PointBuilder {
    measurement: String,
    timestamp: Option<Timestamp>,
    tags: Vec<Tag>,
    fields: Vec<Field>,
}

impl PointBuilder {
    /// Create a new point builder
    pub fn new(measurement: impl Into<String>) -> Self {
        Self {
            measurement: measurement.into(),
            timestamp: None,
            tags: Vec::new(),
            fields: Vec::new(),
        }
    }

    /// Set the timestamp
    pub fn timestamp(mut self, ts: Timestamp) -> Self {
        self.timestamp = Some(ts);
        self
    }

    /// Add a tag
    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.push(Tag::new(key, value));
        self
    }

    /// Add a field
    pub fn field(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.push(Field::new(key, value));
        self
    }

    /// Build the point. Without an explicit timestamp the current time is used.
    pub fn build(self) -> Result<Point> {
        let timestamp = self.timestamp.unwrap_or_else(now_nanos);
        Point::new(self.measurement, self.tags, self.fields, timestamp)
    }
}

/// Compute a series ID from measurement and tags
pub fn compute_series_id(measurement: &str, tags: &[Tag]) -> SeriesId {
    let mut hasher = FxHasher::default();
    measurement.hash(&mut hasher);
    for tag in tags {
        tag.key.hash(&mut hasher);
        tag.value.hash(&mut hasher);
    }
    hasher.finish()
}

/// Current wall-clock time in nanoseconds since the Unix epoch
pub fn now_nanos() -> Timestamp {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or_default()
}

/// Time range for queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    /// Start timestamp (inclusive)
    pub start: Timestamp,
    /// End timestamp (exclusive)
    pub end: Timestamp,
}

impl TimeRange {
    /// Create a new time range
    pub fn new(start: Timestamp, end: Timestamp) -> Self {
        Self { start, end }
    }

    /// Check if this range overlaps with another
    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start < other.end && other.start < self.end
    }
}

impl Default for TimeRange {
    fn default() -> Self {
        Self {
            start: i64::MIN,
            end: i64::MAX,
        }
    }
}
