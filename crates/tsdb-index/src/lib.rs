//! tsdb index - per-shard indexes
//!
//! This crate provides the indexes a shard keeps in memory:
//! - Series Index: SeriesId -> metadata, measurement -> series in first-seen order
//! - Tag Index: inverted (key, value) -> series index with Roaring bitmaps
//! - Tag Key Catalog: measurement -> tag keys ever written, independent of series data
//! - Field Key Catalog: measurement -> field keys in first-written order

pub mod catalog;
pub mod error;
pub mod series;
pub mod tag;

pub use catalog::{FieldKeyCatalog, TagKeyCatalog};
pub use error::{IndexError, Result};
pub use series::{SeriesIndex, SeriesMetadata};
pub use tag::TagIndex;
