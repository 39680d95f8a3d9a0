//! tsdb core - shared types for the shard store and query executor
//!
//! This crate provides the fundamental data types used across the workspace:
//! - `Timestamp`: Nanosecond-precision Unix epoch timestamps
//! - `SeriesId`: Identifier of a series (measurement + canonical tag set)
//! - `Tag`, `Field`, `FieldValue`: the parts of a point
//! - `Point`: A single measurement tuple
//! - `TagFilter`: Predicates over a series' tag set
//! - `ErrorKind`: The error classes surfaced to callers

pub mod error;
pub mod filter;
pub mod time;
pub mod types;

pub use error::{CoreError, ErrorKind, Result};
pub use filter::TagFilter;
pub use time::format_rfc3339_nano;
pub use types::*;
