//! Query results and their JSON shape
//!
//! A statement produces one or more [`QueryResult`]s. Serialized as JSON a
//! result is `{"series":[...],"error":"...","partial":true}` with each key
//! left out when empty, so a successful statement with no data is `{}`.

use crate::error::{QueryError, Result};
use serde::Serialize;
use serde_json::{Number, Value};
use std::collections::BTreeMap;
use tsdb_core::{format_rfc3339_nano, FieldValue, Timestamp};

/// One chunk of a statement's output
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryResult {
    /// Position of the statement within its query
    #[serde(skip)]
    pub statement_id: usize,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub series: Vec<Row>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// More results for the same statement follow
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub partial: bool,
}

impl QueryResult {
    pub fn new(statement_id: usize, series: Vec<Row>) -> Self {
        Self {
            statement_id,
            series,
            error: None,
            partial: false,
        }
    }

    /// Result carrying a statement failure
    pub fn from_error(statement_id: usize, err: &QueryError) -> Self {
        Self {
            statement_id,
            series: Vec::new(),
            error: Some(err.to_string()),
            partial: false,
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// A named, tagged table of values
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Row {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,

    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,

    pub columns: Vec<String>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<Vec<Value>>,
}

impl Row {
    pub fn new(name: impl Into<String>, columns: &[&str]) -> Self {
        Self {
            name: name.into(),
            tags: BTreeMap::new(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            values: Vec::new(),
        }
    }

    /// Copy of the row's name, tags and columns with no values
    pub(crate) fn header(&self) -> Row {
        Row {
            name: self.name.clone(),
            tags: self.tags.clone(),
            columns: self.columns.clone(),
            values: Vec::new(),
        }
    }
}

/// JSON cell for a timestamp
pub fn time_value(ts: Timestamp) -> Value {
    Value::String(format_rfc3339_nano(ts))
}

/// JSON cell for a field value. Floats with no fractional part are written
/// as integers; non-finite floats become null.
pub fn field_value(value: &FieldValue) -> Value {
    match value {
        FieldValue::Float(f) => float_value(*f),
        FieldValue::Integer(i) => Value::from(*i),
        FieldValue::UnsignedInteger(u) => Value::from(*u),
        FieldValue::String(s) => Value::String(s.clone()),
        FieldValue::Boolean(b) => Value::Bool(*b),
    }
}

const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

fn float_value(f: f64) -> Value {
    if f.fract() == 0.0 && f.abs() < MAX_EXACT_INTEGER {
        return Value::from(f as i64);
    }
    Number::from_f64(f).map_or(Value::Null, Value::Number)
}

/// Serialize results as a JSON array
pub fn to_json(results: &[QueryResult]) -> Result<String> {
    serde_json::to_string(results).map_err(|e| QueryError::Execution(e.to_string()))
}
