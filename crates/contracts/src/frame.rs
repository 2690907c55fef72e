//! Frame - one point-in-time telemetry sample
//!
//! Field names are configuration-driven, values are loosely typed. Everything
//! numeric is read through the coercion helpers below so malformed telemetry
//! never fails ingestion.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Generic timestamp field used when the configured one is absent
pub const GENERIC_TIMESTAMP_FIELD: &str = "ts_ms";

/// Telemetry frame (field name -> loosely typed value)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Frame(Map<String, Value>);

impl Frame {
    /// Create an empty frame
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Build a frame from raw stream fields (all values stay strings)
    pub fn from_fields(fields: &HashMap<String, String>) -> Self {
        Self(
            fields
                .iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect(),
        )
    }

    /// Get a field value
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Whether the field is present
    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    /// Insert or replace a field
    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(field.into(), value.into());
    }

    /// Builder-style insert, handy in tests and generators
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(field, value);
        self
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the frame has no fields
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Read a field as `f64`, `0.0` when absent or unparseable
    pub fn number(&self, field: &str) -> f64 {
        coerce_f64(self.get(field))
    }

    /// Read a field as integer milliseconds, `None` when absent or unparseable
    pub fn timestamp_ms(&self, field: &str) -> Option<i64> {
        self.get(field).and_then(coerce_timestamp_ms)
    }

    /// Underlying JSON object
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Consume into the underlying JSON object
    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for Frame {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Coerce a loosely typed value to `f64`.
///
/// Numbers pass through, strings are trimmed and parsed, booleans map to
/// `1.0`/`0.0`. Anything else (missing, null, arrays, objects, garbage strings)
/// is `0.0`.
pub fn coerce_f64(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse::<f64>().unwrap_or(0.0),
        Some(Value::Bool(b)) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        _ => 0.0,
    }
}

/// Coerce a loosely typed value to integer milliseconds.
///
/// Floats are truncated; non-finite values and non-numeric strings are `None`.
pub fn coerce_timestamp_ms(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>().ok().or_else(|| {
                s.parse::<f64>()
                    .ok()
                    .filter(|f| f.is_finite())
                    .map(|f| f as i64)
            })
        }
        _ => None,
    }
}
