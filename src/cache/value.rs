//! Stored values
//!
//! Values are written to disk as text. The value type tag recorded in the
//! entry metadata lets `get` rebuild the original shape.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CacheError, Result};

/// Shape of a stored value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    String,
    Number,
    Object,
}

/// A value as callers hand it to and receive it from the cache.
#[derive(Debug, Clone, PartialEq)]
pub enum StoredValue {
    Text(String),
    Number(f64),
    Object(Value),
}

impl StoredValue {
    pub fn value_type(&self) -> ValueType {
        match self {
            StoredValue::Text(_) => ValueType::String,
            StoredValue::Number(_) => ValueType::Number,
            StoredValue::Object(_) => ValueType::Object,
        }
    }

    /// Formats the value into its on-disk text form.
    pub fn encode(&self) -> Result<String> {
        match self {
            StoredValue::Text(s) => Ok(s.clone()),
            StoredValue::Number(n) if n.is_finite() => Ok(n.to_string()),
            StoredValue::Number(n) => Err(CacheError::ContentInvalid(format!(
                "number {} cannot be stored",
                n
            ))),
            StoredValue::Object(v) => serde_json::to_string(v)
                .map_err(|e| CacheError::ContentInvalid(e.to_string())),
        }
    }

    /// Rebuilds a value from its on-disk text form.
    pub fn decode(text: String, value_type: ValueType) -> Result<Self> {
        match value_type {
            ValueType::String => Ok(StoredValue::Text(text)),
            ValueType::Number => text
                .trim()
                .parse::<f64>()
                .map(StoredValue::Number)
                .map_err(|e| CacheError::Codec(format!("stored number {:?}: {}", text, e))),
            ValueType::Object => serde_json::from_str(&text)
                .map(StoredValue::Object)
                .map_err(|e| CacheError::Codec(format!("stored object: {}", e))),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            StoredValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            StoredValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Converts into a JSON value regardless of the stored shape.
    pub fn into_json(self) -> Value {
        match self {
            StoredValue::Text(s) => Value::String(s),
            StoredValue::Number(n) => serde_json::Number::from_f64(n)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            StoredValue::Object(v) => v,
        }
    }
}

impl From<String> for StoredValue {
    fn from(s: String) -> Self {
        StoredValue::Text(s)
    }
}

impl From<&str> for StoredValue {
    fn from(s: &str) -> Self {
        StoredValue::Text(s.to_string())
    }
}

impl From<f64> for StoredValue {
    fn from(n: f64) -> Self {
        StoredValue::Number(n)
    }
}

impl From<i64> for StoredValue {
    fn from(n: i64) -> Self {
        StoredValue::Number(n as f64)
    }
}

impl From<i32> for StoredValue {
    fn from(n: i32) -> Self {
        StoredValue::Number(f64::from(n))
    }
}

impl From<Value> for StoredValue {
    fn from(v: Value) -> Self {
        StoredValue::Object(v)
    }
}
