//! Schemaless records.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{ID_FIELD, Record};

/// A record with no fixed layout.
///
/// Useful for administrative tooling and for collections whose documents do
/// not map onto one Rust type. The identifier is whatever JSON value sits
/// under `_id`. Managers for dynamic records are normally built with an
/// explicit collection name.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DynamicRecord(Map<String, Value>);

impl DynamicRecord {
    /// Creates an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps a JSON object. Returns `None` for non-object values.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    /// Returns the field at `key`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Sets a top-level field.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(key.into(), value)
    }

    /// Returns the underlying object.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Consumes the record into a JSON value.
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<Map<String, Value>> for DynamicRecord {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl Record for DynamicRecord {
    type Id = Value;

    fn id(&self) -> Option<&Value> {
        self.0.get(ID_FIELD)
    }

    fn set_id(&mut self, id: Value) {
        self.0.insert(ID_FIELD.to_string(), id);
    }
}
