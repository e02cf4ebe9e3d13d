//! Update definitions.

use serde::Serialize;
use serde_json::{Map, Value};

use super::{Criteria, InvalidClause, field_name, to_value};
use crate::error::StorageResult;
use crate::path::IntoFieldName;
use crate::store::Document;

/// A set of update operators applied to matching documents.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Update {
    operators: Map<String, Value>,
    invalid: Option<InvalidClause>,
}

impl Update {
    /// Creates an empty update.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps a store-native update document.
    pub fn from_document(document: Document) -> Self {
        Self {
            operators: document,
            invalid: None,
        }
    }

    /// Returns `true` if no operator was added.
    pub fn is_empty(&self) -> bool {
        self.operators.is_empty() && self.invalid.is_none()
    }

    /// Returns `true` if `field` is assigned by any operator.
    pub fn touches(&self, field: &str) -> bool {
        self.operators
            .values()
            .filter_map(Value::as_object)
            .any(|fields| fields.contains_key(field))
    }

    /// Produces the update document.
    pub fn to_document(&self) -> StorageResult<Document> {
        match &self.invalid {
            Some(invalid) => Err(invalid.clone().into_error()),
            None => Ok(self.operators.clone()),
        }
    }

    /// Sets a field.
    pub fn set(self, field: impl IntoFieldName, value: impl Serialize) -> Self {
        self.put("$set", field, value)
    }

    /// Removes a field.
    pub fn unset(self, field: impl IntoFieldName) -> Self {
        self.put("$unset", field, "")
    }

    /// Adds `amount` to a numeric field, creating it if absent.
    pub fn inc(self, field: impl IntoFieldName, amount: impl Serialize) -> Self {
        self.put("$inc", field, amount)
    }

    /// Lowers a field to `value` if `value` is smaller.
    pub fn min(self, field: impl IntoFieldName, value: impl Serialize) -> Self {
        self.put("$min", field, value)
    }

    /// Raises a field to `value` if `value` is larger.
    pub fn max(self, field: impl IntoFieldName, value: impl Serialize) -> Self {
        self.put("$max", field, value)
    }

    /// Appends a value to an array field.
    pub fn push(self, field: impl IntoFieldName, value: impl Serialize) -> Self {
        self.put("$push", field, value)
    }

    /// Appends several values to an array field.
    pub fn push_each<I, V>(self, field: impl IntoFieldName, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Serialize,
    {
        let values: Vec<V> = values.into_iter().collect();
        self.each("$push", field, values)
    }

    /// Appends a value to an array field unless already present.
    pub fn add_to_set(self, field: impl IntoFieldName, value: impl Serialize) -> Self {
        self.put("$addToSet", field, value)
    }

    /// Appends each value not already present.
    pub fn add_to_set_each<I, V>(self, field: impl IntoFieldName, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Serialize,
    {
        let values: Vec<V> = values.into_iter().collect();
        self.each("$addToSet", field, values)
    }

    /// Removes every array element equal to `value`.
    pub fn pull(self, field: impl IntoFieldName, value: impl Serialize) -> Self {
        self.put("$pull", field, value)
    }

    /// Removes every array element matching `element`.
    pub fn pull_matching(mut self, field: impl IntoFieldName, element: Criteria) -> Self {
        match element.to_document() {
            Ok(filter) => self.put("$pull", field, Value::Object(filter)),
            Err(_) => {
                self.invalid.get_or_insert(InvalidClause::Path {
                    context: "update $pull criteria".to_string(),
                });
                self
            }
        }
    }

    /// Sets a field only when an upsert inserts a new document.
    pub fn set_on_insert(self, field: impl IntoFieldName, value: impl Serialize) -> Self {
        self.put("$setOnInsert", field, value)
    }

    /// Sets a field to the store's current time.
    pub fn current_date(self, field: impl IntoFieldName) -> Self {
        self.put("$currentDate", field, true)
    }

    fn each<V: Serialize>(
        self,
        op: &'static str,
        field: impl IntoFieldName,
        values: Vec<V>,
    ) -> Self {
        let mut each = Map::new();
        match to_value(values, "update value") {
            Ok(values) => {
                each.insert("$each".to_string(), values);
                self.put(op, field, Value::Object(each))
            }
            Err(invalid) => self.invalidate(invalid),
        }
    }

    fn put(mut self, op: &'static str, field: impl IntoFieldName, value: impl Serialize) -> Self {
        let context = format!("update field for {}", op);
        let resolved = field_name(field, &context)
            .and_then(|name| Ok((name, to_value(value, "update value")?)));
        match resolved {
            Ok((name, value)) => {
                let fields = self
                    .operators
                    .entry(op)
                    .or_insert_with(|| Value::Object(Map::new()));
                if let Value::Object(fields) = fields {
                    fields.insert(name, value);
                }
                self
            }
            Err(invalid) => self.invalidate(invalid),
        }
    }

    fn invalidate(mut self, invalid: InvalidClause) -> Self {
        if self.invalid.is_none() {
            self.invalid = Some(invalid);
        }
        self
    }
}
