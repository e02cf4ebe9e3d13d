//! Filter criteria.

use serde::Serialize;
use serde_json::{Map, Value};

use super::{InvalidClause, field_name, is_operator_object, to_value};
use crate::error::StorageResult;
use crate::path::IntoFieldName;
use crate::store::Document;

/// A filter selecting documents.
///
/// An empty `Criteria::new()` is *unscoped*: it has no clauses and was not
/// explicitly asked to match everything. Bulk deletes refuse unscoped
/// criteria; use [`Criteria::everything`] to say "all documents".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Criteria {
    clauses: Map<String, Value>,
    everything: bool,
    invalid: Option<InvalidClause>,
}

impl Criteria {
    /// Creates empty, unscoped criteria.
    pub fn new() -> Self {
        Self::default()
    }

    /// Criteria that explicitly match every document.
    pub fn everything() -> Self {
        Self {
            everything: true,
            ..Self::default()
        }
    }

    /// Wraps a store-native filter document.
    ///
    /// An empty document is treated as unscoped.
    pub fn from_document(document: Document) -> Self {
        Self {
            clauses: document,
            ..Self::default()
        }
    }

    /// Returns `true` if these criteria neither filter nor explicitly match all.
    pub fn is_unscoped(&self) -> bool {
        self.clauses.is_empty() && !self.everything && self.invalid.is_none()
    }

    /// Returns `true` if these criteria were built with [`Criteria::everything`].
    pub fn matches_everything(&self) -> bool {
        self.everything && self.clauses.is_empty()
    }

    /// Produces the filter document.
    pub fn to_document(&self) -> StorageResult<Document> {
        match &self.invalid {
            Some(invalid) => Err(invalid.clone().into_error()),
            None => Ok(self.clauses.clone()),
        }
    }

    /// Field equals value.
    pub fn eq(mut self, field: impl IntoFieldName, value: impl Serialize) -> Self {
        let resolved = field_name(field, "criteria field for $eq")
            .and_then(|name| Ok((name, to_value(value, "criteria value")?)));
        match resolved {
            Ok((name, value)) => {
                match self.clauses.get_mut(&name) {
                    Some(Value::Object(ops)) if is_operator_object(ops) => {
                        ops.insert("$eq".to_string(), value);
                    }
                    _ => {
                        self.clauses.insert(name, value);
                    }
                }
                self
            }
            Err(invalid) => self.invalidate(invalid),
        }
    }

    /// Field differs from value.
    pub fn ne(self, field: impl IntoFieldName, value: impl Serialize) -> Self {
        self.operator(field, "$ne", value)
    }

    /// Field is greater than value.
    pub fn gt(self, field: impl IntoFieldName, value: impl Serialize) -> Self {
        self.operator(field, "$gt", value)
    }

    /// Field is greater than or equal to value.
    pub fn gte(self, field: impl IntoFieldName, value: impl Serialize) -> Self {
        self.operator(field, "$gte", value)
    }

    /// Field is less than value.
    pub fn lt(self, field: impl IntoFieldName, value: impl Serialize) -> Self {
        self.operator(field, "$lt", value)
    }

    /// Field is less than or equal to value.
    pub fn lte(self, field: impl IntoFieldName, value: impl Serialize) -> Self {
        self.operator(field, "$lte", value)
    }

    /// Field equals one of the values.
    pub fn is_in<I, V>(self, field: impl IntoFieldName, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Serialize,
    {
        let values: Vec<V> = values.into_iter().collect();
        self.operator(field, "$in", values)
    }

    /// Field equals none of the values.
    pub fn not_in<I, V>(self, field: impl IntoFieldName, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Serialize,
    {
        let values: Vec<V> = values.into_iter().collect();
        self.operator(field, "$nin", values)
    }

    /// Field is present (or absent).
    pub fn exists(self, field: impl IntoFieldName, present: bool) -> Self {
        self.operator(field, "$exists", present)
    }

    /// Field is a string matching `pattern`.
    ///
    /// `options` follows the store convention (`i`, `m`, `s`, `x`).
    pub fn regex(mut self, field: impl IntoFieldName, pattern: &str, options: &str) -> Self {
        match field_name(field, "criteria field for $regex") {
            Ok(name) => {
                self.merge_operator(
                    name.clone(),
                    "$regex",
                    Value::String(pattern.to_string()),
                );
                if !options.is_empty() {
                    self.merge_operator(name, "$options", Value::String(options.to_string()));
                }
                self
            }
            Err(invalid) => self.invalidate(invalid),
        }
    }

    /// Field is an array of exactly `len` elements.
    pub fn size(self, field: impl IntoFieldName, len: usize) -> Self {
        self.operator(field, "$size", len)
    }

    /// Field is an array containing all of the values.
    pub fn all<I, V>(self, field: impl IntoFieldName, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Serialize,
    {
        let values: Vec<V> = values.into_iter().collect();
        self.operator(field, "$all", values)
    }

    /// Field is an array with at least one element matching `element`.
    ///
    /// Paths inside `element` are relative to the array element; build them
    /// with [`FieldPath::relative`](crate::path::FieldPath::relative).
    pub fn elem_match(mut self, field: impl IntoFieldName, element: Criteria) -> Self {
        if let Some(invalid) = element.invalid {
            return self.invalidate(invalid);
        }
        match field_name(field, "criteria field for $elemMatch") {
            Ok(name) => {
                self.merge_operator(name, "$elemMatch", Value::Object(element.clauses));
                self
            }
            Err(invalid) => self.invalidate(invalid),
        }
    }

    /// All of the criteria match.
    pub fn all_of(criteria: impl IntoIterator<Item = Criteria>) -> Self {
        Self::combine("$and", criteria)
    }

    /// At least one of the criteria matches.
    pub fn any_of(criteria: impl IntoIterator<Item = Criteria>) -> Self {
        Self::combine("$or", criteria)
    }

    /// None of the criteria match.
    pub fn none_of(criteria: impl IntoIterator<Item = Criteria>) -> Self {
        Self::combine("$nor", criteria)
    }

    /// Adds a raw clause, replacing any clause with the same key.
    pub fn raw(mut self, key: impl Into<String>, value: Value) -> Self {
        self.clauses.insert(key.into(), value);
        self
    }

    /// Joins branches under a logical operator.
    ///
    /// When no branch has a clause the result is unscoped, or match-all if a
    /// branch came from [`Criteria::everything`]. For `$nor` that match-all
    /// branch is kept so the result matches nothing.
    fn combine(operator: &str, criteria: impl IntoIterator<Item = Criteria>) -> Self {
        let mut branches = Vec::new();
        let mut explicit_all = false;
        for branch in criteria {
            if let Some(invalid) = branch.invalid {
                return Self::new().invalidate(invalid);
            }
            explicit_all |= branch.matches_everything();
            branches.push(branch.clauses);
        }

        if branches.iter().all(Map::is_empty) {
            return match (operator, explicit_all) {
                (_, false) => Self::new(),
                ("$nor", true) => {
                    Self::new().raw(operator, Value::Array(vec![Value::Object(Map::new())]))
                }
                (_, true) => Self::everything(),
            };
        }

        let branches = branches.into_iter().map(Value::Object).collect();
        Self::new().raw(operator, Value::Array(branches))
    }

    fn operator(
        mut self,
        field: impl IntoFieldName,
        op: &'static str,
        value: impl Serialize,
    ) -> Self {
        let context = format!("criteria field for {}", op);
        let resolved = field_name(field, &context)
            .and_then(|name| Ok((name, to_value(value, "criteria value")?)));
        match resolved {
            Ok((name, value)) => {
                self.merge_operator(name, op, value);
                self
            }
            Err(invalid) => self.invalidate(invalid),
        }
    }

    fn merge_operator(&mut self, name: String, op: &str, value: Value) {
        match self.clauses.get_mut(&name) {
            Some(Value::Object(ops)) if is_operator_object(ops) => {
                ops.insert(op.to_string(), value);
            }
            Some(existing) => {
                let mut ops = Map::new();
                ops.insert("$eq".to_string(), existing.take());
                ops.insert(op.to_string(), value);
                *existing = Value::Object(ops);
            }
            None => {
                let mut ops = Map::new();
                ops.insert(op.to_string(), value);
                self.clauses.insert(name, Value::Object(ops));
            }
        }
    }

    fn invalidate(mut self, invalid: InvalidClause) -> Self {
        if self.invalid.is_none() {
            self.invalid = Some(invalid);
        }
        self
    }
}
