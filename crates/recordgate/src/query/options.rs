//! Sort orders and per-call query options.

use serde_json::{Map, Value};

use super::{InvalidClause, field_name};
use crate::error::StorageResult;
use crate::path::IntoFieldName;
use crate::store::{Document, ReturnDocument};

/// An ordered list of sort keys.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SortOrder {
    keys: Vec<(String, i32)>,
    invalid: Option<InvalidClause>,
}

impl SortOrder {
    /// Sorts by `field`, smallest first.
    pub fn ascending(field: impl IntoFieldName) -> Self {
        Self::default().then_ascending(field)
    }

    /// Sorts by `field`, largest first.
    pub fn descending(field: impl IntoFieldName) -> Self {
        Self::default().then_descending(field)
    }

    /// Adds an ascending tie-breaker.
    pub fn then_ascending(self, field: impl IntoFieldName) -> Self {
        self.then(field, 1)
    }

    /// Adds a descending tie-breaker.
    pub fn then_descending(self, field: impl IntoFieldName) -> Self {
        self.then(field, -1)
    }

    /// Returns `true` when no key was added.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty() && self.invalid.is_none()
    }

    /// Produces the sort document, keys in insertion order.
    pub fn to_document(&self) -> StorageResult<Document> {
        if let Some(invalid) = &self.invalid {
            return Err(invalid.clone().into_error());
        }
        let mut doc = Map::new();
        for (name, direction) in &self.keys {
            doc.insert(name.clone(), Value::from(*direction));
        }
        Ok(doc)
    }

    fn then(mut self, field: impl IntoFieldName, direction: i32) -> Self {
        match field_name(field, "sort key") {
            Ok(name) => {
                self.keys.retain(|(existing, _)| existing != &name);
                self.keys.push((name, direction));
            }
            Err(invalid) => {
                self.invalid.get_or_insert(invalid);
            }
        }
        self
    }
}

/// Options for multi-document reads.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    /// Result order. Unordered when `None`.
    pub sort: Option<SortOrder>,
    /// Number of leading matches to skip.
    pub skip: Option<u64>,
    /// Maximum number of documents to return.
    pub limit: Option<i64>,
}

impl FindOptions {
    /// Creates empty options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the result order.
    pub fn sort(mut self, sort: SortOrder) -> Self {
        self.sort = Some(sort);
        self
    }

    /// Skips the first `skip` matches.
    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }

    /// Returns at most `limit` documents.
    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Options for atomic find-and-modify / find-and-remove.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModifyOptions {
    /// Which match is chosen when several qualify.
    pub sort: Option<SortOrder>,
    /// Whether the pre- or post-update document is returned.
    pub return_document: ReturnDocument,
}

impl ModifyOptions {
    /// Creates options returning the post-update document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Chooses among several matches by this order.
    pub fn sort(mut self, sort: SortOrder) -> Self {
        self.sort = Some(sort);
        self
    }

    /// Selects which version of the document is returned.
    pub fn return_document(mut self, which: ReturnDocument) -> Self {
        self.return_document = which;
        self
    }
}
