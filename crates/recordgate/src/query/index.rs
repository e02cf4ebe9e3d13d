//! Index definitions.

use std::time::Duration;

use super::{InvalidClause, field_name};
use crate::error::StorageResult;
use crate::path::IntoFieldName;
use crate::store::IndexSpec;

/// Ordered index keys.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexKeys {
    keys: Vec<(String, i32)>,
    invalid: Option<InvalidClause>,
}

impl IndexKeys {
    /// Indexes `field` ascending.
    pub fn ascending(field: impl IntoFieldName) -> Self {
        Self::default().then_ascending(field)
    }

    /// Indexes `field` descending.
    pub fn descending(field: impl IntoFieldName) -> Self {
        Self::default().then_descending(field)
    }

    /// Adds an ascending key.
    pub fn then_ascending(self, field: impl IntoFieldName) -> Self {
        self.then(field, 1)
    }

    /// Adds a descending key.
    pub fn then_descending(self, field: impl IntoFieldName) -> Self {
        self.then(field, -1)
    }

    /// Parses `field:1,other:-1`. A key without direction is ascending.
    pub fn parse(text: &str) -> Option<Self> {
        let mut keys = Self::default();
        for part in text.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (name, direction) = match part.rsplit_once(':') {
                Some((name, dir)) => (name.trim(), dir.trim().parse::<i32>().ok()?),
                None => (part, 1),
            };
            if name.is_empty() || !(direction == 1 || direction == -1) {
                return None;
            }
            keys = keys.then(name, direction);
        }
        if keys.keys.is_empty() { None } else { Some(keys) }
    }

    fn then(mut self, field: impl IntoFieldName, direction: i32) -> Self {
        match field_name(field, "index key") {
            Ok(name) => self.keys.push((name, direction)),
            Err(invalid) => {
                self.invalid.get_or_insert(invalid);
            }
        }
        self
    }

    fn default_name(&self) -> String {
        self.keys
            .iter()
            .map(|(name, direction)| format!("{}_{}", name, direction))
            .collect::<Vec<_>>()
            .join("_")
    }
}

/// Index behavior.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexOptions {
    /// Explicit index name. Derived from the keys when `None`.
    pub name: Option<String>,
    /// Reject writes that would duplicate the key.
    pub unique: bool,
    /// Skip documents missing the indexed fields.
    pub sparse: bool,
    /// Expire documents this long after the indexed date.
    pub expire_after: Option<Duration>,
}

/// An index to ensure on a collection.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexModel {
    keys: IndexKeys,
    options: IndexOptions,
}

impl IndexModel {
    /// A plain index over `keys`.
    pub fn new(keys: IndexKeys) -> Self {
        Self {
            keys,
            options: IndexOptions::default(),
        }
    }

    /// Replaces the options.
    pub fn with_options(mut self, options: IndexOptions) -> Self {
        self.options = options;
        self
    }

    /// Names the index.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.options.name = Some(name.into());
        self
    }

    /// Makes the index unique.
    pub fn unique(mut self) -> Self {
        self.options.unique = true;
        self
    }

    /// Makes the index sparse.
    pub fn sparse(mut self) -> Self {
        self.options.sparse = true;
        self
    }

    /// Expires documents `after` the indexed date.
    pub fn expire_after(mut self, after: Duration) -> Self {
        self.options.expire_after = Some(after);
        self
    }

    /// Returns the options.
    pub fn options(&self) -> &IndexOptions {
        &self.options
    }

    /// Resolves to the store-level description.
    pub fn to_spec(&self) -> StorageResult<IndexSpec> {
        if let Some(invalid) = &self.keys.invalid {
            return Err(invalid.clone().into_error());
        }
        if self.keys.keys.is_empty() {
            return Err(InvalidClause::Path {
                context: "index without keys".to_string(),
            }
            .into_error());
        }
        Ok(IndexSpec {
            name: self
                .options
                .name
                .clone()
                .unwrap_or_else(|| self.keys.default_name()),
            keys: self.keys.keys.clone(),
            unique: self.options.unique,
            sparse: self.options.sparse,
            expire_after: self.options.expire_after,
        })
    }
}
