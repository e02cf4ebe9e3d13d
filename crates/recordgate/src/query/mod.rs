//! Query, update, sort and index builders.
//!
//! Builders take anything implementing [`IntoFieldName`](crate::path::IntoFieldName),
//! so field names come from typed paths instead of string literals:
//!
//! ```
//! use recordgate::path::Field;
//! use recordgate::query::{Criteria, SortOrder, Update};
//!
//! struct Task;
//! const STATE: Field<Task, String> = Field::new("State");
//! const ATTEMPTS: Field<Task, u32> = Field::new("Attempts");
//!
//! let pending = Criteria::new().eq(STATE, "pending").lt(ATTEMPTS, 3);
//! let claim = Update::new().set(STATE, "running").inc(ATTEMPTS, 1);
//! let oldest_first = SortOrder::ascending("_id");
//!
//! assert_eq!(
//!     serde_json::Value::Object(pending.to_document().unwrap()),
//!     serde_json::json!({"State": "pending", "Attempts": {"$lt": 3}})
//! );
//! # let _ = (claim, oldest_first);
//! ```
//!
//! Invalid input (a path that resolves to nothing, a value that cannot be
//! serialized) is recorded by the builder and reported as an
//! [`ArgumentError`] when the document is produced.

mod criteria;
mod index;
mod options;
mod update;

pub use criteria::Criteria;
pub use index::{IndexKeys, IndexModel, IndexOptions};
pub use options::{FindOptions, ModifyOptions, SortOrder};
pub use update::Update;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{ArgumentError, StorageError};
use crate::path::IntoFieldName;

/// A builder input that could not be used.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum InvalidClause {
    Path { context: String },
    Value { argument: &'static str, message: String },
}

impl InvalidClause {
    pub(crate) fn into_error(self) -> StorageError {
        match self {
            InvalidClause::Path { context } => ArgumentError::InvalidFieldPath { context }.into(),
            InvalidClause::Value { argument, message } => {
                ArgumentError::InvalidValue { argument, message }.into()
            }
        }
    }
}

/// Resolves a field name, rejecting empty paths.
pub(crate) fn field_name(
    field: impl IntoFieldName,
    context: &str,
) -> Result<String, InvalidClause> {
    let name = field.into_field_name();
    if name.is_empty() {
        Err(InvalidClause::Path {
            context: context.to_string(),
        })
    } else {
        Ok(name)
    }
}

/// Serializes a value for use in a document.
pub(crate) fn to_value(
    value: impl Serialize,
    argument: &'static str,
) -> Result<Value, InvalidClause> {
    serde_json::to_value(value).map_err(|e| InvalidClause::Value {
        argument,
        message: e.to_string(),
    })
}

/// Returns `true` if every key of a non-empty object is an operator.
pub(crate) fn is_operator_object(map: &Map<String, Value>) -> bool {
    !map.is_empty() && map.keys().all(|k| k.starts_with('$'))
}
