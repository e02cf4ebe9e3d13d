//! Record types and their optional capabilities.
//!
//! A [`Record`] is any serde type persisted as one document. Its identifier
//! is stored under [`ID_FIELD`] and may be any [`RecordKey`]. Optional
//! behavior is declared through [`Capabilities`], a compile-time descriptor
//! that managers capture when they are built.
//!
//! # Example
//!
//! ```
//! use recordgate::record::{AuditStamps, Audited, Capabilities, Record, RecordId};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Clone, Default, Serialize, Deserialize)]
//! struct Invoice {
//!     #[serde(rename = "_id")]
//!     id: Option<RecordId>,
//!     #[serde(rename = "Total")]
//!     total: u64,
//!     #[serde(flatten)]
//!     stamps: AuditStamps,
//! }
//!
//! impl Audited for Invoice {
//!     fn audit_stamps(&self) -> &AuditStamps { &self.stamps }
//!     fn audit_stamps_mut(&mut self) -> &mut AuditStamps { &mut self.stamps }
//! }
//!
//! impl Record for Invoice {
//!     type Id = RecordId;
//!     const COLLECTION: Option<&'static str> = Some("invoices");
//!
//!     fn id(&self) -> Option<&RecordId> { self.id.as_ref() }
//!     fn set_id(&mut self, id: RecordId) { self.id = Some(id); }
//!     fn capabilities() -> Capabilities<Self> { Capabilities::audited() }
//! }
//!
//! assert_eq!(Invoice::collection_name(), "invoices");
//! assert!(Invoice::capabilities().is_audited());
//! ```

mod audit;
mod dynamic;
mod key;

use serde::Serialize;
use serde::de::DeserializeOwned;

pub use audit::{
    AuditKind, AuditStamps, Audited, CREATED_DATE_FIELD, Capabilities, MODIFIED_DATE_FIELD,
    TimeStamped,
};
pub use dynamic::DynamicRecord;
pub use key::{ParseRecordIdError, RecordId, RecordKey};

use crate::query::IndexModel;

/// Stored name of every record's identifier.
pub const ID_FIELD: &str = "_id";

/// A value persisted as one document in a collection.
///
/// The identifier must serialize under [`ID_FIELD`]; managers also write
/// `_id` explicitly, so a record that leaves it out of its own serde layout
/// still round-trips as long as it deserializes `_id`.
pub trait Record: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Identifier type.
    type Id: RecordKey;

    /// Collection name override. Defaults to the type's short name.
    const COLLECTION: Option<&'static str> = None;

    /// Named connection override. Defaults to the default connection.
    const CONNECTION: Option<&'static str> = None;

    /// Returns the identifier, or `None` when not yet assigned.
    fn id(&self) -> Option<&Self::Id>;

    /// Assigns the identifier.
    fn set_id(&mut self, id: Self::Id);

    /// Optional capabilities of this record type.
    fn capabilities() -> Capabilities<Self> {
        Capabilities::none()
    }

    /// Indexes ensured once when the collection is first bound.
    fn indexes() -> Vec<IndexModel> {
        Vec::new()
    }

    /// Returns the collection this type is stored in by default.
    fn collection_name() -> String {
        match Self::COLLECTION {
            Some(name) => name.to_string(),
            None => short_type_name::<Self>(),
        }
    }

    /// Returns `true` when the record has a usable identifier.
    fn has_id(&self) -> bool {
        self.id().is_some_and(|id| !id.is_unset())
    }
}

/// Returns the last path segment of a type name, without generics.
pub(crate) fn short_type_name<T: ?Sized>() -> String {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base).to_string()
}
