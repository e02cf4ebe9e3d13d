//! Document store abstraction.
//!
//! This module defines the [`DocumentStore`] trait, the boundary between the
//! typed managers and a concrete database. A store speaks in JSON documents
//! (`serde_json::Map`), Mongo-style filter and update documents, and resolved
//! [`IndexSpec`]s. Every method is a single round trip; the find-and-modify
//! family must be atomic with respect to concurrent callers.
//!
//! Two stores ship with the crate:
//!
//! - [`MemoryStore`]: an in-process store for tests and embedding.
//! - `MongoStore` (feature `mongodb`): the official driver.

use std::fmt::{self, Debug};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::StorageResult;

pub mod memory;
#[cfg(feature = "mongodb")]
pub mod mongo;

pub use memory::MemoryStore;
#[cfg(feature = "mongodb")]
pub use mongo::MongoStore;

/// A stored document.
pub type Document = Map<String, Value>;

/// Identifies the kind of document store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreKind {
    /// In-process [`MemoryStore`].
    Memory,
    /// MongoDB server.
    MongoDB,
    /// Custom store.
    Custom(&'static str),
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreKind::Memory => write!(f, "memory"),
            StoreKind::MongoDB => write!(f, "mongodb"),
            StoreKind::Custom(name) => write!(f, "{}", name),
        }
    }
}

/// Optional features a store may support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreCapability {
    /// Aggregation pipelines beyond `$match`/`$sort`/`$skip`/`$limit`/`$count`/`$project`.
    FullAggregation,
    /// Indexes that expire documents.
    ExpiringIndexes,
    /// Server-side regular expressions.
    Regex,
}

impl fmt::Display for StoreCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StoreCapability::FullAggregation => "full-aggregation",
            StoreCapability::ExpiringIndexes => "expiring-indexes",
            StoreCapability::Regex => "regex",
        };
        write!(f, "{}", name)
    }
}

/// Which version of a document a find-and-modify returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReturnDocument {
    /// The document as it was before the update.
    Before,
    /// The document after the update.
    #[default]
    After,
}

/// A resolved multi-document read.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindQuery {
    /// Filter document.
    pub filter: Document,
    /// Sort document, keys in priority order.
    pub sort: Option<Document>,
    /// Leading matches to skip.
    pub skip: Option<u64>,
    /// Maximum documents to return. Non-positive means unlimited.
    pub limit: Option<i64>,
}

impl FindQuery {
    /// A query with only a filter.
    pub fn filter(filter: Document) -> Self {
        Self {
            filter,
            ..Self::default()
        }
    }
}

/// Result of a replace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReplaceOutcome {
    /// Documents matched by the filter (0 or 1).
    pub matched: u64,
    /// `true` when the upsert inserted a new document.
    pub upserted: bool,
}

/// Result of a multi-document update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UpdateOutcome {
    /// Documents matched by the filter.
    pub matched: u64,
    /// Documents actually changed.
    pub modified: u64,
    /// `true` when the upsert inserted a new document.
    pub upserted: bool,
}

/// A resolved index definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    /// Index name.
    pub name: String,
    /// Keys and directions (1 or -1), in order.
    pub keys: Vec<(String, i32)>,
    /// Reject duplicate keys.
    pub unique: bool,
    /// Skip documents missing every indexed field.
    pub sparse: bool,
    /// Expire documents after this long.
    pub expire_after: Option<Duration>,
}

/// A lazily consumed sequence of documents.
#[async_trait]
pub trait DocumentCursor: Send {
    /// Returns the next document, or `None` when exhausted.
    async fn next_document(&mut self) -> StorageResult<Option<Document>>;
}

/// A cursor over documents that are already in memory.
#[derive(Debug, Default)]
pub struct VecCursor {
    documents: std::vec::IntoIter<Document>,
}

impl VecCursor {
    /// Wraps a list of documents.
    pub fn new(documents: Vec<Document>) -> Self {
        Self {
            documents: documents.into_iter(),
        }
    }
}

#[async_trait]
impl DocumentCursor for VecCursor {
    async fn next_document(&mut self) -> StorageResult<Option<Document>> {
        Ok(self.documents.next())
    }
}

/// A document database reachable through one connection.
///
/// Implementations are shared across tasks behind an `Arc` and must be safe
/// for concurrent use. Filters, updates and pipelines use MongoDB syntax.
#[async_trait]
pub trait DocumentStore: Send + Sync + Debug {
    /// Returns the kind of store.
    fn kind(&self) -> StoreKind;

    /// Returns the database this store is bound to.
    fn database_name(&self) -> &str;

    /// Returns whether the store supports a capability.
    fn supports(&self, capability: StoreCapability) -> bool;

    /// Returns whether a collection exists.
    async fn collection_exists(&self, collection: &str) -> StorageResult<bool>;

    /// Returns the first matching document, if any.
    async fn find_one(&self, collection: &str, filter: Document)
    -> StorageResult<Option<Document>>;

    /// Opens a cursor over matching documents.
    async fn find(
        &self,
        collection: &str,
        query: FindQuery,
    ) -> StorageResult<Box<dyn DocumentCursor>>;

    /// Counts matching documents.
    async fn count(&self, collection: &str, filter: Document) -> StorageResult<u64>;

    /// Inserts one document. The document must carry an `_id`.
    async fn insert_one(&self, collection: &str, document: Document) -> StorageResult<()>;

    /// Inserts documents in order, stopping at the first failure.
    async fn insert_many(&self, collection: &str, documents: Vec<Document>) -> StorageResult<()>;

    /// Replaces the first matching document, inserting when `upsert` is set.
    async fn replace_one(
        &self,
        collection: &str,
        filter: Document,
        replacement: Document,
        upsert: bool,
    ) -> StorageResult<ReplaceOutcome>;

    /// Applies an update to every matching document.
    async fn update_many(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
        upsert: bool,
    ) -> StorageResult<UpdateOutcome>;

    /// Deletes every matching document, returning how many were removed.
    async fn delete_many(&self, collection: &str, filter: Document) -> StorageResult<u64>;

    /// Atomically updates the first match (by `sort`) and returns it.
    async fn find_one_and_update(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
        sort: Option<Document>,
        return_document: ReturnDocument,
    ) -> StorageResult<Option<Document>>;

    /// Atomically removes the first match (by `sort`) and returns it.
    async fn find_one_and_delete(
        &self,
        collection: &str,
        filter: Document,
        sort: Option<Document>,
    ) -> StorageResult<Option<Document>>;

    /// Ensures an index exists. Creating an identical index is a no-op.
    async fn create_index(&self, collection: &str, index: &IndexSpec) -> StorageResult<()>;

    /// Drops a collection and its indexes. Dropping a missing collection is a no-op.
    async fn drop_collection(&self, collection: &str) -> StorageResult<()>;

    /// Runs an aggregation pipeline.
    async fn aggregate(
        &self,
        collection: &str,
        pipeline: Vec<Document>,
    ) -> StorageResult<Box<dyn DocumentCursor>>;
}
