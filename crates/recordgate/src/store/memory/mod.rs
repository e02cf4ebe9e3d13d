//! In-process document store.
//!
//! [`MemoryStore`] keeps every collection in a `HashMap` behind a single
//! `parking_lot::RwLock`. Each operation takes the lock once, so every
//! operation (including find-and-modify) is atomic. A `find` cursor fixes
//! the order of matching identifiers when the query runs, then re-reads each
//! document as it is reached, skipping documents that were removed or no
//! longer match.
//!
//! Stores created with [`MemoryStore::new`] are independent. Clones share
//! state, which is how the connection registry hands one database to many
//! managers.

mod matcher;
mod pipeline;
mod update;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use serde_json::Value;

use self::matcher::{matches, resolve, values_equal};
use self::pipeline::{SortSpec, run_pipeline, sort_documents, window};
use self::update::{apply_update, seed_from_filter};
use super::{
    DocumentCursor, DocumentStore, FindQuery, IndexSpec, ReplaceOutcome, ReturnDocument,
    StoreCapability, StoreKind, UpdateOutcome, VecCursor,
};
use crate::error::{BackendError, StorageError, StorageResult};
use crate::record::{ID_FIELD, RecordId};
use crate::store::Document;

const ID_INDEX: &str = "_id_";

#[derive(Debug, Default, Clone)]
struct MemoryCollection {
    documents: Vec<Document>,
    indexes: Vec<IndexSpec>,
}

impl MemoryCollection {
    fn matching(&self, filter: &Document) -> StorageResult<Vec<usize>> {
        let mut positions = Vec::new();
        for (position, document) in self.documents.iter().enumerate() {
            if matches(document, filter)? {
                positions.push(position);
            }
        }
        Ok(positions)
    }

    /// Picks the first match in `sort` order, or insertion order without one.
    fn first_matching(
        &self,
        filter: &Document,
        sort: Option<&Document>,
    ) -> StorageResult<Option<usize>> {
        let positions = self.matching(filter)?;
        match sort {
            None => Ok(positions.into_iter().next()),
            Some(sort) => {
                let spec = SortSpec::parse(sort)?;
                Ok(positions.into_iter().min_by(|a, b| {
                    spec.compare(&self.documents[*a], &self.documents[*b])
                        .then(a.cmp(b))
                }))
            }
        }
    }

    /// Rejects `candidate` if it collides on `_id` or a unique index with any
    /// document other than the one at `replacing`.
    fn check_unique(
        &self,
        collection: &str,
        candidate: &Document,
        replacing: Option<usize>,
    ) -> StorageResult<()> {
        let others = self
            .documents
            .iter()
            .enumerate()
            .filter(|(position, _)| Some(*position) != replacing)
            .map(|(_, document)| document);

        let candidate_id = candidate.get(ID_FIELD).unwrap_or(&Value::Null);
        let unique: Vec<&IndexSpec> = self.indexes.iter().filter(|i| i.unique).collect();
        let candidate_keys: Vec<Option<Vec<Value>>> =
            unique.iter().map(|index| index_key(candidate, index)).collect();

        for other in others {
            if other
                .get(ID_FIELD)
                .is_some_and(|id| values_equal(id, candidate_id))
            {
                return Err(duplicate(collection, ID_INDEX, candidate_id));
            }
            for (index, key) in unique.iter().zip(&candidate_keys) {
                let Some(key) = key else { continue };
                if let Some(existing) = index_key(other, index) {
                    let same = existing.len() == key.len()
                        && existing.iter().zip(key).all(|(a, b)| values_equal(a, b));
                    if same {
                        return Err(duplicate(collection, &index.name, &Value::Array(key.clone())));
                    }
                }
            }
        }
        Ok(())
    }
}

/// Index key of a document, or `None` when a sparse index skips it.
fn index_key(document: &Document, index: &IndexSpec) -> Option<Vec<Value>> {
    let mut present = false;
    let key: Vec<Value> = index
        .keys
        .iter()
        .map(|(field, _)| match resolve(document, field).first() {
            Some(value) => {
                present = true;
                (*value).clone()
            }
            None => Value::Null,
        })
        .collect();
    if index.sparse && !present { None } else { Some(key) }
}

fn duplicate(collection: &str, index: &str, key: &Value) -> StorageError {
    BackendError::DuplicateKey {
        collection: collection.to_string(),
        index: index.to_string(),
        key: key.to_string(),
    }
    .into()
}

/// Returns the `_id` equality of a filter, if it has one.
fn filter_id(filter: &Document) -> Option<Value> {
    match filter.get(ID_FIELD)? {
        Value::Object(ops) if crate::query::is_operator_object(ops) => ops.get("$eq").cloned(),
        value => Some(value.clone()),
    }
}

fn ensure_id(document: &mut Document, filter: &Document) {
    if document.get(ID_FIELD).is_none_or(Value::is_null) {
        let id = filter_id(filter).unwrap_or_else(|| Value::String(RecordId::new().to_string()));
        document.insert(ID_FIELD.to_string(), id);
    }
}

/// An in-process document store.
///
/// # Example
///
/// ```
/// use recordgate::store::{DocumentStore, MemoryStore};
/// use serde_json::json;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let store = MemoryStore::new("app");
/// let doc = json!({"_id": "a", "n": 1}).as_object().cloned().unwrap();
/// store.insert_one("things", doc).await.unwrap();
/// assert_eq!(store.count("things", Default::default()).await.unwrap(), 1);
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct MemoryStore {
    database: String,
    collections: Arc<RwLock<HashMap<String, MemoryCollection>>>,
}

impl MemoryStore {
    /// Creates an empty store for `database`.
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            collections: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Returns the names of all collections, sorted.
    pub fn collection_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.collections.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Returns the indexes defined on a collection, excluding `_id`.
    pub fn indexes(&self, collection: &str) -> Vec<IndexSpec> {
        self.collections
            .read()
            .get(collection)
            .map(|c| c.indexes.clone())
            .unwrap_or_default()
    }

    fn snapshot(&self, collection: &str, filter: &Document) -> StorageResult<Vec<Document>> {
        let collections = self.collections.read();
        let Some(coll) = collections.get(collection) else {
            return Ok(Vec::new());
        };
        let mut documents = Vec::new();
        for document in &coll.documents {
            if matches(document, filter)? {
                documents.push(document.clone());
            }
        }
        Ok(documents)
    }
}

/// Cursor re-reading each matched document when it is reached.
struct MemoryCursor {
    store: MemoryStore,
    collection: String,
    filter: Document,
    ids: std::vec::IntoIter<Value>,
}

#[async_trait]
impl DocumentCursor for MemoryCursor {
    async fn next_document(&mut self) -> StorageResult<Option<Document>> {
        for id in self.ids.by_ref() {
            let collections = self.store.collections.read();
            let Some(coll) = collections.get(&self.collection) else {
                return Ok(None);
            };
            let current = coll
                .documents
                .iter()
                .find(|document| document.get(ID_FIELD).is_some_and(|v| values_equal(v, &id)));
            if let Some(document) = current {
                if matches(document, &self.filter)? {
                    return Ok(Some(document.clone()));
                }
            }
        }
        Ok(None)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new("default")
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    fn kind(&self) -> StoreKind {
        StoreKind::Memory
    }

    fn database_name(&self) -> &str {
        &self.database
    }

    fn supports(&self, capability: StoreCapability) -> bool {
        matches!(capability, StoreCapability::Regex)
    }

    async fn collection_exists(&self, collection: &str) -> StorageResult<bool> {
        Ok(self.collections.read().contains_key(collection))
    }

    async fn find_one(
        &self,
        collection: &str,
        filter: Document,
    ) -> StorageResult<Option<Document>> {
        let collections = self.collections.read();
        let Some(coll) = collections.get(collection) else {
            return Ok(None);
        };
        for document in &coll.documents {
            if matches(document, &filter)? {
                return Ok(Some(document.clone()));
            }
        }
        Ok(None)
    }

    async fn find(
        &self,
        collection: &str,
        query: FindQuery,
    ) -> StorageResult<Box<dyn DocumentCursor>> {
        let mut documents = self.snapshot(collection, &query.filter)?;
        if let Some(sort) = &query.sort {
            sort_documents(&mut documents, sort)?;
        }
        let ids: Vec<Value> = window(documents, query.skip, query.limit)
            .into_iter()
            .filter_map(|mut document| document.remove(ID_FIELD))
            .collect();
        tracing::trace!("memory find on {} matched {} documents", collection, ids.len());
        Ok(Box::new(MemoryCursor {
            store: self.clone(),
            collection: collection.to_string(),
            filter: query.filter,
            ids: ids.into_iter(),
        }))
    }

    async fn count(&self, collection: &str, filter: Document) -> StorageResult<u64> {
        let collections = self.collections.read();
        match collections.get(collection) {
            Some(coll) => Ok(coll.matching(&filter)?.len() as u64),
            None => Ok(0),
        }
    }

    async fn insert_one(&self, collection: &str, document: Document) -> StorageResult<()> {
        self.insert_many(collection, vec![document]).await
    }

    async fn insert_many(&self, collection: &str, documents: Vec<Document>) -> StorageResult<()> {
        let mut collections = self.collections.write();
        let coll = collections.entry(collection.to_string()).or_default();
        for mut document in documents {
            ensure_id(&mut document, &Document::new());
            coll.check_unique(collection, &document, None)?;
            coll.documents.push(document);
        }
        Ok(())
    }

    async fn replace_one(
        &self,
        collection: &str,
        filter: Document,
        mut replacement: Document,
        upsert: bool,
    ) -> StorageResult<ReplaceOutcome> {
        let mut collections = self.collections.write();
        let existing = match collections.get(collection) {
            Some(coll) => coll.first_matching(&filter, None)?,
            None => None,
        };

        match existing {
            Some(position) => {
                let coll = collections.entry(collection.to_string()).or_default();
                let current_id = coll.documents[position].get(ID_FIELD).cloned();
                match (replacement.get(ID_FIELD), &current_id) {
                    (Some(new_id), Some(current)) if !values_equal(new_id, current) => {
                        return Err(BackendError::QueryError {
                            message: format!(
                                "replacement would modify the immutable field '{}'",
                                ID_FIELD
                            ),
                        }
                        .into());
                    }
                    (None, Some(current)) => {
                        replacement.insert(ID_FIELD.to_string(), current.clone());
                    }
                    _ => {}
                }
                coll.check_unique(collection, &replacement, Some(position))?;
                coll.documents[position] = replacement;
                Ok(ReplaceOutcome {
                    matched: 1,
                    upserted: false,
                })
            }
            None if upsert => {
                let coll = collections.entry(collection.to_string()).or_default();
                ensure_id(&mut replacement, &filter);
                coll.check_unique(collection, &replacement, None)?;
                coll.documents.push(replacement);
                Ok(ReplaceOutcome {
                    matched: 0,
                    upserted: true,
                })
            }
            None => Ok(ReplaceOutcome::default()),
        }
    }

    async fn update_many(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
        upsert: bool,
    ) -> StorageResult<UpdateOutcome> {
        let now = Utc::now();
        let mut collections = self.collections.write();
        if !upsert && !collections.contains_key(collection) {
            return Ok(UpdateOutcome::default());
        }
        let coll = collections.entry(collection.to_string()).or_default();
        let positions = coll.matching(&filter)?;

        if positions.is_empty() {
            if !upsert {
                return Ok(UpdateOutcome::default());
            }
            let mut document = seed_from_filter(&filter)?;
            apply_update(&mut document, &update, true, now)?;
            ensure_id(&mut document, &filter);
            coll.check_unique(collection, &document, None)?;
            coll.documents.push(document);
            return Ok(UpdateOutcome {
                matched: 0,
                modified: 0,
                upserted: true,
            });
        }

        // Stage every change so a failure leaves the collection untouched.
        let mut staged = coll.clone();
        let mut modified = 0;
        for position in &positions {
            let mut document = staged.documents[*position].clone();
            if apply_update(&mut document, &update, false, now)? {
                staged.check_unique(collection, &document, Some(*position))?;
                staged.documents[*position] = document;
                modified += 1;
            }
        }
        *coll = staged;
        Ok(UpdateOutcome {
            matched: positions.len() as u64,
            modified,
            upserted: false,
        })
    }

    async fn delete_many(&self, collection: &str, filter: Document) -> StorageResult<u64> {
        let mut collections = self.collections.write();
        let Some(coll) = collections.get_mut(collection) else {
            return Ok(0);
        };
        let positions = coll.matching(&filter)?;
        let mut position = 0;
        coll.documents.retain(|_| {
            let keep = positions.binary_search(&position).is_err();
            position += 1;
            keep
        });
        Ok(positions.len() as u64)
    }

    async fn find_one_and_update(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
        sort: Option<Document>,
        return_document: ReturnDocument,
    ) -> StorageResult<Option<Document>> {
        let now = Utc::now();
        let mut collections = self.collections.write();
        let Some(coll) = collections.get_mut(collection) else {
            return Ok(None);
        };
        let Some(position) = coll.first_matching(&filter, sort.as_ref())? else {
            return Ok(None);
        };

        let before = coll.documents[position].clone();
        let mut after = before.clone();
        if apply_update(&mut after, &update, false, now)? {
            coll.check_unique(collection, &after, Some(position))?;
            coll.documents[position] = after.clone();
        }
        Ok(Some(match return_document {
            ReturnDocument::Before => before,
            ReturnDocument::After => after,
        }))
    }

    async fn find_one_and_delete(
        &self,
        collection: &str,
        filter: Document,
        sort: Option<Document>,
    ) -> StorageResult<Option<Document>> {
        let mut collections = self.collections.write();
        let Some(coll) = collections.get_mut(collection) else {
            return Ok(None);
        };
        match coll.first_matching(&filter, sort.as_ref())? {
            Some(position) => Ok(Some(coll.documents.remove(position))),
            None => Ok(None),
        }
    }

    async fn create_index(&self, collection: &str, index: &IndexSpec) -> StorageResult<()> {
        let mut collections = self.collections.write();
        let coll = collections.entry(collection.to_string()).or_default();

        if let Some(existing) = coll.indexes.iter().find(|i| i.name == index.name) {
            if existing == index {
                return Ok(());
            }
            return Err(BackendError::QueryError {
                message: format!(
                    "index {} already exists on {} with different options",
                    index.name, collection
                ),
            }
            .into());
        }

        if index.unique {
            let mut probe = MemoryCollection {
                documents: Vec::new(),
                indexes: vec![index.clone()],
            };
            for document in &coll.documents {
                probe.check_unique(collection, document, None)?;
                probe.documents.push(document.clone());
            }
        }
        if index.expire_after.is_some() {
            tracing::debug!(
                "memory store does not expire documents; index {} on {} is advisory",
                index.name,
                collection
            );
        }
        coll.indexes.push(index.clone());
        Ok(())
    }

    async fn drop_collection(&self, collection: &str) -> StorageResult<()> {
        self.collections.write().remove(collection);
        Ok(())
    }

    async fn aggregate(
        &self,
        collection: &str,
        pipeline: Vec<Document>,
    ) -> StorageResult<Box<dyn DocumentCursor>> {
        let documents = self.snapshot(collection, &Document::new())?;
        let documents = run_pipeline(documents, &pipeline)?;
        Ok(Box::new(VecCursor::new(documents)))
    }
}
