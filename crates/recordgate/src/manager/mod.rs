//! Typed record managers.
//!
//! A [`RecordManager`] binds a record type to one collection through a shared
//! [`CollectionHandle`] and exposes the CRUD, query and claim operations over
//! it. Managers hold no mutable state of their own; cloning one is cheap.
//!
//! Decorators built on top of a manager:
//!
//! - [`ArchivingRecordManager`]: moves records into an `Archived_` collection.
//! - [`CachingRecordManager`]: memoizes lookups by identifier.

mod archive;
mod cache;
mod cursor;

pub use archive::{ARCHIVE_PREFIX, ArchivingRecordManager};
pub use cache::CachingRecordManager;
pub use cursor::{ClaimCursor, RecordCursor};

use std::sync::Arc;

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde_json::Value;

use self::cursor::{ClaimKind, decode};
use crate::error::{ArgumentError, BackendError, QueryError, StorageResult};
use crate::policy::{IdentityAuditPolicy, NoopHooks, SaveHooks};
use crate::query::{
    Criteria, FindOptions, IndexKeys, IndexModel, IndexOptions, ModifyOptions, SortOrder, Update,
};
use crate::record::{ID_FIELD, MODIFIED_DATE_FIELD, Record, RecordKey};
use crate::store::{Document, DocumentStore, FindQuery};

/// Binding between a collection name and the store holding it.
///
/// One handle exists per (record type, connection, collection) within a
/// [`Gateway`](crate::Gateway); every manager for that key shares it.
#[derive(Debug)]
pub struct CollectionHandle {
    name: String,
    connection: String,
    store: Arc<dyn DocumentStore>,
}

impl CollectionHandle {
    /// Creates a handle.
    pub fn new(
        name: impl Into<String>,
        connection: impl Into<String>,
        store: Arc<dyn DocumentStore>,
    ) -> Self {
        Self {
            name: name.into(),
            connection: connection.into(),
            store,
        }
    }

    /// Collection name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Connection the collection lives on.
    pub fn connection(&self) -> &str {
        &self.connection
    }

    /// Store holding the collection.
    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }
}

/// Typed access to one collection.
pub struct RecordManager<T: Record> {
    handle: Arc<CollectionHandle>,
    policy: IdentityAuditPolicy<T>,
    hooks: Arc<dyn SaveHooks<T>>,
}

impl<T: Record> Clone for RecordManager<T> {
    fn clone(&self) -> Self {
        Self {
            handle: self.handle.clone(),
            policy: self.policy.clone(),
            hooks: self.hooks.clone(),
        }
    }
}

impl<T: Record> std::fmt::Debug for RecordManager<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordManager")
            .field("collection", &self.handle.name())
            .field("connection", &self.handle.connection())
            .field("policy", &self.policy)
            .finish()
    }
}

fn id_value<K: RecordKey>(id: &K) -> StorageResult<Value> {
    if id.is_unset() {
        return Err(ArgumentError::Missing { argument: "id" }.into());
    }
    Ok(serde_json::to_value(id)?)
}

fn id_filter(id: Value) -> Document {
    let mut filter = Document::new();
    filter.insert(ID_FIELD.to_string(), id);
    filter
}

impl<T: Record> RecordManager<T> {
    /// Creates a manager over `handle`.
    ///
    /// Prefer [`Gateway::manager`](crate::Gateway::manager), which also ensures
    /// the type's indexes once per handle.
    pub fn new(handle: Arc<CollectionHandle>) -> Self {
        Self {
            handle,
            policy: IdentityAuditPolicy::new(),
            hooks: Arc::new(NoopHooks),
        }
    }

    /// Replaces the save hooks.
    pub fn with_hooks(mut self, hooks: Arc<dyn SaveHooks<T>>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Returns the shared collection handle.
    pub fn handle(&self) -> &Arc<CollectionHandle> {
        &self.handle
    }

    /// Returns the collection name.
    pub fn collection_name(&self) -> &str {
        self.handle.name()
    }

    fn store(&self) -> &Arc<dyn DocumentStore> {
        self.handle.store()
    }

    /// Criteria matching the record with `id`.
    pub fn criteria_by_id(id: &T::Id) -> StorageResult<Criteria> {
        Ok(Criteria::new().eq(ID_FIELD, id_value(id)?))
    }

    /// Criteria matching any record whose id is in `ids`.
    pub fn criteria_by_ids<'a, I>(ids: I) -> StorageResult<Criteria>
    where
        I: IntoIterator<Item = &'a T::Id>,
    {
        let values = ids
            .into_iter()
            .map(id_value)
            .collect::<StorageResult<Vec<_>>>()?;
        Ok(Criteria::new().is_in(ID_FIELD, values))
    }

    /// Serializes a record, with `_id` written explicitly.
    fn encode(record: &T) -> StorageResult<(Value, Document)> {
        let id = match record.id() {
            Some(id) => id_value(id)?,
            None => return Err(ArgumentError::Missing { argument: "id" }.into()),
        };
        let mut document = match serde_json::to_value(record)? {
            Value::Object(map) => map,
            other => {
                return Err(BackendError::SerializationError {
                    message: format!("record serialized to a non-document value: {}", other),
                }
                .into());
            }
        };
        document.insert(ID_FIELD.to_string(), id.clone());
        Ok((id, document))
    }

    /// Returns the record with `id`, if present.
    pub async fn get_by_id(&self, id: &T::Id) -> StorageResult<Option<T>> {
        let filter = id_filter(id_value(id)?);
        tracing::debug!("get_by_id on {}", self.collection_name());
        match self.store().find_one(self.collection_name(), filter).await? {
            Some(document) => Ok(Some(decode(document)?)),
            None => Ok(None),
        }
    }

    /// Returns the records whose ids are in `ids`. Order is unspecified.
    pub async fn get_many_by_ids(&self, ids: &[T::Id]) -> StorageResult<RecordCursor<T>> {
        let criteria = Self::criteria_by_ids(ids)?;
        self.find(&criteria, FindOptions::default()).await
    }

    /// Deletes the record with `id`. Returns whether a document was removed.
    pub async fn delete_by_id(&self, id: &T::Id) -> StorageResult<bool> {
        let filter = id_filter(id_value(id)?);
        let deleted = self.store().delete_many(self.collection_name(), filter).await?;
        tracing::debug!("delete_by_id on {} removed {}", self.collection_name(), deleted);
        Ok(deleted > 0)
    }

    /// Inserts or overwrites `record`.
    ///
    /// Assigns an identifier if unset and maintains audit stamps first.
    /// Returns `true` if the record was inserted, `false` if it replaced an
    /// existing document.
    pub async fn save(&self, record: &mut T) -> StorageResult<bool> {
        self.policy.prepare(record, Utc::now())?;
        self.hooks.before_save(record)?;
        let (id, document) = Self::encode(record)?;
        let outcome = self
            .store()
            .replace_one(self.collection_name(), id_filter(id), document, true)
            .await?;
        tracing::debug!(
            "save on {} ({})",
            self.collection_name(),
            if outcome.upserted { "inserted" } else { "replaced" }
        );
        self.hooks.after_save(record);
        Ok(outcome.upserted)
    }

    /// Writes `record` as-is, without identity or audit preparation.
    pub(crate) async fn write_unprepared(&self, record: &T) -> StorageResult<bool> {
        let (id, document) = Self::encode(record)?;
        let outcome = self
            .store()
            .replace_one(self.collection_name(), id_filter(id), document, true)
            .await?;
        Ok(outcome.upserted)
    }

    /// Inserts several records in one store call.
    ///
    /// `None` elements are skipped. Each record is prepared like [`save`](Self::save).
    /// The insert is not transactional: on a store error, records before the
    /// failing one may already be stored.
    pub async fn batch_insert<I>(&self, records: I) -> StorageResult<Vec<T>>
    where
        I: IntoIterator,
        I::Item: Into<Option<T>>,
    {
        let now = Utc::now();
        let mut prepared = Vec::new();
        let mut skipped = 0usize;
        for record in records {
            let Some(mut record) = record.into() else {
                skipped += 1;
                continue;
            };
            self.policy.prepare(&mut record, now)?;
            self.hooks.before_save(&mut record)?;
            prepared.push(record);
        }
        if skipped > 0 {
            tracing::warn!(
                "batch_insert on {} skipped {} empty elements",
                self.collection_name(),
                skipped
            );
        }
        if prepared.is_empty() {
            return Ok(prepared);
        }

        let documents = prepared
            .iter()
            .map(|record| Self::encode(record).map(|(_, document)| document))
            .collect::<StorageResult<Vec<_>>>()?;
        self.store()
            .insert_many(self.collection_name(), documents)
            .await?;
        tracing::debug!(
            "batch_insert on {} inserted {}",
            self.collection_name(),
            prepared.len()
        );
        for record in &prepared {
            self.hooks.after_save(record);
        }
        Ok(prepared)
    }

    /// Returns a cursor over matching records.
    pub async fn find(
        &self,
        criteria: &Criteria,
        options: FindOptions,
    ) -> StorageResult<RecordCursor<T>> {
        let query = FindQuery {
            filter: criteria.to_document()?,
            sort: options.sort.as_ref().map(SortOrder::to_document).transpose()?,
            skip: options.skip,
            limit: options.limit,
        };
        let cursor = self.store().find(self.collection_name(), query).await?;
        Ok(RecordCursor::new(cursor))
    }

    /// Returns a cursor over every record.
    pub async fn find_all(&self) -> StorageResult<RecordCursor<T>> {
        self.find(&Criteria::everything(), FindOptions::default()).await
    }

    /// Returns the only matching record.
    ///
    /// Fails with [`QueryError::MultipleMatches`] if more than one matches.
    pub async fn find_single(&self, criteria: &Criteria) -> StorageResult<Option<T>> {
        let mut cursor = self.find(criteria, FindOptions::new().limit(2)).await?;
        let first = cursor.next().await?;
        if first.is_some() && cursor.next().await?.is_some() {
            return Err(QueryError::MultipleMatches {
                collection: self.collection_name().to_string(),
                operation: "find_single",
            }
            .into());
        }
        Ok(first)
    }

    /// Counts matching records, or all records when `criteria` is `None`.
    pub async fn count(&self, criteria: Option<&Criteria>) -> StorageResult<u64> {
        let filter = match criteria {
            Some(criteria) => criteria.to_document()?,
            None => Document::new(),
        };
        self.store().count(self.collection_name(), filter).await
    }

    /// Drops the collection if it exists. Returns whether it did.
    pub async fn drop_collection(&self) -> StorageResult<bool> {
        let collection = self.collection_name();
        if !self.store().collection_exists(collection).await? {
            return Ok(false);
        }
        self.store().drop_collection(collection).await?;
        tracing::info!("Dropped collection {}", collection);
        Ok(true)
    }

    fn update_document(update: &Update, operation: &'static str) -> StorageResult<Document> {
        if update.is_empty() {
            return Err(ArgumentError::EmptyUpdate { operation }.into());
        }
        update.to_document()
    }

    /// Atomically updates the first match and returns it.
    ///
    /// Returns the modified document unless the options ask for the original.
    pub async fn find_one_and_modify(
        &self,
        criteria: &Criteria,
        update: &Update,
        options: &ModifyOptions,
    ) -> StorageResult<Option<T>> {
        let update = Self::update_document(update, "find_one_and_modify")?;
        let sort = options.sort.as_ref().map(SortOrder::to_document).transpose()?;
        let found = self
            .store()
            .find_one_and_update(
                self.collection_name(),
                criteria.to_document()?,
                update,
                sort,
                options.return_document,
            )
            .await?;
        found.map(decode).transpose()
    }

    /// Atomically removes the first match and returns it.
    pub async fn find_one_and_remove(
        &self,
        criteria: &Criteria,
        sort: Option<&SortOrder>,
    ) -> StorageResult<Option<T>> {
        let sort = sort.map(SortOrder::to_document).transpose()?;
        let found = self
            .store()
            .find_one_and_delete(self.collection_name(), criteria.to_document()?, sort)
            .await?;
        found.map(decode).transpose()
    }

    /// Claims matching records one at a time, each through
    /// [`find_one_and_modify`](Self::find_one_and_modify).
    ///
    /// The cursor ends when nothing matches. If the update does not make
    /// claimed records stop matching, it never ends; cap it with
    /// [`ClaimCursor::with_limit`].
    pub fn enumerate_and_modify(
        &self,
        criteria: &Criteria,
        update: &Update,
        options: &ModifyOptions,
    ) -> StorageResult<ClaimCursor<T>> {
        let update = Self::update_document(update, "enumerate_and_modify")?;
        let sort = options.sort.as_ref().map(SortOrder::to_document).transpose()?;
        Ok(ClaimCursor::new(
            self.handle.clone(),
            criteria.to_document()?,
            sort,
            ClaimKind::Modify {
                update,
                return_document: options.return_document,
            },
        ))
    }

    /// Removes matching records one at a time, yielding each.
    pub fn enumerate_and_remove(
        &self,
        criteria: &Criteria,
        sort: Option<&SortOrder>,
    ) -> StorageResult<ClaimCursor<T>> {
        let sort = sort.map(SortOrder::to_document).transpose()?;
        Ok(ClaimCursor::new(
            self.handle.clone(),
            criteria.to_document()?,
            sort,
            ClaimKind::Remove,
        ))
    }

    /// Applies `update` to every match. Returns matched plus upserted count.
    ///
    /// Audited record types also get `ModifiedDate` set to now, unless the
    /// update already sets it.
    pub async fn update_many(
        &self,
        criteria: &Criteria,
        update: &Update,
        upsert: bool,
    ) -> StorageResult<u64> {
        let mut document = Self::update_document(update, "update_many")?;
        if self.policy.capabilities().is_audited() && !update.touches(MODIFIED_DATE_FIELD) {
            let stamped = update.clone().set(MODIFIED_DATE_FIELD, Utc::now());
            document = stamped.to_document()?;
        }
        let outcome = self
            .store()
            .update_many(self.collection_name(), criteria.to_document()?, document, upsert)
            .await?;
        tracing::debug!(
            "update_many on {} matched {} modified {}",
            self.collection_name(),
            outcome.matched,
            outcome.modified
        );
        Ok(outcome.matched + u64::from(outcome.upserted))
    }

    /// Deletes every match. Returns the number removed.
    ///
    /// Unscoped criteria are rejected; pass [`Criteria::everything`] to empty
    /// the collection.
    pub async fn delete_many(&self, criteria: &Criteria) -> StorageResult<u64> {
        if criteria.is_unscoped() {
            return Err(ArgumentError::UnscopedCriteria {
                operation: "delete_many",
            }
            .into());
        }
        let deleted = self
            .store()
            .delete_many(self.collection_name(), criteria.to_document()?)
            .await?;
        tracing::debug!("delete_many on {} removed {}", self.collection_name(), deleted);
        Ok(deleted)
    }

    /// Ensures an index exists. Idempotent.
    pub async fn ensure_index(&self, keys: IndexKeys, options: IndexOptions) -> StorageResult<()> {
        self.ensure_model(&IndexModel::new(keys).with_options(options))
            .await
    }

    pub(crate) async fn ensure_model(&self, model: &IndexModel) -> StorageResult<()> {
        let spec = model.to_spec()?;
        self.store()
            .create_index(self.collection_name(), &spec)
            .await
    }

    /// Runs an aggregation pipeline, decoding each result as `R`.
    pub async fn aggregate<R: DeserializeOwned>(
        &self,
        pipeline: Vec<Document>,
    ) -> StorageResult<RecordCursor<R>> {
        let cursor = self
            .store()
            .aggregate(self.collection_name(), pipeline)
            .await?;
        Ok(RecordCursor::new(cursor))
    }
}
