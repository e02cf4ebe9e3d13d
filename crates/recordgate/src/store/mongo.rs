//! MongoDB document store.
//!
//! Documents cross the boundary as relaxed extended JSON: outgoing maps are
//! converted with `bson::Document::try_from`, incoming documents with
//! `Bson::into_relaxed_extjson`.

use async_trait::async_trait;
use mongodb::bson::{Bson, Document as BsonDocument, doc};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::{
    ClientOptions, FindOneAndDeleteOptions, FindOneAndUpdateOptions, FindOptions, IndexOptions,
    ReplaceOptions, ReturnDocument as MongoReturnDocument, UpdateOptions,
};
use mongodb::{Client, Collection, Cursor, Database, IndexModel};
use serde_json::Value;

use super::{
    Document, DocumentCursor, DocumentStore, FindQuery, IndexSpec, ReplaceOutcome,
    ReturnDocument, StoreCapability, StoreKind, UpdateOutcome,
};
use crate::error::{BackendError, StorageError, StorageResult};

const DUPLICATE_KEY_CODE: i32 = 11000;

/// A store backed by one MongoDB database.
#[derive(Debug, Clone)]
pub struct MongoStore {
    client: Client,
    database: Database,
}

impl MongoStore {
    /// Connects to `uri` and binds to `database`.
    ///
    /// The driver connects lazily; this call only parses and validates the
    /// connection string.
    pub async fn connect(uri: &str, database: &str) -> StorageResult<Self> {
        let options = ClientOptions::parse(uri).await.map_err(|e| {
            StorageError::Backend(BackendError::ConnectionFailed {
                backend_name: "mongodb".to_string(),
                message: e.to_string(),
            })
        })?;
        let client = Client::with_options(options).map_err(|e| {
            StorageError::Backend(BackendError::ConnectionFailed {
                backend_name: "mongodb".to_string(),
                message: e.to_string(),
            })
        })?;
        tracing::debug!("Connected MongoDB client for database {}", database);
        Ok(Self::from_client(client, database))
    }

    /// Wraps an existing client.
    pub fn from_client(client: Client, database: &str) -> Self {
        let database = client.database(database);
        Self { client, database }
    }

    /// Returns the underlying client.
    pub fn client(&self) -> &Client {
        &self.client
    }

    fn collection(&self, name: &str) -> Collection<BsonDocument> {
        self.database.collection::<BsonDocument>(name)
    }
}

fn to_bson(document: Document) -> StorageResult<BsonDocument> {
    Ok(BsonDocument::try_from(document)?)
}

fn from_bson(document: BsonDocument) -> StorageResult<Document> {
    match Bson::Document(document).into_relaxed_extjson() {
        Value::Object(map) => Ok(map),
        other => Err(BackendError::SerializationError {
            message: format!("expected a document, got {}", other),
        }
        .into()),
    }
}

/// Maps driver errors, surfacing unique index violations as duplicate keys.
fn write_error(collection: &str, err: mongodb::error::Error) -> StorageError {
    let duplicate = match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write)) if write.code == DUPLICATE_KEY_CODE => {
            Some(write.message.clone())
        }
        ErrorKind::Command(command) if command.code == DUPLICATE_KEY_CODE => {
            Some(command.message.clone())
        }
        _ => None,
    };
    match duplicate {
        Some(message) => BackendError::DuplicateKey {
            collection: collection.to_string(),
            index: index_from_message(&message).unwrap_or_default(),
            key: message,
        }
        .into(),
        None => err.into(),
    }
}

/// Extracts the index name from "E11000 duplicate key error ... index: name dup key: ...".
fn index_from_message(message: &str) -> Option<String> {
    let rest = message.split("index: ").nth(1)?;
    rest.split_whitespace().next().map(str::to_string)
}

fn sort_document(sort: Option<Document>) -> StorageResult<Option<BsonDocument>> {
    sort.map(to_bson).transpose()
}

struct MongoCursor {
    inner: Cursor<BsonDocument>,
}

#[async_trait]
impl DocumentCursor for MongoCursor {
    async fn next_document(&mut self) -> StorageResult<Option<Document>> {
        if self.inner.advance().await? {
            let current = self.inner.deserialize_current()?;
            Ok(Some(from_bson(current)?))
        } else {
            Ok(None)
        }
    }
}

#[async_trait]
impl DocumentStore for MongoStore {
    fn kind(&self) -> StoreKind {
        StoreKind::MongoDB
    }

    fn database_name(&self) -> &str {
        self.database.name()
    }

    fn supports(&self, _capability: StoreCapability) -> bool {
        true
    }

    async fn collection_exists(&self, collection: &str) -> StorageResult<bool> {
        let names = self
            .database
            .list_collection_names()
            .filter(doc! { "name": collection })
            .await?;
        Ok(names.iter().any(|name| name == collection))
    }

    async fn find_one(
        &self,
        collection: &str,
        filter: Document,
    ) -> StorageResult<Option<Document>> {
        let found = self.collection(collection).find_one(to_bson(filter)?).await?;
        found.map(from_bson).transpose()
    }

    async fn find(
        &self,
        collection: &str,
        query: FindQuery,
    ) -> StorageResult<Box<dyn DocumentCursor>> {
        let mut options = FindOptions::default();
        options.sort = sort_document(query.sort)?;
        options.skip = query.skip;
        options.limit = query.limit.filter(|l| *l > 0);
        let cursor = self
            .collection(collection)
            .find(to_bson(query.filter)?)
            .with_options(options)
            .await?;
        Ok(Box::new(MongoCursor { inner: cursor }))
    }

    async fn count(&self, collection: &str, filter: Document) -> StorageResult<u64> {
        Ok(self
            .collection(collection)
            .count_documents(to_bson(filter)?)
            .await?)
    }

    async fn insert_one(&self, collection: &str, document: Document) -> StorageResult<()> {
        self.collection(collection)
            .insert_one(to_bson(document)?)
            .await
            .map_err(|e| write_error(collection, e))?;
        Ok(())
    }

    async fn insert_many(&self, collection: &str, documents: Vec<Document>) -> StorageResult<()> {
        if documents.is_empty() {
            return Ok(());
        }
        let documents = documents
            .into_iter()
            .map(to_bson)
            .collect::<StorageResult<Vec<_>>>()?;
        self.collection(collection)
            .insert_many(documents)
            .await
            .map_err(|e| write_error(collection, e))?;
        Ok(())
    }

    async fn replace_one(
        &self,
        collection: &str,
        filter: Document,
        replacement: Document,
        upsert: bool,
    ) -> StorageResult<ReplaceOutcome> {
        let mut options = ReplaceOptions::default();
        options.upsert = Some(upsert);
        let result = self
            .collection(collection)
            .replace_one(to_bson(filter)?, to_bson(replacement)?)
            .with_options(options)
            .await
            .map_err(|e| write_error(collection, e))?;
        Ok(ReplaceOutcome {
            matched: result.matched_count,
            upserted: result.upserted_id.is_some(),
        })
    }

    async fn update_many(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
        upsert: bool,
    ) -> StorageResult<UpdateOutcome> {
        let mut options = UpdateOptions::default();
        options.upsert = Some(upsert);
        let result = self
            .collection(collection)
            .update_many(to_bson(filter)?, to_bson(update)?)
            .with_options(options)
            .await
            .map_err(|e| write_error(collection, e))?;
        Ok(UpdateOutcome {
            matched: result.matched_count,
            modified: result.modified_count,
            upserted: result.upserted_id.is_some(),
        })
    }

    async fn delete_many(&self, collection: &str, filter: Document) -> StorageResult<u64> {
        let result = self
            .collection(collection)
            .delete_many(to_bson(filter)?)
            .await?;
        Ok(result.deleted_count)
    }

    async fn find_one_and_update(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
        sort: Option<Document>,
        return_document: ReturnDocument,
    ) -> StorageResult<Option<Document>> {
        let mut options = FindOneAndUpdateOptions::default();
        options.sort = sort_document(sort)?;
        options.return_document = Some(match return_document {
            ReturnDocument::Before => MongoReturnDocument::Before,
            ReturnDocument::After => MongoReturnDocument::After,
        });
        let found = self
            .collection(collection)
            .find_one_and_update(to_bson(filter)?, to_bson(update)?)
            .with_options(options)
            .await
            .map_err(|e| write_error(collection, e))?;
        found.map(from_bson).transpose()
    }

    async fn find_one_and_delete(
        &self,
        collection: &str,
        filter: Document,
        sort: Option<Document>,
    ) -> StorageResult<Option<Document>> {
        let mut options = FindOneAndDeleteOptions::default();
        options.sort = sort_document(sort)?;
        let found = self
            .collection(collection)
            .find_one_and_delete(to_bson(filter)?)
            .with_options(options)
            .await?;
        found.map(from_bson).transpose()
    }

    async fn create_index(&self, collection: &str, index: &IndexSpec) -> StorageResult<()> {
        let mut keys = BsonDocument::new();
        for (field, direction) in &index.keys {
            keys.insert(field.clone(), *direction);
        }
        let mut options = IndexOptions::default();
        options.name = Some(index.name.clone());
        options.unique = index.unique.then_some(true);
        options.sparse = index.sparse.then_some(true);
        options.expire_after = index.expire_after;
        let model = IndexModel::builder().keys(keys).options(options).build();
        self.collection(collection)
            .create_index(model)
            .await
            .map_err(|e| write_error(collection, e))?;
        tracing::debug!("Ensured index {} on {}", index.name, collection);
        Ok(())
    }

    async fn drop_collection(&self, collection: &str) -> StorageResult<()> {
        self.collection(collection).drop().await?;
        Ok(())
    }

    async fn aggregate(
        &self,
        collection: &str,
        pipeline: Vec<Document>,
    ) -> StorageResult<Box<dyn DocumentCursor>> {
        let pipeline = pipeline
            .into_iter()
            .map(to_bson)
            .collect::<StorageResult<Vec<_>>>()?;
        let cursor = self.collection(collection).aggregate(pipeline).await?;
        Ok(Box::new(MongoCursor { inner: cursor }))
    }
}
