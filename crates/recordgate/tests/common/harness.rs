//! Gateways over in-memory stores, and a store wrapper that counts calls
//! and can hold a read open.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Notify;
use recordgate::StorageResult;
use recordgate::store::{
    Document, DocumentCursor, DocumentStore, FindQuery, IndexSpec, MemoryStore, ReplaceOutcome,
    ReturnDocument, StoreCapability, StoreKind, UpdateOutcome,
};
use recordgate::{ConnectionRegistry, Gateway};

/// Everything a test needs to drive one in-memory database.
pub struct TestContext {
    /// Gateway whose default connection is [`TestContext::store`].
    pub gateway: Gateway,
    /// The store behind the default connection.
    pub store: MemoryStore,
}

impl TestContext {
    /// A gateway over a fresh store named `database`.
    pub fn new(database: &str) -> Self {
        let store = MemoryStore::new(database);
        let registry = ConnectionRegistry::new();
        registry.register_store("default", Arc::new(store.clone()));
        Self {
            gateway: Gateway::new(registry),
            store,
        }
    }
}

/// Wraps a store and counts `find_one`, `find` and `create_index` round trips.
///
/// [`hold_next_find_one`](Self::hold_next_find_one) makes the next `find_one`
/// read its document and then wait for [`release_read`](Self::release_read)
/// before returning it.
#[derive(Debug)]
pub struct CountingStore {
    inner: Arc<dyn DocumentStore>,
    find_one_calls: AtomicUsize,
    find_calls: AtomicUsize,
    create_index_calls: AtomicUsize,
    hold_read: AtomicBool,
    read_held: Notify,
    read_released: Notify,
}

impl CountingStore {
    /// Wraps `inner`.
    pub fn new(inner: Arc<dyn DocumentStore>) -> Self {
        Self {
            inner,
            find_one_calls: AtomicUsize::new(0),
            find_calls: AtomicUsize::new(0),
            create_index_calls: AtomicUsize::new(0),
            hold_read: AtomicBool::new(false),
            read_held: Notify::new(),
            read_released: Notify::new(),
        }
    }

    /// Number of `find_one` calls so far.
    pub fn find_one_calls(&self) -> usize {
        self.find_one_calls.load(Ordering::SeqCst)
    }

    /// Number of `find` calls so far.
    pub fn find_calls(&self) -> usize {
        self.find_calls.load(Ordering::SeqCst)
    }

    /// Number of `create_index` calls so far.
    pub fn create_index_calls(&self) -> usize {
        self.create_index_calls.load(Ordering::SeqCst)
    }

    /// Holds the next `find_one` after it has read from the inner store.
    pub fn hold_next_find_one(&self) {
        self.hold_read.store(true, Ordering::SeqCst);
    }

    /// Waits until a held `find_one` has read its document.
    pub async fn read_held(&self) {
        self.read_held.notified().await;
    }

    /// Lets the held `find_one` return.
    pub fn release_read(&self) {
        self.read_released.notify_one();
    }
}

/// A gateway whose default connection goes through a [`CountingStore`].
pub fn counting_gateway(database: &str) -> (Gateway, Arc<CountingStore>) {
    let counting = Arc::new(CountingStore::new(Arc::new(MemoryStore::new(database))));
    let registry = ConnectionRegistry::new();
    registry.register_store("default", counting.clone());
    (Gateway::new(registry), counting)
}

#[async_trait]
impl DocumentStore for CountingStore {
    fn kind(&self) -> StoreKind {
        StoreKind::Custom("counting")
    }

    fn database_name(&self) -> &str {
        self.inner.database_name()
    }

    fn supports(&self, capability: StoreCapability) -> bool {
        self.inner.supports(capability)
    }

    async fn collection_exists(&self, collection: &str) -> StorageResult<bool> {
        self.inner.collection_exists(collection).await
    }

    async fn find_one(
        &self,
        collection: &str,
        filter: Document,
    ) -> StorageResult<Option<Document>> {
        self.find_one_calls.fetch_add(1, Ordering::SeqCst);
        let found = self.inner.find_one(collection, filter).await?;
        if self.hold_read.swap(false, Ordering::SeqCst) {
            self.read_held.notify_one();
            self.read_released.notified().await;
        }
        Ok(found)
    }

    async fn find(
        &self,
        collection: &str,
        query: FindQuery,
    ) -> StorageResult<Box<dyn DocumentCursor>> {
        self.find_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.find(collection, query).await
    }

    async fn count(&self, collection: &str, filter: Document) -> StorageResult<u64> {
        self.inner.count(collection, filter).await
    }

    async fn insert_one(&self, collection: &str, document: Document) -> StorageResult<()> {
        self.inner.insert_one(collection, document).await
    }

    async fn insert_many(&self, collection: &str, documents: Vec<Document>) -> StorageResult<()> {
        self.inner.insert_many(collection, documents).await
    }

    async fn replace_one(
        &self,
        collection: &str,
        filter: Document,
        replacement: Document,
        upsert: bool,
    ) -> StorageResult<ReplaceOutcome> {
        self.inner
            .replace_one(collection, filter, replacement, upsert)
            .await
    }

    async fn update_many(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
        upsert: bool,
    ) -> StorageResult<UpdateOutcome> {
        self.inner
            .update_many(collection, filter, update, upsert)
            .await
    }

    async fn delete_many(&self, collection: &str, filter: Document) -> StorageResult<u64> {
        self.inner.delete_many(collection, filter).await
    }

    async fn find_one_and_update(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
        sort: Option<Document>,
        return_document: ReturnDocument,
    ) -> StorageResult<Option<Document>> {
        self.inner
            .find_one_and_update(collection, filter, update, sort, return_document)
            .await
    }

    async fn find_one_and_delete(
        &self,
        collection: &str,
        filter: Document,
        sort: Option<Document>,
    ) -> StorageResult<Option<Document>> {
        self.inner
            .find_one_and_delete(collection, filter, sort)
            .await
    }

    async fn create_index(&self, collection: &str, index: &IndexSpec) -> StorageResult<()> {
        self.create_index_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.create_index(collection, index).await
    }

    async fn drop_collection(&self, collection: &str) -> StorageResult<()> {
        self.inner.drop_collection(collection).await
    }

    async fn aggregate(
        &self,
        collection: &str,
        pipeline: Vec<Document>,
    ) -> StorageResult<Box<dyn DocumentCursor>> {
        self.inner.aggregate(collection, pipeline).await
    }
}
