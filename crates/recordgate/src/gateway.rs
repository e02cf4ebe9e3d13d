//! The entry point that hands out record managers.
//!
//! A [`Gateway`] owns a [`ConnectionRegistry`] and everything derived from
//! it: one [`CollectionHandle`] per (record type, connection, collection),
//! the one-time index initialization of each handle, and the shared caches
//! behind [`Gateway::caching_manager`]. Nothing here is process-global; two
//! gateways never share state unless they share a registry.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::OnceCell;

use crate::connection::{ConnectionRegistry, DEFAULT_CONNECTION, normalize_name};
use crate::error::{BackendError, StorageError, StorageResult};
use crate::manager::{
    ArchivingRecordManager, CachingRecordManager, CollectionHandle, RecordManager,
};
use crate::record::Record;

/// Overrides for where a manager's records live.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManagerOptions {
    /// Connection name. Defaults to [`Record::CONNECTION`], then the default connection.
    pub connection: Option<String>,
    /// Collection name. Defaults to [`Record::collection_name`].
    pub collection: Option<String>,
}

impl ManagerOptions {
    /// Options with no overrides.
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses the named connection.
    pub fn connection(mut self, name: impl Into<String>) -> Self {
        self.connection = Some(name.into());
        self
    }

    /// Uses the named collection.
    pub fn collection(mut self, name: impl Into<String>) -> Self {
        self.collection = Some(name.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct HandleKey {
    record_type: TypeId,
    connection: String,
    collection: String,
}

impl HandleKey {
    fn of<T: Record>(options: &ManagerOptions) -> Self {
        let connection = options
            .connection
            .as_deref()
            .or(T::CONNECTION)
            .unwrap_or(DEFAULT_CONNECTION);
        Self {
            record_type: TypeId::of::<T>(),
            connection: normalize_name(connection),
            collection: options
                .collection
                .clone()
                .unwrap_or_else(T::collection_name),
        }
    }
}

/// Hands out managers bound to shared collection handles.
///
/// # Example
///
/// ```
/// use recordgate::{Gateway, ConnectionRegistry};
/// use recordgate::record::{Record, RecordId};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// struct Job {
///     #[serde(rename = "_id")]
///     id: Option<RecordId>,
///     name: String,
/// }
///
/// impl Record for Job {
///     type Id = RecordId;
///     fn id(&self) -> Option<&RecordId> { self.id.as_ref() }
///     fn set_id(&mut self, id: RecordId) { self.id = Some(id); }
/// }
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> recordgate::StorageResult<()> {
/// let registry = ConnectionRegistry::from_settings("DB", [("DB", "memory://jobs")])?;
/// let gateway = Gateway::new(registry);
///
/// let jobs = gateway.manager::<Job>().await?;
/// let mut job = Job { id: None, name: "reindex".into() };
/// jobs.save(&mut job).await?;
/// assert_eq!(jobs.count(None).await?, 1);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Gateway {
    registry: Arc<ConnectionRegistry>,
    handles: RwLock<HashMap<HandleKey, Arc<CollectionHandle>>>,
    initializers: RwLock<HashMap<HandleKey, Arc<OnceCell<()>>>>,
    caches: RwLock<HashMap<HandleKey, Arc<dyn Any + Send + Sync>>>,
}

impl Gateway {
    /// Creates a gateway over `registry`.
    pub fn new(registry: ConnectionRegistry) -> Self {
        Self::with_registry(Arc::new(registry))
    }

    /// Creates a gateway over a registry shared with other owners.
    pub fn with_registry(registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            registry,
            handles: RwLock::new(HashMap::new()),
            initializers: RwLock::new(HashMap::new()),
            caches: RwLock::new(HashMap::new()),
        }
    }

    /// The connection registry.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Manager for `T` at its default location.
    pub async fn manager<T: Record>(&self) -> StorageResult<RecordManager<T>> {
        self.manager_with(ManagerOptions::default()).await
    }

    /// Manager for `T` at the location given by `options`.
    ///
    /// The first manager for a (type, connection, collection) creates the
    /// shared handle and ensures `T::indexes()`. Concurrent first calls wait
    /// for that initialization; a failed initialization is retried by the
    /// next call.
    pub async fn manager_with<T: Record>(
        &self,
        options: ManagerOptions,
    ) -> StorageResult<RecordManager<T>> {
        let key = HandleKey::of::<T>(&options);
        let handle = self.handle(&key).await?;
        let manager = RecordManager::new(handle);

        let cell = self
            .initializers
            .write()
            .entry(key.clone())
            .or_default()
            .clone();
        cell.get_or_try_init(|| async {
            let indexes = T::indexes();
            for model in &indexes {
                manager.ensure_model(model).await?;
            }
            tracing::info!(
                "Initialized collection {} on '{}' ({} indexes)",
                key.collection,
                key.connection,
                indexes.len()
            );
            Ok::<(), StorageError>(())
        })
        .await?;

        Ok(manager)
    }

    /// Archiving manager for `T` at its default location.
    pub async fn archiving_manager<T: Record>(&self) -> StorageResult<ArchivingRecordManager<T>> {
        Ok(ArchivingRecordManager::new(self.manager::<T>().await?))
    }

    /// Caching manager for `T` at its default location.
    ///
    /// Every call for the same type and location shares one cache.
    pub async fn caching_manager<T>(&self) -> StorageResult<CachingRecordManager<T>>
    where
        T: Record + Clone,
        T::Id: Hash + Eq,
    {
        self.caching_manager_with(ManagerOptions::default()).await
    }

    /// Caching manager for `T` at the location given by `options`.
    pub async fn caching_manager_with<T>(
        &self,
        options: ManagerOptions,
    ) -> StorageResult<CachingRecordManager<T>>
    where
        T: Record + Clone,
        T::Id: Hash + Eq,
    {
        let key = HandleKey::of::<T>(&options);
        if let Some(existing) = self.cached_manager::<T>(&key)? {
            return Ok(existing);
        }

        let created: Arc<dyn Any + Send + Sync> =
            Arc::new(CachingRecordManager::new(self.manager_with::<T>(options).await?));
        let shared = self
            .caches
            .write()
            .entry(key.clone())
            .or_insert(created)
            .clone();
        downcast_manager::<T>(&shared, &key)
    }

    fn cached_manager<T>(&self, key: &HandleKey) -> StorageResult<Option<CachingRecordManager<T>>>
    where
        T: Record + Clone,
        T::Id: Hash + Eq,
    {
        let caches = self.caches.read();
        caches
            .get(key)
            .map(|shared| downcast_manager::<T>(shared, key))
            .transpose()
    }

    async fn handle(&self, key: &HandleKey) -> StorageResult<Arc<CollectionHandle>> {
        let existing = self.handles.read().get(key).cloned();
        if let Some(handle) = existing {
            return Ok(handle);
        }

        let store = self.registry.get_instance(&key.connection).await?;
        let handle = self
            .handles
            .write()
            .entry(key.clone())
            .or_insert_with(|| {
                tracing::debug!(
                    "Bound collection {} on '{}'",
                    key.collection,
                    key.connection
                );
                Arc::new(CollectionHandle::new(
                    key.collection.clone(),
                    key.connection.clone(),
                    store,
                ))
            })
            .clone();
        Ok(handle)
    }
}

fn downcast_manager<T>(
    shared: &Arc<dyn Any + Send + Sync>,
    key: &HandleKey,
) -> StorageResult<CachingRecordManager<T>>
where
    T: Record + Clone,
    T::Id: Hash + Eq,
{
    shared
        .downcast_ref::<CachingRecordManager<T>>()
        .cloned()
        .ok_or_else(|| {
            BackendError::Internal {
                backend_name: "gateway".to_string(),
                message: format!("cached manager for {} has the wrong type", key.collection),
                source: None,
            }
            .into()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{IndexKeys, IndexModel};
    use crate::record::RecordId;
    use crate::store::MemoryStore;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Ticket {
        #[serde(rename = "_id")]
        id: Option<RecordId>,
        #[serde(rename = "Code")]
        code: String,
    }

    impl Record for Ticket {
        type Id = RecordId;

        fn id(&self) -> Option<&RecordId> {
            self.id.as_ref()
        }

        fn set_id(&mut self, id: RecordId) {
            self.id = Some(id);
        }

        fn indexes() -> Vec<IndexModel> {
            vec![IndexModel::new(IndexKeys::ascending("Code")).unique()]
        }
    }

    fn gateway() -> (Gateway, MemoryStore) {
        let store = MemoryStore::new("gw");
        let registry = ConnectionRegistry::new();
        registry.register_store("default", Arc::new(store.clone()));
        registry.register_store("reports", Arc::new(MemoryStore::new("reports")));
        (Gateway::new(registry), store)
    }

    #[tokio::test]
    async fn test_managers_share_a_handle() {
        let (gateway, _) = gateway();
        let first = gateway.manager::<Ticket>().await.unwrap();
        let second = gateway.manager::<Ticket>().await.unwrap();
        assert!(Arc::ptr_eq(first.handle(), second.handle()));
        assert_eq!(first.collection_name(), "Ticket");
        assert_eq!(first.handle().connection(), "default");
    }

    #[tokio::test]
    async fn test_indexes_are_ensured_on_first_bind() {
        let (gateway, store) = gateway();
        gateway.manager::<Ticket>().await.unwrap();
        let names: Vec<String> = store
            .indexes("Ticket")
            .into_iter()
            .map(|spec| spec.name)
            .collect();
        assert_eq!(names, vec!["Code_1".to_string()]);
    }

    #[tokio::test]
    async fn test_options_pick_connection_and_collection() {
        let (gateway, _) = gateway();
        let manager = gateway
            .manager_with::<Ticket>(ManagerOptions::new().connection("REPORTS").collection("t2"))
            .await
            .unwrap();
        assert_eq!(manager.collection_name(), "t2");
        assert_eq!(manager.handle().connection(), "reports");
        assert_eq!(manager.handle().store().database_name(), "reports");
    }

    #[tokio::test]
    async fn test_unknown_connection_fails() {
        let (gateway, _) = gateway();
        let err = gateway
            .manager_with::<Ticket>(ManagerOptions::new().connection("missing"))
            .await
            .unwrap_err();
        assert!(err.is_configuration_missing());
    }

    #[tokio::test]
    async fn test_caching_managers_share_one_cache() {
        let (gateway, _) = gateway();
        let first = gateway.caching_manager::<Ticket>().await.unwrap();
        let mut ticket = Ticket {
            id: None,
            code: "A-1".to_string(),
        };
        first.save(&mut ticket).await.unwrap();

        let second = gateway.caching_manager::<Ticket>().await.unwrap();
        assert_eq!(second.len(), 1);
    }

    #[tokio::test]
    async fn test_archiving_manager_uses_prefixed_collection() {
        let (gateway, _) = gateway();
        let archiving = gateway.archiving_manager::<Ticket>().await.unwrap();
        assert_eq!(archiving.archived().collection_name(), "Archived_Ticket");
        assert!(Arc::ptr_eq(
            archiving.records().handle().store(),
            archiving.archived().handle().store()
        ));
    }

    #[test]
    fn test_gateways_do_not_share_state() {
        let (a, _) = gateway();
        let (b, _) = gateway();
        assert!(!Arc::ptr_eq(a.registry(), b.registry()));
    }
}
