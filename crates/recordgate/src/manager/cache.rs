//! Read-through caching of records by identifier.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::Mutex;

use super::RecordManager;
use crate::error::StorageResult;
use crate::record::Record;

struct CacheState<T: Record> {
    entries: RwLock<HashMap<T::Id, Arc<T>>>,
    fill: Mutex<()>,
}

/// A [`RecordManager`] that memoizes [`get_by_id`](Self::get_by_id).
///
/// Hits return the same `Arc<T>` every time. Misses go to the store; found
/// records are cached, absent ones are not. Misses, saves and deletes are
/// serialized by one fill lock: a miss re-checks the map before fetching, and
/// a write cannot land between a miss's read and its insert, so a fetched
/// value never overwrites a newer save or resurrects a delete.
///
/// Only writes made through this manager keep the cache coherent. Other
/// operations reached through `Deref` (bulk updates, claim loops) bypass it;
/// call [`clear_cache`](Self::clear_cache) or [`clear_item`](Self::clear_item)
/// after using them.
pub struct CachingRecordManager<T: Record> {
    inner: RecordManager<T>,
    state: Arc<CacheState<T>>,
}

impl<T: Record> Clone for CachingRecordManager<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            state: self.state.clone(),
        }
    }
}

impl<T> CachingRecordManager<T>
where
    T: Record + Clone,
    T::Id: Hash + Eq,
{
    /// Wraps `inner` with an empty cache.
    pub fn new(inner: RecordManager<T>) -> Self {
        Self {
            inner,
            state: Arc::new(CacheState {
                entries: RwLock::new(HashMap::new()),
                fill: Mutex::new(()),
            }),
        }
    }

    /// The wrapped manager.
    pub fn inner(&self) -> &RecordManager<T> {
        &self.inner
    }

    fn cached(&self, id: &T::Id) -> Option<Arc<T>> {
        self.state.entries.read().get(id).cloned()
    }

    /// Returns the record with `id`, from the cache when possible.
    pub async fn get_by_id(&self, id: &T::Id) -> StorageResult<Option<Arc<T>>> {
        if let Some(hit) = self.cached(id) {
            return Ok(Some(hit));
        }

        let _fill = self.state.fill.lock().await;
        if let Some(hit) = self.cached(id) {
            return Ok(Some(hit));
        }

        let Some(record) = self.inner.get_by_id(id).await? else {
            return Ok(None);
        };
        let record = Arc::new(record);
        self.state
            .entries
            .write()
            .insert(id.clone(), record.clone());
        tracing::debug!("Cached {:?} from {}", id, self.inner.collection_name());
        Ok(Some(record))
    }

    /// Saves `record`, then caches the saved value.
    pub async fn save(&self, record: &mut T) -> StorageResult<bool> {
        let _fill = self.state.fill.lock().await;
        let inserted = self.inner.save(record).await?;
        if let Some(id) = record.id() {
            self.state
                .entries
                .write()
                .insert(id.clone(), Arc::new(record.clone()));
        }
        Ok(inserted)
    }

    /// Deletes the record with `id`, then evicts it.
    pub async fn delete_by_id(&self, id: &T::Id) -> StorageResult<bool> {
        let _fill = self.state.fill.lock().await;
        let deleted = self.inner.delete_by_id(id).await?;
        self.state.entries.write().remove(id);
        Ok(deleted)
    }

    /// Evicts every entry.
    pub fn clear_cache(&self) {
        self.state.entries.write().clear();
    }

    /// Evicts one entry. Returns whether it was cached.
    pub fn clear_item(&self, id: &T::Id) -> bool {
        self.state.entries.write().remove(id).is_some()
    }

    /// Number of cached records.
    pub fn len(&self) -> usize {
        self.state.entries.read().len()
    }

    /// Returns `true` when nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.state.entries.read().is_empty()
    }
}

impl<T: Record> std::ops::Deref for CachingRecordManager<T> {
    type Target = RecordManager<T>;

    fn deref(&self) -> &RecordManager<T> {
        &self.inner
    }
}

impl<T: Record> std::fmt::Debug for CachingRecordManager<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachingRecordManager")
            .field("inner", &self.inner)
            .field("cached", &self.state.entries.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::CollectionHandle;
    use crate::store::{DocumentStore, MemoryStore};
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Setting {
        #[serde(rename = "_id")]
        key: String,
        value: String,
    }

    impl Record for Setting {
        type Id = String;

        fn id(&self) -> Option<&String> {
            Some(&self.key)
        }

        fn set_id(&mut self, id: String) {
            self.key = id;
        }
    }

    fn cache() -> CachingRecordManager<Setting> {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new("cache"));
        let handle = CollectionHandle::new("Setting", "default", store);
        CachingRecordManager::new(RecordManager::new(Arc::new(handle)))
    }

    fn setting(key: &str, value: &str) -> Setting {
        Setting {
            key: key.to_string(),
            value: value.to_string(),
        }
    }

    #[tokio::test]
    async fn test_hits_share_one_instance() {
        let cache = cache();
        cache.inner().save(&mut setting("theme", "dark")).await.unwrap();
        let key = "theme".to_string();

        let first = cache.get_by_id(&key).await.unwrap().unwrap();
        let second = cache.get_by_id(&key).await.unwrap().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_absent_records_are_not_cached() {
        let cache = cache();
        assert!(cache.get_by_id(&"nope".to_string()).await.unwrap().is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_save_overwrites_and_delete_evicts() {
        let cache = cache();
        let key = "lang".to_string();
        cache.save(&mut setting("lang", "en")).await.unwrap();
        cache.save(&mut setting("lang", "fr")).await.unwrap();
        assert_eq!(cache.get_by_id(&key).await.unwrap().unwrap().value, "fr");

        assert!(cache.delete_by_id(&key).await.unwrap());
        assert!(cache.is_empty());
        assert!(cache.get_by_id(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_clear_item_forces_refetch() {
        let cache = cache();
        let key = "tz".to_string();
        cache.save(&mut setting("tz", "UTC")).await.unwrap();
        let before = cache.get_by_id(&key).await.unwrap().unwrap();

        assert!(cache.clear_item(&key));
        assert!(!cache.clear_item(&key));
        let after = cache.get_by_id(&key).await.unwrap().unwrap();
        assert!(!Arc::ptr_eq(&before, &after));
        assert_eq!(*before, *after);
    }

    #[tokio::test]
    async fn test_clones_share_the_cache() {
        let cache = cache();
        let other = cache.clone();
        cache.save(&mut setting("a", "1")).await.unwrap();
        assert_eq!(other.len(), 1);
        other.clear_cache();
        assert!(cache.is_empty());
    }
}
