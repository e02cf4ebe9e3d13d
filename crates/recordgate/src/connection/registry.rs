//! Named connections and the stores behind them.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::{DefaultConnector, Endpoint, StoreConnector};
use crate::error::{ConfigurationError, StorageResult};
use crate::store::DocumentStore;

/// Name of the connection used when none is given.
pub const DEFAULT_CONNECTION: &str = "default";

/// Default prefix for connection settings and environment variables.
pub const DEFAULT_SETTINGS_PREFIX: &str = "RECORDGATE_CONNECTION";

/// Normalizes a connection name. Empty means [`DEFAULT_CONNECTION`]; names are
/// case-insensitive.
pub fn normalize_name(name: &str) -> String {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        DEFAULT_CONNECTION.to_string()
    } else {
        trimmed.to_lowercase()
    }
}

#[derive(Debug, Clone)]
struct RegisteredConnection {
    endpoint: Option<Endpoint>,
    store: Option<Arc<dyn DocumentStore>>,
}

/// Maps logical connection names to stores.
///
/// Entries are registered with an endpoint URL and connected lazily on first
/// use, or registered with an already-built store. Lookups take a read lock;
/// connecting happens outside any lock and the first store to finish
/// connecting is kept.
///
/// # Settings
///
/// [`ConnectionRegistry::from_settings`] reads flat key/value pairs:
///
/// | Key | Entry |
/// |-----|-------|
/// | `<prefix>` | default connection |
/// | `<prefix>.<name>` | connection `<name>` |
///
/// [`ConnectionRegistry::from_env`] reads `<PREFIX>` and `<PREFIX>__<NAME>`.
#[derive(Debug)]
pub struct ConnectionRegistry {
    entries: RwLock<HashMap<String, RegisteredConnection>>,
    connector: Arc<dyn StoreConnector>,
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionRegistry {
    /// Creates an empty registry using [`DefaultConnector`].
    pub fn new() -> Self {
        Self::with_connector(Arc::new(DefaultConnector::new()))
    }

    /// Creates an empty registry with a custom connector.
    pub fn with_connector(connector: Arc<dyn StoreConnector>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            connector,
        }
    }

    /// Builds a registry from `<prefix>` / `<prefix>.<name>` settings.
    pub fn from_settings<I, K, V>(prefix: &str, settings: I) -> StorageResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let registry = Self::new();
        registry.load_settings(prefix, settings)?;
        Ok(registry)
    }

    /// Builds a registry from `<PREFIX>` / `<PREFIX>__<NAME>` environment variables.
    pub fn from_env(prefix: &str) -> StorageResult<Self> {
        let registry = Self::new();
        registry.load_env(prefix, std::env::vars())?;
        Ok(registry)
    }

    /// Registers every matching setting. Returns how many were registered.
    pub fn load_settings<I, K, V>(&self, prefix: &str, settings: I) -> StorageResult<usize>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut loaded = 0;
        for (key, value) in settings {
            let Some(name) = setting_name(key.as_ref(), prefix, ".") else {
                continue;
            };
            if value.as_ref().trim().is_empty() {
                continue;
            }
            self.set_connection(&name, Some(value.as_ref()))?;
            loaded += 1;
        }
        Ok(loaded)
    }

    /// Registers every matching environment-style variable.
    pub fn load_env<I>(&self, prefix: &str, vars: I) -> StorageResult<usize>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let translated = vars.into_iter().filter_map(|(key, value)| {
            setting_name(&key, prefix, "__").map(|name| (format!("{}.{}", prefix, name), value))
        });
        self.load_settings(prefix, translated)
    }

    /// Registers, replaces or (with `None` or an empty URL) removes a connection.
    pub fn set_connection(&self, name: &str, url: Option<&str>) -> StorageResult<()> {
        let name = normalize_name(name);
        let url = url.map(str::trim).filter(|u| !u.is_empty());

        let Some(url) = url else {
            if self.entries.write().remove(&name).is_some() {
                tracing::info!("Removed connection '{}'", name);
            }
            return Ok(());
        };

        let endpoint = Endpoint::parse(url)?;
        let mut entries = self.entries.write();
        match entries.get_mut(&name) {
            Some(existing) if existing.endpoint.as_ref() == Some(&endpoint) => {}
            Some(existing) => {
                tracing::warn!("Replacing connection '{}' with {}", name, endpoint);
                existing.endpoint = Some(endpoint);
                existing.store = None;
            }
            None => {
                tracing::info!("Registered connection '{}' -> {}", name, endpoint);
                entries.insert(
                    name,
                    RegisteredConnection {
                        endpoint: Some(endpoint),
                        store: None,
                    },
                );
            }
        }
        Ok(())
    }

    /// Registers an already-built store under `name`.
    pub fn register_store(&self, name: &str, store: Arc<dyn DocumentStore>) {
        let name = normalize_name(name);
        tracing::info!("Registered {} store as connection '{}'", store.kind(), name);
        let previous = self.entries.write().insert(
            name.clone(),
            RegisteredConnection {
                endpoint: None,
                store: Some(store),
            },
        );
        if previous.is_some() {
            tracing::warn!("Replaced existing connection '{}'", name);
        }
    }

    /// Returns `true` if `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.read().contains_key(&normalize_name(name))
    }

    /// Returns the registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Returns the endpoint registered under `name`, if any.
    pub fn endpoint(&self, name: &str) -> Option<Endpoint> {
        self.entries
            .read()
            .get(&normalize_name(name))
            .and_then(|entry| entry.endpoint.clone())
    }

    /// Returns the store for `name`, connecting on first use.
    ///
    /// Fails with [`ConfigurationError::Missing`] when nothing is registered.
    pub async fn get_instance(&self, name: &str) -> StorageResult<Arc<dyn DocumentStore>> {
        let name = normalize_name(name);
        let endpoint = {
            let entries = self.entries.read();
            let entry = entries
                .get(&name)
                .ok_or_else(|| ConfigurationError::Missing { name: name.clone() })?;
            if let Some(store) = &entry.store {
                return Ok(store.clone());
            }
            entry
                .endpoint
                .clone()
                .ok_or_else(|| ConfigurationError::Missing { name: name.clone() })?
        };

        tracing::debug!("Connecting '{}' to {}", name, endpoint);
        let connected = self.connector.connect(&endpoint).await?;

        let mut entries = self.entries.write();
        match entries.get_mut(&name) {
            Some(entry) if entry.endpoint.as_ref() == Some(&endpoint) => match &entry.store {
                Some(winner) => Ok(winner.clone()),
                None => {
                    entry.store = Some(connected.clone());
                    Ok(connected)
                }
            },
            _ => Ok(connected),
        }
    }
}

/// Extracts the connection name from a settings key.
fn setting_name(key: &str, prefix: &str, separator: &str) -> Option<String> {
    if key == prefix {
        return Some(DEFAULT_CONNECTION.to_string());
    }
    let rest = key.strip_prefix(prefix)?.strip_prefix(separator)?;
    if rest.is_empty() {
        None
    } else {
        Some(normalize_name(rest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn test_name_normalization() {
        assert_eq!(normalize_name(""), "default");
        assert_eq!(normalize_name("  "), "default");
        assert_eq!(normalize_name("Analytics"), "analytics");
    }

    #[test]
    fn test_settings_keys() {
        assert_eq!(setting_name("DB", "DB", ".").as_deref(), Some("default"));
        assert_eq!(setting_name("DB.audit", "DB", ".").as_deref(), Some("audit"));
        assert_eq!(setting_name("DB__AUDIT", "DB", "__").as_deref(), Some("audit"));
        assert_eq!(setting_name("DBX", "DB", "."), None);
        assert_eq!(setting_name("DB.", "DB", "."), None);
    }

    #[tokio::test]
    async fn test_missing_connection_is_configuration_error() {
        let registry = ConnectionRegistry::new();
        let err = registry.get_instance("nowhere").await.unwrap_err();
        assert!(err.is_configuration_missing());
    }

    #[tokio::test]
    async fn test_empty_name_is_default() {
        let registry =
            ConnectionRegistry::from_settings("DB", [("DB", "memory://main"), ("DB.audit", "")])
                .unwrap();
        assert_eq!(registry.names(), vec!["default".to_string()]);
        let store = registry.get_instance("").await.unwrap();
        assert_eq!(store.database_name(), "main");
        let again = registry.get_instance("default").await.unwrap();
        assert!(Arc::ptr_eq(&store, &again));
    }

    #[tokio::test]
    async fn test_set_connection_none_removes() {
        let registry = ConnectionRegistry::new();
        registry.set_connection("reports", Some("memory://r")).unwrap();
        assert!(registry.contains("REPORTS"));
        registry.set_connection("reports", None).unwrap();
        assert!(!registry.contains("reports"));
        registry.set_connection("reports", Some("  ")).unwrap();
        assert!(!registry.contains("reports"));
    }

    #[tokio::test]
    async fn test_registered_store_is_returned() {
        let registry = ConnectionRegistry::new();
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new("given"));
        registry.register_store("side", store.clone());
        let found = registry.get_instance("side").await.unwrap();
        assert!(Arc::ptr_eq(&store, &found));
        assert!(registry.endpoint("side").is_none());
    }

    #[tokio::test]
    async fn test_invalid_url_is_rejected() {
        let registry = ConnectionRegistry::new();
        let err = registry.set_connection("x", Some("ftp://nope")).unwrap_err();
        assert!(err.is_invalid_argument());
        assert!(!registry.contains("x"));
    }
}
