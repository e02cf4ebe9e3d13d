//! Turning endpoints into live stores.

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{Endpoint, EndpointScheme};
use crate::error::StorageResult;
use crate::store::{DocumentStore, MemoryStore};

/// Opens a store for an endpoint.
#[async_trait]
pub trait StoreConnector: Send + Sync + Debug {
    /// Connects to `endpoint`.
    async fn connect(&self, endpoint: &Endpoint) -> StorageResult<Arc<dyn DocumentStore>>;
}

/// Connector for the stores built into this crate.
///
/// `memory://` endpoints naming the same database share one [`MemoryStore`]
/// for the connector's lifetime.
#[derive(Debug, Default)]
pub struct DefaultConnector {
    memory: Mutex<HashMap<String, MemoryStore>>,
}

impl DefaultConnector {
    /// Creates a connector.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StoreConnector for DefaultConnector {
    async fn connect(&self, endpoint: &Endpoint) -> StorageResult<Arc<dyn DocumentStore>> {
        match endpoint.scheme() {
            EndpointScheme::Memory => {
                let store = self
                    .memory
                    .lock()
                    .entry(endpoint.database().to_string())
                    .or_insert_with(|| MemoryStore::new(endpoint.database()))
                    .clone();
                Ok(Arc::new(store))
            }
            EndpointScheme::MongoDb | EndpointScheme::MongoDbSrv => connect_mongodb(endpoint).await,
        }
    }
}

#[cfg(feature = "mongodb")]
async fn connect_mongodb(endpoint: &Endpoint) -> StorageResult<Arc<dyn DocumentStore>> {
    let store =
        crate::store::MongoStore::connect(endpoint.connection_string(), endpoint.database())
            .await?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "mongodb"))]
async fn connect_mongodb(endpoint: &Endpoint) -> StorageResult<Arc<dyn DocumentStore>> {
    Err(crate::error::BackendError::UnsupportedCapability {
        backend_name: endpoint.scheme().to_string(),
        capability: "mongodb stores (enable the `mongodb` feature)".to_string(),
    }
    .into())
}
