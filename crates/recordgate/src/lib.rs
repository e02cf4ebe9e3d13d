//! Typed record managers over document stores.
//!
//! This crate maps plain serde types onto collections of a document store and
//! provides the operations applications build on: identity assignment, audit
//! stamps, queries built from typed field paths, atomic claim loops for work
//! queues, archiving, and read-through caching.
//!
//! # Features
//!
//! - **Typed records**: any serde type implementing [`Record`](record::Record)
//! - **Identity & audit**: identifiers generated on save, `CreatedDate`/`ModifiedDate` maintained
//! - **Field paths**: dotted paths resolved from typed member chains
//! - **Claim loops**: repeated atomic find-and-modify for concurrent workers
//! - **Named connections**: a registry of endpoints connected on first use
//!
//! # Store Features
//!
//! ```toml
//! [dependencies]
//! recordgate = { version = "0.1", features = ["mongodb"] }
//! ```
//!
//! - in-memory store (always available) - `memory://<database>` endpoints
//! - `mongodb` - MongoDB via the official driver, `mongodb://` and `mongodb+srv://` endpoints
//!
//! # Architecture
//!
//! - [`error`] - Error types for all operations
//! - [`path`] - Field-path resolution
//! - [`record`] - The record trait, identifiers and capabilities
//! - [`policy`] - Identity assignment, audit stamps and save hooks
//! - [`query`] - Criteria, update, sort and index builders
//! - [`store`] - The document store boundary and its implementations
//! - [`connection`] - Named connections and endpoint parsing
//! - [`manager`] - Record managers, cursors and decorators
//! - [`gateway`] - The entry point that hands out managers
//!
//! # Quick Start
//!
//! ```
//! use recordgate::query::{Criteria, ModifyOptions, Update};
//! use recordgate::record::{Record, RecordId};
//! use recordgate::{ConnectionRegistry, Gateway};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! struct Task {
//!     #[serde(rename = "_id")]
//!     id: Option<RecordId>,
//!     #[serde(rename = "State")]
//!     state: String,
//! }
//!
//! impl Record for Task {
//!     type Id = RecordId;
//!     fn id(&self) -> Option<&RecordId> { self.id.as_ref() }
//!     fn set_id(&mut self, id: RecordId) { self.id = Some(id); }
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> recordgate::StorageResult<()> {
//! let registry = ConnectionRegistry::from_settings("DB", [("DB", "memory://work")])?;
//! let gateway = Gateway::new(registry);
//! let tasks = gateway.manager::<Task>().await?;
//!
//! tasks
//!     .batch_insert((0..3).map(|_| Task { id: None, state: "pending".into() }))
//!     .await?;
//!
//! let pending = Criteria::new().eq("State", "pending");
//! let claim = Update::new().set("State", "running");
//! let claimed = tasks
//!     .enumerate_and_modify(&pending, &claim, &ModifyOptions::default())?
//!     .try_collect()
//!     .await?;
//! assert_eq!(claimed.len(), 3);
//! assert!(claimed.iter().all(|task| task.state == "running"));
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod connection;
pub mod error;
pub mod gateway;
pub mod manager;
pub mod path;
pub mod policy;
pub mod query;
pub mod record;
pub mod store;

// Re-export commonly used types at crate root
pub use connection::{ConnectionRegistry, Endpoint};
pub use error::{StorageError, StorageResult};
pub use gateway::{Gateway, ManagerOptions};
pub use manager::{
    ArchivingRecordManager, CachingRecordManager, ClaimCursor, CollectionHandle, RecordCursor,
    RecordManager,
};
pub use record::{Record, RecordId};

// Re-export the store boundary
pub use store::{Document, DocumentStore, MemoryStore, StoreKind};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
