//! Error types for the record gateway.
//!
//! Errors are grouped by category: argument errors raised locally before any
//! store round trip, configuration errors from the connection registry, query
//! errors about result cardinality, and backend errors that originate in the
//! document store itself.

// Error enum variant fields are self-documenting via their #[error(...)] messages
#![allow(missing_docs)]

use thiserror::Error;

/// The primary error type for all gateway operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// A required argument was missing or unusable.
    #[error(transparent)]
    Argument(#[from] ArgumentError),

    /// Connection configuration errors.
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// Result cardinality errors.
    #[error(transparent)]
    Query(#[from] QueryError),

    /// Errors raised by the document store.
    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl StorageError {
    /// Returns `true` for errors caused by an absent or unusable argument.
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, StorageError::Argument(_))
    }

    /// Returns `true` when a named connection has no registered endpoint.
    pub fn is_configuration_missing(&self) -> bool {
        matches!(
            self,
            StorageError::Configuration(ConfigurationError::Missing { .. })
        )
    }

    /// Returns `true` when a single-match query matched more than one document.
    pub fn is_multiple_matches(&self) -> bool {
        matches!(self, StorageError::Query(QueryError::MultipleMatches { .. }))
    }
}

/// Errors about absent or malformed arguments.
///
/// These are always raised locally, before the store is contacted.
#[derive(Error, Debug)]
pub enum ArgumentError {
    /// A required identifier was unset.
    #[error("missing required argument: {argument}")]
    Missing { argument: &'static str },

    /// A bulk operation was given criteria that select nothing explicitly.
    #[error(
        "{operation} requires explicit criteria; use Criteria::everything() to match every document"
    )]
    UnscopedCriteria { operation: &'static str },

    /// A field path resolved to the empty string.
    #[error("not a field path: {context}")]
    InvalidFieldPath { context: String },

    /// A value could not be converted into a document value.
    #[error("invalid value for {argument}: {message}")]
    InvalidValue {
        argument: &'static str,
        message: String,
    },

    /// An update document without any operators.
    #[error("{operation} requires a non-empty update")]
    EmptyUpdate { operation: &'static str },

    /// The record's key type cannot generate identifiers.
    #[error("record type {record_type} requires an explicit identifier")]
    IdentifierRequired { record_type: String },

    /// An endpoint URL could not be parsed.
    #[error("invalid endpoint '{url}': {message}")]
    InvalidEndpoint { url: String, message: String },
}

/// Errors related to connection configuration.
#[derive(Error, Debug)]
pub enum ConfigurationError {
    /// No endpoint is registered under the requested name.
    #[error("no connection configured for '{name}'")]
    Missing { name: String },
}

/// Errors related to query results.
#[derive(Error, Debug)]
pub enum QueryError {
    /// A single-match query matched more than one document.
    #[error("{operation} on {collection} matched more than one document")]
    MultipleMatches {
        collection: String,
        operation: &'static str,
    },
}

/// Errors originating from the document store.
#[derive(Error, Debug)]
pub enum BackendError {
    /// Connection to the store failed.
    #[error("connection failed to {backend_name}: {message}")]
    ConnectionFailed {
        backend_name: String,
        message: String,
    },

    /// The requested capability is not supported by this store.
    #[error("capability '{capability}' not supported by {backend_name}")]
    UnsupportedCapability {
        backend_name: String,
        capability: String,
    },

    /// A unique index rejected a write.
    #[error("duplicate key in {collection} for index {index}: {key}")]
    DuplicateKey {
        collection: String,
        index: String,
        key: String,
    },

    /// Internal store error.
    #[error("internal error in {backend_name}: {message}")]
    Internal {
        backend_name: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The store rejected a filter, update or pipeline.
    #[error("query execution failed: {message}")]
    QueryError { message: String },

    /// Serialization/deserialization error.
    #[error("serialization error: {message}")]
    SerializationError { message: String },
}

/// Result type alias for gateway operations.
pub type StorageResult<T> = Result<T, StorageError>;

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Backend(BackendError::SerializationError {
            message: err.to_string(),
        })
    }
}

#[cfg(feature = "mongodb")]
impl From<mongodb::error::Error> for StorageError {
    fn from(err: mongodb::error::Error) -> Self {
        StorageError::Backend(BackendError::Internal {
            backend_name: "mongodb".to_string(),
            message: err.to_string(),
            source: Some(Box::new(err)),
        })
    }
}

#[cfg(feature = "mongodb")]
impl From<mongodb::bson::extjson::de::Error> for StorageError {
    fn from(err: mongodb::bson::extjson::de::Error) -> Self {
        StorageError::Backend(BackendError::SerializationError {
            message: err.to_string(),
        })
    }
}
