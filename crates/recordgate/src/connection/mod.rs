//! Connection configuration.
//!
//! A [`ConnectionRegistry`] maps logical names to [`Endpoint`]s and the stores
//! connected from them. Record types pick a connection through
//! [`Record::CONNECTION`](crate::record::Record::CONNECTION); everything else
//! uses [`DEFAULT_CONNECTION`].

mod connector;
mod endpoint;
mod registry;

pub use connector::{DefaultConnector, StoreConnector};
pub use endpoint::{DEFAULT_DATABASE, Endpoint, EndpointScheme};
pub use registry::{
    ConnectionRegistry, DEFAULT_CONNECTION, DEFAULT_SETTINGS_PREFIX, normalize_name,
};
