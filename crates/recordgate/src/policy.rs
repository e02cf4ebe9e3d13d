//! Save policy: identity assignment, audit stamps and save hooks.

use std::marker::PhantomData;

use chrono::{DateTime, Utc};

use crate::error::{ArgumentError, StorageResult};
use crate::record::{Capabilities, Record, RecordKey, short_type_name};

/// Assigns identifiers and audit stamps before a record is written.
///
/// Built once per manager from [`Record::capabilities`].
pub struct IdentityAuditPolicy<T> {
    capabilities: Capabilities<T>,
    _record: PhantomData<fn() -> T>,
}

impl<T: Record> IdentityAuditPolicy<T> {
    /// Captures the capabilities of `T`.
    pub fn new() -> Self {
        Self::with_capabilities(T::capabilities())
    }

    /// Uses explicit capabilities.
    pub fn with_capabilities(capabilities: Capabilities<T>) -> Self {
        Self {
            capabilities,
            _record: PhantomData,
        }
    }

    /// Returns the captured capabilities.
    pub fn capabilities(&self) -> Capabilities<T> {
        self.capabilities
    }

    /// Prepares `record` for a write at `now`.
    ///
    /// An unset identifier is generated; key types that cannot generate one
    /// fail with [`ArgumentError::IdentifierRequired`]. Audited records get
    /// `CreatedDate` on first save and `ModifiedDate` on every save.
    pub fn prepare(&self, record: &mut T, now: DateTime<Utc>) -> StorageResult<()> {
        if !record.has_id() {
            match T::Id::generate() {
                Some(id) => record.set_id(id),
                None => {
                    return Err(ArgumentError::IdentifierRequired {
                        record_type: short_type_name::<T>(),
                    }
                    .into());
                }
            }
        }
        if let Some(stamps) = self.capabilities.stamps_mut(record) {
            stamps.touch(now);
        }
        Ok(())
    }
}

impl<T: Record> Default for IdentityAuditPolicy<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for IdentityAuditPolicy<T> {
    fn clone(&self) -> Self {
        Self {
            capabilities: self.capabilities,
            _record: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for IdentityAuditPolicy<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityAuditPolicy")
            .field("capabilities", &self.capabilities)
            .finish()
    }
}

/// Callbacks run around every `save`.
///
/// `before_save` runs after identity and audit preparation and may veto the
/// write by returning an error. `after_save` runs once the store accepted it.
pub trait SaveHooks<T>: Send + Sync {
    /// Runs before the write.
    fn before_save(&self, _record: &mut T) -> StorageResult<()> {
        Ok(())
    }

    /// Runs after a successful write.
    fn after_save(&self, _record: &T) {}
}

/// Hooks that do nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHooks;

impl<T> SaveHooks<T> for NoopHooks {}
