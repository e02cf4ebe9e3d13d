//! Archiving: moving records into a sibling collection.

use std::sync::Arc;

use super::{CollectionHandle, RecordManager};
use crate::error::{ArgumentError, StorageResult};
use crate::record::Record;

/// Prefix of archive collection names.
pub const ARCHIVE_PREFIX: &str = "Archived_";

/// A manager that can move records into `Archived_<collection>`.
///
/// Archiving writes the record unchanged to the archive collection, then
/// deletes it from the primary one. The two steps are separate store calls;
/// a failure between them leaves the record in both collections.
pub struct ArchivingRecordManager<T: Record> {
    records: RecordManager<T>,
    archived: RecordManager<T>,
}

impl<T: Record> Clone for ArchivingRecordManager<T> {
    fn clone(&self) -> Self {
        Self {
            records: self.records.clone(),
            archived: self.archived.clone(),
        }
    }
}

impl<T: Record> ArchivingRecordManager<T> {
    /// Wraps `records`; the archive shares its connection.
    pub fn new(records: RecordManager<T>) -> Self {
        let primary = records.handle();
        let handle = CollectionHandle::new(
            format!("{}{}", ARCHIVE_PREFIX, primary.name()),
            primary.connection(),
            primary.store().clone(),
        );
        let archived = RecordManager::new(Arc::new(handle));
        Self { records, archived }
    }

    /// Manager over the primary collection.
    pub fn records(&self) -> &RecordManager<T> {
        &self.records
    }

    /// Manager over the archive collection.
    pub fn archived(&self) -> &RecordManager<T> {
        &self.archived
    }

    /// Moves `record` into the archive. Returns whether it was removed from
    /// the primary collection.
    pub async fn archive(&self, record: &T) -> StorageResult<bool> {
        let Some(id) = record.id().filter(|_| record.has_id()) else {
            return Err(ArgumentError::Missing { argument: "id" }.into());
        };
        self.archived.write_unprepared(record).await?;
        let removed = self.records.delete_by_id(id).await?;
        tracing::debug!(
            "Archived record from {} into {}",
            self.records.collection_name(),
            self.archived.collection_name()
        );
        Ok(removed)
    }

    /// Archives each record in turn. Returns how many left the primary collection.
    ///
    /// Stops at the first failure; records archived before it stay archived.
    pub async fn archive_many(&self, records: &[T]) -> StorageResult<u64> {
        let mut removed = 0;
        for record in records {
            if self.archive(record).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

impl<T: Record> std::ops::Deref for ArchivingRecordManager<T> {
    type Target = RecordManager<T>;

    fn deref(&self) -> &RecordManager<T> {
        &self.records
    }
}
