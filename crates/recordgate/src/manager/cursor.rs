//! Typed cursors.

use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;

use super::CollectionHandle;
use crate::error::StorageResult;
use crate::record::Record;
use crate::store::{Document, DocumentCursor, ReturnDocument};

pub(crate) fn decode<R: DeserializeOwned>(document: Document) -> StorageResult<R> {
    Ok(serde_json::from_value(Value::Object(document))?)
}

/// A lazy, single-pass sequence of typed results.
///
/// Documents are fetched from the store as the cursor advances.
pub struct RecordCursor<R> {
    inner: Box<dyn DocumentCursor>,
    _marker: PhantomData<fn() -> R>,
}

impl<R: DeserializeOwned> RecordCursor<R> {
    pub(crate) fn new(inner: Box<dyn DocumentCursor>) -> Self {
        Self {
            inner,
            _marker: PhantomData,
        }
    }

    /// Returns the next result, or `None` when exhausted.
    pub async fn next(&mut self) -> StorageResult<Option<R>> {
        match self.inner.next_document().await? {
            Some(document) => Ok(Some(decode(document)?)),
            None => Ok(None),
        }
    }

    /// Drains the remaining results.
    pub async fn try_collect(mut self) -> StorageResult<Vec<R>> {
        let mut out = Vec::new();
        while let Some(item) = self.next().await? {
            out.push(item);
        }
        Ok(out)
    }
}

impl<R> std::fmt::Debug for RecordCursor<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordCursor").finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub(crate) enum ClaimKind {
    Modify {
        update: Document,
        return_document: ReturnDocument,
    },
    Remove,
}

/// Repeatedly claims one matching document until none is left.
///
/// Each step is one atomic find-and-modify (or find-and-remove), so several
/// workers draining the same criteria never receive the same document.
///
/// A modify cursor only terminates if the update makes claimed documents stop
/// matching the criteria. [`ClaimCursor::with_limit`] caps the number of
/// claims for updates that do not.
pub struct ClaimCursor<T> {
    handle: Arc<CollectionHandle>,
    filter: Document,
    sort: Option<Document>,
    kind: ClaimKind,
    limit: Option<usize>,
    claimed: usize,
    exhausted: bool,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Record> ClaimCursor<T> {
    pub(crate) fn new(
        handle: Arc<CollectionHandle>,
        filter: Document,
        sort: Option<Document>,
        kind: ClaimKind,
    ) -> Self {
        Self {
            handle,
            filter,
            sort,
            kind,
            limit: None,
            claimed: 0,
            exhausted: false,
            _marker: PhantomData,
        }
    }

    /// Stops after `limit` claims.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Number of documents claimed so far.
    pub fn claimed(&self) -> usize {
        self.claimed
    }

    /// Claims the next document.
    pub async fn next(&mut self) -> StorageResult<Option<T>> {
        if self.exhausted || self.limit.is_some_and(|limit| self.claimed >= limit) {
            return Ok(None);
        }
        let store = self.handle.store();
        let collection = self.handle.name();
        let found = match &self.kind {
            ClaimKind::Modify {
                update,
                return_document,
            } => {
                store
                    .find_one_and_update(
                        collection,
                        self.filter.clone(),
                        update.clone(),
                        self.sort.clone(),
                        *return_document,
                    )
                    .await?
            }
            ClaimKind::Remove => {
                store
                    .find_one_and_delete(collection, self.filter.clone(), self.sort.clone())
                    .await?
            }
        };
        match found {
            Some(document) => {
                self.claimed += 1;
                Ok(Some(decode(document)?))
            }
            None => {
                self.exhausted = true;
                tracing::debug!(
                    "Claim loop on {} finished after {} documents",
                    collection,
                    self.claimed
                );
                Ok(None)
            }
        }
    }

    /// Claims every remaining document.
    pub async fn try_collect(mut self) -> StorageResult<Vec<T>> {
        let mut out = Vec::new();
        while let Some(item) = self.next().await? {
            out.push(item);
        }
        Ok(out)
    }
}

impl<T> std::fmt::Debug for ClaimCursor<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClaimCursor")
            .field("collection", &self.handle.name())
            .field("kind", &self.kind)
            .field("limit", &self.limit)
            .field("claimed", &self.claimed)
            .finish()
    }
}
