//! Sorting and the aggregation subset of the in-memory store.

use std::cmp::Ordering;

use serde_json::Value;

use super::matcher::{compare_values, matches, resolve};
use crate::error::{BackendError, StorageError, StorageResult};
use crate::store::Document;

/// Parsed sort document.
pub(crate) struct SortSpec {
    keys: Vec<(String, bool)>,
}

impl SortSpec {
    /// Parses `{field: 1 | -1, ...}`.
    pub(crate) fn parse(sort: &Document) -> StorageResult<Self> {
        let mut keys = Vec::with_capacity(sort.len());
        for (field, direction) in sort {
            let descending = match direction.as_i64() {
                Some(1) => false,
                Some(-1) => true,
                _ => {
                    return Err(failure(format!(
                        "sort direction for '{}' must be 1 or -1",
                        field
                    )));
                }
            };
            keys.push((field.clone(), descending));
        }
        Ok(Self { keys })
    }

    /// Orders two documents. Missing fields sort as `null`.
    pub(crate) fn compare(&self, a: &Document, b: &Document) -> Ordering {
        for (field, descending) in &self.keys {
            let ord = compare_values(
                &sort_key(a, field, *descending),
                &sort_key(b, field, *descending),
            );
            let ord = if *descending { ord.reverse() } else { ord };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }
}

/// Array fields sort by their smallest element ascending, largest descending.
fn sort_key(document: &Document, field: &str, descending: bool) -> Value {
    let mut values: Vec<&Value> = Vec::new();
    for value in resolve(document, field) {
        match value {
            Value::Array(items) if !items.is_empty() => values.extend(items.iter()),
            other => values.push(other),
        }
    }
    let pick = if descending {
        values.into_iter().max_by(|a, b| compare_values(a, b))
    } else {
        values.into_iter().min_by(|a, b| compare_values(a, b))
    };
    pick.cloned().unwrap_or(Value::Null)
}

/// Stable sort of `documents`.
pub(crate) fn sort_documents(documents: &mut [Document], sort: &Document) -> StorageResult<()> {
    let spec = SortSpec::parse(sort)?;
    documents.sort_by(|a, b| spec.compare(a, b));
    Ok(())
}

/// Applies skip and limit. A non-positive limit means unlimited.
pub(crate) fn window(
    documents: Vec<Document>,
    skip: Option<u64>,
    limit: Option<i64>,
) -> Vec<Document> {
    let skip = skip.unwrap_or(0) as usize;
    let iter = documents.into_iter().skip(skip);
    match limit {
        Some(limit) if limit > 0 => iter.take(limit as usize).collect(),
        _ => iter.collect(),
    }
}

/// Runs a pipeline over a snapshot of a collection.
pub(crate) fn run_pipeline(
    mut documents: Vec<Document>,
    pipeline: &[Document],
) -> StorageResult<Vec<Document>> {
    for stage in pipeline {
        let mut entries = stage.iter();
        let (name, argument) = match (entries.next(), entries.next()) {
            (Some(entry), None) => entry,
            _ => return Err(failure("pipeline stage must have exactly one operator".to_string())),
        };
        documents = match name.as_str() {
            "$match" => {
                let filter = as_document(name, argument)?;
                let mut kept = Vec::with_capacity(documents.len());
                for document in documents {
                    if matches(&document, filter)? {
                        kept.push(document);
                    }
                }
                kept
            }
            "$sort" => {
                sort_documents(&mut documents, as_document(name, argument)?)?;
                documents
            }
            "$skip" => {
                let skip = argument
                    .as_u64()
                    .ok_or_else(|| failure("$skip requires a non-negative integer".to_string()))?;
                window(documents, Some(skip), None)
            }
            "$limit" => {
                let limit = argument
                    .as_i64()
                    .filter(|l| *l > 0)
                    .ok_or_else(|| failure("$limit requires a positive integer".to_string()))?;
                window(documents, None, Some(limit))
            }
            "$count" => {
                let field = argument
                    .as_str()
                    .filter(|f| !f.is_empty() && !f.starts_with('$'))
                    .ok_or_else(|| failure("$count requires a field name".to_string()))?;
                if documents.is_empty() {
                    Vec::new()
                } else {
                    let mut counted = Document::new();
                    counted.insert(field.to_string(), Value::from(documents.len() as u64));
                    vec![counted]
                }
            }
            "$project" => project(documents, as_document(name, argument)?)?,
            other => {
                return Err(BackendError::UnsupportedCapability {
                    backend_name: "memory".to_string(),
                    capability: format!("aggregation stage {}", other),
                }
                .into());
            }
        };
    }
    Ok(documents)
}

fn project(documents: Vec<Document>, projection: &Document) -> StorageResult<Vec<Document>> {
    let mut include_id = true;
    let mut included = Vec::new();
    let mut excluded = Vec::new();
    for (field, flag) in projection {
        let keep = match flag {
            Value::Bool(b) => *b,
            Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
            _ => return Err(failure(format!("unsupported projection for '{}'", field))),
        };
        if field == "_id" {
            include_id = keep;
        } else if keep {
            included.push(field.as_str());
        } else {
            excluded.push(field.as_str());
        }
    }
    if !included.is_empty() && !excluded.is_empty() {
        return Err(failure("projection cannot mix inclusion and exclusion".to_string()));
    }

    Ok(documents
        .into_iter()
        .map(|mut document| {
            if !included.is_empty() {
                document.retain(|key, _| {
                    included.contains(&key.as_str()) || (include_id && key == "_id")
                });
            } else {
                document.retain(|key, _| !excluded.contains(&key.as_str()));
            }
            if !include_id {
                document.remove("_id");
            }
            document
        })
        .collect())
}

fn as_document<'a>(stage: &str, argument: &'a Value) -> StorageResult<&'a Document> {
    argument
        .as_object()
        .ok_or_else(|| failure(format!("{} requires a document", stage)))
}

fn failure(message: String) -> StorageError {
    BackendError::QueryError { message }.into()
}
