//! Update operator application for the in-memory store.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use super::matcher::{compare_values, matches, values_equal};
use crate::error::{BackendError, StorageError, StorageResult};
use crate::query::is_operator_object;
use crate::record::ID_FIELD;
use crate::store::Document;

/// Applies an update document to `document`.
///
/// `inserting` enables `$setOnInsert`. Returns `true` if the document changed.
/// On error the document is left untouched.
pub(crate) fn apply_update(
    document: &mut Document,
    update: &Document,
    inserting: bool,
    now: DateTime<Utc>,
) -> StorageResult<bool> {
    if update.is_empty() || !update.keys().all(|k| k.starts_with('$')) {
        return Err(failure("update document must contain only operators".to_string()));
    }

    let original_id = document.get(ID_FIELD).cloned();
    let mut root = Value::Object(document.clone());

    for (op, fields) in update {
        let fields = fields
            .as_object()
            .ok_or_else(|| failure(format!("{} requires a document", op)))?;
        for (path, operand) in fields {
            match op.as_str() {
                "$set" => set_path(&mut root, path, operand.clone())?,
                "$setOnInsert" => {
                    if inserting {
                        set_path(&mut root, path, operand.clone())?;
                    }
                }
                "$unset" => remove_path(&mut root, path),
                "$inc" => {
                    let current = get_path(&root, path).cloned();
                    let sum = add_numbers(current.as_ref(), operand, path)?;
                    set_path(&mut root, path, sum)?;
                }
                "$min" | "$max" => {
                    let replace = match get_path(&root, path) {
                        None => true,
                        Some(current) => {
                            let ord = compare_values(operand, current);
                            if op == "$min" { ord.is_lt() } else { ord.is_gt() }
                        }
                    };
                    if replace {
                        set_path(&mut root, path, operand.clone())?;
                    }
                }
                "$push" | "$addToSet" => {
                    let mut items = array_at(&root, path, op)?;
                    let additions = match operand {
                        Value::Object(each) if each.contains_key("$each") => each
                            .get("$each")
                            .and_then(Value::as_array)
                            .cloned()
                            .ok_or_else(|| failure("$each requires an array".to_string()))?,
                        other => vec![other.clone()],
                    };
                    for addition in additions {
                        let present = items.iter().any(|item| values_equal(item, &addition));
                        if op == "$push" || !present {
                            items.push(addition);
                        }
                    }
                    set_path(&mut root, path, Value::Array(items))?;
                }
                "$pull" => {
                    if get_path(&root, path).is_some() {
                        let items = array_at(&root, path, op)?;
                        let mut kept = Vec::with_capacity(items.len());
                        for item in items {
                            if !pull_matches(&item, operand)? {
                                kept.push(item);
                            }
                        }
                        set_path(&mut root, path, Value::Array(kept))?;
                    }
                }
                "$currentDate" => {
                    set_path(&mut root, path, serde_json::to_value(now)?)?;
                }
                other => {
                    return Err(failure(format!("unsupported update operator '{}'", other)));
                }
            }
        }
    }

    let Value::Object(updated) = root else {
        return Err(failure("update replaced the document root".to_string()));
    };
    if !inserting && updated.get(ID_FIELD) != original_id.as_ref() {
        return Err(failure(format!(
            "update would modify the immutable field '{}'",
            ID_FIELD
        )));
    }
    let changed = &updated != document;
    *document = updated;
    Ok(changed)
}

/// Builds the document an upsert inserts: equality clauses of the filter.
pub(crate) fn seed_from_filter(filter: &Document) -> StorageResult<Document> {
    let mut root = Value::Object(Map::new());
    seed_into(&mut root, filter)?;
    match root {
        Value::Object(map) => Ok(map),
        _ => Ok(Document::new()),
    }
}

fn seed_into(root: &mut Value, filter: &Document) -> StorageResult<()> {
    for (key, condition) in filter {
        if key == "$and" {
            for branch in condition.as_array().into_iter().flatten() {
                if let Value::Object(branch) = branch {
                    seed_into(root, branch)?;
                }
            }
            continue;
        }
        if key.starts_with('$') {
            continue;
        }
        match condition {
            Value::Object(ops) if is_operator_object(ops) => {
                if let Some(value) = ops.get("$eq") {
                    set_path(root, key, value.clone())?;
                }
            }
            value => set_path(root, key, value.clone())?,
        }
    }
    Ok(())
}

/// Returns the value at a dotted path without descending through arrays by
/// anything but numeric index.
pub(crate) fn get_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(root, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

fn set_path(root: &mut Value, path: &str, value: Value) -> StorageResult<()> {
    let segments: Vec<&str> = path.split('.').collect();
    let Some((last, parents)) = segments.split_last() else {
        return Err(failure("empty update path".to_string()));
    };
    let mut current = root;
    for segment in parents {
        current = child_mut(current, segment, path)?;
    }
    *child_mut(current, last, path)? = value;
    Ok(())
}

fn child_mut<'a>(value: &'a mut Value, segment: &str, path: &str) -> StorageResult<&'a mut Value> {
    if value.is_null() {
        *value = Value::Object(Map::new());
    }
    match value {
        Value::Object(map) => Ok(map.entry(segment).or_insert(Value::Null)),
        Value::Array(items) => {
            let index = segment
                .parse::<usize>()
                .map_err(|_| {
                    failure(format!(
                        "cannot create field '{}' in array at '{}'",
                        segment, path
                    ))
                })?;
            if index >= items.len() {
                items.resize(index + 1, Value::Null);
            }
            Ok(&mut items[index])
        }
        _ => Err(failure(format!(
            "cannot create field '{}' in non-document at '{}'",
            segment, path
        ))),
    }
}

fn remove_path(root: &mut Value, path: &str) {
    let segments: Vec<&str> = path.split('.').collect();
    let Some((last, parents)) = segments.split_last() else {
        return;
    };
    let mut current = root;
    for segment in parents {
        let next = match current {
            Value::Object(map) => map.get_mut(*segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get_mut(i)),
            _ => None,
        };
        match next {
            Some(next) => current = next,
            None => return,
        }
    }
    match current {
        Value::Object(map) => {
            map.remove(*last);
        }
        Value::Array(items) => {
            if let Some(slot) = last.parse::<usize>().ok().and_then(|i| items.get_mut(i)) {
                *slot = Value::Null;
            }
        }
        _ => {}
    }
}

fn array_at(root: &Value, path: &str, op: &str) -> StorageResult<Vec<Value>> {
    match get_path(root, path) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => Ok(items.clone()),
        Some(_) => Err(failure(format!("{} requires an array at '{}'", op, path))),
    }
}

fn pull_matches(item: &Value, condition: &Value) -> StorageResult<bool> {
    match (condition, item) {
        (Value::Object(ops), _) if is_operator_object(ops) => {
            let mut wrapper = Document::new();
            wrapper.insert("v".to_string(), item.clone());
            let mut filter = Document::new();
            filter.insert("v".to_string(), condition.clone());
            matches(&wrapper, &filter)
        }
        (Value::Object(filter), Value::Object(doc)) => matches(doc, filter),
        _ => Ok(values_equal(item, condition)),
    }
}

fn add_numbers(current: Option<&Value>, amount: &Value, path: &str) -> StorageResult<Value> {
    let amount = match amount {
        Value::Number(n) => n,
        _ => return Err(failure(format!("$inc amount for '{}' must be numeric", path))),
    };
    let current = match current {
        None | Some(Value::Null) => return Ok(Value::Number(amount.clone())),
        Some(Value::Number(n)) => n,
        Some(_) => return Err(failure(format!("$inc target '{}' is not numeric", path))),
    };
    if let (Some(a), Some(b)) = (current.as_i64(), amount.as_i64()) {
        if let Some(sum) = a.checked_add(b) {
            return Ok(Value::from(sum));
        }
    }
    let sum = current.as_f64().unwrap_or(0.0) + amount.as_f64().unwrap_or(0.0);
    Ok(Value::from(sum))
}

fn failure(message: String) -> StorageError {
    BackendError::QueryError { message }.into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    fn apply(document: Value, update: Value) -> Value {
        let mut document = doc(document);
        apply_update(&mut document, &doc(update), false, Utc::now()).unwrap();
        Value::Object(document)
    }

    #[test]
    fn test_set_creates_nested_fields() {
        let result = apply(json!({"_id": 1}), json!({"$set": {"Address.City": "Oslo"}}));
        assert_eq!(result, json!({"_id": 1, "Address": {"City": "Oslo"}}));
    }

    #[test]
    fn test_inc_and_unset() {
        let result = apply(
            json!({"_id": 1, "Tries": 2, "Owner": "w"}),
            json!({"$inc": {"Tries": 1, "Fresh": 5}, "$unset": {"Owner": ""}}),
        );
        assert_eq!(result, json!({"_id": 1, "Tries": 3, "Fresh": 5}));
    }

    #[test]
    fn test_min_max() {
        let result = apply(
            json!({"_id": 1, "Low": 5, "High": 5}),
            json!({"$min": {"Low": 3}, "$max": {"High": 4}}),
        );
        assert_eq!(result, json!({"_id": 1, "Low": 3, "High": 5}));
    }

    #[test]
    fn test_array_operators() {
        let result = apply(
            json!({"_id": 1, "Tags": ["a"]}),
            json!({
                "$addToSet": {"Tags": {"$each": ["a", "b"]}},
                "$push": {"Log": "x"}
            }),
        );
        assert_eq!(result, json!({"_id": 1, "Tags": ["a", "b"], "Log": ["x"]}));

        let pulled = apply(
            json!({"_id": 1, "Scores": [1, 5, 9]}),
            json!({"$pull": {"Scores": {"$gte": 5}}}),
        );
        assert_eq!(pulled, json!({"_id": 1, "Scores": [1]}));
    }

    #[test]
    fn test_id_is_immutable() {
        let mut document = doc(json!({"_id": 1}));
        let err = apply_update(&mut document, &doc(json!({"$set": {"_id": 2}})), false, Utc::now())
            .unwrap_err();
        assert!(err.to_string().contains("_id"));
        assert_eq!(Value::Object(document), json!({"_id": 1}));
    }

    #[test]
    fn test_set_on_insert_only_when_inserting() {
        let update = doc(json!({"$setOnInsert": {"State": "new"}}));
        let mut existing = doc(json!({"_id": 1}));
        assert!(!apply_update(&mut existing, &update, false, Utc::now()).unwrap());

        let mut inserted = seed_from_filter(&doc(json!({"_id": 7, "Kind": {"$eq": "job"}}))).unwrap();
        apply_update(&mut inserted, &update, true, Utc::now()).unwrap();
        assert_eq!(Value::Object(inserted), json!({"_id": 7, "Kind": "job", "State": "new"}));
    }

    #[test]
    fn test_replacement_documents_are_rejected() {
        let mut document = doc(json!({"_id": 1}));
        assert!(apply_update(&mut document, &doc(json!({"A": 1})), false, Utc::now()).is_err());
    }
}
