//! Filter evaluation for the in-memory store.
//!
//! Supports the query operators the managers emit plus the common logical
//! and array operators. Unknown operators are rejected rather than ignored.

use std::cmp::Ordering;

use regex::RegexBuilder;
use serde_json::{Map, Value};

use crate::error::{BackendError, StorageResult};
use crate::query::is_operator_object;
use crate::store::Document;

/// Returns `true` if `document` satisfies `filter`.
pub(crate) fn matches(document: &Document, filter: &Document) -> StorageResult<bool> {
    for (key, condition) in filter {
        let satisfied = match key.as_str() {
            "$and" => {
                let mut all = true;
                for branch in branches(key, condition)? {
                    if !matches(document, branch)? {
                        all = false;
                        break;
                    }
                }
                all
            }
            "$or" => {
                let mut any = false;
                for branch in branches(key, condition)? {
                    if matches(document, branch)? {
                        any = true;
                        break;
                    }
                }
                any
            }
            "$nor" => {
                let mut none = true;
                for branch in branches(key, condition)? {
                    if matches(document, branch)? {
                        none = false;
                        break;
                    }
                }
                none
            }
            "$comment" => true,
            op if op.starts_with('$') => return Err(unsupported(op)),
            path => {
                let candidates = resolve(document, path);
                field_matches(&candidates, condition)?
            }
        };
        if !satisfied {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Collects every value reachable at a dotted `path`, descending into arrays.
pub(crate) fn resolve<'a>(document: &'a Document, path: &str) -> Vec<&'a Value> {
    let segments: Vec<&str> = path.split('.').collect();
    let mut out = Vec::new();
    if let Some((head, rest)) = segments.split_first() {
        if let Some(value) = document.get(*head) {
            collect(value, rest, &mut out);
        }
    }
    out
}

fn collect<'a>(value: &'a Value, path: &[&str], out: &mut Vec<&'a Value>) {
    let Some((head, rest)) = path.split_first() else {
        out.push(value);
        return;
    };
    match value {
        Value::Object(map) => {
            if let Some(child) = map.get(*head) {
                collect(child, rest, out);
            }
        }
        Value::Array(items) => {
            if let Ok(index) = head.parse::<usize>() {
                if let Some(child) = items.get(index) {
                    collect(child, rest, out);
                }
            }
            for item in items.iter().filter(|item| item.is_object()) {
                collect(item, path, out);
            }
        }
        _ => {}
    }
}

fn branches<'a>(operator: &str, condition: &'a Value) -> StorageResult<Vec<&'a Document>> {
    let items = condition
        .as_array()
        .ok_or_else(|| malformed(format!("{} requires an array", operator)))?;
    items
        .iter()
        .map(|item| {
            item.as_object()
                .ok_or_else(|| malformed(format!("{} entries must be documents", operator)))
        })
        .collect()
}

fn field_matches(candidates: &[&Value], condition: &Value) -> StorageResult<bool> {
    match condition {
        Value::Object(ops) if is_operator_object(ops) => operators_match(candidates, ops),
        _ => Ok(equals_any(candidates, condition)),
    }
}

fn operators_match(candidates: &[&Value], ops: &Map<String, Value>) -> StorageResult<bool> {
    for (op, operand) in ops {
        let satisfied = match op.as_str() {
            "$eq" => equals_any(candidates, operand),
            "$ne" => !equals_any(candidates, operand),
            "$gt" => compares_any(candidates, operand, |o| o == Ordering::Greater),
            "$gte" => compares_any(candidates, operand, |o| o != Ordering::Less),
            "$lt" => compares_any(candidates, operand, |o| o == Ordering::Less),
            "$lte" => compares_any(candidates, operand, |o| o != Ordering::Greater),
            "$in" => in_list(candidates, op, operand)?,
            "$nin" => !in_list(candidates, op, operand)?,
            "$exists" => {
                let wanted = operand.as_bool().unwrap_or_else(|| is_truthy(operand));
                candidates.is_empty() != wanted
            }
            "$regex" => {
                let pattern = operand
                    .as_str()
                    .ok_or_else(|| malformed("$regex requires a string".to_string()))?;
                let options = ops.get("$options").and_then(Value::as_str).unwrap_or("");
                regex_any(candidates, pattern, options)?
            }
            "$options" => {
                if !ops.contains_key("$regex") {
                    return Err(malformed("$options without $regex".to_string()));
                }
                true
            }
            "$size" => {
                let expected = operand
                    .as_u64()
                    .ok_or_else(|| malformed("$size requires a non-negative integer".to_string()))?;
                candidates.iter().any(|value| {
                    value
                        .as_array()
                        .is_some_and(|items| items.len() as u64 == expected)
                })
            }
            "$all" => {
                let required = operand
                    .as_array()
                    .ok_or_else(|| malformed("$all requires an array".to_string()))?;
                !required.is_empty() && required.iter().all(|v| equals_any(candidates, v))
            }
            "$elemMatch" => {
                let element = operand
                    .as_object()
                    .ok_or_else(|| malformed("$elemMatch requires a document".to_string()))?;
                elem_match_any(candidates, element)?
            }
            "$not" => match operand {
                Value::Object(inner) if is_operator_object(inner) => {
                    !operators_match(candidates, inner)?
                }
                _ => return Err(malformed("$not requires an operator document".to_string())),
            },
            other => return Err(unsupported(other)),
        };
        if !satisfied {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Equality against a field: a missing field equals `null`, and an array
/// field equals a scalar it contains.
fn equals_any(candidates: &[&Value], expected: &Value) -> bool {
    if candidates.is_empty() {
        return expected.is_null();
    }
    candidates.iter().any(|value| {
        values_equal(value, expected)
            || value
                .as_array()
                .is_some_and(|items| items.iter().any(|item| values_equal(item, expected)))
    })
}

fn compares_any(candidates: &[&Value], operand: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
    let check = |value: &Value| {
        type_rank(value) == type_rank(operand) && accept(compare_values(value, operand))
    };
    candidates.iter().any(|value| {
        check(*value)
            || value
                .as_array()
                .is_some_and(|items| items.iter().any(|item| check(item)))
    })
}

fn in_list(candidates: &[&Value], op: &str, operand: &Value) -> StorageResult<bool> {
    let options = operand
        .as_array()
        .ok_or_else(|| malformed(format!("{} requires an array", op)))?;
    Ok(options.iter().any(|option| equals_any(candidates, option)))
}

fn regex_any(candidates: &[&Value], pattern: &str, options: &str) -> StorageResult<bool> {
    let mut builder = RegexBuilder::new(pattern);
    for flag in options.chars() {
        match flag {
            'i' => builder.case_insensitive(true),
            'm' => builder.multi_line(true),
            's' => builder.dot_matches_new_line(true),
            'x' => builder.ignore_whitespace(true),
            other => return Err(malformed(format!("unknown $regex option '{}'", other))),
        };
    }
    let regex = builder
        .build()
        .map_err(|e| malformed(format!("invalid $regex: {}", e)))?;
    let hit = |value: &Value| value.as_str().is_some_and(|text| regex.is_match(text));
    Ok(candidates.iter().any(|value| {
        hit(*value)
            || value
                .as_array()
                .is_some_and(|items| items.iter().any(|item| hit(item)))
    }))
}

fn elem_match_any(candidates: &[&Value], element: &Map<String, Value>) -> StorageResult<bool> {
    for value in candidates {
        let Some(items) = value.as_array() else {
            continue;
        };
        for item in items {
            let hit = if is_operator_object(element) && !is_logical(element) {
                operators_match(&[item], element)?
            } else {
                match item {
                    Value::Object(doc) => matches(doc, element)?,
                    _ => false,
                }
            };
            if hit {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

fn is_logical(ops: &Map<String, Value>) -> bool {
    ops.keys()
        .any(|k| matches!(k.as_str(), "$and" | "$or" | "$nor"))
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        _ => true,
    }
}

/// Structural equality with numeric values compared by magnitude.
pub(crate) fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x == y,
            _ => x.as_f64() == y.as_f64(),
        },
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(a, b)| values_equal(a, b))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter()
                    .all(|(k, v)| y.get(k).is_some_and(|other| values_equal(v, other)))
        }
        _ => a == b,
    }
}

/// Canonical cross-type order: null, numbers, strings, documents, arrays, booleans.
fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Number(_) => 1,
        Value::String(_) => 2,
        Value::Object(_) => 3,
        Value::Array(_) => 4,
        Value::Bool(_) => 5,
    }
}

/// Total order over JSON values used for range operators and sorting.
pub(crate) fn compare_values(a: &Value, b: &Value) -> Ordering {
    let rank = type_rank(a).cmp(&type_rank(b));
    if rank != Ordering::Equal {
        return rank;
    }
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => {
                let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
                x.partial_cmp(&y).unwrap_or(Ordering::Equal)
            }
        },
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => {
            for (a, b) in x.iter().zip(y) {
                let ord = compare_values(a, b);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        (Value::Object(x), Value::Object(y)) => {
            for ((ka, va), (kb, vb)) in x.iter().zip(y) {
                let ord = ka.cmp(kb).then_with(|| compare_values(va, vb));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        _ => Ordering::Equal,
    }
}

fn unsupported(operator: &str) -> crate::error::StorageError {
    BackendError::QueryError {
        message: format!("unsupported query operator '{}'", operator),
    }
    .into()
}

fn malformed(message: String) -> crate::error::StorageError {
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

    fn check(document: Value, filter: Value) -> bool {
        matches(&doc(document), &doc(filter)).unwrap()
    }

    #[test]
    fn test_equality_and_missing_fields() {
        let person = json!({"Name": "Ada", "Age": 36});
        assert!(check(person.clone(), json!({"Name": "Ada"})));
        assert!(!check(person.clone(), json!({"Name": "Grace"})));
        assert!(check(person.clone(), json!({"Nickname": null})));
        assert!(check(person.clone(), json!({"Age": 36.0})));
        assert!(check(person, json!({})));
    }

    #[test]
    fn test_range_operators_stay_within_type() {
        let person = json!({"Age": 36, "Name": "Ada"});
        assert!(check(person.clone(), json!({"Age": {"$gt": 30, "$lte": 36}})));
        assert!(!check(person.clone(), json!({"Age": {"$gt": "30"}})));
        assert!(check(person, json!({"Name": {"$gte": "A", "$lt": "B"}})));
    }

    #[test]
    fn test_array_fields() {
        let record = json!({"Tags": ["red", "blue"], "Children": [{"Name": "a", "Age": 3}, {"Name": "b", "Age": 9}]});
        assert!(check(record.clone(), json!({"Tags": "red"})));
        assert!(check(record.clone(), json!({"Tags": {"$all": ["blue", "red"]}})));
        assert!(check(record.clone(), json!({"Tags": {"$size": 2}})));
        assert!(check(record.clone(), json!({"Children.Name": "b"})));
        assert!(check(record.clone(), json!({"Children.1.Age": 9})));
        assert!(check(
            record.clone(),
            json!({"Children": {"$elemMatch": {"Name": "b", "Age": {"$gt": 5}}}})
        ));
        assert!(!check(
            record,
            json!({"Children": {"$elemMatch": {"Name": "a", "Age": {"$gt": 5}}}})
        ));
    }

    #[test]
    fn test_membership_and_existence() {
        let record = json!({"State": "new"});
        assert!(check(record.clone(), json!({"State": {"$in": ["new", "retry"]}})));
        assert!(check(record.clone(), json!({"State": {"$nin": ["done"]}})));
        assert!(check(record.clone(), json!({"State": {"$exists": true}})));
        assert!(check(record, json!({"Owner": {"$exists": false}})));
    }

    #[test]
    fn test_logical_operators() {
        let record = json!({"A": 1, "B": 2});
        assert!(check(record.clone(), json!({"$or": [{"A": 5}, {"B": 2}]})));
        assert!(!check(record.clone(), json!({"$and": [{"A": 1}, {"B": 3}]})));
        assert!(check(record.clone(), json!({"$nor": [{"A": 5}]})));
        assert!(check(record, json!({"A": {"$not": {"$gt": 3}}})));
    }

    #[test]
    fn test_regex_with_options() {
        let record = json!({"Name": "Smith"});
        assert!(check(record.clone(), json!({"Name": {"$regex": "^sm", "$options": "i"}})));
        assert!(!check(record, json!({"Name": {"$regex": "^sm"}})));
    }

    #[test]
    fn test_unknown_operator_is_an_error() {
        let err = matches(&doc(json!({"A": 1})), &doc(json!({"A": {"$near": 1}}))).unwrap_err();
        assert!(err.to_string().contains("$near"));
    }

    #[test]
    fn test_cross_type_order() {
        assert_eq!(compare_values(&json!(null), &json!(0)), Ordering::Less);
        assert_eq!(compare_values(&json!(10), &json!("1")), Ordering::Less);
        assert_eq!(compare_values(&json!(2), &json!(10)), Ordering::Less);
        assert_eq!(compare_values(&json!(2.5), &json!(2)), Ordering::Greater);
    }
}
