//! Filter / sort / update evaluation for the in-memory store.
//!
//! Supported subset:
//! - equality on (dotted) paths, including sub-document equality
//! - `$eq`, `$ne`, `$gt`, `$gte`, `$lt`, `$lte`, `$in`, `$nin`, `$exists`
//! - sort documents with `1` / `-1`
//! - `$set` updates

use std::cmp::Ordering;

use crate::domain::{Document, Value};
use crate::ports::{StoreError, StoreResult};

/// Does `document` satisfy every condition in `filter`?
pub fn matches(document: &Document, filter: &Document) -> StoreResult<bool> {
    for (path, condition) in filter.iter() {
        if path.starts_with('$') {
            return Err(StoreError::Other(format!(
                "unsupported top-level operator {path}"
            )));
        }
        if !matches_condition(document.get_path(path), condition)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn matches_condition(value: Option<&Value>, condition: &Value) -> StoreResult<bool> {
    match operator_document(condition) {
        Some(operators) => {
            for (op, operand) in operators.iter() {
                if !apply_operator(value, op, operand)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        None => Ok(equals_or_contains(value, condition)),
    }
}

/// `{"$gt": 1, "$lt": 5}` is an operator document; `{"a": 1}` is a literal.
fn operator_document(condition: &Value) -> Option<&Document> {
    let doc = condition.as_document()?;
    if !doc.is_empty() && doc.keys().all(|k| k.starts_with('$')) {
        Some(doc)
    } else {
        None
    }
}

fn apply_operator(value: Option<&Value>, op: &str, operand: &Value) -> StoreResult<bool> {
    let result = match op {
        "$eq" => equals_or_contains(value, operand),
        "$ne" => !equals_or_contains(value, operand),
        "$gt" => compare_with(value, operand, |o| o == Ordering::Greater),
        "$gte" => compare_with(value, operand, |o| o != Ordering::Less),
        "$lt" => compare_with(value, operand, |o| o == Ordering::Less),
        "$lte" => compare_with(value, operand, |o| o != Ordering::Greater),
        "$in" => in_list(value, operand, op)?,
        "$nin" => !in_list(value, operand, op)?,
        "$exists" => match operand.as_bool() {
            Some(expected) => value.is_some() == expected,
            None => return Err(StoreError::Other("$exists needs a bool".to_string())),
        },
        other => return Err(StoreError::Other(format!("unsupported operator {other}"))),
    };
    Ok(result)
}

fn in_list(value: Option<&Value>, operand: &Value, op: &str) -> StoreResult<bool> {
    match operand {
        Value::Array(candidates) => Ok(candidates.iter().any(|c| equals_or_contains(value, c))),
        _ => Err(StoreError::Other(format!("{op} needs an array"))),
    }
}

/// Equality with array fan-out: an array field matches if any element does.
fn equals_or_contains(value: Option<&Value>, expected: &Value) -> bool {
    match value {
        None => matches!(expected, Value::Null),
        Some(actual) => {
            values_equal(actual, expected)
                || matches!(actual, Value::Array(items) if items.iter().any(|i| values_equal(i, expected)))
        }
    }
}

fn compare_with(value: Option<&Value>, operand: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .any(|item| compare_values(item, operand).is_some_and(&accept)),
        Some(actual) => compare_values(actual, operand).is_some_and(accept),
        None => false,
    }
}

/// Numbers compare across int/double; everything else only within its own type.
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Int(_) | Value::Double(_), Value::Int(_) | Value::Double(_)) => {
            compare_values(a, b) == Some(Ordering::Equal)
        }
        _ => a == b,
    }
}

fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Some(x.cmp(y)),
        (Value::Int(_) | Value::Double(_), Value::Int(_) | Value::Double(_)) => {
            a.as_f64()?.partial_cmp(&b.as_f64()?)
        }
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::DateTime(x), Value::DateTime(y)) => Some(x.cmp(y)),
        (Value::Id(x), Value::Id(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Cross-type order used for sorting: missing/null < numbers < strings <
/// documents < arrays < ids < bools < datetimes.
fn type_rank(value: Option<&Value>) -> u8 {
    match value {
        None | Some(Value::Null) => 0,
        Some(Value::Int(_) | Value::Double(_)) => 1,
        Some(Value::String(_)) => 2,
        Some(Value::Document(_)) => 3,
        Some(Value::Array(_)) => 4,
        Some(Value::Id(_)) => 5,
        Some(Value::Bool(_)) => 6,
        Some(Value::DateTime(_)) => 7,
    }
}

fn sort_cmp(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let by_rank = type_rank(a).cmp(&type_rank(b));
    if by_rank != Ordering::Equal {
        return by_rank;
    }
    match (a, b) {
        (Some(x), Some(y)) => compare_values(x, y).unwrap_or(Ordering::Equal),
        _ => Ordering::Equal,
    }
}

/// Compare two documents by a sort specification (`{"priority": 1, "created": 1}`).
pub fn compare_by_sort(a: &Document, b: &Document, sort: &Document) -> StoreResult<Ordering> {
    for (path, direction) in sort.iter() {
        let ordering = sort_cmp(a.get_path(path), b.get_path(path));
        let ordering = match direction {
            Value::Int(1) => ordering,
            Value::Int(-1) => ordering.reverse(),
            other => {
                return Err(StoreError::Other(format!(
                    "invalid sort direction for {path}: {other}"
                )));
            }
        };
        if ordering != Ordering::Equal {
            return Ok(ordering);
        }
    }
    Ok(Ordering::Equal)
}

/// Apply a `{"$set": {...}}` update in place.
pub fn apply_update(document: &mut Document, update: &Document) -> StoreResult<()> {
    for (op, operand) in update.iter() {
        match (op, operand) {
            ("$set", Value::Document(fields)) => {
                for (path, value) in fields.iter() {
                    if path == "_id" {
                        return Err(StoreError::Other("_id is immutable".to_string()));
                    }
                    document.set_path(path, value.clone());
                }
            }
            _ => return Err(StoreError::Other(format!("unsupported update operator {op}"))),
        }
    }
    Ok(())
}
