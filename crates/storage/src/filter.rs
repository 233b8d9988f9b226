//! Filter matching, projection, and update application
//!
//! The small query language the layer itself relies on, evaluated at read
//! time against in-memory records:
//! - implicit equality (`{field: value}`)
//! - comparison operators `$eq`, `$ne`, `$gt`, `$gte`, `$lt`, `$lte`
//! - `$prefix` for lexical path-prefix listing
//!
//! Numbers compare numerically across integer/float representations;
//! everything else compares structurally.

use crate::driver::{Record, UpdateDoc};
use serde_json::{Number, Value};
use std::cmp::Ordering;

/// True iff `record` satisfies every condition in `filter`.
pub fn matches(record: &Record, filter: &Record) -> bool {
    filter
        .iter()
        .all(|(field, condition)| matches_condition(record.get(field), condition))
}

fn matches_condition(actual: Option<&Value>, condition: &Value) -> bool {
    if let Value::Object(operators) = condition {
        if operators.keys().any(|k| k.starts_with('$')) {
            return operators
                .iter()
                .all(|(op, operand)| apply_operator(actual, op, operand));
        }
    }
    match actual {
        Some(actual) => values_equal(actual, condition),
        None => false,
    }
}

fn apply_operator(actual: Option<&Value>, op: &str, operand: &Value) -> bool {
    match op {
        "$eq" => actual.is_some_and(|a| values_equal(a, operand)),
        "$ne" => !actual.is_some_and(|a| values_equal(a, operand)),
        "$gt" => compare(actual, operand) == Some(Ordering::Greater),
        "$gte" => matches!(
            compare(actual, operand),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        "$lt" => compare(actual, operand) == Some(Ordering::Less),
        "$lte" => matches!(
            compare(actual, operand),
            Some(Ordering::Less | Ordering::Equal)
        ),
        "$prefix" => match (actual, operand) {
            (Some(Value::String(a)), Value::String(p)) => a.starts_with(p.as_str()),
            _ => false,
        },
        _ => false,
    }
}

/// Structural equality with numeric coercion (`1` equals `1.0`).
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(a), Some(b)) => a == b,
        _ => a == b,
    }
}

/// Ordering between a record field and an operand; `None` when the field is
/// missing or the types are not comparable.
pub fn compare(actual: Option<&Value>, operand: &Value) -> Option<Ordering> {
    let actual = actual?;
    match (actual, operand) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => {
            let a = actual.as_f64()?;
            let b = operand.as_f64()?;
            a.partial_cmp(&b)
        }
    }
}

/// Ordering between two record field values for sorting; missing fields
/// sort first.
pub fn compare_fields(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => compare(Some(a), b).unwrap_or(Ordering::Equal),
    }
}

/// Field-inclusion projection.
pub fn project(record: &Record, fields: &[String]) -> Record {
    let mut projected = Record::new();
    for field in fields {
        if let Some(value) = record.get(field) {
            projected.insert(field.clone(), value.clone());
        }
    }
    projected
}

/// Apply an update document to a record.
///
/// `$setOnInsert` fields are applied only when `inserting`, and never
/// overwrite a seeded filter field of the same name.
pub fn apply_update(record: &mut Record, update: &UpdateDoc, inserting: bool) {
    if inserting {
        for (field, value) in &update.set_on_insert {
            if !record.contains_key(field) {
                record.insert(field.clone(), value.clone());
            }
        }
    }
    for (field, value) in &update.set {
        record.insert(field.clone(), value.clone());
    }
    for field in &update.unset {
        record.remove(field);
    }
    for (field, amount) in &update.inc {
        let incremented = increment(record.get(field), amount);
        record.insert(field.clone(), incremented);
    }
}

fn increment(current: Option<&Value>, amount: &Value) -> Value {
    match current {
        None => amount.clone(),
        Some(current) => match (current.as_i64(), amount.as_i64()) {
            (Some(a), Some(b)) => Value::Number(Number::from(a + b)),
            _ => {
                let sum = current.as_f64().unwrap_or(0.0) + amount.as_f64().unwrap_or(0.0);
                Number::from_f64(sum).map_or(Value::Null, Value::Number)
            }
        },
    }
}

/// Equality-only fields of a filter: the fields that seed a record inserted
/// by an upsert (operator conditions describe no concrete value).
pub fn equality_fields(filter: &Record) -> Record {
    let mut seed = Record::new();
    for (field, condition) in filter {
        let is_operator = matches!(
            condition,
            Value::Object(map) if map.keys().any(|k| k.starts_with('$'))
        );
        if !is_operator {
            seed.insert(field.clone(), condition.clone());
        }
    }
    seed
}
