//! In-memory evaluation of query objects against stored items.
//!
//! Supports plain equality, the comparison operators `$in`, `$nin`, `$ne`,
//! `$lt`, `$lte`, `$gt`, `$gte`, the combinators `$or` and `$and`, and the
//! `$sort`/`$skip`/`$limit` result operators. Other `$`-prefixed top-level
//! keys (`$select`, ...) do not filter.

use std::cmp::Ordering;

use pagesync_utils_fingerprint::LIMIT_KEY;
use pagesync_utils_fingerprint::SKIP_KEY;
use serde_json::Value;

use crate::params::Query;

const SORT_KEY: &str = "$sort";

pub(crate) fn matches(item: &Value, query: &Query) -> bool {
    query.iter().all(|(key, criterion)| match key.as_str() {
        "$or" => criterion
            .as_array()
            .is_some_and(|subs| subs.iter().any(|sub| matches_value(item, sub))),
        "$and" => criterion
            .as_array()
            .is_some_and(|subs| subs.iter().all(|sub| matches_value(item, sub))),
        k if k.starts_with('$') => true,
        field => matches_field(lookup(item, field), criterion),
    })
}

/// Filters, sorts, and windows `items` according to `query`.
pub(crate) fn select<'a>(items: impl Iterator<Item = &'a Value>, query: &Query) -> Vec<Value> {
    let mut out: Vec<&Value> = items.filter(|item| matches(item, query)).collect();
    if let Some(Value::Object(sort)) = query.get(SORT_KEY) {
        out.sort_by(|a, b| {
            for (field, direction) in sort {
                let descending = direction.as_i64().is_some_and(|d| d < 0);
                let ord = compare(lookup(a, field), lookup(b, field)).unwrap_or(Ordering::Equal);
                let ord = if descending { ord.reverse() } else { ord };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            Ordering::Equal
        });
    }
    let skip = query.get(SKIP_KEY).and_then(Value::as_u64).unwrap_or(0) as usize;
    let limit = query
        .get(LIMIT_KEY)
        .and_then(Value::as_u64)
        .map_or(usize::MAX, |l| l as usize);
    out.into_iter().skip(skip).take(limit).cloned().collect()
}

fn matches_value(item: &Value, query: &Value) -> bool {
    match query {
        Value::Object(map) => matches(item, map),
        _ => false,
    }
}

fn lookup<'a>(item: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(item, |value, segment| value.get(segment))
}

fn matches_field(actual: Option<&Value>, criterion: &Value) -> bool {
    let Value::Object(ops) = criterion else {
        return equals(actual, criterion);
    };
    if !ops.keys().all(|k| k.starts_with('$')) {
        return equals(actual, criterion);
    }
    ops.iter().all(|(op, operand)| match op.as_str() {
        "$in" => operand
            .as_array()
            .is_some_and(|values| values.iter().any(|v| equals(actual, v))),
        "$nin" => operand
            .as_array()
            .is_none_or(|values| !values.iter().any(|v| equals(actual, v))),
        "$ne" => !equals(actual, operand),
        "$lt" => compare(actual, Some(operand)) == Some(Ordering::Less),
        "$lte" => matches!(
            compare(actual, Some(operand)),
            Some(Ordering::Less | Ordering::Equal)
        ),
        "$gt" => compare(actual, Some(operand)) == Some(Ordering::Greater),
        "$gte" => matches!(
            compare(actual, Some(operand)),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        _ => false,
    })
}

fn equals(actual: Option<&Value>, expected: &Value) -> bool {
    match (actual, expected) {
        (None, Value::Null) => true,
        (None, _) => false,
        (Some(Value::Number(a)), Value::Number(b)) => a.as_f64() == b.as_f64(),
        (Some(Value::Array(values)), expected) if !expected.is_array() => {
            values.contains(expected)
        }
        (Some(a), b) => a == b,
    }
}

fn compare(a: Option<&Value>, b: Option<&Value>) -> Option<Ordering> {
    match (a?, b?) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}
