//! Stable identities for JSON queries.
//!
//! Two queries that differ only in object key order, or only in their
//! pagination operators, map to the same [`QueryFingerprint`].

use std::fmt;
use std::fmt::Write as _;

use serde_json::Map;
use serde_json::Value;

/// Query operator holding the page size.
pub const LIMIT_KEY: &str = "$limit";
/// Query operator holding the page offset.
pub const SKIP_KEY: &str = "$skip";

/// Canonical identity of a query's filtering criteria.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QueryFingerprint(String);

impl QueryFingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueryFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fingerprint of `query` with `$limit` and `$skip` removed.
pub fn fingerprint(query: &Map<String, Value>) -> QueryFingerprint {
    let mut out = String::new();
    out.push('{');
    let mut first = true;
    for (key, value) in sorted_entries(query) {
        if key == LIMIT_KEY || key == SKIP_KEY {
            continue;
        }
        if !first {
            out.push(',');
        }
        first = false;
        write_entry(&mut out, key, value);
    }
    out.push('}');
    QueryFingerprint(out)
}

/// Deterministic serialization of `value`: object keys are emitted in
/// lexicographic order at every depth, array order is preserved.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_value(&mut out, value);
    out
}

fn sorted_entries(map: &Map<String, Value>) -> Vec<(&String, &Value)> {
    let mut entries: Vec<_> = map.iter().collect();
    entries.sort_by_key(|(key, _)| *key);
    entries
}

fn write_entry(out: &mut String, key: &str, value: &Value) {
    write_string(out, key);
    out.push(':');
    write_value(out, value);
}

fn write_value(out: &mut String, value: &Value) {
    match value {
        Value::Object(map) => {
            out.push('{');
            for (i, (key, value)) in sorted_entries(map).into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_entry(out, key, value);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(out, item);
            }
            out.push(']');
        }
        Value::String(s) => write_string(out, s),
        Value::Null => out.push_str("null"),
        Value::Bool(b) => {
            let _ = write!(out, "{b}");
        }
        Value::Number(n) => {
            let _ = write!(out, "{n}");
        }
    }
}

fn write_string(out: &mut String, s: &str) {
    // Value's Display produces a correctly escaped JSON string literal.
    let _ = write!(out, "{}", Value::String(s.to_string()));
}
