//! "First non-empty field wins" lookups over JSON payloads.
//!
//! Providers move fields around between API versions (`data.task_id` vs
//! `task_id` vs `id`). Adapters list every known location in priority order
//! and take the first one that holds a usable value.
//!
//! Paths are dot-separated; numeric segments index into arrays, so
//! `"data.task_result.videos.0.url"` is valid.

use serde_json::Value;

/// Follow a dot-separated path.
pub fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// `null`, empty strings, empty arrays and empty objects count as empty.
fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// The first non-empty value among `paths`.
pub fn first_value<'a>(value: &'a Value, paths: &[&str]) -> Option<&'a Value> {
    paths
        .iter()
        .filter_map(|path| lookup(value, path))
        .find(|v| !is_empty(v))
}

/// The first non-empty string (or number, rendered as a string).
pub fn first_string(value: &Value, paths: &[&str]) -> Option<String> {
    paths
        .iter()
        .filter_map(|path| lookup(value, path))
        .find_map(|v| match v {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
}

/// The first non-empty array among `paths`.
pub fn first_array<'a>(value: &'a Value, paths: &[&str]) -> &'a [Value] {
    paths
        .iter()
        .filter_map(|path| lookup(value, path))
        .find_map(|v| v.as_array().filter(|items| !items.is_empty()))
        .map(Vec::as_slice)
        .unwrap_or_default()
}
