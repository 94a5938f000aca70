use serde_json::Value;

/// Loose emptiness shared by the enrichment checks and the first-value selector:
/// null, false, zero, `""`, `"0"`, and empty collections are all empty.
pub fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(flag) => !flag,
        Value::Number(number) => number.as_f64().map(|n| n == 0.0).unwrap_or(false),
        Value::String(text) => text.is_empty() || text == "0",
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
    }
}

/// Walks `path` through nested objects, treating any missing step as absent.
pub fn lookup<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(value, |current, key| current.get(*key))
}

/// Like [`lookup`], but only yields non-empty string leaves.
pub fn non_empty_str<'a>(value: &'a Value, path: &[&str]) -> Option<&'a str> {
    lookup(value, path)
        .filter(|leaf| !is_empty(leaf))
        .and_then(|leaf| leaf.as_str())
}
