//! Ordered field-alias resolution over loosely typed JSON.
//!
//! Gateway builds disagree on response and webhook shapes (`qrcode` vs
//! `instance.qrcode` vs `base64`). Lookups take an ordered list of dotted paths
//! and return the first one that holds a usable value. Numeric path segments
//! index arrays (`messages.0.id`).

use serde_json::Value;

/// Resolve a dotted path.
pub fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        Value::Object(map) => !map.is_empty(),
        Value::Array(items) => !items.is_empty(),
        _ => true,
    }
}

/// First path holding a non-null, non-empty value.
pub fn first_present<'a>(value: &'a Value, paths: &[&str]) -> Option<&'a Value> {
    paths
        .iter()
        .filter_map(|path| lookup(value, path))
        .find(|v| is_present(v))
}

/// First path holding a string or a number, rendered as a string.
pub fn first_str(value: &Value, paths: &[&str]) -> Option<String> {
    paths.iter().filter_map(|path| lookup(value, path)).find_map(|v| match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// First path holding something interpretable as a boolean.
///
/// Accepts JSON booleans, `"true"`/`"false"` strings and `0`/`1` numbers.
pub fn first_bool(value: &Value, paths: &[&str]) -> Option<bool> {
    paths.iter().filter_map(|path| lookup(value, path)).find_map(|v| match v {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Some(true),
            "false" | "0" | "no" => Some(false),
            _ => None,
        },
        Value::Number(n) => n.as_i64().map(|i| i != 0),
        _ => None,
    })
}

/// First path holding an integer (numbers or numeric strings).
pub fn first_i64(value: &Value, paths: &[&str]) -> Option<i64> {
    paths.iter().filter_map(|path| lookup(value, path)).find_map(|v| match v {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_lookup_nested_and_arrays() {
        let v = json!({"a": {"b": [{"c": 1}]}});
        assert_eq!(lookup(&v, "a.b.0.c"), Some(&json!(1)));
        assert_eq!(lookup(&v, "a.x"), None);
        assert_eq!(lookup(&v, "a.b.9"), None);
    }

    #[test]
    fn test_first_present_skips_empty_values() {
        let v = json!({"qrcode": "", "instance": {"qrcode": "abc"}, "base64": "zzz"});
        let found = first_present(&v, &["qrcode", "instance.qrcode", "base64"]);
        assert_eq!(found, Some(&json!("abc")));
    }

    #[test]
    fn test_first_str_renders_numbers() {
        let v = json!({"id": 42});
        assert_eq!(first_str(&v, &["missing", "id"]), Some("42".to_string()));
        assert_eq!(first_str(&v, &["missing"]), None);
    }

    #[test]
    fn test_first_bool_variants() {
        assert_eq!(first_bool(&json!({"x": "true"}), &["x"]), Some(true));
        assert_eq!(first_bool(&json!({"x": 0}), &["x"]), Some(false));
        assert_eq!(first_bool(&json!({"x": "maybe", "y": true}), &["x", "y"]), Some(true));
    }

    #[test]
    fn test_first_i64() {
        assert_eq!(first_i64(&json!({"t": "1700000000"}), &["t"]), Some(1_700_000_000));
        assert_eq!(first_i64(&json!({"t": 14}), &["t"]), Some(14));
    }
}
