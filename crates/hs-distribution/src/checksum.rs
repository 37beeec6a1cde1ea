//! Content checksums over canonical JSON
//!
//! The canonical form is fixed: object keys sorted recursively, compact
//! `,`/`:` separators, UTF-8 bytes. Identical logical content yields an
//! identical checksum regardless of field order, so re-downloading
//! unchanged content is a cache no-op. Changing this form invalidates
//! every existing cache entry, so it must stay stable across versions.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// SHA-256 hex digest of the canonical serialization
pub fn content_checksum(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    hex::encode(Sha256::digest(out.as_bytes()))
}

/// Canonical JSON text of a value
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                // serde_json string escaping is deterministic
                out.push_str(&serde_json::to_string(key).unwrap_or_default());
                out.push(':');
                write_canonical(&map[*key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        // Scalars use serde_json's shortest-roundtrip formatting
        other => out.push_str(&other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_order_does_not_affect_checksum() {
        let a: Value = serde_json::from_str(r#"{"b": 1, "a": {"y": 2, "x": 3}}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"a": {"x": 3, "y": 2}, "b": 1}"#).unwrap();
        assert_eq!(content_checksum(&a), content_checksum(&b));
    }

    #[test]
    fn test_different_content_different_checksum() {
        assert_ne!(
            content_checksum(&json!({"a": 1})),
            content_checksum(&json!({"a": 2}))
        );
    }

    #[test]
    fn test_canonical_form_is_sorted_and_compact() {
        let value: Value = serde_json::from_str(r#"{"b": [1, 2], "a": "x"}"#).unwrap();
        assert_eq!(canonical_json(&value), r#"{"a":"x","b":[1,2]}"#);
    }

    #[test]
    fn test_array_order_is_preserved() {
        assert_ne!(
            content_checksum(&json!([1, 2])),
            content_checksum(&json!([2, 1]))
        );
    }
}
