//! Deterministic serialization primitives shared by the audit hash-chain and
//! the messaging envelope hash. Canonicalization must be a total function:
//! `canonical(x) == canonical(x)` byte-for-byte across processes and
//! platforms.

use serde_json::{Map, Value};

/// Recursively sort the keys of every JSON object reachable from `value`,
/// leaving arrays and scalars untouched. Used for the `details`/`metadata`
/// bags embedded in audit records and envelopes, whose key order is
/// otherwise serialization-order-dependent.
pub fn sort_value_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut sorted = Map::new();
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            for k in keys {
                sorted.insert(k.clone(), sort_value_keys(&map[k]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_value_keys).collect()),
        other => other.clone(),
    }
}

/// Serialize `value` to its canonical compact-JSON byte representation:
/// object keys sorted recursively, no insignificant whitespace.
pub fn canonical_json_bytes(value: &Value) -> Vec<u8> {
    serde_json::to_vec(&sort_value_keys(value)).expect("canonical JSON values always serialize")
}

/// Format a timestamp as RFC3339 with nanosecond precision and a literal
/// `Z` suffix, as required by the canonical record format.
pub fn rfc3339_nanos(ts: &chrono::DateTime<chrono::Utc>) -> String {
    ts.to_rfc3339_opts(chrono::SecondsFormat::Nanos, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sorts_nested_object_keys() {
        let v = json!({"b": 1, "a": {"z": 1, "y": 2}});
        let sorted = sort_value_keys(&v);
        let bytes = serde_json::to_vec(&sorted).unwrap();
        let s = String::from_utf8(bytes).unwrap();
        assert_eq!(s, r#"{"a":{"y":2,"z":1},"b":1}"#);
    }

    #[test]
    fn canonicalization_is_total_and_repeatable() {
        let v = json!({"x": [3, {"d": 1, "c": 2}], "a": null});
        let b1 = canonical_json_bytes(&v);
        let b2 = canonical_json_bytes(&v);
        assert_eq!(b1, b2);
    }

    #[test]
    fn rfc3339_nanos_has_z_suffix_and_nanosecond_precision() {
        let ts = chrono::DateTime::parse_from_rfc3339("2025-01-01T12:00:00.123456789Z")
            .unwrap()
            .with_timezone(&chrono::Utc);
        let s = rfc3339_nanos(&ts);
        assert!(s.ends_with('Z'));
        assert_eq!(s, "2025-01-01T12:00:00.123456789Z");
    }
}
