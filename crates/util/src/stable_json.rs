//! Deterministic JSON serialization with sorted object keys.
//!
//! Unlike standard JSON serialization, object keys are emitted in
//! lexicographic order, so two structurally equal values always produce the
//! same string regardless of the order keys were inserted into their maps.
//! Index keys, record-map keys and serialized table lines all rely on this.

use serde_json::Value;

/// Serialize `value` to a deterministic JSON string with sorted object keys.
///
/// Scalars and strings use `serde_json`'s own formatting (and escaping), so
/// the output of a key-sorted input is byte-identical to
/// `serde_json::to_string`.
pub fn stringify(value: &Value) -> String {
    let mut out = String::new();
    write_value(&mut out, value);
    out
}

fn write_value(out: &mut String, value: &Value) {
    match value {
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => {
            // Infallible for these variants.
            if let Ok(s) = serde_json::to_string(value) {
                out.push_str(&s);
            }
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
        Value::Object(map) => {
            let mut keys: Vec<&str> = map.keys().map(String::as_str).collect();
            keys.sort_unstable();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                if let Ok(k) = serde_json::to_string(key) {
                    out.push_str(&k);
                }
                out.push(':');
                write_value(out, &map[*key]);
            }
            out.push('}');
        }
    }
}
