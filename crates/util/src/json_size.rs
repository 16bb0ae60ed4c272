//! Cheap upper-bound size estimation for JSON values.
//!
//! The estimate drives cache eviction budgets, not correctness, so it trades
//! accuracy for speed: strings count their UTF-8 bytes plus quoting overhead,
//! numbers a fixed width, containers their punctuation.

use serde_json::Value;

const NUMBER_BYTES: usize = 22;
const NULL_BYTES: usize = 4;
const BOOL_BYTES: usize = 5;

/// Approximate serialized size of `value` in bytes. Biased high for typical
/// content; escape-heavy strings may undershoot.
pub fn json_size_approx(value: &Value) -> usize {
    match value {
        Value::Null => NULL_BYTES,
        Value::Bool(_) => BOOL_BYTES,
        Value::Number(_) => NUMBER_BYTES,
        Value::String(s) => s.len() + 2,
        Value::Array(items) => {
            2 + items.len() + items.iter().map(json_size_approx).sum::<usize>()
        }
        Value::Object(map) => {
            2 + map.len() * 2
                + map
                    .iter()
                    .map(|(k, v)| k.len() + 3 + json_size_approx(v))
                    .sum::<usize>()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn estimate_is_an_upper_bound_for_common_shapes() {
        for v in [
            json!(null),
            json!(true),
            json!(123.456),
            json!("hello world"),
            json!([1, 2, 3, "four"]),
            json!({"a": 1, "b": [true, null], "c": {"d": "e"}}),
        ] {
            let exact = serde_json::to_string(&v).unwrap().len();
            assert!(
                json_size_approx(&v) >= exact,
                "estimate {} < exact {} for {v}",
                json_size_approx(&v),
                exact
            );
        }
    }
}
