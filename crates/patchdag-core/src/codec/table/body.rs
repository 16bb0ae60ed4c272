//! Table patch body wire format.
//!
//! A body is a flat array alternating `(op, payload)`: `-1` followed by an
//! array of where-objects to delete, or `1` followed by an array of records
//! to upsert. A single body may carry any number of such pairs.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One JSON record: field name to value.
pub type Record = serde_json::Map<String, Value>;

#[derive(Debug, Clone, PartialEq)]
pub enum TableOp {
    /// Delete every record matching each where-object (primary keys only).
    Delete(Vec<Record>),
    /// Upsert each record payload.
    Upsert(Vec<Record>),
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct TableBody(pub Vec<TableOp>);

impl TableBody {
    pub fn upsert(records: Vec<Record>) -> Self {
        Self(vec![TableOp::Upsert(records)])
    }

    pub fn delete(wheres: Vec<Record>) -> Self {
        Self(vec![TableOp::Delete(wheres)])
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<TableBody> for Value {
    fn from(body: TableBody) -> Value {
        let mut out = Vec::with_capacity(body.0.len() * 2);
        for op in body.0 {
            let (code, records) = match op {
                TableOp::Delete(records) => (-1, records),
                TableOp::Upsert(records) => (1, records),
            };
            out.push(Value::from(code));
            out.push(Value::Array(
                records.into_iter().map(Value::Object).collect(),
            ));
        }
        Value::Array(out)
    }
}

impl TryFrom<Value> for TableBody {
    type Error = String;

    fn try_from(value: Value) -> Result<Self, String> {
        let items = match value {
            Value::Array(items) => items,
            _ => return Err("table patch body must be an array".to_owned()),
        };
        if items.len() % 2 != 0 {
            return Err("table patch body must alternate (op, payload)".to_owned());
        }
        let mut ops = Vec::with_capacity(items.len() / 2);
        let mut iter = items.into_iter();
        while let (Some(op), Some(payload)) = (iter.next(), iter.next()) {
            let code = op
                .as_i64()
                .ok_or_else(|| "table op must be an integer".to_owned())?;
            let entries = match payload {
                Value::Array(entries) => entries,
                _ => return Err("table op payload must be an array".to_owned()),
            };
            let records = entries
                .into_iter()
                .map(|entry| match entry {
                    Value::Object(map) => Ok(map),
                    _ => Err("table op payload entries must be objects".to_owned()),
                })
                .collect::<Result<Vec<Record>, String>>()?;
            match code {
                -1 => ops.push(TableOp::Delete(records)),
                1 => ops.push(TableOp::Upsert(records)),
                other => return Err(format!("unknown table op {other}")),
            }
        }
        Ok(Self(ops))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wire_form_is_the_alternating_array() {
        let body = TableBody(vec![
            TableOp::Upsert(vec![json!({"id": 1, "body": "hello"})
                .as_object()
                .cloned()
                .unwrap()]),
            TableOp::Delete(vec![json!({"id": 2}).as_object().cloned().unwrap()]),
        ]);
        let v = serde_json::to_value(&body).unwrap();
        assert_eq!(
            v,
            json!([1, [{"id": 1, "body": "hello"}], -1, [{"id": 2}]])
        );
        let back: TableBody = serde_json::from_value(v).unwrap();
        assert_eq!(back, body);
    }

    #[test]
    fn rejects_malformed_bodies() {
        for bad in [
            json!({"op": 1}),
            json!([1]),
            json!([2, []]),
            json!([1, {"not": "array"}]),
            json!([1, ["not an object"]]),
        ] {
            assert!(serde_json::from_value::<TableBody>(bad).is_err());
        }
    }

    #[test]
    fn empty_body_round_trips() {
        let body = TableBody::default();
        let v = serde_json::to_value(&body).unwrap();
        assert_eq!(v, json!([]));
        assert_eq!(serde_json::from_value::<TableBody>(v).unwrap(), body);
    }
}
