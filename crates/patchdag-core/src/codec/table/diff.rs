//! Record-level diffing between two table documents.
//!
//! Documents are compared as primary-key-keyed record maps. Removed keys
//! become a delete payload carrying only the key fields; new keys become
//! full-record upserts; common keys get a per-field delta: string columns
//! diff through the text patch service, map values through the shallow
//! merge-patch encoding, everything else by overwrite.

use serde_json::Value;

use crate::codec::table::{Record, TableBody, TableConfig, TableDoc, TableOp};
use crate::diff::hunk;

pub(crate) fn make_patch(config: &TableConfig, from: &TableDoc, to: &TableDoc) -> TableBody {
    let from_map = from.key_map();
    let to_map = to.key_map();

    let mut deletes = Vec::new();
    for (key, rec) in &from_map {
        if !to_map.contains_key(key) {
            let mut where_ = Record::new();
            for pk in &config.primary_keys {
                if let Some(v) = rec.get(pk) {
                    where_.insert(pk.clone(), v.clone());
                }
            }
            deletes.push(where_);
        }
    }

    let mut upserts = Vec::new();
    for (key, to_rec) in &to_map {
        match from_map.get(key) {
            None => upserts.push(to_rec.as_ref().clone()),
            Some(from_rec) if from_rec != to_rec => {
                if let Some(update) = field_delta(config, from_rec, to_rec) {
                    upserts.push(update);
                }
            }
            Some(_) => {}
        }
    }

    let mut ops = Vec::new();
    if !deletes.is_empty() {
        ops.push(TableOp::Delete(deletes));
    }
    if !upserts.is_empty() {
        ops.push(TableOp::Upsert(upserts));
    }
    TableBody(ops)
}

fn field_delta(config: &TableConfig, from: &Record, to: &Record) -> Option<Record> {
    let mut update = Record::new();
    for pk in &config.primary_keys {
        if let Some(v) = to.get(pk) {
            update.insert(pk.clone(), v.clone());
        }
    }
    let key_fields = update.len();

    for (field, to_val) in to {
        if config.is_primary_key(field) {
            continue;
        }
        match from.get(field) {
            Some(from_val) if from_val == to_val => {}
            Some(from_val) => {
                update.insert(field.clone(), changed_value(config, field, from_val, to_val));
            }
            None => {
                update.insert(field.clone(), to_val.clone());
            }
        }
    }
    for field in from.keys() {
        if !config.is_primary_key(field) && !to.contains_key(field) {
            update.insert(field.clone(), Value::Null);
        }
    }

    (update.len() > key_fields).then_some(update)
}

fn changed_value(config: &TableConfig, field: &str, from: &Value, to: &Value) -> Value {
    if config.is_string_col(field) {
        if let (Some(a), Some(b)) = (from.as_str(), to.as_str()) {
            let patch = hunk::make(a, b);
            if let Ok(encoded) = serde_json::to_value(&patch) {
                return encoded;
            }
        }
        return to.clone();
    }
    if let (Value::Object(a), Value::Object(b)) = (from, to) {
        // Merge-patch: only changed keys, null marks a deletion.
        let mut delta = Record::new();
        for (k, bv) in b {
            if a.get(k) != Some(bv) {
                delta.insert(k.clone(), bv.clone());
            }
        }
        for k in a.keys() {
            if !b.contains_key(k) {
                delta.insert(k.clone(), Value::Null);
            }
        }
        return Value::Object(delta);
    }
    to.clone()
}

#[cfg(test)]
mod tests {
    use crate::codec::table::{Record, TableCodec, TableOp};
    use crate::codec::{DocCodec, Document};
    use serde_json::{json, Value};

    fn codec() -> TableCodec {
        TableCodec::new(vec!["id".into()], vec!["body".into()]).unwrap()
    }

    fn rec(v: Value) -> Record {
        v.as_object().cloned().expect("object")
    }

    #[test]
    fn emits_deletes_then_upserts() {
        let c = codec();
        let from = c.doc_from_records(vec![
            rec(json!({"id": 1, "body": "keep"})),
            rec(json!({"id": 2, "body": "gone"})),
        ]);
        let to = c.doc_from_records(vec![
            rec(json!({"id": 1, "body": "keep"})),
            rec(json!({"id": 3, "body": "new"})),
        ]);
        let body = c.make_patch(&from, &to);
        assert_eq!(body.0.len(), 2);
        assert!(matches!(&body.0[0], TableOp::Delete(w) if w == &vec![rec(json!({"id": 2}))]));
        assert!(
            matches!(&body.0[1], TableOp::Upsert(r) if r == &vec![rec(json!({"id": 3, "body": "new"}))])
        );
    }

    #[test]
    fn string_columns_diff_as_patches() {
        let c = codec();
        let from = c.doc_from_records(vec![rec(json!({"id": 1, "body": "hello"}))]);
        let to = c.doc_from_records(vec![rec(json!({"id": 1, "body": "1hello2"}))]);
        let body = c.make_patch(&from, &to);
        let TableOp::Upsert(recs) = &body.0[0] else {
            panic!("expected upsert");
        };
        assert!(recs[0].get("body").is_some_and(Value::is_array));
        // And the patch round-trips through apply.
        let out = c.apply_patch(&from, &body).unwrap();
        let one = out.get_one(&rec(json!({"id": 1}))).unwrap().unwrap();
        assert_eq!(one.get("body"), Some(&json!("1hello2")));
    }

    #[test]
    fn map_columns_diff_as_merge_patches() {
        let c = codec();
        let from =
            c.doc_from_records(vec![rec(json!({"id": 1, "meta": {"a": 1, "b": 2}}))]);
        let to = c.doc_from_records(vec![rec(json!({"id": 1, "meta": {"a": 1, "c": 3}}))]);
        let body = c.make_patch(&from, &to);
        let TableOp::Upsert(recs) = &body.0[0] else {
            panic!("expected upsert");
        };
        assert_eq!(recs[0].get("meta"), Some(&json!({"b": null, "c": 3})));
        let out = c.apply_patch(&from, &body).unwrap();
        assert!(out.is_equal(&to));
    }

    #[test]
    fn removed_fields_become_nulls() {
        let c = codec();
        let from = c.doc_from_records(vec![rec(json!({"id": 1, "extra": true}))]);
        let to = c.doc_from_records(vec![rec(json!({"id": 1}))]);
        let body = c.make_patch(&from, &to);
        let out = c.apply_patch(&from, &body).unwrap();
        assert!(out.is_equal(&to));
    }

    #[test]
    fn patch_round_trip_over_assorted_docs() {
        let c = codec();
        let docs = [
            c.from_string(""),
            c.doc_from_records(vec![rec(json!({"id": 1, "body": "alpha"}))]),
            c.doc_from_records(vec![
                rec(json!({"id": 1, "body": "alpha", "n": 5})),
                rec(json!({"id": 2, "body": "beta", "meta": {"x": 1}})),
                rec(json!({"id": 3})),
            ]),
            c.doc_from_records(vec![
                rec(json!({"id": 2, "body": "beta rewritten"})),
                rec(json!({"id": 4, "body": "delta"})),
            ]),
        ];
        for from in &docs {
            for to in &docs {
                let body = c.make_patch(from, to);
                let out = c.apply_patch(from, &body).unwrap();
                assert!(
                    out.is_equal(to),
                    "round trip failed:\n{}\n->\n{}",
                    c.to_string(from),
                    c.to_string(to)
                );
            }
        }
    }

    #[test]
    fn identical_docs_produce_an_empty_body() {
        let c = codec();
        let doc = c.doc_from_records(vec![rec(json!({"id": 1, "body": "same"}))]);
        assert!(c.make_patch(&doc, &doc.clone()).is_empty());
    }
}
