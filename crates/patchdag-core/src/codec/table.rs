//! Indexed JSONL table documents.
//!
//! A table document is an ordered sequence of JSON records with tombstoned
//! slots, plus one secondary index per primary-key column mapping the
//! stable-JSON encoding of a key value to the set of slots holding it.
//! Documents are immutable; records are shared via `Rc`, so producing a new
//! state clones slot pointers and index buckets, never record contents.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::rc::Rc;

use patchdag_util::{json_size_approx, stable_json};
use serde_json::Value;

use crate::codec::{CodecError, DocCodec, Document};

mod apply;
mod diff;

pub mod body;

pub use body::{Record, TableBody, TableOp};

use apply::TableTx;

/// Table shape: primary-key columns (at least one) and the columns eligible
/// for diff-encoded string patches.
#[derive(Debug, Clone)]
pub(crate) struct TableConfig {
    pub(crate) primary_keys: Vec<String>,
    pub(crate) string_cols: Vec<String>,
}

impl TableConfig {
    pub(crate) fn is_primary_key(&self, field: &str) -> bool {
        self.primary_keys.iter().any(|k| k == field)
    }

    pub(crate) fn is_string_col(&self, field: &str) -> bool {
        self.string_cols.iter().any(|k| k == field)
    }
}

/// Codec for [`TableDoc`].
#[derive(Debug, Clone)]
pub struct TableCodec {
    config: Rc<TableConfig>,
}

impl TableCodec {
    pub fn new(
        primary_keys: Vec<String>,
        string_cols: Vec<String>,
    ) -> Result<Self, CodecError> {
        if primary_keys.is_empty() {
            return Err(CodecError::NoPrimaryKey);
        }
        Ok(Self {
            config: Rc::new(TableConfig {
                primary_keys,
                string_cols,
            }),
        })
    }

    pub fn primary_keys(&self) -> &[String] {
        &self.config.primary_keys
    }

    pub fn string_cols(&self) -> &[String] {
        &self.config.string_cols
    }

    /// Build a document directly from records, in slot order.
    pub fn doc_from_records(&self, records: Vec<Record>) -> TableDoc {
        TableDoc::build(
            self.config.clone(),
            records.into_iter().map(|r| Some(Rc::new(r))).collect(),
        )
    }
}

#[derive(Debug)]
pub(crate) struct TableInner {
    pub(crate) config: Rc<TableConfig>,
    pub(crate) slots: Vec<Option<Rc<Record>>>,
    pub(crate) indexes: HashMap<String, HashMap<String, BTreeSet<usize>>>,
    pub(crate) record_count: usize,
    pub(crate) approx_bytes: usize,
}

/// An immutable table document.
#[derive(Debug, Clone)]
pub struct TableDoc {
    inner: Rc<TableInner>,
}

impl TableDoc {
    pub(crate) fn build(config: Rc<TableConfig>, slots: Vec<Option<Rc<Record>>>) -> Self {
        let mut indexes = HashMap::new();
        let mut record_count = 0;
        let mut approx_bytes = 0;
        for (slot, rec) in slots.iter().enumerate() {
            if let Some(rec) = rec {
                index_insert(&mut indexes, &config, slot, rec);
                record_count += 1;
                approx_bytes += record_size(rec);
            }
        }
        Self {
            inner: Rc::new(TableInner {
                config,
                slots,
                indexes,
                record_count,
                approx_bytes,
            }),
        }
    }

    /// Assemble a document from already-maintained parts (transaction
    /// commit path; the caller guarantees indexes and counters are exact).
    pub(crate) fn from_parts(
        config: Rc<TableConfig>,
        slots: Vec<Option<Rc<Record>>>,
        indexes: HashMap<String, HashMap<String, BTreeSet<usize>>>,
        record_count: usize,
        approx_bytes: usize,
    ) -> Self {
        Self {
            inner: Rc::new(TableInner {
                config,
                slots,
                indexes,
                record_count,
                approx_bytes,
            }),
        }
    }

    /// Live records in slot order.
    pub fn records(&self) -> impl Iterator<Item = &Rc<Record>> {
        self.inner.slots.iter().filter_map(|s| s.as_ref())
    }

    /// Records matching `where_` (primary-key columns only), resolved through
    /// the indexes. An empty `where_` selects everything.
    pub fn select(&self, where_: &Record) -> Result<Vec<Rc<Record>>, CodecError> {
        let slots = resolve_where(
            &self.inner.config,
            &self.inner.indexes,
            &self.inner.slots,
            where_,
        )?;
        Ok(slots
            .into_iter()
            .filter_map(|s| self.inner.slots[s].clone())
            .collect())
    }

    /// First record matching `where_`, if any.
    pub fn get_one(&self, where_: &Record) -> Result<Option<Rc<Record>>, CodecError> {
        Ok(self.select(where_)?.into_iter().next())
    }

    /// Records keyed by the stable encoding of their primary-key fields.
    pub(crate) fn key_map(&self) -> BTreeMap<String, Rc<Record>> {
        self.records()
            .map(|rec| (record_key(&self.inner.config, rec), rec.clone()))
            .collect()
    }

    pub(crate) fn inner(&self) -> &TableInner {
        &self.inner
    }
}

impl Document for TableDoc {
    fn count(&self) -> usize {
        self.inner.record_count
    }

    fn size_hint(&self) -> usize {
        self.inner.approx_bytes
    }

    fn is_equal(&self, other: &Self) -> bool {
        if Rc::ptr_eq(&self.inner, &other.inner) {
            return true;
        }
        if self.inner.record_count != other.inner.record_count {
            return false;
        }
        let theirs = other.key_map();
        let mine = self.key_map();
        if mine.len() != theirs.len() {
            return false;
        }
        mine.iter()
            .all(|(key, rec)| theirs.get(key).is_some_and(|o| o == rec))
    }
}

impl DocCodec for TableCodec {
    type Doc = TableDoc;
    type Body = TableBody;

    fn from_string(&self, text: &str) -> TableDoc {
        let mut slots = Vec::new();
        for (i, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<Value>(line) {
                Ok(Value::Object(map)) => slots.push(Some(Rc::new(map))),
                Ok(_) => {
                    tracing::warn!(line = i + 1, "dropping non-object line in table document");
                }
                Err(error) => {
                    tracing::warn!(
                        line = i + 1,
                        %error,
                        "dropping corrupt line in table document"
                    );
                }
            }
        }
        TableDoc::build(self.config.clone(), slots)
    }

    fn to_string(&self, doc: &TableDoc) -> String {
        let mut lines: Vec<String> = doc
            .records()
            .map(|rec| stable_json::stringify(&Value::Object(rec.as_ref().clone())))
            .collect();
        lines.sort_unstable();
        if lines.is_empty() {
            String::new()
        } else {
            let mut out = lines.join("\n");
            out.push('\n');
            out
        }
    }

    fn apply_patch(&self, doc: &TableDoc, body: &TableBody) -> Result<TableDoc, CodecError> {
        let mut tx = TableTx::begin(doc);
        tx.apply_body(body)?;
        Ok(tx.commit())
    }

    fn apply_patch_batch(
        &self,
        doc: &TableDoc,
        bodies: &[&TableBody],
    ) -> Result<TableDoc, CodecError> {
        // One transaction over a mutable working copy: indexes update
        // incrementally per affected record instead of rebuilding per patch.
        let mut tx = TableTx::begin(doc);
        for body in bodies {
            tx.apply_body(body)?;
        }
        Ok(tx.commit())
    }

    fn make_patch(&self, from: &TableDoc, to: &TableDoc) -> TableBody {
        diff::make_patch(&self.config, from, to)
    }
}

/// Stable key for a record's primary-key fields.
pub(crate) fn record_key(config: &TableConfig, rec: &Record) -> String {
    let mut keys = Record::new();
    for pk in &config.primary_keys {
        if let Some(v) = rec.get(pk) {
            keys.insert(pk.clone(), v.clone());
        }
    }
    stable_json::stringify(&Value::Object(keys))
}

/// Resolve a where clause to slot numbers by intersecting index buckets.
pub(crate) fn resolve_where(
    config: &TableConfig,
    indexes: &HashMap<String, HashMap<String, BTreeSet<usize>>>,
    slots: &[Option<Rc<Record>>],
    where_: &Record,
) -> Result<BTreeSet<usize>, CodecError> {
    for key in where_.keys() {
        if !config.is_primary_key(key) {
            return Err(CodecError::InvalidWhere(key.clone()));
        }
    }
    if where_.is_empty() {
        return Ok(slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|_| i))
            .collect());
    }
    let mut acc: Option<BTreeSet<usize>> = None;
    for (key, value) in where_ {
        let bucket = indexes
            .get(key)
            .and_then(|m| m.get(&stable_json::stringify(value)))
            .cloned()
            .unwrap_or_default();
        let next = match acc.take() {
            None => bucket,
            Some(prev) => prev.intersection(&bucket).copied().collect(),
        };
        if next.is_empty() {
            return Ok(next);
        }
        acc = Some(next);
    }
    Ok(acc.unwrap_or_default())
}

pub(crate) fn index_insert(
    indexes: &mut HashMap<String, HashMap<String, BTreeSet<usize>>>,
    config: &TableConfig,
    slot: usize,
    rec: &Record,
) {
    for col in &config.primary_keys {
        if let Some(value) = rec.get(col) {
            indexes
                .entry(col.clone())
                .or_default()
                .entry(stable_json::stringify(value))
                .or_default()
                .insert(slot);
        }
    }
}

pub(crate) fn index_remove(
    indexes: &mut HashMap<String, HashMap<String, BTreeSet<usize>>>,
    config: &TableConfig,
    slot: usize,
    rec: &Record,
) {
    for col in &config.primary_keys {
        let Some(value) = rec.get(col) else { continue };
        let key = stable_json::stringify(value);
        if let Some(buckets) = indexes.get_mut(col) {
            if let Some(bucket) = buckets.get_mut(&key) {
                bucket.remove(&slot);
                if bucket.is_empty() {
                    buckets.remove(&key);
                }
            }
        }
    }
}

pub(crate) fn record_size(rec: &Record) -> usize {
    2 + rec
        .iter()
        .map(|(k, v)| k.len() + 3 + json_size_approx(v))
        .sum::<usize>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn codec() -> TableCodec {
        TableCodec::new(vec!["id".into()], vec!["body".into()]).unwrap()
    }

    fn rec(v: Value) -> Record {
        match v {
            Value::Object(m) => m,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn requires_a_primary_key() {
        assert_eq!(
            TableCodec::new(vec![], vec![]).unwrap_err(),
            CodecError::NoPrimaryKey
        );
    }

    #[test]
    fn parses_and_serializes_sorted_lines() {
        let c = codec();
        let doc = c.from_string("{\"id\":2,\"body\":\"b\"}\n{\"body\":\"a\",\"id\":1}\n");
        assert_eq!(doc.count(), 2);
        assert_eq!(
            c.to_string(&doc),
            "{\"body\":\"a\",\"id\":1}\n{\"body\":\"b\",\"id\":2}\n"
        );
    }

    #[test]
    fn corrupt_and_non_object_lines_are_dropped() {
        let c = codec();
        let doc = c.from_string("{\"id\":1}\nnot json\n[1,2]\n\n{\"id\":2}\n");
        assert_eq!(doc.count(), 2);
    }

    #[test]
    fn select_intersects_indexes() {
        let c = TableCodec::new(vec!["a".into(), "b".into()], vec![]).unwrap();
        let doc = c.doc_from_records(vec![
            rec(json!({"a": 1, "b": 1, "x": "p"})),
            rec(json!({"a": 1, "b": 2, "x": "q"})),
            rec(json!({"a": 2, "b": 1, "x": "r"})),
        ]);
        let hits = doc.select(&rec(json!({"a": 1, "b": 2}))).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].get("x"), Some(&json!("q")));
        // Empty where selects everything.
        assert_eq!(doc.select(&Record::new()).unwrap().len(), 3);
    }

    #[test]
    fn select_rejects_non_primary_keys() {
        let c = codec();
        let doc = c.doc_from_records(vec![rec(json!({"id": 1}))]);
        assert_eq!(
            doc.select(&rec(json!({"body": "x"}))).unwrap_err(),
            CodecError::InvalidWhere("body".into())
        );
    }

    #[test]
    fn equality_ignores_slot_order() {
        let c = codec();
        let a = c.doc_from_records(vec![rec(json!({"id": 1})), rec(json!({"id": 2}))]);
        let b = c.doc_from_records(vec![rec(json!({"id": 2})), rec(json!({"id": 1}))]);
        assert!(a.is_equal(&b));
        let d = c.doc_from_records(vec![rec(json!({"id": 1}))]);
        assert!(!a.is_equal(&d));
    }

    #[test]
    fn round_trip_preserves_content() {
        let c = codec();
        let doc = c.doc_from_records(vec![
            rec(json!({"id": 1, "body": "hello", "tags": {"x": true}})),
            rec(json!({"id": 2, "body": "bye"})),
        ]);
        let back = c.from_string(&c.to_string(&doc));
        assert!(doc.is_equal(&back));
    }
}
