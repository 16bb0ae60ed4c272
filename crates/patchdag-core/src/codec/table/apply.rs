//! Batch application of table patch bodies.
//!
//! A transaction clones the slot vector and index buckets once (record
//! contents stay shared), then applies any number of bodies with incremental
//! index maintenance: a touched record leaves its old buckets before
//! mutation and re-enters afterwards, which also keeps the indexes exact
//! when an upsert rewrites a primary-key field. Total cost is proportional
//! to the records actually affected, plus per-patch overhead.

use std::collections::{BTreeSet, HashMap};
use std::rc::Rc;

use serde_json::Value;

use crate::codec::table::{
    index_insert, index_remove, record_size, resolve_where, Record, TableBody, TableConfig,
    TableDoc, TableOp,
};
use crate::codec::CodecError;
use crate::diff::hunk::{self, TextPatch};

pub(crate) struct TableTx {
    config: Rc<TableConfig>,
    slots: Vec<Option<Rc<Record>>>,
    indexes: HashMap<String, HashMap<String, BTreeSet<usize>>>,
    record_count: usize,
    approx_bytes: usize,
}

impl TableTx {
    pub(crate) fn begin(doc: &TableDoc) -> Self {
        let inner = doc.inner();
        Self {
            config: inner.config.clone(),
            slots: inner.slots.clone(),
            indexes: inner.indexes.clone(),
            record_count: inner.record_count,
            approx_bytes: inner.approx_bytes,
        }
    }

    pub(crate) fn commit(self) -> TableDoc {
        TableDoc::from_parts(
            self.config,
            self.slots,
            self.indexes,
            self.record_count,
            self.approx_bytes,
        )
    }

    pub(crate) fn apply_body(&mut self, body: &TableBody) -> Result<(), CodecError> {
        for op in &body.0 {
            match op {
                TableOp::Delete(wheres) => {
                    for where_ in wheres {
                        self.delete_where(where_)?;
                    }
                }
                TableOp::Upsert(records) => {
                    for record in records {
                        self.upsert(record)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn delete_where(&mut self, where_: &Record) -> Result<(), CodecError> {
        let hits = resolve_where(&self.config, &self.indexes, &self.slots, where_)?;
        for slot in hits {
            if let Some(rec) = self.slots[slot].take() {
                index_remove(&mut self.indexes, &self.config, slot, &rec);
                self.record_count -= 1;
                self.approx_bytes = self.approx_bytes.saturating_sub(record_size(&rec));
            }
        }
        Ok(())
    }

    fn upsert(&mut self, payload: &Record) -> Result<(), CodecError> {
        // Primary-key fields with non-null values select the targets; all
        // remaining fields are the mutation.
        let mut where_keys = Record::new();
        let mut set_fields = Record::new();
        for (field, value) in payload {
            if self.config.is_primary_key(field) && !value.is_null() {
                where_keys.insert(field.clone(), value.clone());
            } else {
                set_fields.insert(field.clone(), value.clone());
            }
        }
        let hits = if where_keys.is_empty() {
            BTreeSet::new()
        } else {
            resolve_where(&self.config, &self.indexes, &self.slots, &where_keys)?
        };
        if hits.is_empty() {
            return self.insert(payload);
        }
        for slot in hits {
            self.update(slot, &set_fields)?;
        }
        Ok(())
    }

    fn update(&mut self, slot: usize, set_fields: &Record) -> Result<(), CodecError> {
        let Some(old) = self.slots[slot].clone() else {
            return Ok(());
        };
        index_remove(&mut self.indexes, &self.config, slot, &old);
        self.approx_bytes = self.approx_bytes.saturating_sub(record_size(&old));

        let mut rec = (*old).clone();
        for (field, value) in set_fields {
            if value.is_null() {
                rec.remove(field);
                continue;
            }
            if self.config.is_string_col(field) {
                match value {
                    Value::Array(_) => {
                        let patch: TextPatch =
                            serde_json::from_value(value.clone()).map_err(|e| {
                                CodecError::CorruptBody(format!(
                                    "bad string patch for column {field:?}: {e}"
                                ))
                            })?;
                        let current = rec
                            .get(field)
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_owned();
                        let (next, _clean) = hunk::apply(&patch, &current);
                        rec.insert(field.clone(), Value::String(next));
                    }
                    Value::String(_) => {
                        rec.insert(field.clone(), value.clone());
                    }
                    _ => {
                        return Err(CodecError::InvalidFieldType {
                            column: field.clone(),
                        })
                    }
                }
                continue;
            }
            match (rec.get(field), value) {
                (Some(Value::Object(current)), Value::Object(changes)) => {
                    // Shallow merge: null deletes a key, anything else wins.
                    let mut merged = current.clone();
                    for (k, v) in changes {
                        if v.is_null() {
                            merged.remove(k);
                        } else {
                            merged.insert(k.clone(), v.clone());
                        }
                    }
                    rec.insert(field.clone(), Value::Object(merged));
                }
                _ => {
                    rec.insert(field.clone(), value.clone());
                }
            }
        }

        let rec = Rc::new(rec);
        index_insert(&mut self.indexes, &self.config, slot, &rec);
        self.approx_bytes += record_size(&rec);
        self.slots[slot] = Some(rec);
        Ok(())
    }

    fn insert(&mut self, payload: &Record) -> Result<(), CodecError> {
        let mut rec = Record::new();
        for (field, value) in payload {
            if value.is_null() {
                continue;
            }
            if self.config.is_string_col(field) {
                match value {
                    // A string patch with no base record is dropped.
                    Value::Array(_) => continue,
                    Value::String(_) => {}
                    _ => {
                        return Err(CodecError::InvalidFieldType {
                            column: field.clone(),
                        })
                    }
                }
            }
            rec.insert(field.clone(), value.clone());
        }
        let slot = self.slots.len();
        let rec = Rc::new(rec);
        index_insert(&mut self.indexes, &self.config, slot, &rec);
        self.record_count += 1;
        self.approx_bytes += record_size(&rec);
        self.slots.push(Some(rec));
        Ok(())
    }
}
