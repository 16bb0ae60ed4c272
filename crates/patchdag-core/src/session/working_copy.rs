//! Staged draft state and its rebase across committed changes.

use crate::codec::{CodecError, DocCodec, Document};

/// An uncommitted draft on top of a committed base. Both advance together
/// when the committed document moves underneath.
pub(crate) struct WorkingCopy<D> {
    pub(crate) base: D,
    pub(crate) draft: D,
}

/// Carry `draft`'s changes over from `base` to `updated_base`.
///
/// Trivial cases resolve without the codec; otherwise the codec decides
/// (three-way string merge for text, delta re-application for tables).
pub(crate) fn rebase_draft<C: DocCodec>(
    codec: &C,
    base: &C::Doc,
    draft: &C::Doc,
    updated_base: &C::Doc,
) -> Result<C::Doc, CodecError> {
    if draft.is_equal(base) || draft.is_equal(updated_base) {
        return Ok(updated_base.clone());
    }
    codec.rebase(base, draft, updated_base)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::table::{Record, TableCodec};
    use crate::codec::text::TextCodec;
    use serde_json::json;

    #[test]
    fn unchanged_draft_follows_the_base() {
        let codec = TextCodec::new();
        let base = codec.from_string("a");
        let updated = codec.from_string("ab");
        let out = rebase_draft(&codec, &base, &base.clone(), &updated).unwrap();
        assert!(out.is_equal(&updated));
    }

    #[test]
    fn text_drafts_merge_three_ways() {
        let codec = TextCodec::new();
        let base = codec.from_string("hello");
        let draft = codec.from_string("hello local");
        let updated = codec.from_string("REMOTE hello");
        let out = rebase_draft(&codec, &base, &draft, &updated).unwrap();
        assert_eq!(out.as_str(), "REMOTE hello local");
    }

    #[test]
    fn table_drafts_reapply_their_delta() {
        let codec = TableCodec::new(vec!["id".into()], vec![]).unwrap();
        let rec = |v: serde_json::Value| -> Record { v.as_object().cloned().unwrap() };
        let base = codec.doc_from_records(vec![rec(json!({"id": 1, "v": "a"}))]);
        // Draft adds a record; meanwhile the base gained another.
        let draft = codec.doc_from_records(vec![
            rec(json!({"id": 1, "v": "a"})),
            rec(json!({"id": 2, "v": "draft"})),
        ]);
        let updated = codec.doc_from_records(vec![
            rec(json!({"id": 1, "v": "a"})),
            rec(json!({"id": 3, "v": "remote"})),
        ]);
        let out = rebase_draft(&codec, &base, &draft, &updated).unwrap();
        assert_eq!(out.count(), 3);
        assert!(out.get_one(&rec(json!({"id": 2}))).unwrap().is_some());
        assert!(out.get_one(&rec(json!({"id": 3}))).unwrap().is_some());
    }
}
