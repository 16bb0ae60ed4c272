//! Text documents: plain strings patched with context hunks.

use std::rc::Rc;

use crate::codec::{CodecError, DocCodec, Document};
use crate::diff::hunk::{self, TextPatch};
use crate::diff::merge::three_way_merge;

/// An immutable string document. Cloning shares the underlying buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextDoc(Rc<String>);

impl TextDoc {
    pub fn new(text: impl Into<String>) -> Self {
        Self(Rc::new(text.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Document for TextDoc {
    fn count(&self) -> usize {
        self.0.chars().count()
    }

    fn size_hint(&self) -> usize {
        self.0.len()
    }

    fn is_equal(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0) || self.0 == other.0
    }
}

/// Codec for [`TextDoc`]. `from_string`/`to_string` are identity; patches
/// delegate to the hunk service.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextCodec;

impl TextCodec {
    pub fn new() -> Self {
        Self
    }
}

impl DocCodec for TextCodec {
    type Doc = TextDoc;
    type Body = TextPatch;

    fn from_string(&self, text: &str) -> TextDoc {
        TextDoc::new(text)
    }

    fn to_string(&self, doc: &TextDoc) -> String {
        doc.as_str().to_owned()
    }

    fn apply_patch(&self, doc: &TextDoc, body: &TextPatch) -> Result<TextDoc, CodecError> {
        let (next, clean) = hunk::apply(body, doc.as_str());
        if !clean {
            // A patch that does not place exactly is a no-op.
            return Ok(doc.clone());
        }
        Ok(TextDoc::new(next))
    }

    fn make_patch(&self, from: &TextDoc, to: &TextDoc) -> TextPatch {
        hunk::make(from.as_str(), to.as_str())
    }

    fn rebase(
        &self,
        base: &TextDoc,
        draft: &TextDoc,
        updated_base: &TextDoc,
    ) -> Result<TextDoc, CodecError> {
        Ok(TextDoc::new(three_way_merge(
            base.as_str(),
            draft.as_str(),
            updated_base.as_str(),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_round_trip() {
        let codec = TextCodec::new();
        let a = codec.from_string("hello");
        let b = codec.from_string("hello world");
        let body = codec.make_patch(&a, &b);
        let out = codec.apply_patch(&a, &body).unwrap();
        assert!(out.is_equal(&b));
    }

    #[test]
    fn unclean_patch_is_a_no_op() {
        let codec = TextCodec::new();
        let a = codec.from_string("alpha beta");
        let b = codec.from_string("alpha BETA");
        let body = codec.make_patch(&a, &b);
        let unrelated = codec.from_string("something else entirely");
        let out = codec.apply_patch(&unrelated, &body).unwrap();
        assert!(out.is_equal(&unrelated));
    }

    #[test]
    fn rebase_uses_three_way_merge() {
        let codec = TextCodec::new();
        let base = codec.from_string("hello");
        let draft = codec.from_string("hello local");
        let updated = codec.from_string("REMOTE hello");
        let out = codec.rebase(&base, &draft, &updated).unwrap();
        assert_eq!(out.as_str(), "REMOTE hello local");
    }

    #[test]
    fn batch_apply_chains_patches() {
        let codec = TextCodec::new();
        let a = codec.from_string("");
        let b = codec.from_string("one");
        let c = codec.from_string("one two");
        let p1 = codec.make_patch(&a, &b);
        let p2 = codec.make_patch(&b, &c);
        let out = codec.apply_patch_batch(&a, &[&p1, &p2]).unwrap();
        assert_eq!(out.as_str(), "one two");
    }
}
