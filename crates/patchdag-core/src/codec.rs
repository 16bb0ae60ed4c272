//! Document codec interface.
//!
//! A codec owns one document family: how it parses from and serializes to a
//! string, how patch bodies apply, and how deltas are computed. The graph is
//! polymorphic over the codec and treats bodies as opaque typed values.

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

pub mod table;
pub mod text;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("table codec requires at least one primary key")]
    NoPrimaryKey,
    #[error("where clause uses non-primary-key field {0:?}")]
    InvalidWhere(String),
    #[error("string column {column:?} set to a non-string value")]
    InvalidFieldType { column: String },
    #[error("corrupt patch body: {0}")]
    CorruptBody(String),
}

/// A materialized document value. Instances are immutable after construction;
/// every new state is a new instance (codecs use structural sharing to keep
/// clones cheap).
pub trait Document: Clone {
    /// Element count: characters for text, live records for tables.
    fn count(&self) -> usize;

    /// Cheap upper-bound byte estimate; drives cache eviction, not
    /// correctness.
    fn size_hint(&self) -> usize {
        self.count()
    }

    /// Semantic equality.
    fn is_equal(&self, other: &Self) -> bool;
}

/// Codec for one document family.
pub trait DocCodec {
    type Doc: Document;
    type Body: Clone + PartialEq + std::fmt::Debug + Serialize + DeserializeOwned;

    /// Parse the serialized string form. Tolerant: malformed input degrades
    /// (the table codec drops corrupt lines with a warning).
    fn from_string(&self, text: &str) -> Self::Doc;

    fn to_string(&self, doc: &Self::Doc) -> String;

    /// Apply one patch body, producing a new document.
    fn apply_patch(&self, doc: &Self::Doc, body: &Self::Body) -> Result<Self::Doc, CodecError>;

    /// Apply a run of bodies. The default iterates [`DocCodec::apply_patch`];
    /// codecs override it when a single transaction is cheaper.
    fn apply_patch_batch(
        &self,
        doc: &Self::Doc,
        bodies: &[&Self::Body],
    ) -> Result<Self::Doc, CodecError> {
        let mut current = doc.clone();
        for body in bodies {
            current = self.apply_patch(&current, body)?;
        }
        Ok(current)
    }

    /// Compute the delta transforming `from` into `to`.
    fn make_patch(&self, from: &Self::Doc, to: &Self::Doc) -> Self::Body;

    /// Rebase a draft across an advanced base. The default applies the local
    /// delta onto the new base; string-shaped codecs override this with a
    /// three-way merge.
    fn rebase(
        &self,
        base: &Self::Doc,
        draft: &Self::Doc,
        updated_base: &Self::Doc,
    ) -> Result<Self::Doc, CodecError> {
        self.apply_patch(updated_base, &self.make_patch(base, draft))
    }
}
