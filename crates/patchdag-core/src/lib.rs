//! Core primitives for patchdag: a patch-DAG synchronization engine for
//! small collaborative documents.
//!
//! The graph ([`graph::PatchGraph`]) owns a content-addressed DAG of patches
//! and computes document values by deterministic replay in id order. The
//! session ([`session::Session`]) orchestrates one participant: commits,
//! remote ingest, undo/redo, working-copy rebase, file mirroring and
//! presence. Two codecs ship out of the box: free-form text
//! ([`codec::text::TextCodec`]) and indexed JSONL tables
//! ([`codec::table::TableCodec`]).

pub mod adapters;
pub mod codec;
pub mod diff;
pub mod graph;
pub mod patch;
pub mod patch_id;
pub mod session;
pub mod wire;

pub use codec::table::{TableBody, TableCodec, TableDoc};
pub use codec::text::{TextCodec, TextDoc};
pub use codec::{CodecError, DocCodec, Document};
pub use graph::{MergeStrategy, PatchGraph, ValueQuery};
pub use patch::Patch;
pub use patch_id::PatchId;
pub use session::{CommitOptions, Session, SessionEvent, SessionOptions};

/// Returns the crate version at compile time.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
