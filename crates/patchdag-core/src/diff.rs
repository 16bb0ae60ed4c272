//! Text diff service: character-level diffs, context-hunk patches, and the
//! pure three-way merge used for working-copy rebase.

pub mod hunk;
pub mod merge;
pub mod str;
