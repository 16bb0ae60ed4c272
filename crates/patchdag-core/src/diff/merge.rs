//! Deterministic three-way text merge.
//!
//! Both sides are diffed against the base, the base is partitioned at every
//! insert/delete boundary from either side, and the pieces are woven back
//! together: at each boundary local inserts come first, then remote inserts
//! that are not byte-identical to a local insert at the same spot; a base
//! segment survives only if neither side deleted it. No conflict markers are
//! ever produced; on conflicting deletes the local side wins by omission.

use std::collections::BTreeSet;

use super::str::{diff, DiffList, DiffOpKind};

/// Merge `local` and `remote`, both derived from `base`.
pub fn three_way_merge(base: &str, local: &str, remote: &str) -> String {
    if local == remote || base == remote {
        return local.to_owned();
    }
    if base == local {
        return remote.to_owned();
    }

    let base_chars: Vec<char> = base.chars().collect();
    let ours = SideEdits::from_diff(&diff(base, local));
    let theirs = SideEdits::from_diff(&diff(base, remote));

    let mut bounds: BTreeSet<usize> = BTreeSet::new();
    bounds.insert(0);
    bounds.insert(base_chars.len());
    for (s, e) in ours.deletes.iter().chain(&theirs.deletes) {
        bounds.insert(*s);
        bounds.insert(*e);
    }
    for (p, _) in ours.inserts.iter().chain(&theirs.inserts) {
        bounds.insert(*p);
    }
    let bounds: Vec<usize> = bounds.into_iter().collect();

    let mut out = String::new();
    for (i, &b) in bounds.iter().enumerate() {
        let mut local_inserted: Vec<&str> = Vec::new();
        for (p, text) in &ours.inserts {
            if *p == b {
                out.push_str(text);
                local_inserted.push(text);
            }
        }
        for (p, text) in &theirs.inserts {
            if *p == b && !local_inserted.contains(&text.as_str()) {
                out.push_str(text);
            }
        }
        if let Some(&next) = bounds.get(i + 1) {
            if !ours.covers(b, next) && !theirs.covers(b, next) {
                out.extend(base_chars[b..next].iter());
            }
        }
    }
    out
}

/// One side's edits in base char coordinates.
struct SideEdits {
    deletes: Vec<(usize, usize)>,
    inserts: Vec<(usize, String)>,
}

impl SideEdits {
    fn from_diff(ops: &DiffList) -> Self {
        let mut deletes = Vec::new();
        let mut inserts = Vec::new();
        let mut pos = 0usize;
        for (kind, text) in ops {
            let len = text.chars().count();
            match kind {
                DiffOpKind::Equal => pos += len,
                DiffOpKind::Delete => {
                    deletes.push((pos, pos + len));
                    pos += len;
                }
                DiffOpKind::Insert => inserts.push((pos, text.clone())),
            }
        }
        Self { deletes, inserts }
    }

    /// Whether the segment `[start, end)` falls inside a deleted span.
    fn covers(&self, start: usize, end: usize) -> bool {
        self.deletes.iter().any(|(s, e)| *s <= start && end <= *e)
    }
}
