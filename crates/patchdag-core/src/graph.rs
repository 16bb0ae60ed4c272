//! The patch DAG: topology queries and deterministic value replay.
//!
//! Patches live in a `BTreeMap` keyed by [`PatchId`], so iteration order is
//! replay order. A reverse child index answers head queries; value
//! computation replays the reachable set in id order on top of the latest
//! reachable snapshot, with caching at three levels (per-head values,
//! per-head reachability, per-head-set merges).

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::rc::Rc;

use thiserror::Error;

use crate::codec::{CodecError, DocCodec, Document};
use crate::patch::Patch;
use crate::patch_id::PatchId;

mod cache;

use cache::{ValueCache, DEFAULT_MAX_BYTES, DEFAULT_MAX_ENTRIES};

/// Two `file:true` patches with identical bodies within this window replay
/// as one.
pub const FILE_DEDUP_MS: i64 = 3000;

/// Default cap on parent-chain enumeration.
pub const DEFAULT_CHAIN_LIMIT: usize = 1000;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("unknown patch id {0}")]
    UnknownPatchId(PatchId),
    #[error("patch {id} references missing parent {parent}")]
    ParentMissing { id: PatchId, parent: PatchId },
    #[error("parent chain enumeration exceeded limit {limit}")]
    ChainLimitExceeded { limit: usize },
    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Strategy for combining divergent heads. Deterministic replay in id order
/// converges for both codecs, so both variants run the same algorithm;
/// `ApplyAll` is canonical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergeStrategy {
    #[default]
    ApplyAll,
    ThreeWay,
}

/// Parameters for [`PatchGraph::value`].
#[derive(Debug, Clone, Default)]
pub struct ValueQuery {
    /// Compute the value at this patch instead of the current heads.
    pub time: Option<PatchId>,
    /// Patches to hide from the replay (undo uses this).
    pub without_times: Vec<PatchId>,
    pub merge_strategy: MergeStrategy,
}

impl ValueQuery {
    pub fn at(id: PatchId) -> Self {
        Self {
            time: Some(id),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AncestorOptions {
    pub include_self: bool,
    pub stop_at_snapshots: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct ChainOptions {
    pub stop_at_snapshots: bool,
    pub limit: usize,
}

impl Default for ChainOptions {
    fn default() -> Self {
        Self {
            stop_at_snapshots: false,
            limit: DEFAULT_CHAIN_LIMIT,
        }
    }
}

/// Inclusive id bounds.
#[derive(Debug, Clone, Default)]
pub struct VersionRange {
    pub start: Option<PatchId>,
    pub end: Option<PatchId>,
}

impl VersionRange {
    fn contains(&self, id: &PatchId) -> bool {
        self.start.as_ref().map_or(true, |s| id >= s)
            && self.end.as_ref().map_or(true, |e| id <= e)
    }
}

#[derive(Debug, Clone, Default)]
pub struct HistoryQuery {
    pub start: Option<PatchId>,
    pub end: Option<PatchId>,
    pub include_snapshots: bool,
}

struct GraphCaches<D> {
    value: ValueCache<D>,
    reach: HashMap<PatchId, Rc<Vec<PatchId>>>,
    merge: HashMap<String, D>,
}

pub struct PatchGraph<C: DocCodec> {
    codec: Rc<C>,
    patches: BTreeMap<PatchId, Patch<C::Body>>,
    children: HashMap<PatchId, BTreeSet<PatchId>>,
    caches: RefCell<GraphCaches<C::Doc>>,
}

impl<C: DocCodec> PatchGraph<C> {
    pub fn new(codec: Rc<C>) -> Self {
        Self {
            codec,
            patches: BTreeMap::new(),
            children: HashMap::new(),
            caches: RefCell::new(GraphCaches {
                value: ValueCache::new(DEFAULT_MAX_ENTRIES, DEFAULT_MAX_BYTES),
                reach: HashMap::new(),
                merge: HashMap::new(),
            }),
        }
    }

    pub fn codec(&self) -> &Rc<C> {
        &self.codec
    }

    pub fn len(&self) -> usize {
        self.patches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }

    pub fn contains(&self, id: &PatchId) -> bool {
        self.patches.contains_key(id)
    }

    /// Insert patches. An id already present is a no-op, except that
    /// snapshot data arriving on an existing node missing it is attached.
    /// Returns the number of nodes inserted or changed.
    pub fn add(&mut self, patches: Vec<Patch<C::Body>>) -> usize {
        let mut changed = 0;
        for patch in patches {
            if self.patches.contains_key(&patch.id) {
                if let Some(existing) = self.patches.get_mut(&patch.id) {
                    if !existing.is_snapshot
                        && patch.is_snapshot
                        && patch.snapshot_text.is_some()
                    {
                        existing.is_snapshot = true;
                        existing.snapshot_text = patch.snapshot_text;
                        changed += 1;
                    }
                }
            } else {
                for parent in &patch.parents {
                    self.children
                        .entry(parent.clone())
                        .or_default()
                        .insert(patch.id.clone());
                }
                self.patches.insert(patch.id.clone(), patch);
                changed += 1;
            }
        }
        if changed > 0 {
            let mut caches = self.caches.borrow_mut();
            caches.reach.clear();
            caches.merge.clear();
        }
        changed
    }

    /// Ids with no children, ascending.
    pub fn get_heads(&self) -> Vec<PatchId> {
        self.patches
            .keys()
            .filter(|id| self.children.get(*id).map_or(true, BTreeSet::is_empty))
            .cloned()
            .collect()
    }

    pub fn get_patch(&self, id: &PatchId) -> Result<&Patch<C::Body>, GraphError> {
        self.patches
            .get(id)
            .ok_or_else(|| GraphError::UnknownPatchId(id.clone()))
    }

    pub fn get_parents(&self, id: &PatchId) -> Result<Vec<PatchId>, GraphError> {
        Ok(self.get_patch(id)?.parents.clone())
    }

    /// All ancestors of `ids`, ascending. Seeds must exist; parents missing
    /// from the graph are skipped (the store owes us completeness, arrival
    /// order does not).
    pub fn get_ancestors(
        &self,
        ids: &[PatchId],
        options: AncestorOptions,
    ) -> Result<Vec<PatchId>, GraphError> {
        let mut stack: Vec<PatchId> = Vec::new();
        for id in ids {
            let patch = self.get_patch(id)?;
            if options.include_self {
                stack.push(id.clone());
            } else if !(options.stop_at_snapshots && patch.is_snapshot) {
                stack.extend(patch.parents.iter().cloned());
            }
        }
        let mut seen: BTreeSet<PatchId> = BTreeSet::new();
        while let Some(id) = stack.pop() {
            if !seen.insert(id.clone()) {
                continue;
            }
            let Some(patch) = self.patches.get(&id) else {
                continue;
            };
            if options.stop_at_snapshots && patch.is_snapshot {
                continue;
            }
            for parent in &patch.parents {
                if !seen.contains(parent) {
                    stack.push(parent.clone());
                }
            }
        }
        Ok(seen.into_iter().collect())
    }

    /// Enumerate root-ward paths from `id`. A path ends at a parentless node
    /// or, with `stop_at_snapshots`, at a snapshot. Errors if enumeration
    /// exceeds the limit or a parent is missing.
    pub fn get_parent_chains(
        &self,
        id: &PatchId,
        options: ChainOptions,
    ) -> Result<Vec<Vec<PatchId>>, GraphError> {
        self.get_patch(id)?;
        let mut done: Vec<Vec<PatchId>> = Vec::new();
        let mut stack: Vec<Vec<PatchId>> = vec![vec![id.clone()]];
        while let Some(path) = stack.pop() {
            let Some(last) = path.last().cloned() else {
                continue;
            };
            let node = self.get_patch(&last)?;
            let terminal =
                node.parents.is_empty() || (options.stop_at_snapshots && node.is_snapshot);
            if terminal {
                done.push(path);
            } else {
                for parent in &node.parents {
                    if !self.patches.contains_key(parent) {
                        return Err(GraphError::ParentMissing {
                            id: last.clone(),
                            parent: parent.clone(),
                        });
                    }
                    let mut next = path.clone();
                    next.push(parent.clone());
                    stack.push(next);
                }
            }
            if done.len() + stack.len() > options.limit {
                return Err(GraphError::ChainLimitExceeded {
                    limit: options.limit,
                });
            }
        }
        Ok(done)
    }

    /// Sorted ids, optionally bounded inclusively.
    pub fn versions(&self, range: Option<&VersionRange>) -> Vec<PatchId> {
        match range {
            None => self.patches.keys().cloned().collect(),
            Some(range) => self
                .patches
                .keys()
                .filter(|id| range.contains(id))
                .cloned()
                .collect(),
        }
    }

    pub fn versions_in_range(&self, range: &VersionRange) -> Vec<PatchId> {
        self.versions(Some(range))
    }

    /// Patches in sorted order, filtered.
    pub fn history(&self, query: &HistoryQuery) -> Vec<Patch<C::Body>> {
        let range = VersionRange {
            start: query.start.clone(),
            end: query.end.clone(),
        };
        self.patches
            .values()
            .filter(|p| range.contains(&p.id))
            .filter(|p| query.include_snapshots || !p.is_snapshot)
            .cloned()
            .collect()
    }

    /// The document at a specific patch.
    pub fn version(&self, id: &PatchId) -> Result<C::Doc, GraphError> {
        self.value(&ValueQuery::at(id.clone()))
    }

    /// Compute the document at the requested heads (defaulting to all
    /// current heads) by deterministic replay.
    pub fn value(&self, query: &ValueQuery) -> Result<C::Doc, GraphError> {
        let heads: Vec<PatchId> = match &query.time {
            Some(id) => {
                if !self.patches.contains_key(id) {
                    return Err(GraphError::UnknownPatchId(id.clone()));
                }
                vec![id.clone()]
            }
            None => self.get_heads(),
        };
        if heads.is_empty() {
            return Ok(self.codec.from_string(""));
        }
        let exclusions: BTreeSet<&PatchId> = query.without_times.iter().collect();

        let merge_key = if heads.len() > 1 && exclusions.is_empty() {
            let key = heads
                .iter()
                .map(PatchId::as_str)
                .collect::<Vec<_>>()
                .join(",");
            if let Some(doc) = self.caches.borrow().merge.get(&key) {
                return Ok(doc.clone());
            }
            Some(key)
        } else {
            None
        };

        let single_cached = heads.len() == 1 && exclusions.is_empty();
        let reachable: Rc<Vec<PatchId>> = if single_cached {
            let cached = self.caches.borrow().reach.get(&heads[0]).cloned();
            match cached {
                Some(r) => r,
                None => {
                    let r = Rc::new(self.compute_reachable(&heads));
                    self.caches
                        .borrow_mut()
                        .reach
                        .insert(heads[0].clone(), r.clone());
                    r
                }
            }
        } else {
            Rc::new(self.compute_reachable(&heads))
        };

        let ids: Vec<&PatchId> = reachable
            .iter()
            .filter(|id| !exclusions.contains(id))
            .collect();
        if ids.is_empty() {
            return Ok(self.codec.from_string(""));
        }

        // The latest reachable snapshot is the replay floor.
        let floor = ids
            .iter()
            .rev()
            .find(|id| {
                self.patches
                    .get(**id)
                    .is_some_and(|p| p.is_snapshot && p.snapshot_text.is_some())
            })
            .copied();
        let (seed, ids) = match floor {
            Some(floor_id) => {
                let text = self
                    .patches
                    .get(floor_id)
                    .and_then(|p| p.snapshot_text.as_deref())
                    .unwrap_or("");
                let kept: Vec<&PatchId> = ids.into_iter().filter(|id| *id > floor_id).collect();
                (self.codec.from_string(text), kept)
            }
            None => (self.codec.from_string(""), ids),
        };

        let ids = self.dedup_file_loads(ids);

        // Prefix reuse: the longest cached value whose applied count matches
        // its position in this ordered list.
        let mut doc = seed;
        let mut start = 0;
        {
            let caches = &mut *self.caches.borrow_mut();
            for i in (0..ids.len()).rev() {
                if let Some((cached, applied)) = caches.value.lookup(ids[i]) {
                    if applied == i + 1 {
                        doc = cached;
                        start = i + 1;
                        break;
                    }
                }
            }
        }

        let bodies: Vec<&C::Body> = ids[start..]
            .iter()
            .filter_map(|id| self.patches.get(*id).and_then(|p| p.body.as_ref()))
            .collect();
        let result = if bodies.is_empty() {
            doc
        } else {
            self.codec.apply_patch_batch(&doc, &bodies)?
        };

        let mut caches = self.caches.borrow_mut();
        if single_cached {
            caches
                .value
                .insert(heads[0].clone(), result.clone(), ids.len(), result.size_hint());
        }
        if let Some(key) = merge_key {
            caches.merge.insert(key, result.clone());
        }
        Ok(result)
    }

    pub fn clear_caches(&self) {
        let mut caches = self.caches.borrow_mut();
        caches.value.clear();
        caches.reach.clear();
        caches.merge.clear();
    }

    /// DFS through parents from `heads`, stopping at snapshot boundaries.
    /// Returns ascending ids.
    fn compute_reachable(&self, heads: &[PatchId]) -> Vec<PatchId> {
        let mut seen: BTreeSet<PatchId> = BTreeSet::new();
        let mut stack: Vec<PatchId> = heads.to_vec();
        while let Some(id) = stack.pop() {
            if !seen.insert(id.clone()) {
                continue;
            }
            let Some(patch) = self.patches.get(&id) else {
                continue;
            };
            if patch.is_snapshot {
                continue;
            }
            for parent in &patch.parents {
                if !seen.contains(parent) {
                    stack.push(parent.clone());
                }
            }
        }
        seen.into_iter().collect()
    }

    /// Drop consecutive file-origin patches with identical bodies landing
    /// within [`FILE_DEDUP_MS`] of each other.
    fn dedup_file_loads<'a>(&'a self, ids: Vec<&'a PatchId>) -> Vec<&'a PatchId> {
        let mut out: Vec<&PatchId> = Vec::with_capacity(ids.len());
        let mut last_kept: Option<&Patch<C::Body>> = None;
        for id in ids {
            let Some(patch) = self.patches.get(id) else {
                continue;
            };
            if patch.file {
                if let Some(last) = last_kept {
                    if last.file && last.body == patch.body {
                        if let (Ok(a), Ok(b)) = (last.id.decode(), patch.id.decode()) {
                            if b.time_ms - a.time_ms <= FILE_DEDUP_MS {
                                continue;
                            }
                        }
                    }
                }
            }
            out.push(id);
            last_kept = Some(patch);
        }
        out
    }
}
