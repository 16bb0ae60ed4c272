//! Bounded LRU cache of computed document values.
//!
//! Entries are bounded by count and by an estimated byte budget fed from
//! `Document::size_hint`. The budget drives eviction only; a wildly wrong
//! estimate can never change a computed value.

use std::num::NonZeroUsize;

use clru::CLruCache;

use crate::patch_id::PatchId;

pub(crate) const DEFAULT_MAX_ENTRIES: usize = 100;
pub(crate) const DEFAULT_MAX_BYTES: usize = 10 * 1024 * 1024;

pub(crate) struct ValueCache<D> {
    lru: CLruCache<PatchId, Entry<D>>,
    bytes: usize,
    max_bytes: usize,
}

struct Entry<D> {
    doc: D,
    applied: usize,
    size: usize,
}

impl<D: Clone> ValueCache<D> {
    pub(crate) fn new(max_entries: usize, max_bytes: usize) -> Self {
        let capacity = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            lru: CLruCache::new(capacity),
            bytes: 0,
            max_bytes,
        }
    }

    /// Cached document and its applied patch count, promoting the entry.
    pub(crate) fn lookup(&mut self, id: &PatchId) -> Option<(D, usize)> {
        self.lru.get(id).map(|e| (e.doc.clone(), e.applied))
    }

    pub(crate) fn insert(&mut self, id: PatchId, doc: D, applied: usize, size: usize) {
        if let Some(old) = self.lru.put(
            id,
            Entry {
                doc,
                applied,
                size,
            },
        ) {
            self.bytes = self.bytes.saturating_sub(old.size);
        }
        self.bytes += size;
        while self.bytes > self.max_bytes && self.lru.len() > 1 {
            match self.lru.pop_back() {
                Some((_, evicted)) => {
                    tracing::debug!(size = evicted.size, "evicting cached document value");
                    self.bytes = self.bytes.saturating_sub(evicted.size);
                }
                None => break,
            }
        }
    }

    pub(crate) fn clear(&mut self) {
        self.lru.clear();
        self.bytes = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(t: i64) -> PatchId {
        PatchId::encode(t, "c").unwrap()
    }

    #[test]
    fn entry_count_is_bounded() {
        let mut cache: ValueCache<String> = ValueCache::new(2, usize::MAX);
        cache.insert(id(1), "a".into(), 1, 1);
        cache.insert(id(2), "b".into(), 2, 1);
        cache.insert(id(3), "c".into(), 3, 1);
        assert!(cache.lookup(&id(1)).is_none());
        assert_eq!(cache.lookup(&id(3)), Some(("c".into(), 3)));
    }

    #[test]
    fn byte_budget_evicts_lru_entries() {
        let mut cache: ValueCache<String> = ValueCache::new(100, 10);
        cache.insert(id(1), "a".into(), 1, 6);
        cache.insert(id(2), "b".into(), 2, 6);
        // 12 > 10: the older entry goes.
        assert!(cache.lookup(&id(1)).is_none());
        assert!(cache.lookup(&id(2)).is_some());
    }

    #[test]
    fn reinsert_replaces_size_accounting() {
        let mut cache: ValueCache<String> = ValueCache::new(100, 10);
        cache.insert(id(1), "a".into(), 1, 8);
        cache.insert(id(1), "a2".into(), 2, 4);
        cache.insert(id(2), "b".into(), 1, 5);
        // 4 + 5 fits; nothing evicted.
        assert!(cache.lookup(&id(1)).is_some());
        assert!(cache.lookup(&id(2)).is_some());
    }
}
