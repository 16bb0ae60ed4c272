//! Cursor presence state.

use std::collections::BTreeMap;

use serde_json::Value;

/// Cursor entries older than this are pruned from snapshots.
pub const CURSOR_TTL_MS: i64 = 60_000;

/// One participant's last reported cursor state.
#[derive(Debug, Clone, PartialEq)]
pub struct CursorEntry {
    /// `"user-<userId>"` when a user id is known, else the client id.
    pub key: String,
    /// Sender-reported milliseconds.
    pub time: i64,
    /// Opaque cursor locations.
    pub locs: Value,
    pub user_id: Option<u32>,
    /// Local receive time, used for TTL pruning.
    pub received_ms: i64,
}

pub(crate) fn cursor_key(user_id: Option<u32>, client_id: Option<&str>) -> Option<String> {
    match user_id {
        Some(user) => Some(format!("user-{user}")),
        None => client_id.map(str::to_owned),
    }
}

#[derive(Default)]
pub(crate) struct CursorMap {
    entries: BTreeMap<String, CursorEntry>,
}

impl CursorMap {
    pub(crate) fn merge(&mut self, entry: CursorEntry) {
        self.entries.insert(entry.key.clone(), entry);
    }

    /// Current entries, dropping anything received longer than `ttl_ms` ago.
    pub(crate) fn snapshot(&mut self, now_ms: i64, ttl_ms: i64) -> Vec<CursorEntry> {
        self.entries
            .retain(|_, entry| now_ms - entry.received_ms <= ttl_ms);
        self.entries.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(key: &str, received_ms: i64) -> CursorEntry {
        CursorEntry {
            key: key.to_owned(),
            time: received_ms,
            locs: json!([{"x": 0, "y": 1}]),
            user_id: None,
            received_ms,
        }
    }

    #[test]
    fn keying_prefers_user_id() {
        assert_eq!(cursor_key(Some(7), Some("abc")), Some("user-7".to_owned()));
        assert_eq!(cursor_key(None, Some("abc")), Some("abc".to_owned()));
        assert_eq!(cursor_key(None, None), None);
    }

    #[test]
    fn merge_replaces_by_key() {
        let mut map = CursorMap::default();
        map.merge(entry("a", 10));
        map.merge(entry("a", 20));
        map.merge(entry("b", 20));
        let snap = map.snapshot(20, CURSOR_TTL_MS);
        assert_eq!(snap.len(), 2);
        assert_eq!(snap[0].received_ms, 20);
    }

    #[test]
    fn stale_entries_are_pruned() {
        let mut map = CursorMap::default();
        map.merge(entry("old", 0));
        map.merge(entry("new", 90_000));
        let snap = map.snapshot(100_000, CURSOR_TTL_MS);
        assert_eq!(snap.len(), 1);
        assert_eq!(snap[0].key, "new");
    }
}
