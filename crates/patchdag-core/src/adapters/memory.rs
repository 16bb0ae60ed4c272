//! In-memory reference adapters.
//!
//! These back the test suite and small single-process setups: a shared
//! append log with synchronous broadcast, a file cell with watcher fan-out
//! and a write log, and a presence hub keyed by client id. All are cheaply
//! cloneable handles onto shared state, so one instance can serve several
//! sessions in the same process.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;

use serde_json::Value;

use crate::adapters::{
    EnvelopeCallback, FileAdapter, FileChangeCallback, FileError, InitialLoad, PatchStore,
    PresenceAdapter, PresenceCallback, StoreError, Subscription,
};
use crate::patch::{Patch, WireBody};
use crate::patch_id::PatchId;
use crate::wire::{decode_envelopes, encode_envelopes, WireError};

struct StoreShared<B> {
    log: RefCell<Vec<Patch<B>>>,
    subscribers: RefCell<BTreeMap<u64, Rc<EnvelopeCallback<B>>>>,
    next_subscriber: Cell<u64>,
}

/// Shared in-memory patch log with synchronous delivery to every
/// subscriber, the appender included (sessions dedup by id).
pub struct MemoryPatchStore<B> {
    shared: Rc<StoreShared<B>>,
}

impl<B> Clone for MemoryPatchStore<B> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<B> Default for MemoryPatchStore<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B> MemoryPatchStore<B> {
    pub fn new() -> Self {
        Self {
            shared: Rc::new(StoreShared {
                log: RefCell::new(Vec::new()),
                subscribers: RefCell::new(BTreeMap::new()),
                next_subscriber: Cell::new(1),
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.shared.log.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.log.borrow().is_empty()
    }
}

impl<B: WireBody> MemoryPatchStore<B> {
    /// Seed a store from an NDJSON envelope log.
    pub fn from_ndjson(text: &str) -> Result<Self, WireError>
    where
        B: Default,
    {
        let store = Self::new();
        *store.shared.log.borrow_mut() = decode_envelopes(text)?;
        Ok(store)
    }

    /// Export the full log as NDJSON.
    pub fn to_ndjson(&self) -> Result<String, WireError> {
        encode_envelopes(&self.shared.log.borrow())
    }
}

impl<B: Clone + 'static> PatchStore<B> for MemoryPatchStore<B> {
    fn load_initial(&self, since: Option<&PatchId>) -> Result<InitialLoad<B>, StoreError> {
        let log = self.shared.log.borrow();
        let patches = match since {
            None => log.clone(),
            Some(since) => log.iter().filter(|p| p.id > *since).cloned().collect(),
        };
        Ok(InitialLoad {
            patches,
            has_more: false,
        })
    }

    fn append(&self, envelope: &Patch<B>) -> Result<(), StoreError> {
        self.shared.log.borrow_mut().push(envelope.clone());
        // Snapshot the callback list before invoking: a callback may
        // subscribe or unsubscribe re-entrantly.
        let callbacks: Vec<Rc<EnvelopeCallback<B>>> =
            self.shared.subscribers.borrow().values().cloned().collect();
        for callback in callbacks {
            (*callback)(envelope.clone());
        }
        Ok(())
    }

    fn subscribe(&self, on_envelope: EnvelopeCallback<B>) -> Subscription {
        let id = self.shared.next_subscriber.get();
        self.shared.next_subscriber.set(id + 1);
        self.shared
            .subscribers
            .borrow_mut()
            .insert(id, Rc::new(on_envelope));
        let weak = Rc::downgrade(&self.shared);
        Subscription::new(move || {
            if let Some(shared) = weak.upgrade() {
                shared.subscribers.borrow_mut().remove(&id);
            }
        })
    }
}

struct FileShared {
    content: RefCell<String>,
    watchers: RefCell<BTreeMap<u64, Rc<FileChangeCallback>>>,
    next_watcher: Cell<u64>,
    writes: RefCell<Vec<(String, Option<String>)>>,
}

impl FileShared {
    fn notify(&self) {
        let callbacks: Vec<Rc<FileChangeCallback>> =
            self.watchers.borrow().values().cloned().collect();
        for callback in callbacks {
            (*callback)();
        }
    }
}

/// A single mirrored file held in memory, with a `(content, base)` write log
/// so tests can assert write ordering.
#[derive(Clone)]
pub struct MemoryFileAdapter {
    shared: Rc<FileShared>,
}

impl Default for MemoryFileAdapter {
    fn default() -> Self {
        Self::new("")
    }
}

impl MemoryFileAdapter {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            shared: Rc::new(FileShared {
                content: RefCell::new(content.into()),
                watchers: RefCell::new(BTreeMap::new()),
                next_watcher: Cell::new(1),
                writes: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Every write observed so far, as `(content, base)` pairs.
    pub fn writes(&self) -> Vec<(String, Option<String>)> {
        self.shared.writes.borrow().clone()
    }

    /// Simulate an external editor: replace the content and fire watchers.
    pub fn modify_externally(&self, content: impl Into<String>) {
        *self.shared.content.borrow_mut() = content.into();
        self.shared.notify();
    }
}

impl FileAdapter for MemoryFileAdapter {
    fn read(&self) -> Result<String, FileError> {
        Ok(self.shared.content.borrow().clone())
    }

    fn write(&self, content: &str, base: Option<&str>) -> Result<(), FileError> {
        self.shared
            .writes
            .borrow_mut()
            .push((content.to_owned(), base.map(str::to_owned)));
        *self.shared.content.borrow_mut() = content.to_owned();
        // A real watcher fires on self-induced writes too; sessions suppress
        // those with their counter.
        self.shared.notify();
        Ok(())
    }

    fn watch(&self, on_change: FileChangeCallback) -> Option<Subscription> {
        let id = self.shared.next_watcher.get();
        self.shared.next_watcher.set(id + 1);
        self.shared
            .watchers
            .borrow_mut()
            .insert(id, Rc::new(on_change));
        let weak = Rc::downgrade(&self.shared);
        Some(Subscription::new(move || {
            if let Some(shared) = weak.upgrade() {
                shared.watchers.borrow_mut().remove(&id);
            }
        }))
    }
}

#[derive(Default)]
struct PresenceShared {
    subscribers: RefCell<BTreeMap<u64, (Option<String>, Rc<PresenceCallback>)>>,
    next_subscriber: Cell<u64>,
}

/// Presence fan-out hub shared between sessions in one process.
#[derive(Clone, Default)]
pub struct MemoryPresenceHub {
    shared: Rc<PresenceShared>,
}

impl MemoryPresenceHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// A per-participant handle; its publishes skip subscriptions registered
    /// under the same client id.
    pub fn channel(&self, client_id: impl Into<String>) -> MemoryPresenceChannel {
        MemoryPresenceChannel {
            shared: self.shared.clone(),
            client_id: client_id.into(),
        }
    }
}

/// One participant's handle onto a [`MemoryPresenceHub`].
#[derive(Clone)]
pub struct MemoryPresenceChannel {
    shared: Rc<PresenceShared>,
    client_id: String,
}

impl PresenceAdapter for MemoryPresenceChannel {
    fn publish(&self, state: &Value) {
        let callbacks: Vec<Rc<PresenceCallback>> = self
            .shared
            .subscribers
            .borrow()
            .values()
            .filter(|(client, _)| client.as_deref() != Some(self.client_id.as_str()))
            .map(|(_, cb)| cb.clone())
            .collect();
        for callback in callbacks {
            (*callback)(state.clone());
        }
    }

    fn subscribe(&self, on_state: PresenceCallback, client_id: Option<&str>) -> Subscription {
        let id = self.shared.next_subscriber.get();
        self.shared.next_subscriber.set(id + 1);
        let client = client_id
            .map(str::to_owned)
            .or_else(|| Some(self.client_id.clone()));
        self.shared
            .subscribers
            .borrow_mut()
            .insert(id, (client, Rc::new(on_state)));
        let weak = Rc::downgrade(&self.shared);
        Subscription::new(move || {
            if let Some(shared) = weak.upgrade() {
                shared.subscribers.borrow_mut().remove(&id);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn patch(t: i64, payload: u8) -> Patch<Vec<u8>> {
        Patch::new(
            PatchId::encode(t, "c").unwrap(),
            vec![payload],
            Vec::new(),
        )
    }

    #[test]
    fn append_broadcasts_to_subscribers() {
        let store: MemoryPatchStore<Vec<u8>> = MemoryPatchStore::new();
        let seen: Rc<RefCell<Vec<PatchId>>> = Rc::default();
        let sink = seen.clone();
        let sub = store.subscribe(Box::new(move |p| sink.borrow_mut().push(p.id)));
        store.append(&patch(1, 1)).unwrap();
        store.append(&patch(2, 2)).unwrap();
        assert_eq!(seen.borrow().len(), 2);
        sub.unsubscribe();
        store.append(&patch(3, 3)).unwrap();
        assert_eq!(seen.borrow().len(), 2);
    }

    #[test]
    fn load_initial_honors_since() {
        let store: MemoryPatchStore<Vec<u8>> = MemoryPatchStore::new();
        store.append(&patch(1, 1)).unwrap();
        store.append(&patch(2, 2)).unwrap();
        let since = PatchId::encode(1, "c").unwrap();
        let load = store.load_initial(Some(&since)).unwrap();
        assert_eq!(load.patches.len(), 1);
        assert!(!load.has_more);
    }

    #[test]
    fn ndjson_round_trip() {
        let store: MemoryPatchStore<Vec<u8>> = MemoryPatchStore::new();
        store.append(&patch(1, 1)).unwrap();
        store.append(&patch(2, 2)).unwrap();
        let text = store.to_ndjson().unwrap();
        let restored: MemoryPatchStore<Vec<u8>> = MemoryPatchStore::from_ndjson(&text).unwrap();
        assert_eq!(restored.len(), 2);
    }

    #[test]
    fn file_adapter_records_writes_and_notifies() {
        let file = MemoryFileAdapter::new("initial");
        let fired: Rc<Cell<u32>> = Rc::default();
        let counter = fired.clone();
        let _watch = file
            .watch(Box::new(move || counter.set(counter.get() + 1)))
            .unwrap();
        file.write("next", Some("initial")).unwrap();
        assert_eq!(file.read().unwrap(), "next");
        assert_eq!(file.writes(), vec![("next".to_owned(), Some("initial".to_owned()))]);
        assert_eq!(fired.get(), 1);
        file.modify_externally("external");
        assert_eq!(fired.get(), 2);
    }

    #[test]
    fn presence_hub_excludes_the_publisher() {
        let hub = MemoryPresenceHub::new();
        let alice = hub.channel("alice");
        let bob = hub.channel("bob");
        let alice_seen: Rc<RefCell<Vec<Value>>> = Rc::default();
        let bob_seen: Rc<RefCell<Vec<Value>>> = Rc::default();
        let a_sink = alice_seen.clone();
        let b_sink = bob_seen.clone();
        let _a = alice.subscribe(Box::new(move |v| a_sink.borrow_mut().push(v)), Some("alice"));
        let _b = bob.subscribe(Box::new(move |v| b_sink.borrow_mut().push(v)), Some("bob"));
        alice.publish(&json!({"hello": "from alice"}));
        assert!(alice_seen.borrow().is_empty());
        assert_eq!(bob_seen.borrow().len(), 1);
    }
}
