//! One participant's view of a document: local commits, remote ingest,
//! undo/redo over the local patch sequence, working-copy rebase, serialized
//! file mirroring and cursor presence relay.
//!
//! The session owns its graph for the lifetime between `init()` and
//! `close()`. Everything is single-threaded cooperative: adapter callbacks
//! re-enter the session through `Weak` handles, and every method releases
//! its state borrow before touching adapters or listeners.

use std::cell::RefCell;
use std::fmt::Write as _;
use std::rc::{Rc, Weak};
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::{json, Value};
use thiserror::Error;

use crate::adapters::{FileAdapter, PatchStore, PresenceAdapter, StoreError, Subscription};
use crate::codec::{CodecError, DocCodec, Document};
use crate::graph::{GraphError, HistoryQuery, PatchGraph, ValueQuery};
use crate::patch::Patch;
use crate::patch_id::{generate_client_id, PatchId, PatchIdError};

mod events;
mod file_mirror;
mod presence;
mod working_copy;

pub use events::{ListenerId, SessionEvent};
pub use presence::{CursorEntry, CURSOR_TTL_MS};

use events::Emitter;
use file_mirror::FileMirror;
use presence::{cursor_key, CursorMap};
use working_copy::{rebase_draft, WorkingCopy};

/// Millisecond clock, injectable for tests.
pub type Clock = Rc<dyn Fn() -> i64>;

fn system_clock() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session not initialized")]
    NotInitialized,
    #[error("session already initialized")]
    AlreadyInitialized,
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    PatchId(#[from] PatchIdError),
}

/// Construction options; everything has a sensible default.
#[derive(Default)]
pub struct SessionOptions {
    pub client_id: Option<String>,
    pub user_id: Option<u32>,
    pub doc_id: Option<String>,
    pub clock: Option<Clock>,
    pub file_adapter: Option<Rc<dyn FileAdapter>>,
    pub presence_adapter: Option<Rc<dyn PresenceAdapter>>,
}

#[derive(Debug, Clone, Default)]
pub struct CommitOptions {
    /// Mark the patch as file-originated (participates in file-load dedup).
    pub file: bool,
    pub source: Option<String>,
    pub meta: Option<serde_json::Map<String, Value>>,
}

pub struct Session<C: DocCodec + 'static> {
    core: Rc<SessionCore<C>>,
}

struct SessionCore<C: DocCodec> {
    codec: Rc<C>,
    store: Rc<dyn PatchStore<C::Body>>,
    file: Option<Rc<dyn FileAdapter>>,
    presence: Option<Rc<dyn PresenceAdapter>>,
    client_id: String,
    user_id: Option<u32>,
    doc_id: Option<String>,
    clock: Clock,
    state: RefCell<SessionState<C>>,
    events: Emitter,
    subscriptions: RefCell<Vec<Subscription>>,
    /// Handed to adapter callbacks so they can re-enter the session without
    /// keeping it alive.
    weak_self: Weak<SessionCore<C>>,
}

struct SessionState<C: DocCodec> {
    graph: PatchGraph<C>,
    initialized: bool,
    has_more_history: bool,
    last_encoded_time_ms: i64,
    /// Committed value with undone local patches excluded.
    committed: Option<C::Doc>,
    /// The live (displayed) document: committed state plus any working copy.
    doc: Option<C::Doc>,
    /// Ids of patches committed by this session, in commit order.
    local_times: Vec<PatchId>,
    /// Boundary of the undo region: `local_times[undo_ptr..]` is hidden.
    undo_ptr: usize,
    working_copy: Option<WorkingCopy<C::Doc>>,
    mirror: FileMirror,
    cursors: CursorMap,
}

impl<C: DocCodec + 'static> Session<C> {
    pub fn new(codec: C, store: Rc<dyn PatchStore<C::Body>>, options: SessionOptions) -> Self {
        let codec = Rc::new(codec);
        Self {
            core: Rc::new_cyclic(|weak| SessionCore {
                codec: codec.clone(),
                store,
                file: options.file_adapter,
                presence: options.presence_adapter,
                client_id: options.client_id.unwrap_or_else(generate_client_id),
                user_id: options.user_id,
                doc_id: options.doc_id,
                clock: options.clock.unwrap_or_else(|| Rc::new(system_clock)),
                state: RefCell::new(SessionState {
                    graph: PatchGraph::new(codec),
                    initialized: false,
                    has_more_history: false,
                    last_encoded_time_ms: 0,
                    committed: None,
                    doc: None,
                    local_times: Vec::new(),
                    undo_ptr: 0,
                    working_copy: None,
                    mirror: FileMirror::default(),
                    cursors: CursorMap::default(),
                }),
                events: Emitter::default(),
                subscriptions: RefCell::new(Vec::new()),
                weak_self: weak.clone(),
            }),
        }
    }

    /// Load history, compute the initial document, and wire adapter
    /// subscriptions.
    pub fn init(&self) -> Result<(), SessionError> {
        self.core.init()
    }

    /// Commit a new document state. Local state (graph, undo history, live
    /// doc) reflects the patch before persistence is attempted.
    pub fn commit(
        &self,
        next: C::Doc,
        options: CommitOptions,
    ) -> Result<Patch<C::Body>, SessionError> {
        self.core.commit(next, options)
    }

    /// Commit a snapshot of the current full value at the current heads,
    /// giving replay a floor.
    pub fn commit_snapshot(&self) -> Result<Patch<C::Body>, SessionError> {
        self.core.commit_snapshot()
    }

    /// Ingest a remote envelope (normally driven by the store subscription).
    pub fn apply_remote(&self, envelope: Patch<C::Body>) -> Result<(), SessionError> {
        self.core.apply_remote(envelope)
    }

    /// The live document.
    pub fn get_document(&self) -> Result<C::Doc, SessionError> {
        let state = self.core.state.borrow();
        ensure_init(&state)?;
        state.doc.clone().ok_or(SessionError::NotInitialized)
    }

    pub fn undo(&self) -> Result<C::Doc, SessionError> {
        self.core.shift_undo(-1)
    }

    pub fn redo(&self) -> Result<C::Doc, SessionError> {
        self.core.shift_undo(1)
    }

    pub fn can_undo(&self) -> bool {
        let state = self.core.state.borrow();
        state.undo_ptr > 0
    }

    pub fn can_redo(&self) -> bool {
        let state = self.core.state.borrow();
        state.undo_ptr < state.local_times.len()
    }

    /// Make the current undone state permanent: if the displayed doc differs
    /// from the fully-applied value, commit the difference forward; either
    /// way the redo region is cleared.
    pub fn reset_undo(&self) -> Result<(), SessionError> {
        self.core.reset_undo()
    }

    /// Stage an uncommitted draft; the live doc becomes the draft. No graph
    /// mutation, no persistence.
    pub fn set_working_copy(&self, draft: C::Doc) -> Result<(), SessionError> {
        self.core.set_working_copy(draft)
    }

    /// Drop the staged draft and show the committed document again.
    pub fn clear_working_copy(&self) -> Result<(), SessionError> {
        self.core.clear_working_copy()
    }

    pub fn has_working_copy(&self) -> bool {
        self.core.state.borrow().working_copy.is_some()
    }

    /// Publish this participant's cursor locations and record them locally.
    pub fn update_cursors(&self, locs: Value) -> Result<(), SessionError> {
        self.core.update_cursors(locs)
    }

    /// Snapshot of known cursors, pruning entries older than `ttl_ms`
    /// (default [`CURSOR_TTL_MS`]).
    pub fn cursors(&self, ttl_ms: Option<i64>) -> Vec<CursorEntry> {
        self.core.cursors(ttl_ms)
    }

    pub fn versions(&self) -> Result<Vec<PatchId>, SessionError> {
        let state = self.core.state.borrow();
        ensure_init(&state)?;
        Ok(state.graph.versions(None))
    }

    pub fn value(&self, query: &ValueQuery) -> Result<C::Doc, SessionError> {
        let state = self.core.state.borrow();
        ensure_init(&state)?;
        Ok(state.graph.value(query)?)
    }

    pub fn history(&self, query: &HistoryQuery) -> Result<Vec<Patch<C::Body>>, SessionError> {
        let state = self.core.state.borrow();
        ensure_init(&state)?;
        Ok(state.graph.history(query))
    }

    pub fn get_patch(&self, id: &PatchId) -> Result<Patch<C::Body>, SessionError> {
        let state = self.core.state.borrow();
        ensure_init(&state)?;
        Ok(state.graph.get_patch(id)?.clone())
    }

    /// Human-readable history listing: one line per patch with id, version,
    /// user, wall clock, parents, kind, and the rendered document.
    pub fn summarize_history(&self) -> Result<String, SessionError> {
        self.core.summarize_history()
    }

    pub fn has_more_history(&self) -> bool {
        self.core.state.borrow().has_more_history
    }

    pub fn client_id(&self) -> &str {
        &self.core.client_id
    }

    pub fn on_event(&self, listener: impl FnMut(&SessionEvent) + 'static) -> ListenerId {
        self.core.events.on(listener)
    }

    pub fn off_event(&self, id: ListenerId) -> bool {
        self.core.events.off(id)
    }

    /// Unsubscribe adapters, publish an empty presence, clear listeners and
    /// caches. The session cannot be used afterwards.
    pub fn close(&self) {
        self.core.close();
    }
}

fn ensure_init<C: DocCodec>(state: &SessionState<C>) -> Result<(), SessionError> {
    if state.initialized {
        Ok(())
    } else {
        Err(SessionError::NotInitialized)
    }
}

impl<C: DocCodec + 'static> SessionCore<C> {
    fn init(&self) -> Result<(), SessionError> {
        if self.state.borrow().initialized {
            return Err(SessionError::AlreadyInitialized);
        }
        let load = self.store.load_initial(None)?;
        {
            let mut state = self.state.borrow_mut();
            state.graph.add(load.patches);
            state.has_more_history = load.has_more;
            state.last_encoded_time_ms = state
                .graph
                .versions(None)
                .iter()
                .filter_map(|id| id.decode().ok())
                .map(|d| d.time_ms)
                .max()
                .unwrap_or(0);
            state.initialized = true;
            let committed = state.graph.value(&ValueQuery::default())?;
            if self.file.is_some() {
                state.mirror.persisted = Some(self.codec.to_string(&committed));
            }
            state.doc = Some(committed.clone());
            state.committed = Some(committed);
        }

        let weak = self.weak_self.clone();
        let sub = self.store.subscribe(Box::new(move |envelope| {
            if let Some(core) = weak.upgrade() {
                if let Err(error) = core.apply_remote(envelope) {
                    tracing::warn!(%error, "failed to apply remote patch");
                }
            }
        }));
        self.subscriptions.borrow_mut().push(sub);

        if let Some(presence) = &self.presence {
            let weak = self.weak_self.clone();
            let sub = presence.subscribe(
                Box::new(move |payload| {
                    if let Some(core) = weak.upgrade() {
                        core.on_presence_payload(payload);
                    }
                }),
                Some(&self.client_id),
            );
            self.subscriptions.borrow_mut().push(sub);
        }

        if let Some(file) = &self.file {
            let weak = self.weak_self.clone();
            if let Some(sub) = file.watch(Box::new(move || {
                if let Some(core) = weak.upgrade() {
                    core.handle_file_change();
                }
            })) {
                self.subscriptions.borrow_mut().push(sub);
            }
        }
        Ok(())
    }

    fn commit(
        &self,
        next: C::Doc,
        options: CommitOptions,
    ) -> Result<Patch<C::Body>, SessionError> {
        let envelope = {
            let mut state = self.state.borrow_mut();
            ensure_init(&state)?;
            let base = match &state.working_copy {
                Some(wc) => wc.base.clone(),
                None => state.committed.clone().ok_or(SessionError::NotInitialized)?,
            };
            let body = self.codec.make_patch(&base, &next);
            let id = self.next_patch_id(&mut state)?;
            let mut envelope = Patch::new(id.clone(), body, state.graph.get_heads());
            envelope.wall = Some((self.clock)());
            envelope.user_id = self.user_id;
            envelope.version = Some(state.graph.versions(None).len() as u64 + 1);
            envelope.file = options.file;
            envelope.source = options.source;
            envelope.meta = options.meta;
            state.graph.add(vec![envelope.clone()]);
            state.committed = Some(next);
            state.working_copy = None;
            let ptr = state.undo_ptr;
            state.local_times.truncate(ptr);
            state.local_times.push(id);
            state.undo_ptr = state.local_times.len();
            envelope
        };
        self.sync_doc()?;
        // Fire-and-forget: the local state already reflects the patch.
        if let Err(error) = self.store.append(&envelope) {
            tracing::warn!(%error, "patch store append failed");
        }
        self.publish_presence(json!({ "userId": self.user_id, "time": envelope.wall }));
        Ok(envelope)
    }

    fn commit_snapshot(&self) -> Result<Patch<C::Body>, SessionError> {
        let envelope = {
            let mut state = self.state.borrow_mut();
            ensure_init(&state)?;
            let full = state.graph.value(&ValueQuery::default())?;
            let text = self.codec.to_string(&full);
            let id = self.next_patch_id(&mut state)?;
            let mut envelope = Patch::snapshot(id, text, state.graph.get_heads());
            envelope.wall = Some((self.clock)());
            envelope.user_id = self.user_id;
            envelope.version = Some(state.graph.versions(None).len() as u64 + 1);
            state.graph.add(vec![envelope.clone()]);
            envelope
        };
        self.sync_doc()?;
        if let Err(error) = self.store.append(&envelope) {
            tracing::warn!(%error, "patch store append failed");
        }
        Ok(envelope)
    }

    fn apply_remote(&self, envelope: Patch<C::Body>) -> Result<(), SessionError> {
        let added = {
            let mut state = self.state.borrow_mut();
            if !state.initialized {
                return Ok(());
            }
            if let Ok(decoded) = envelope.id.decode() {
                state.last_encoded_time_ms = state.last_encoded_time_ms.max(decoded.time_ms);
            }
            state.graph.add(vec![envelope.clone()])
        };
        if added > 0 {
            self.sync_doc()?;
            self.events.emit(&SessionEvent::Patch {
                id: envelope.id.clone(),
            });
        }
        Ok(())
    }

    /// `t = max(lastT + 1, clock())`, keeping ids strictly increasing per
    /// client regardless of clock behavior.
    fn next_patch_id(&self, state: &mut SessionState<C>) -> Result<PatchId, SessionError> {
        let now = (self.clock)();
        if now > state.last_encoded_time_ms {
            state.last_encoded_time_ms = now;
        } else {
            state.last_encoded_time_ms += 1;
        }
        Ok(PatchId::encode(state.last_encoded_time_ms, &self.client_id)?)
    }

    /// Recompute the committed and live documents, rebase any working copy,
    /// queue a file write, and announce the change.
    fn sync_doc(&self) -> Result<(), SessionError> {
        let mut file_text = None;
        let changed = {
            let mut state = self.state.borrow_mut();
            if !state.initialized {
                return Ok(());
            }
            let hidden: Vec<PatchId> = state.local_times[state.undo_ptr..].to_vec();
            let committed = state.graph.value(&ValueQuery {
                without_times: hidden,
                ..ValueQuery::default()
            })?;
            state.committed = Some(committed.clone());
            let live = match state.working_copy.take() {
                Some(wc) => {
                    let rebased =
                        rebase_draft(self.codec.as_ref(), &wc.base, &wc.draft, &committed)?;
                    // Both base and draft advance; diffing the stale draft
                    // against the merged base would re-apply the local delta.
                    state.working_copy = Some(WorkingCopy {
                        base: committed,
                        draft: rebased.clone(),
                    });
                    rebased
                }
                None => committed,
            };
            let changed = state.doc.as_ref().map_or(true, |d| !d.is_equal(&live));
            state.doc = Some(live.clone());
            if self.file.is_some() {
                file_text = Some(self.codec.to_string(&live));
            }
            changed
        };
        if let Some(text) = file_text {
            self.queue_file_write(text);
        }
        if changed {
            self.events.emit(&SessionEvent::Change);
        }
        Ok(())
    }

    fn shift_undo(&self, direction: i32) -> Result<C::Doc, SessionError> {
        let ptr = {
            let mut state = self.state.borrow_mut();
            ensure_init(&state)?;
            if direction < 0 {
                state.undo_ptr = state.undo_ptr.saturating_sub(1);
            } else {
                state.undo_ptr = (state.undo_ptr + 1).min(state.local_times.len());
            }
            state.undo_ptr
        };
        self.sync_doc()?;
        self.publish_presence(json!({ "userId": self.user_id, "undoPtr": ptr }));
        let state = self.state.borrow();
        state.doc.clone().ok_or(SessionError::NotInitialized)
    }

    fn reset_undo(&self) -> Result<(), SessionError> {
        let (displayed, full, diverged) = {
            let state = self.state.borrow();
            ensure_init(&state)?;
            let displayed = state.doc.clone().ok_or(SessionError::NotInitialized)?;
            let full = state.graph.value(&ValueQuery::default())?;
            let diverged = !displayed.is_equal(&full);
            (displayed, full, diverged)
        };
        if diverged {
            {
                // Commit the undone state forward: the next patch's base is
                // the fully-applied value, so its body reverses the hidden
                // tail.
                let mut state = self.state.borrow_mut();
                state.working_copy = None;
                state.committed = Some(full);
            }
            self.commit(displayed, CommitOptions::default())?;
        } else {
            let mut state = self.state.borrow_mut();
            state.undo_ptr = state.local_times.len();
        }
        Ok(())
    }

    fn set_working_copy(&self, draft: C::Doc) -> Result<(), SessionError> {
        let changed = {
            let mut state = self.state.borrow_mut();
            ensure_init(&state)?;
            let base = state.committed.clone().ok_or(SessionError::NotInitialized)?;
            let changed = state.doc.as_ref().map_or(true, |d| !d.is_equal(&draft));
            state.working_copy = Some(WorkingCopy {
                base,
                draft: draft.clone(),
            });
            state.doc = Some(draft);
            changed
        };
        if changed {
            self.events.emit(&SessionEvent::Change);
        }
        Ok(())
    }

    fn clear_working_copy(&self) -> Result<(), SessionError> {
        let changed = {
            let mut state = self.state.borrow_mut();
            ensure_init(&state)?;
            state.working_copy = None;
            let committed = state.committed.clone().ok_or(SessionError::NotInitialized)?;
            let changed = state.doc.as_ref().map_or(true, |d| !d.is_equal(&committed));
            state.doc = Some(committed);
            changed
        };
        if changed {
            self.events.emit(&SessionEvent::Change);
        }
        Ok(())
    }

    fn queue_file_write(&self, text: String) {
        if self.file.is_none() {
            return;
        }
        let start = {
            let mut state = self.state.borrow_mut();
            state.mirror.queue(text)
        };
        if start {
            self.flush_file_queue();
        }
    }

    /// Drain the dirty content with at most one write in flight; later
    /// content queued during a write coalesces into the next iteration.
    fn flush_file_queue(&self) {
        let Some(file) = self.file.clone() else {
            return;
        };
        {
            let mut state = self.state.borrow_mut();
            if state.mirror.flushing {
                return;
            }
            state.mirror.flushing = true;
        }
        loop {
            let next = {
                let mut state = self.state.borrow_mut();
                match state.mirror.dirty.take() {
                    Some(content) => {
                        state.mirror.suppress += 1;
                        Some((content, state.mirror.persisted.clone()))
                    }
                    None => {
                        state.mirror.flushing = false;
                        None
                    }
                }
            };
            let Some((content, base)) = next else { break };
            let result = file.write(&content, base.as_deref());
            {
                let mut state = self.state.borrow_mut();
                state.mirror.suppress = state.mirror.suppress.saturating_sub(1);
                if result.is_ok() {
                    state.mirror.persisted = Some(content);
                }
            }
            if let Err(error) = result {
                self.events.emit(&SessionEvent::FileError {
                    message: error.to_string(),
                });
            }
        }
    }

    /// External modification notification from the file adapter.
    fn handle_file_change(&self) {
        {
            let mut state = self.state.borrow_mut();
            if !state.initialized {
                return;
            }
            if state.mirror.suppress > 0 {
                state.mirror.suppress -= 1;
                tracing::debug!("ignoring self-induced file change");
                return;
            }
        }
        let Some(file) = self.file.clone() else {
            return;
        };
        let Ok(content) = file.read() else {
            return;
        };
        let current = {
            let mut state = self.state.borrow_mut();
            // A stray watch event for content this session wrote is not an
            // external edit, whatever the suppression counter says.
            if state.mirror.persisted.as_deref() == Some(content.as_str()) {
                return;
            }
            state.mirror.persisted = Some(content.clone());
            state.doc.clone()
        };
        let doc = self.codec.from_string(&content);
        if let Some(current) = current {
            if doc.is_equal(&current) {
                return;
            }
        }
        // Ingest the external state as a local file-origin commit; errors
        // here are deliberately swallowed.
        let _ = self.commit(
            doc,
            CommitOptions {
                file: true,
                source: Some("file".to_owned()),
                meta: None,
            },
        );
    }

    fn update_cursors(&self, locs: Value) -> Result<(), SessionError> {
        {
            let state = self.state.borrow();
            ensure_init(&state)?;
        }
        let now = (self.clock)();
        let mut payload = json!({
            "type": "cursor",
            "time": now,
            "locs": locs,
            "clientId": self.client_id,
        });
        if let Some(user) = self.user_id {
            payload["userId"] = user.into();
        }
        if let Some(doc_id) = &self.doc_id {
            payload["docId"] = doc_id.clone().into();
        }
        self.publish_presence(payload.clone());
        if let Some(key) = cursor_key(self.user_id, Some(&self.client_id)) {
            let mut state = self.state.borrow_mut();
            state.cursors.merge(CursorEntry {
                key,
                time: now,
                locs: payload["locs"].clone(),
                user_id: self.user_id,
                received_ms: now,
            });
        }
        self.events.emit(&SessionEvent::Cursors);
        Ok(())
    }

    fn cursors(&self, ttl_ms: Option<i64>) -> Vec<CursorEntry> {
        let now = (self.clock)();
        let mut state = self.state.borrow_mut();
        state
            .cursors
            .snapshot(now, ttl_ms.unwrap_or(CURSOR_TTL_MS))
    }

    fn on_presence_payload(&self, payload: Value) {
        let is_cursor = payload.get("type").and_then(Value::as_str) == Some("cursor");
        if !is_cursor {
            self.events.emit(&SessionEvent::Presence { payload });
            return;
        }
        if payload.get("docId").and_then(Value::as_str) != self.doc_id.as_deref() {
            return;
        }
        let user_id = payload
            .get("userId")
            .and_then(Value::as_u64)
            .map(|u| u as u32);
        let client_id = payload.get("clientId").and_then(Value::as_str);
        let Some(key) = cursor_key(user_id, client_id) else {
            return;
        };
        let now = (self.clock)();
        let time = payload.get("time").and_then(Value::as_i64).unwrap_or(now);
        let locs = payload.get("locs").cloned().unwrap_or(Value::Null);
        {
            let mut state = self.state.borrow_mut();
            if !state.initialized {
                return;
            }
            state.cursors.merge(CursorEntry {
                key,
                time,
                locs,
                user_id,
                received_ms: now,
            });
        }
        self.events.emit(&SessionEvent::Cursors);
    }

    fn summarize_history(&self) -> Result<String, SessionError> {
        let state = self.state.borrow();
        ensure_init(&state)?;
        let patches = state.graph.history(&HistoryQuery {
            include_snapshots: true,
            ..HistoryQuery::default()
        });
        let mut out = String::new();
        for patch in patches {
            let rendered = self
                .codec
                .to_string(&state.graph.value(&ValueQuery::at(patch.id.clone()))?);
            let version = patch
                .version
                .map(|v| v.to_string())
                .unwrap_or_else(|| "-".to_owned());
            let user = patch
                .user_id
                .map(|u| u.to_string())
                .unwrap_or_else(|| "-".to_owned());
            let wall = patch
                .wall
                .map(|w| w.to_string())
                .unwrap_or_else(|| "-".to_owned());
            let parents = patch
                .parents
                .iter()
                .map(PatchId::as_str)
                .collect::<Vec<_>>()
                .join(",");
            let kind = if patch.is_snapshot { "snapshot" } else { "patch" };
            let _ = writeln!(
                out,
                "{} v{} user={} wall={} parents=[{}] {} {}",
                patch.id,
                version,
                user,
                wall,
                parents,
                kind,
                truncate_middle(&rendered, 80)
            );
        }
        Ok(out)
    }

    fn publish_presence(&self, payload: Value) {
        if let Some(presence) = &self.presence {
            presence.publish(&payload);
        }
    }

    fn close(&self) {
        self.publish_presence(Value::Null);
        for sub in self.subscriptions.borrow_mut().drain(..) {
            sub.unsubscribe();
        }
        self.events.clear();
        let mut state = self.state.borrow_mut();
        state.initialized = false;
        state.graph.clear_caches();
    }
}

/// Shorten `text` to at most `max` characters, eliding the middle.
fn truncate_middle(text: &str, max: usize) -> String {
    let flat: String = text
        .chars()
        .map(|c| if c == '\n' { '\u{23ce}' } else { c })
        .collect();
    let count = flat.chars().count();
    if count <= max {
        return flat;
    }
    let head = max.saturating_sub(1) / 2;
    let tail = max.saturating_sub(1) - head;
    let start: String = flat.chars().take(head).collect();
    let end: String = flat.chars().skip(count - tail).collect();
    format!("{start}\u{2026}{end}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_middle_elides_long_text() {
        assert_eq!(truncate_middle("short", 10), "short");
        let long: String = "x".repeat(100);
        let out = truncate_middle(&long, 21);
        assert_eq!(out.chars().count(), 21);
        assert!(out.contains('\u{2026}'));
    }
}
