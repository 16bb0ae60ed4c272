//! External collaborator interfaces: persistence, file mirroring, presence.
//!
//! The core is transport- and storage-agnostic; concrete adapters implement
//! these object-safe traits. Everything is single-threaded cooperative:
//! callbacks are plain boxed closures and subscriptions are RAII handles
//! whose drop unsubscribes.

use serde_json::Value;
use thiserror::Error;

use crate::patch::Patch;
use crate::patch_id::PatchId;

pub mod memory;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("patch store i/o: {0}")]
    Io(String),
    #[error("corrupt patch envelope: {0}")]
    Corrupt(String),
}

#[derive(Debug, Error)]
pub enum FileError {
    #[error("file i/o: {0}")]
    Io(String),
}

/// Result of [`PatchStore::load_initial`].
#[derive(Debug, Clone)]
pub struct InitialLoad<B> {
    pub patches: Vec<Patch<B>>,
    /// Whether older history exists beyond what was returned.
    pub has_more: bool,
}

pub type EnvelopeCallback<B> = Box<dyn Fn(Patch<B>)>;
pub type PresenceCallback = Box<dyn Fn(Value)>;
pub type FileChangeCallback = Box<dyn Fn()>;

/// Persistence and delivery of patch envelopes.
///
/// Stores may redeliver (the graph dedups by id) but must deliver a patch's
/// ancestry before the patch itself, or report `has_more` from the initial
/// load.
pub trait PatchStore<B> {
    fn load_initial(&self, since: Option<&PatchId>) -> Result<InitialLoad<B>, StoreError>;

    /// Persist one envelope. May complete after the caller has already
    /// ingested the patch locally.
    fn append(&self, envelope: &Patch<B>) -> Result<(), StoreError>;

    fn subscribe(&self, on_envelope: EnvelopeCallback<B>) -> Subscription;
}

/// A mirrored file. The core is the single writer; watch callbacks report
/// external modifications.
pub trait FileAdapter {
    /// Current content; empty string when the file is missing.
    fn read(&self) -> Result<String, FileError>;

    fn write(&self, content: &str, base: Option<&str>) -> Result<(), FileError>;

    /// Subscribe to external changes, when the adapter supports watching.
    fn watch(&self, on_change: FileChangeCallback) -> Option<Subscription> {
        let _ = on_change;
        None
    }
}

/// Ephemeral presence fan-out. No ordering or delivery guarantees.
pub trait PresenceAdapter {
    fn publish(&self, state: &Value);

    /// `client_id` identifies the subscriber so its own messages can be
    /// excluded.
    fn subscribe(&self, on_state: PresenceCallback, client_id: Option<&str>) -> Subscription;
}

/// RAII unsubscriber returned by `subscribe`. Dropping it (or calling
/// [`Subscription::unsubscribe`]) detaches the callback.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}
