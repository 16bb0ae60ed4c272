//! Session event stream.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;

use serde_json::Value;

use crate::patch_id::PatchId;

pub type ListenerId = u64;

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The live document changed.
    Change,
    /// A new remote patch was ingested.
    Patch { id: PatchId },
    /// The cursor map changed.
    Cursors,
    /// A non-cursor presence payload arrived.
    Presence { payload: Value },
    /// A file mirror write failed; the queue continues.
    FileError { message: String },
}

type Listener = Rc<RefCell<dyn FnMut(&SessionEvent)>>;

/// Listener registry with re-entrancy-safe emission: the callback list is
/// snapshotted before invoking, so a listener may subscribe or unsubscribe
/// from inside its own callback.
#[derive(Default)]
pub(crate) struct Emitter {
    listeners: RefCell<BTreeMap<ListenerId, Listener>>,
    next_id: Cell<ListenerId>,
}

impl Emitter {
    pub(crate) fn on(&self, listener: impl FnMut(&SessionEvent) + 'static) -> ListenerId {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        self.listeners
            .borrow_mut()
            .insert(id, Rc::new(RefCell::new(listener)));
        id
    }

    pub(crate) fn off(&self, id: ListenerId) -> bool {
        self.listeners.borrow_mut().remove(&id).is_some()
    }

    pub(crate) fn emit(&self, event: &SessionEvent) {
        let listeners: Vec<Listener> = self.listeners.borrow().values().cloned().collect();
        for listener in listeners {
            (&mut *listener.borrow_mut())(event);
        }
    }

    pub(crate) fn clear(&self) {
        self.listeners.borrow_mut().clear();
    }
}
