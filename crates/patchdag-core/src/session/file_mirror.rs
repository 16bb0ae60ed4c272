//! File mirror write-queue state.
//!
//! The session is the file's single writer: at most one write runs at a
//! time, newer content coalesces into `dirty` while a flush is underway, and
//! `suppress` counts self-induced watch events still expected from the
//! adapter.

#[derive(Default)]
pub(crate) struct FileMirror {
    /// Last content successfully written.
    pub(crate) persisted: Option<String>,
    /// Next desired content, if any.
    pub(crate) dirty: Option<String>,
    /// Watch events to ignore because this session caused them.
    pub(crate) suppress: u32,
    /// Whether a flush loop is currently draining the queue.
    pub(crate) flushing: bool,
}

impl FileMirror {
    /// Stage `text` for writing. Returns whether the caller should start a
    /// flush (false when one is already running or nothing changed).
    pub(crate) fn queue(&mut self, text: String) -> bool {
        if self.dirty.is_none() && self.persisted.as_deref() == Some(text.as_str()) {
            return false;
        }
        self.dirty = Some(text);
        !self.flushing
    }
}
