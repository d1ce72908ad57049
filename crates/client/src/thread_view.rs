// crates/client/src/thread_view.rs
//! Per-thread read/unread reconciliation.
//!
//! New content must never reflow what the user is already looking at: a
//! `file_change` push triggers a refetch, and every message the client has
//! not seen before lands in `unread` until the user explicitly reveals it.
//! The partition is keyed purely by message uuid, so reconnect-and-refetch
//! (or a duplicated delta) cannot desynchronize the view.
//!
//! The first two messages of a thread are a pinned, always-visible prefix
//! held outside the `{read, unread}` partition: they are shown eagerly on
//! first load and never counted as unread.

use std::collections::{HashMap, HashSet};

use chattail_core::Message;

/// Number of leading messages that are always visible.
const ALWAYS_VISIBLE: usize = 2;

/// Read/unread view state for one open thread.
#[derive(Debug, Clone, Default)]
pub struct ThreadView {
    thread_id: String,
    pinned: Vec<Message>,
    read: Vec<Message>,
    unread: Vec<Message>,
    known: HashSet<String>,
}

impl ThreadView {
    /// Initial full load: the pinned prefix plus everything else straight
    /// into `read`. Nothing starts unread.
    pub fn load(thread_id: impl Into<String>, messages: &[Message]) -> Self {
        let mut view = Self {
            thread_id: thread_id.into(),
            ..Self::default()
        };
        for (idx, msg) in messages.iter().enumerate() {
            if !view.known.insert(msg.uuid.clone()) {
                continue;
            }
            if idx < ALWAYS_VISIBLE {
                view.pinned.push(msg.clone());
            } else {
                view.read.push(msg.clone());
            }
        }
        view
    }

    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    /// Merge a freshly fetched message set into the view.
    ///
    /// Unknown uuids beyond the pinned prefix go to `unread`; known uuids are
    /// ignored, so applying the same delta twice is a no-op. A thread that
    /// loaded with fewer than two messages grows its pinned prefix first.
    pub fn apply_delta(&mut self, fetched: &[Message]) {
        for (idx, msg) in fetched.iter().enumerate() {
            if self.known.contains(&msg.uuid) {
                continue;
            }
            self.known.insert(msg.uuid.clone());
            if idx < ALWAYS_VISIBLE && self.pinned.len() < ALWAYS_VISIBLE {
                self.pinned.push(msg.clone());
            } else {
                self.unread.push(msg.clone());
            }
        }
    }

    /// Disclose all pending messages. The only transition that changes what
    /// `visible` renders.
    pub fn reveal(&mut self) {
        self.read.append(&mut self.unread);
    }

    /// Messages currently rendered, in order: pinned prefix then `read`.
    pub fn visible(&self) -> impl Iterator<Item = &Message> {
        self.pinned.iter().chain(self.read.iter())
    }

    pub fn read(&self) -> &[Message] {
        &self.read
    }

    pub fn unread(&self) -> &[Message] {
        &self.unread
    }

    /// Pending-disclosure count shown as the thread's unread badge.
    pub fn unread_count(&self) -> usize {
        self.unread.len()
    }
}

/// The per-client set of open thread views.
///
/// Routes deltas by thread id; a delta for a never-seen thread falls back to
/// the initial-load path.
#[derive(Debug, Default)]
pub struct ThreadViews {
    views: HashMap<String, ThreadView>,
}

impl ThreadViews {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, thread_id: &str) -> Option<&ThreadView> {
        self.views.get(thread_id)
    }

    /// Apply a refetched message set for `thread_id`, loading the thread
    /// first if this client has never seen it.
    pub fn apply_delta(&mut self, thread_id: &str, fetched: &[Message]) -> usize {
        match self.views.get_mut(thread_id) {
            Some(view) => {
                view.apply_delta(fetched);
                view.unread_count()
            }
            None => {
                let view = ThreadView::load(thread_id, fetched);
                let count = view.unread_count();
                self.views.insert(thread_id.to_string(), view);
                count
            }
        }
    }

    pub fn reveal(&mut self, thread_id: &str) {
        if let Some(view) = self.views.get_mut(thread_id) {
            view.reveal();
        }
    }

    pub fn total_unread(&self) -> usize {
        self.views.values().map(ThreadView::unread_count).sum()
    }
}
