// crates/core/src/grouper.rs
//! Groups one project's messages into ordered conversation threads.
//!
//! A thread starts at a user message and is identified by that message's uuid
//! for the life of the process. Grouping is driven by two links carried in the
//! log records:
//!
//! - `parentUuid` ties a continuation record (e.g. a tool-result turn) to the
//!   message it answers, so such a user record extends the thread instead of
//!   starting a new one.
//! - `parentSessionId` on the first record of a new session file attaches the
//!   whole session to the thread the parent session last touched, flagged via
//!   `is_continuation_session` rather than silently merged.
//!
//! Already-seen uuids are ignored, which makes ingestion idempotent: the
//! watcher can re-feed overlapping reads (after truncation, catch-up scans)
//! without duplicating messages or splitting threads.

use std::collections::{HashMap, HashSet};

use tracing::warn;

use crate::types::{Message, Role, Thread};

/// Per-project thread grouping state.
pub struct ThreadGrouper {
    project_id: String,
    threads: HashMap<String, Thread>,
    /// Thread ids in creation order, for stable snapshots.
    order: Vec<String>,
    /// message uuid -> owning thread id
    by_uuid: HashMap<String, String>,
    /// session id -> thread id the session's messages currently flow into
    session_thread: HashMap<String, String>,
    seen: HashSet<String>,
}

impl ThreadGrouper {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            threads: HashMap::new(),
            order: Vec::new(),
            by_uuid: HashMap::new(),
            session_thread: HashMap::new(),
            seen: HashSet::new(),
        }
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn thread(&self, id: &str) -> Option<&Thread> {
        self.threads.get(id)
    }

    /// Snapshot of all threads in creation order.
    pub fn threads(&self) -> Vec<Thread> {
        self.order
            .iter()
            .filter_map(|id| self.threads.get(id))
            .cloned()
            .collect()
    }

    /// Feed newly read messages into the grouping state.
    ///
    /// Returns the ids of threads that were created or extended, in
    /// first-touch order. Messages whose uuid has been seen before are
    /// ignored.
    pub fn ingest(&mut self, messages: &[Message]) -> Vec<String> {
        let mut changed: Vec<String> = Vec::new();

        for msg in messages {
            if self.seen.contains(&msg.uuid) {
                continue;
            }

            let thread_id = match self.resolve_thread(msg) {
                Some(id) => id,
                None => {
                    warn!(
                        project_id = %self.project_id,
                        uuid = %msg.uuid,
                        session_id = %msg.session_id,
                        "Dropping orphan assistant message with no resolvable thread"
                    );
                    continue;
                }
            };

            let thread = self
                .threads
                .get_mut(&thread_id)
                .expect("resolved thread id always exists");
            thread.messages.push(msg.clone());
            if !thread.session_ids.contains(&msg.session_id) {
                thread.session_ids.push(msg.session_id.clone());
            }

            self.seen.insert(msg.uuid.clone());
            self.by_uuid.insert(msg.uuid.clone(), thread_id.clone());
            self.session_thread
                .insert(msg.session_id.clone(), thread_id.clone());
            if !changed.contains(&thread_id) {
                changed.push(thread_id);
            }
        }

        changed
    }

    /// Decide which thread a message belongs to, creating one if the message
    /// opens a new conversation. Returns `None` only for orphan assistant
    /// records.
    fn resolve_thread(&mut self, msg: &Message) -> Option<String> {
        // A record whose parent message is already grouped continues that
        // thread, whatever its role.
        if let Some(parent) = &msg.parent_uuid {
            if let Some(tid) = self.by_uuid.get(parent) {
                return Some(tid.clone());
            }
        }

        match msg.role {
            Role::User => {
                // First record of a continuation session: attach to the
                // thread the parent session last touched.
                if !self.session_thread.contains_key(&msg.session_id) {
                    if let Some(tid) = msg
                        .parent_session_id
                        .as_ref()
                        .and_then(|ps| self.session_thread.get(ps))
                        .cloned()
                    {
                        if let Some(thread) = self.threads.get_mut(&tid) {
                            thread.is_continuation_session = true;
                        }
                        return Some(tid);
                    }
                }
                // Otherwise this user message opens a new thread.
                Some(self.create_thread(msg))
            }
            Role::Assistant => {
                // Fall back to the thread its session is flowing into.
                self.session_thread.get(&msg.session_id).cloned()
            }
        }
    }

    fn create_thread(&mut self, first: &Message) -> String {
        let id = first.uuid.clone();
        self.threads.insert(
            id.clone(),
            Thread {
                id: id.clone(),
                project_id: self.project_id.clone(),
                messages: Vec::new(),
                session_ids: Vec::new(),
                is_continuation_session: false,
            },
        );
        self.order.push(id.clone());
        id
    }
}
