// crates/server/src/store.rs
//! In-memory thread state, fed by the file watcher.
//!
//! The store owns one [`LogReader`] per session file and one
//! [`ThreadGrouper`] per project. Only the watcher task calls `apply_file`;
//! everyone else reads cloned snapshots, so the thread set has exactly one
//! writer.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tokio::sync::RwLock;
use tracing::error;

use chattail_core::{LogReader, ParseError, Thread, ThreadGrouper};

#[derive(Default)]
struct Inner {
    readers: HashMap<PathBuf, LogReader>,
    groupers: HashMap<String, ThreadGrouper>,
}

/// Shared thread state keyed by project.
#[derive(Default)]
pub struct ThreadStore {
    inner: RwLock<Inner>,
}

impl ThreadStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-read one session file from its stored offset and group any new
    /// messages.
    ///
    /// Returns the project id when new messages were grouped, `None` when the
    /// read produced nothing new. The blocking file read runs on the blocking
    /// pool so a slow disk never stalls event delivery elsewhere.
    pub async fn apply_file(&self, path: &Path) -> Result<Option<String>, ParseError> {
        let mut reader = {
            let mut inner = self.inner.write().await;
            inner
                .readers
                .remove(path)
                .unwrap_or_else(|| LogReader::new(path.to_path_buf()))
        };

        let (reader, result) = match tokio::task::spawn_blocking(move || {
            let result = reader.read_new();
            (reader, result)
        })
        .await
        {
            Ok(pair) => pair,
            Err(e) => {
                // The reader is lost with the panicked task; the next event
                // re-reads from offset 0 and grouping dedups by uuid.
                error!(path = %path.display(), error = %e, "Log read task panicked");
                return Ok(None);
            }
        };

        let mut inner = self.inner.write().await;
        let project_id = reader.project_id().to_string();
        inner.readers.insert(path.to_path_buf(), reader);

        let messages = result?;
        if messages.is_empty() {
            return Ok(None);
        }

        let grouper = inner
            .groupers
            .entry(project_id.clone())
            .or_insert_with(|| ThreadGrouper::new(project_id.clone()));
        let changed = grouper.ingest(&messages);

        Ok((!changed.is_empty()).then_some(project_id))
    }

    /// Forget the reader for a removed file. Grouped threads stay; the
    /// thread set never shrinks during a process lifetime.
    pub async fn forget_file(&self, path: &Path) {
        self.inner.write().await.readers.remove(path);
    }

    /// Snapshot one project's threads, in creation order.
    pub async fn project_threads(&self, project_id: &str) -> Vec<Thread> {
        self.inner
            .read()
            .await
            .groupers
            .get(project_id)
            .map(|g| g.threads())
            .unwrap_or_default()
    }

    /// Snapshot every project's threads.
    pub async fn all_threads(&self) -> Vec<Thread> {
        let inner = self.inner.read().await;
        let mut projects: Vec<&String> = inner.groupers.keys().collect();
        projects.sort();
        projects
            .into_iter()
            .flat_map(|p| inner.groupers[p].threads())
            .collect()
    }

    /// Project ids with at least one thread, sorted.
    pub async fn projects(&self) -> Vec<String> {
        let inner = self.inner.read().await;
        let mut projects: Vec<String> = inner.groupers.keys().cloned().collect();
        projects.sort();
        projects
    }
}
