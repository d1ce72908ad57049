// crates/server/src/watcher.rs
//! File system watcher for session log files.
//!
//! Watches every configured root recursively and forwards create/modify
//! events for `{project}/{session}.jsonl` files (exactly two path components
//! below a root; deeper attachments and non-jsonl files are ignored) into a
//! debouncer. Each path holds a restartable deadline: another write within
//! the debounce window pushes the deadline back instead of stacking a second
//! re-read, so a burst of appends to one file produces one `file_change`.
//!
//! A root that is missing or vanishes is a warning, never a crash; remaining
//! roots keep working. If the bridge channel overflows, a drop counter
//! triggers a catch-up scan. Offsets live in the thread store, so a dropped
//! event delays data but cannot lose it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use chattail_core::{ParseError, UpdateEvent};

use crate::state::AppState;

/// Events forwarded from the notify callback, pre-filtered to session logs.
#[derive(Debug, Clone)]
pub enum FileEvent {
    Modified(PathBuf),
    Removed(PathBuf),
}

/// True for paths shaped `{root}/{project}/{session}.jsonl`.
fn is_session_log(path: &Path, roots: &[PathBuf]) -> bool {
    if path.extension().map(|ext| ext == "jsonl") != Some(true) {
        return false;
    }
    roots.iter().any(|root| {
        path.strip_prefix(root)
            .map(|rel| rel.components().count() == 2)
            .unwrap_or(false)
    })
}

/// Start a notify watcher over `roots`.
///
/// Filtered events are sent through `tx`; sends that fail because the channel
/// is full bump the returned drop counter. The watcher handle must be kept
/// alive for the duration of monitoring.
pub fn start_watcher(
    tx: mpsc::Sender<FileEvent>,
    roots: Vec<PathBuf>,
) -> notify::Result<(RecommendedWatcher, Arc<AtomicU64>)> {
    let dropped_events = Arc::new(AtomicU64::new(0));
    let dropped_counter = dropped_events.clone();
    let filter_roots = roots.clone();

    let mut watcher = notify::recommended_watcher(move |res: Result<notify::Event, notify::Error>| {
        match res {
            Ok(event) => {
                let paths: Vec<PathBuf> = event
                    .paths
                    .into_iter()
                    .filter(|p| is_session_log(p, &filter_roots))
                    .collect();

                for path in paths {
                    let file_event = match event.kind {
                        EventKind::Remove(_) => FileEvent::Removed(path),
                        EventKind::Modify(_) | EventKind::Create(_) => FileEvent::Modified(path),
                        _ => continue,
                    };
                    if tx.try_send(file_event).is_err() {
                        let count = dropped_counter.fetch_add(1, Ordering::Relaxed) + 1;
                        if count == 1 || count % 100 == 0 {
                            warn!(
                                dropped_total = count,
                                "Watcher channel full; event dropped (catch-up scan will recover)"
                            );
                        }
                    }
                }
            }
            Err(e) => {
                error!(error = %e, "File watcher error");
            }
        }
    })?;

    for root in &roots {
        if !root.exists() {
            warn!(root = %root.display(), "Watch root does not exist; skipping");
            continue;
        }
        // One bad root must not take down the others.
        match watcher.watch(root, RecursiveMode::Recursive) {
            Ok(()) => info!(root = %root.display(), "Watching for session log changes"),
            Err(e) => warn!(root = %root.display(), error = %e, "Failed to watch root; skipping"),
        }
    }

    Ok((watcher, dropped_events))
}

/// Scan every root for existing session logs: direct `.jsonl` children of
/// each project directory, nothing deeper.
pub fn initial_scan(roots: &[PathBuf]) -> Vec<PathBuf> {
    let mut found = Vec::new();
    for root in roots {
        if !root.exists() {
            warn!(root = %root.display(), "Watch root missing during scan");
            continue;
        }
        for entry in walkdir::WalkDir::new(root)
            .min_depth(2)
            .max_depth(2)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if entry.file_type().is_file()
                && path.extension().and_then(|e| e.to_str()) == Some("jsonl")
            {
                found.push(path.to_path_buf());
            }
        }
    }
    found.sort();
    found
}

/// Run the watch/debounce/re-read loop until the process exits.
///
/// Spawned once from `main`; the only writer of the thread store.
pub async fn run(state: Arc<AppState>) {
    let roots = state.config.roots.clone();
    let debounce = state.config.debounce;

    // Seed the thread store with whatever is already on disk.
    let scanned = {
        let scan_roots = roots.clone();
        tokio::task::spawn_blocking(move || initial_scan(&scan_roots))
            .await
            .unwrap_or_default()
    };
    info!(files = scanned.len(), "Initial scan complete");
    for path in &scanned {
        process_path(&state, path).await;
    }

    let (tx, mut rx) = mpsc::channel::<FileEvent>(512);
    let (_watcher, dropped_events) = match start_watcher(tx, roots.clone()) {
        Ok(pair) => pair,
        Err(e) => {
            error!(error = %e, "Failed to start file watcher; live updates disabled");
            return;
        }
    };

    let mut pending: HashMap<PathBuf, Instant> = HashMap::new();
    let mut seen_drops = 0u64;

    loop {
        let next_deadline = pending.values().min().copied();

        tokio::select! {
            maybe = rx.recv() => {
                match maybe {
                    Some(FileEvent::Modified(path)) => {
                        // Restart, never stack: a new write within the window
                        // pushes the deadline back.
                        pending.insert(path, Instant::now() + debounce);
                    }
                    Some(FileEvent::Removed(path)) => {
                        pending.remove(&path);
                        state.threads.forget_file(&path).await;
                        debug!(path = %path.display(), "Session log removed");
                    }
                    None => break,
                }
            }
            _ = async {
                match next_deadline {
                    Some(deadline) => tokio::time::sleep_until(deadline).await,
                    None => std::future::pending::<()>().await,
                }
            } => {
                let now = Instant::now();
                let due: Vec<PathBuf> = pending
                    .iter()
                    .filter(|(_, deadline)| **deadline <= now)
                    .map(|(path, _)| path.clone())
                    .collect();
                for path in due {
                    pending.remove(&path);
                    process_path(&state, &path).await;
                }
            }
        }

        // Channel overflow since last check: schedule a catch-up scan of
        // everything, debounced like any other event.
        let drops = dropped_events.load(Ordering::Relaxed);
        if drops > seen_drops {
            seen_drops = drops;
            info!(dropped_total = drops, "Scheduling catch-up scan after dropped events");
            let scan_roots = roots.clone();
            let paths = tokio::task::spawn_blocking(move || initial_scan(&scan_roots))
                .await
                .unwrap_or_default();
            let deadline = Instant::now() + debounce;
            for path in paths {
                pending.entry(path).or_insert(deadline);
            }
        }
    }
}

/// Re-read one file and broadcast `file_change` if its project gained
/// messages.
async fn process_path(state: &Arc<AppState>, path: &Path) {
    match state.threads.apply_file(path).await {
        Ok(Some(project_id)) => {
            debug!(project_id = %project_id, path = %path.display(), "New messages grouped");
            state.hub.broadcast(&UpdateEvent::FileChange { project_id });
        }
        Ok(None) => {}
        Err(ParseError::NotFound { .. }) => {
            // Deleted between the event and the read.
            debug!(path = %path.display(), "Session log vanished before read");
            state.threads.forget_file(path).await;
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to re-read session log");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ServerConfig;
    use std::io::Write;

    #[test]
    fn test_is_session_log_depth_filtering() {
        let roots = vec![PathBuf::from("/data/projects")];

        // {project}/{session}.jsonl passes.
        assert!(is_session_log(
            Path::new("/data/projects/proj/session.jsonl"),
            &roots
        ));

        // Deeper attachments are ignored.
        assert!(!is_session_log(
            Path::new("/data/projects/proj/session/attachments/blob.jsonl"),
            &roots
        ));
        // Files directly under a root are ignored.
        assert!(!is_session_log(Path::new("/data/projects/stray.jsonl"), &roots));
        // Non-jsonl files are ignored.
        assert!(!is_session_log(
            Path::new("/data/projects/proj/notes.txt"),
            &roots
        ));
        // Paths outside every root are ignored.
        assert!(!is_session_log(Path::new("/tmp/session.jsonl"), &roots));
    }

    #[test]
    fn test_initial_scan_finds_only_session_logs() {
        let tmp = tempfile::tempdir().unwrap();
        let project = tmp.path().join("demo");
        std::fs::create_dir_all(project.join("s1")).unwrap();
        std::fs::write(project.join("s1.jsonl"), "").unwrap();
        std::fs::write(project.join("notes.md"), "").unwrap();
        std::fs::write(project.join("s1").join("nested.jsonl"), "").unwrap();

        let found = initial_scan(&[tmp.path().to_path_buf()]);
        assert_eq!(found, vec![project.join("s1.jsonl")]);
    }

    #[test]
    fn test_initial_scan_missing_root_is_empty_not_error() {
        let found = initial_scan(&[PathBuf::from("/definitely/not/here")]);
        assert!(found.is_empty());
    }

    fn record_line(uuid: &str, role: &str) -> String {
        format!(
            r#"{{"uuid":"{uuid}","type":"{role}","content":"c","timestamp":"2024-01-01T00:00:00Z","sessionId":"s1"}}"#
        )
    }

    #[tokio::test]
    async fn test_process_path_broadcasts_file_change_once() {
        let tmp = tempfile::tempdir().unwrap();
        let project_dir = tmp.path().join("demo");
        std::fs::create_dir_all(&project_dir).unwrap();
        let path = project_dir.join("s1.jsonl");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "{}", record_line("u1", "user")).unwrap();

        let state = AppState::new(ServerConfig {
            roots: vec![tmp.path().to_path_buf()],
            ..ServerConfig::default()
        });
        let (_id, mut rx) = state.hub.register();

        process_path(&state, &path).await;
        assert_eq!(
            rx.recv().await.unwrap(),
            UpdateEvent::FileChange {
                project_id: "demo".into()
            }
        );

        // Unchanged file: no second event.
        process_path(&state, &path).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_process_path_missing_file_does_not_broadcast() {
        let tmp = tempfile::tempdir().unwrap();
        let state = AppState::new(ServerConfig {
            roots: vec![tmp.path().to_path_buf()],
            ..ServerConfig::default()
        });
        let (_id, mut rx) = state.hub.register();

        process_path(&state, &tmp.path().join("demo").join("gone.jsonl")).await;
        assert!(rx.try_recv().is_err());
    }
}
