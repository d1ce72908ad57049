// crates/server/src/state.rs
//! Application state for the Axum server.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::hub::EventHub;
use crate::notifications::NotificationStore;
use crate::store::ThreadStore;

/// Runtime configuration, resolved once at startup from the CLI.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Root directories holding `{project}/{session}.jsonl` trees.
    pub roots: Vec<PathBuf>,
    /// Quiet period a file must hold before it is re-read.
    pub debounce: Duration,
    /// Window within which identical hook deliveries collapse.
    pub dedup_window: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            roots: default_roots(),
            debounce: Duration::from_millis(500),
            dedup_window: Duration::from_secs(5),
        }
    }
}

/// Default watch root: `~/.chattail/projects`.
pub fn default_roots() -> Vec<PathBuf> {
    dirs::home_dir()
        .map(|home| vec![home.join(".chattail").join("projects")])
        .unwrap_or_default()
}

/// Shared application state accessible from all route handlers and the
/// watcher task.
pub struct AppState {
    /// Server start time for uptime tracking.
    pub start_time: Instant,
    pub config: ServerConfig,
    /// Authoritative in-memory thread set (single writer: the watcher).
    pub threads: ThreadStore,
    /// Per-project notification partitions.
    pub notifications: NotificationStore,
    /// Live subscriber connections.
    pub hub: EventHub,
}

impl AppState {
    /// Create a new application state wrapped in an Arc for sharing.
    pub fn new(config: ServerConfig) -> Arc<Self> {
        Arc::new(Self {
            start_time: Instant::now(),
            notifications: NotificationStore::new(config.dedup_window),
            threads: ThreadStore::new(),
            hub: EventHub::new(),
            config,
        })
    }

    /// Get the server uptime in seconds.
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_starts_empty() {
        let state = AppState::new(ServerConfig::default());
        assert!(state.uptime_secs() < 1);
        assert_eq!(state.hub.connection_count(), 0);
        assert_eq!(state.notifications.stats().0, 0);
    }

    #[test]
    fn test_config_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.debounce, Duration::from_millis(500));
        assert_eq!(config.dedup_window, Duration::from_secs(5));
    }
}
