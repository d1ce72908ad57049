// crates/server/src/notifications.rs
//! Notification intake, dedup, and the in-memory notification store.
//!
//! The store is partitioned by project. Every mutation for a project runs
//! under that partition's mutex (single-writer discipline, so unread
//! counters can never race) while intake for different projects proceeds
//! independently. Aggregate unread counts live in a side map updated under
//! the owning partition's lock (lock order is always partition → stats, never
//! the reverse).
//!
//! Mutations broadcast their events through the [`EventHub`] while the
//! partition lock is still held, so per-project event order matches mutation
//! order. Notifications live for the process lifetime only; history is
//! re-derived from the log files, not from this store.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

use chattail_core::{Notification, NotificationKind, UpdateEvent};

use crate::hub::EventHub;

/// Rejection reasons for a hook payload.
#[derive(Debug, Error)]
pub enum IntakeError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("unknown notification type: {0}")]
    UnknownKind(String),
}

/// Result of one intake call.
#[derive(Debug)]
pub enum IntakeOutcome {
    Stored(Notification),
    /// A notification with the same dedup key arrived within the window.
    Duplicate,
}

/// Identity used to collapse repeated hook deliveries.
///
/// An explicit idempotency token from the hook wins; otherwise the key is
/// derived from the payload fields with the timestamp floored to the second.
/// Any field difference makes a distinct key, so dedup errs toward keeping
/// events.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum DedupKey {
    Token(String),
    Derived {
        kind: NotificationKind,
        tool_name: Option<String>,
        notification: Option<String>,
        second: i64,
    },
}

#[derive(Default)]
struct Partition {
    notifications: Vec<Notification>,
    /// Dedup keys seen recently, with their arrival time.
    recent: HashMap<DedupKey, DateTime<Utc>>,
}

/// In-memory notification store, partitioned per project.
pub struct NotificationStore {
    dedup_window: Duration,
    partitions: RwLock<HashMap<String, Arc<Mutex<Partition>>>>,
    /// Aggregate unread counters, only mutated under an owning partition's
    /// lock. Zero entries are pruned.
    unread: std::sync::Mutex<BTreeMap<String, u64>>,
}

impl NotificationStore {
    pub fn new(dedup_window: std::time::Duration) -> Self {
        Self {
            dedup_window: Duration::from_std(dedup_window)
                .unwrap_or_else(|_| Duration::seconds(5)),
            partitions: RwLock::new(HashMap::new()),
            unread: std::sync::Mutex::new(BTreeMap::new()),
        }
    }

    async fn partition(&self, project_id: &str) -> Arc<Mutex<Partition>> {
        if let Some(p) = self.partitions.read().await.get(project_id) {
            return p.clone();
        }
        self.partitions
            .write()
            .await
            .entry(project_id.to_string())
            .or_default()
            .clone()
    }

    /// Current aggregate unread counts: total plus per-project breakdown.
    pub fn stats(&self) -> (u64, BTreeMap<String, u64>) {
        let by_project = self.unread.lock().expect("stats lock poisoned").clone();
        (by_project.values().sum(), by_project)
    }

    fn stats_event(&self) -> UpdateEvent {
        let (unread_count, by_project) = self.stats();
        UpdateEvent::StatsUpdate {
            unread_count,
            by_project,
        }
    }

    /// Adjust a project's unread counter. Caller holds the partition lock.
    fn bump_unread(&self, project_id: &str, delta: i64) {
        let mut unread = self.unread.lock().expect("stats lock poisoned");
        let entry = unread.entry(project_id.to_string()).or_insert(0);
        *entry = entry.saturating_add_signed(delta);
        if *entry == 0 {
            unread.remove(project_id);
        }
    }

    /// Accept one untyped hook payload.
    ///
    /// Validates `type` and `project_id`, dedups within the window, and on a
    /// fresh notification stores it and emits `new_notification` +
    /// `stats_update`. Duplicates are accepted silently: no store, no
    /// broadcast.
    pub async fn intake(
        &self,
        payload: &serde_json::Value,
        now: DateTime<Utc>,
        hub: &EventHub,
    ) -> Result<IntakeOutcome, IntakeError> {
        let kind_str = payload
            .get("type")
            .and_then(|v| v.as_str())
            .ok_or(IntakeError::MissingField("type"))?;
        let kind: NotificationKind =
            serde_json::from_value(serde_json::Value::String(kind_str.to_string()))
                .map_err(|_| IntakeError::UnknownKind(kind_str.to_string()))?;
        let project_id = payload
            .get("project_id")
            .and_then(|v| v.as_str())
            .ok_or(IntakeError::MissingField("project_id"))?
            .to_string();

        let notification_text = payload
            .get("notification")
            .and_then(|v| v.as_str())
            .map(String::from);
        let tool_name = payload
            .get("tool_name")
            .and_then(|v| v.as_str())
            .map(String::from);
        // tool_input is a string on the wire, but hooks occasionally send the
        // raw argument object; keep it as compact JSON in that case.
        let tool_input = payload.get("tool_input").and_then(|v| match v {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Null => None,
            other => Some(other.to_string()),
        });
        let details: BTreeMap<String, serde_json::Value> = payload
            .get("details")
            .and_then(|v| v.as_object())
            .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();
        let timestamp = payload
            .get("timestamp")
            .and_then(|v| v.as_str())
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or(now);

        let key = match payload.get("idempotency_key").and_then(|v| v.as_str()) {
            Some(token) => DedupKey::Token(token.to_string()),
            None => DedupKey::Derived {
                kind,
                tool_name: tool_name.clone(),
                notification: notification_text.clone(),
                second: timestamp.timestamp(),
            },
        };

        let partition = self.partition(&project_id).await;
        let mut guard = partition.lock().await;

        guard.recent.retain(|_, seen| now - *seen <= self.dedup_window);
        if guard.recent.contains_key(&key) {
            debug!(project_id = %project_id, "Duplicate hook delivery within dedup window");
            return Ok(IntakeOutcome::Duplicate);
        }
        guard.recent.insert(key, now);

        let notification = Notification {
            id: Uuid::new_v4().to_string(),
            kind,
            project_id: project_id.clone(),
            notification: notification_text,
            tool_name,
            tool_input,
            details,
            timestamp,
            read: false,
        };
        guard.notifications.push(notification.clone());
        self.bump_unread(&project_id, 1);

        info!(
            project_id = %project_id,
            kind = ?kind,
            id = %notification.id,
            "Notification stored"
        );
        hub.broadcast(&UpdateEvent::NewNotification {
            notification: notification.clone(),
        });
        hub.broadcast(&self.stats_event());

        Ok(IntakeOutcome::Stored(notification))
    }

    /// Mark one notification read. Returns false if the id is unknown.
    pub async fn mark_read(&self, id: &str, hub: &EventHub) -> bool {
        let partitions: Vec<(String, Arc<Mutex<Partition>>)> = {
            let map = self.partitions.read().await;
            map.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
        };

        for (project_id, partition) in partitions {
            let mut guard = partition.lock().await;
            if let Some(n) = guard.notifications.iter_mut().find(|n| n.id == id) {
                if !n.read {
                    n.read = true;
                    self.bump_unread(&project_id, -1);
                    hub.broadcast(&UpdateEvent::NotificationRead { id: id.to_string() });
                    hub.broadcast(&self.stats_event());
                }
                return true;
            }
        }
        false
    }

    /// Mark every notification read, optionally scoped to one project.
    /// Returns the number of notifications that changed state.
    pub async fn mark_all_read(&self, project_id: Option<&str>, hub: &EventHub) -> u64 {
        let mut changed = 0u64;
        for (project, partition) in self.select_partitions(project_id).await {
            let mut guard = partition.lock().await;
            for n in guard.notifications.iter_mut().filter(|n| !n.read) {
                n.read = true;
                changed += 1;
                self.bump_unread(&project, -1);
                hub.broadcast(&UpdateEvent::NotificationRead { id: n.id.clone() });
            }
        }
        if changed > 0 {
            hub.broadcast(&self.stats_event());
        }
        changed
    }

    /// Delete one notification. Returns false if the id is unknown.
    pub async fn delete(&self, id: &str, hub: &EventHub) -> bool {
        let partitions: Vec<(String, Arc<Mutex<Partition>>)> = {
            let map = self.partitions.read().await;
            map.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
        };

        for (project_id, partition) in partitions {
            let mut guard = partition.lock().await;
            if let Some(pos) = guard.notifications.iter().position(|n| n.id == id) {
                let removed = guard.notifications.remove(pos);
                if !removed.read {
                    self.bump_unread(&project_id, -1);
                }
                hub.broadcast(&self.stats_event());
                return true;
            }
        }
        false
    }

    /// Delete all notifications, optionally scoped to one project.
    /// Returns the number removed.
    pub async fn delete_all(&self, project_id: Option<&str>, hub: &EventHub) -> u64 {
        let mut removed = 0u64;
        for (project, partition) in self.select_partitions(project_id).await {
            let mut guard = partition.lock().await;
            let unread = guard.notifications.iter().filter(|n| !n.read).count() as i64;
            removed += guard.notifications.len() as u64;
            guard.notifications.clear();
            if unread > 0 {
                self.bump_unread(&project, -unread);
            }
        }
        if removed > 0 {
            hub.broadcast(&self.stats_event());
        }
        removed
    }

    /// Snapshot notifications, newest first, optionally scoped to a project.
    pub async fn list(&self, project_id: Option<&str>) -> Vec<Notification> {
        let mut all = Vec::new();
        for (_, partition) in self.select_partitions(project_id).await {
            all.extend(partition.lock().await.notifications.iter().cloned());
        }
        all.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        all
    }

    async fn select_partitions(
        &self,
        project_id: Option<&str>,
    ) -> Vec<(String, Arc<Mutex<Partition>>)> {
        let map = self.partitions.read().await;
        map.iter()
            .filter(|(k, _)| project_id.map_or(true, |p| p == k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}
