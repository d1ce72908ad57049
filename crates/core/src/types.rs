// crates/core/src/types.rs
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[cfg(feature = "codegen")]
use ts_rs::TS;

/// Message role in a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "codegen", derive(TS))]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../ui/src/types/generated/"))]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One raw line of a session log file, exactly as written by the producing CLI.
///
/// Unknown extra fields are ignored so newer producer versions can add fields
/// without breaking ingestion.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    pub uuid: String,
    #[serde(rename = "type")]
    pub record_type: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub session_id: String,
    #[serde(default)]
    pub parent_uuid: Option<String>,
    #[serde(default)]
    pub parent_session_id: Option<String>,
}

/// One turn in a conversation. Immutable once ingested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "codegen", derive(TS))]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../ui/src/types/generated/"))]
pub struct Message {
    pub uuid: String,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub session_id: String,
    pub project_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_uuid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_session_id: Option<String>,
}

impl Message {
    /// Build a Message from a parsed log record plus the project the file
    /// belongs to.
    pub fn from_record(record: LogRecord, project_id: impl Into<String>) -> Self {
        Self {
            uuid: record.uuid,
            role: record.record_type,
            content: record.content,
            timestamp: record.timestamp,
            session_id: record.session_id,
            project_id: project_id.into(),
            parent_uuid: record.parent_uuid,
            parent_session_id: record.parent_session_id,
        }
    }

    pub fn user(uuid: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            role: Role::User,
            content: content.into(),
            timestamp: Utc::now(),
            session_id: String::new(),
            project_id: String::new(),
            parent_uuid: None,
            parent_session_id: None,
        }
    }

    pub fn assistant(uuid: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            role: Role::Assistant,
            content: content.into(),
            timestamp: Utc::now(),
            session_id: String::new(),
            project_id: String::new(),
            parent_uuid: None,
            parent_session_id: None,
        }
    }

    pub fn in_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = session_id.into();
        self
    }

    pub fn in_project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = project_id.into();
        self
    }

    pub fn with_parent(mut self, parent_uuid: impl Into<String>) -> Self {
        self.parent_uuid = Some(parent_uuid.into());
        self
    }

    pub fn with_parent_session(mut self, parent_session_id: impl Into<String>) -> Self {
        self.parent_session_id = Some(parent_session_id.into());
        self
    }
}

/// One logical conversation: a user message plus everything that follows it,
/// across continuation sessions.
///
/// `id` is the uuid of the first user message and never changes once the
/// thread exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "codegen", derive(TS))]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../ui/src/types/generated/"))]
pub struct Thread {
    pub id: String,
    pub project_id: String,
    pub messages: Vec<Message>,
    /// Every session file that contributed messages, in attach order.
    pub session_ids: Vec<String>,
    /// True once a continuation session has attached to this thread.
    pub is_continuation_session: bool,
}

impl Thread {
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Kind of a hook-reported notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "codegen", derive(TS))]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../ui/src/types/generated/"))]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    PermissionRequest,
    ToolUse,
    Notification,
}

/// One hook-reported event, as stored and as pushed to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "codegen", derive(TS))]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../ui/src/types/generated/"))]
pub struct Notification {
    /// Server-assigned id (uuid v4).
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub project_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_input: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    #[cfg_attr(feature = "codegen", ts(type = "Record<string, unknown>"))]
    pub details: BTreeMap<String, serde_json::Value>,
    pub timestamp: DateTime<Utc>,
    pub read: bool,
}

/// Push-channel event, fanned out to every live subscriber connection.
///
/// The wire shape is one JSON frame per event, discriminated by `type`:
/// `{"type":"file_change","project_id":"..."}` and so on. Server and clients
/// share this enum so the contract stays exhaustive instead of stringly-typed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "codegen", derive(TS))]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../ui/src/types/generated/"))]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UpdateEvent {
    FileChange {
        project_id: String,
    },
    NewNotification {
        notification: Notification,
    },
    NotificationRead {
        id: String,
    },
    StatsUpdate {
        unread_count: u64,
        by_project: BTreeMap<String, u64>,
    },
}
