// crates/server/src/routes/conversations.rs
//! Thread snapshot queries.
//!
//! Clients refetch a project's threads here after a `file_change` push; the
//! snapshot is always consistent with what was last broadcast because both
//! come from the same single-writer thread store.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    response::Json,
    routing::get,
    Router,
};
use serde::Deserialize;

use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/api/conversations", get(list_conversations))
}

#[derive(Debug, Deserialize)]
struct ConversationsQuery {
    /// Restrict to one project; omitted means all projects.
    project: Option<String>,
}

/// GET /api/conversations?project= -- thread snapshots, creation order.
async fn list_conversations(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ConversationsQuery>,
) -> Json<serde_json::Value> {
    let threads = match params.project.as_deref() {
        Some(project) => state.threads.project_threads(project).await,
        None => state.threads.all_threads().await,
    };
    Json(serde_json::json!({
        "total": threads.len(),
        "threads": threads,
    }))
}
