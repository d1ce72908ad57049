// crates/server/src/routes/notifications.rs
//! Notification endpoints: hook intake plus read/delete mutations.
//!
//! - `POST   /api/notifications/hook`       -- inbound webhook intake
//! - `GET    /api/notifications`            -- snapshot, newest first
//! - `POST   /api/notifications/{id}/read`  -- mark one read
//! - `POST   /api/notifications/read-all`   -- mark all read (optional project scope)
//! - `DELETE /api/notifications/{id}`       -- delete one
//! - `DELETE /api/notifications`            -- delete all (optional project scope)

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{delete, get, post},
    Router,
};
use chrono::Utc;
use serde::Deserialize;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/notifications/hook", post(hook_intake))
        .route(
            "/api/notifications",
            get(list_notifications).delete(delete_all),
        )
        .route("/api/notifications/read-all", post(mark_all_read))
        .route("/api/notifications/{id}/read", post(mark_read))
        .route("/api/notifications/{id}", delete(delete_one))
}

#[derive(Debug, Deserialize)]
struct ProjectScope {
    project: Option<String>,
}

/// POST /api/notifications/hook -- accept one untyped hook payload.
///
/// 202 for stored *and* for deduplicated deliveries (intake is idempotent
/// from the hook's point of view); 422 when `type` or `project_id` is
/// missing or unusable.
async fn hook_intake(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<serde_json::Value>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    state
        .notifications
        .intake(&payload, Utc::now(), &state.hub)
        .await
        .map_err(ApiError::from)?;
    Ok((StatusCode::ACCEPTED, Json(serde_json::json!({ "ok": true }))))
}

/// GET /api/notifications?project= -- snapshot, newest first.
async fn list_notifications(
    State(state): State<Arc<AppState>>,
    Query(scope): Query<ProjectScope>,
) -> Json<serde_json::Value> {
    let notifications = state.notifications.list(scope.project.as_deref()).await;
    let (unread_count, by_project) = state.notifications.stats();
    Json(serde_json::json!({
        "total": notifications.len(),
        "unread_count": unread_count,
        "by_project": by_project,
        "notifications": notifications,
    }))
}

/// POST /api/notifications/{id}/read
async fn mark_read(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    if !state.notifications.mark_read(&id, &state.hub).await {
        return Err(ApiError::NotificationNotFound(id));
    }
    Ok(Json(serde_json::json!({ "ok": true })))
}

/// POST /api/notifications/read-all?project=
async fn mark_all_read(
    State(state): State<Arc<AppState>>,
    Query(scope): Query<ProjectScope>,
) -> Json<serde_json::Value> {
    let changed = state
        .notifications
        .mark_all_read(scope.project.as_deref(), &state.hub)
        .await;
    Json(serde_json::json!({ "ok": true, "changed": changed }))
}

/// DELETE /api/notifications/{id}
async fn delete_one(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    if !state.notifications.delete(&id, &state.hub).await {
        return Err(ApiError::NotificationNotFound(id));
    }
    Ok(Json(serde_json::json!({ "ok": true })))
}

/// DELETE /api/notifications?project=
async fn delete_all(
    State(state): State<Arc<AppState>>,
    Query(scope): Query<ProjectScope>,
) -> Json<serde_json::Value> {
    let removed = state
        .notifications
        .delete_all(scope.project.as_deref(), &state.hub)
        .await;
    Json(serde_json::json!({ "ok": true, "removed": removed }))
}
