// crates/server/src/lib.rs
//! chattail server library.
//!
//! Ties the pipeline together: the file watcher feeds the thread store, hook
//! intake feeds the notification store, and both broadcast through the event
//! hub to every `/ws/updates` subscriber. Route handlers only ever read
//! snapshots or call store operations; they never own state of their own.

pub mod error;
pub mod hub;
pub mod notifications;
pub mod routes;
pub mod state;
pub mod store;
pub mod watcher;

pub use error::{ApiError, ApiResult, ErrorResponse};
pub use routes::api_routes;
pub use state::{AppState, ServerConfig};

use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the Axum application with all routes and middleware.
pub fn create_app(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(api_routes(state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

// ============================================================================
// Integration Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Method, Request, StatusCode},
    };
    use tower::ServiceExt;

    fn test_app() -> (Arc<AppState>, Router) {
        let state = AppState::new(ServerConfig {
            roots: Vec::new(),
            ..ServerConfig::default()
        });
        let app = create_app(state.clone());
        (state, app)
    }

    async fn request(
        app: Router,
        method: Method,
        uri: &str,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(serde_json::to_vec(&json).unwrap())
            }
            None => Body::empty(),
        };
        let response = app.oneshot(builder.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let (_state, app) = test_app();
        let (status, body) = request(app, Method::GET, "/api/health", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert!(body["version"].is_string());
        assert!(body["uptime_secs"].is_number());
    }

    #[tokio::test]
    async fn test_hook_intake_stores_and_is_idempotent() {
        let (state, app) = test_app();
        let payload = serde_json::json!({
            "type": "tool_use",
            "project_id": "p1",
            "tool_name": "Bash",
            "timestamp": "2024-01-01T00:00:00Z",
        });

        let (status, _) = request(
            app.clone(),
            Method::POST,
            "/api/notifications/hook",
            Some(payload.clone()),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);

        // Second delivery within the window: accepted, not duplicated.
        let (status, _) = request(
            app.clone(),
            Method::POST,
            "/api/notifications/hook",
            Some(payload),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);

        let (status, body) =
            request(app, Method::GET, "/api/notifications?project=p1", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 1);
        assert_eq!(body["unread_count"], 1);
        assert_eq!(body["by_project"]["p1"], 1);
        assert_eq!(state.notifications.stats().0, 1);
    }

    #[tokio::test]
    async fn test_hook_intake_rejects_missing_fields() {
        let (_state, app) = test_app();

        let (status, body) = request(
            app.clone(),
            Method::POST,
            "/api/notifications/hook",
            Some(serde_json::json!({ "project_id": "p1" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"], "Invalid hook payload");

        let (status, _) = request(
            app,
            Method::POST,
            "/api/notifications/hook",
            Some(serde_json::json!({ "type": "tool_use" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_mark_read_flow() {
        let (state, app) = test_app();
        let (_, _) = request(
            app.clone(),
            Method::POST,
            "/api/notifications/hook",
            Some(serde_json::json!({
                "type": "permission_request",
                "project_id": "p1",
                "tool_name": "Edit",
            })),
        )
        .await;

        let id = state.notifications.list(Some("p1")).await[0].id.clone();
        let (status, _) = request(
            app.clone(),
            Method::POST,
            &format!("/api/notifications/{id}/read"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(state.notifications.stats().0, 0);

        let (status, body) = request(
            app,
            Method::POST,
            "/api/notifications/no-such-id/read",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Notification not found");
    }

    #[tokio::test]
    async fn test_delete_endpoints() {
        let (state, app) = test_app();
        for project in ["p1", "p2"] {
            request(
                app.clone(),
                Method::POST,
                "/api/notifications/hook",
                Some(serde_json::json!({
                    "type": "notification",
                    "project_id": project,
                    "notification": "done",
                })),
            )
            .await;
        }

        let id = state.notifications.list(Some("p1")).await[0].id.clone();
        let (status, _) = request(
            app.clone(),
            Method::DELETE,
            &format!("/api/notifications/{id}"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = request(app, Method::DELETE, "/api/notifications", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["removed"], 1);
        assert_eq!(state.notifications.stats().0, 0);
    }

    #[tokio::test]
    async fn test_conversations_snapshot_empty() {
        let (_state, app) = test_app();
        let (status, body) = request(app, Method::GET, "/api/conversations", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 0);
        assert!(body["threads"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_hook_broadcasts_reach_subscribers() {
        let (state, app) = test_app();
        let (_conn, mut rx) = state.hub.register();

        request(
            app,
            Method::POST,
            "/api/notifications/hook",
            Some(serde_json::json!({
                "type": "tool_use",
                "project_id": "p1",
                "tool_name": "Bash",
            })),
        )
        .await;

        let first = rx.recv().await.unwrap();
        assert!(matches!(
            first,
            chattail_core::UpdateEvent::NewNotification { .. }
        ));
        let second = rx.recv().await.unwrap();
        assert!(matches!(
            second,
            chattail_core::UpdateEvent::StatsUpdate { .. }
        ));
    }
}
