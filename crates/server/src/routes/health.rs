// crates/server/src/routes/health.rs
use std::sync::Arc;

use axum::{extract::State, response::Json, routing::get, Router};

use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/api/health", get(health))
}

/// GET /api/health -- liveness plus basic runtime info.
async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.uptime_secs(),
        "connections": state.hub.connection_count(),
    }))
}
