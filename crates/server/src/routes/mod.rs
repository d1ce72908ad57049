// crates/server/src/routes/mod.rs
//! HTTP surface, one sub-router per concern.

pub mod conversations;
pub mod health;
pub mod notifications;
pub mod updates;

use std::sync::Arc;

use axum::Router;

use crate::state::AppState;

/// Build the combined API router.
pub fn api_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(health::router())
        .merge(conversations::router())
        .merge(notifications::router())
        .merge(updates::router())
        .with_state(state)
}
