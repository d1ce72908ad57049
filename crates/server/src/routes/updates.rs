// crates/server/src/routes/updates.rs
//! The push channel: `GET /ws/updates`.
//!
//! Server→client only. Each connection registers with the event hub and gets
//! every subsequent event as one JSON text frame. Inbound frames are ignored
//! apart from close; clients that miss frames while disconnected reconcile
//! through the query endpoints on reconnect.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, warn};

use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/ws/updates", get(ws_handler))
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (conn_id, mut events) = state.hub.register();
    let (mut sink, mut stream) = socket.split();
    debug!(connection_id = conn_id, "Push channel opened");

    loop {
        tokio::select! {
            maybe = events.recv() => {
                let Some(event) = maybe else { break };
                let frame = match serde_json::to_string(&event) {
                    Ok(json) => json,
                    Err(e) => {
                        warn!(connection_id = conn_id, error = %e, "Failed to serialize event");
                        continue;
                    }
                };
                if sink.send(Message::Text(frame.into())).await.is_err() {
                    break;
                }
            }
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    // Server→client channel: ignore any other inbound frame.
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    state.hub.deregister(conn_id);
    debug!(connection_id = conn_id, "Push channel closed");
}
