//! HTTP and WebSocket handlers.

use crate::server::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use futures::{future, SinkExt, StreamExt};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Health check endpoint.
pub async fn handle_health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

/// Upgrade to the session socket. Only one client may be attached at a time.
pub async fn handle_socket(State(state): State<Arc<AppState>>, ws: WebSocketUpgrade) -> Response {
    if state.session.is_connected() {
        warn!("Rejecting socket: a client is already connected");
        return (StatusCode::CONFLICT, "A client is already connected").into_response();
    }
    ws.on_upgrade(move |socket| serve_socket(socket, state))
}

async fn serve_socket(socket: WebSocket, state: Arc<AppState>) {
    let (sink, stream) = socket.split();

    let inbound = stream.filter_map(|message| {
        future::ready(match message {
            Ok(Message::Text(text)) => Some(Ok(text)),
            Ok(Message::Binary(_)) => {
                debug!("Ignoring binary frame");
                None
            }
            Ok(_) => None,
            Err(e) => Some(Err(e)),
        })
    });
    let outbound =
        sink.with(|frame: String| future::ready(Ok::<_, axum::Error>(Message::Text(frame))));

    match state.session.serve(inbound, outbound).await {
        Ok(end) => info!("Socket finished: {:?}", end),
        Err(e) => warn!("Socket not served: {}", e),
    }
}
