use std::sync::Arc;

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::HeaderMap,
    response::Response,
};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};

use crate::{playback::PlaybackEvent, server::AppState};

/// GET /v1/websocket
///
/// Authorization is enforced by the router middleware before the upgrade.
pub async fn websocket_handler(
    headers: HeaderMap,
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Response {
    let client = headers
        .get("client-name")
        .and_then(|h| h.to_str().ok())
        .unwrap_or("unknown")
        .to_string();
    info!("Event subscriber connecting: client={}", client);

    // Subscribe before the upgrade so nothing emitted in between is lost.
    let events = state.manager.subscribe();
    ws.on_upgrade(move |socket| handle_socket(socket, events, client))
}

pub async fn handle_socket(
    mut socket: WebSocket,
    mut events: broadcast::Receiver<PlaybackEvent>,
    client: String,
) {
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    let Ok(json) = serde_json::to_string(&event) else {
                        continue;
                    };
                    if let Err(e) = socket.send(Message::Text(json.into())).await {
                        debug!("Socket send failed: client={} err={}", client, e);
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Event subscriber {} lagged, dropped {} events", client, skipped);
                }
                Err(RecvError::Closed) => break,
            },
            msg = socket.recv() => match msg {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(Message::Text(_))) => {
                    debug!("Ignoring inbound text frame from {}; use the REST api", client);
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("WebSocket error: client={} err={}", client, e);
                    break;
                }
            },
        }
    }

    info!("Event subscriber disconnected: client={}", client);
}
