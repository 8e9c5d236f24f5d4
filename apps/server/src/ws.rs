//! WebSocket push of connection-state changes.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, info, warn};

use chatlink_connection::BroadcastHub;
use chatlink_protocol::ServerMessage;

use crate::AppState;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// GET / and GET /ws
pub(crate) async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let hub = Arc::clone(state.manager.hub());
    ws.on_upgrade(move |socket| handle_socket(socket, hub))
}

/// Registers the client as an observer and forwards every snapshot until
/// either side goes away. Client messages are ignored.
async fn handle_socket(socket: WebSocket, hub: Arc<BroadcastHub>) {
    let mut subscription = hub.subscribe();
    let id = subscription.id;
    info!(observer = id, "dashboard client connected");

    let (mut ws_tx, mut ws_rx) = socket.split();
    let mut ping = tokio::time::interval(HEARTBEAT_INTERVAL);
    ping.tick().await;

    loop {
        tokio::select! {
            state = subscription.recv() => {
                let Some(state) = state else { break };
                let text = match serde_json::to_string(&ServerMessage::Connection(state)) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(observer = id, "failed to serialize state: {e}");
                        continue;
                    }
                };
                if ws_tx.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            _ = ping.tick() => {
                if ws_tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
            }
            msg = ws_rx.next() => match msg {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    hub.unsubscribe(id);
    debug!(observer = id, "dashboard client disconnected");
}
