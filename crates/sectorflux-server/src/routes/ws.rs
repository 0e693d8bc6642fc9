//! WebSocket endpoints.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::{SinkExt, StreamExt};

use crate::chat;
use crate::state::AppState;

pub async fn chat_upgrade(State(state): State<Arc<AppState>>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| chat::handle_chat_socket(socket, state))
}

pub async fn dashboard_upgrade(
    State(state): State<Arc<AppState>>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| handle_dashboard_socket(socket, state))
}

/// Server-push only: relay broadcast frames until either side goes away.
async fn handle_dashboard_socket(socket: WebSocket, state: Arc<AppState>) {
    let (id, mut frames) = state.broadcaster.subscribe();
    tracing::info!(target: "sectorflux::ws", "Dashboard observer {id} connected");

    let (mut ws_tx, mut ws_rx) = socket.split();

    loop {
        tokio::select! {
            frame = frames.recv() => {
                let Some(frame) = frame else { break };
                if ws_tx.send(Message::Text(frame.into())).await.is_err() {
                    break;
                }
            }
            msg = ws_rx.next() => {
                // Observers only listen; any close or error ends the session.
                match msg {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    _ => {}
                }
            }
        }
    }

    state.broadcaster.unsubscribe(id);
    tracing::info!(target: "sectorflux::ws", "Dashboard observer {id} disconnected");
}
