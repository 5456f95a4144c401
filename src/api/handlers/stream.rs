//! WebSocket streaming endpoint.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, instrument, warn};

use crate::api::models::StreamMessage;
use crate::app_state::AppState;
use crate::swap::CSV_HEADER;

/// WebSocket endpoint streaming one message per emitted swap.
#[instrument(skip(state, ws))]
pub async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    info!("WebSocket connection requested");
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn send_json(socket: &mut WebSocket, message: &StreamMessage) -> bool {
    match serde_json::to_string(message) {
        Ok(json) => socket.send(Message::Text(json)).await.is_ok(),
        Err(e) => {
            warn!(error = %e, "Failed to encode stream message");
            true
        }
    }
}

async fn handle_socket(mut socket: WebSocket, state: AppState) {
    let (mut rx, _guard) = state.subscribe();
    info!(subscribers = state.subscriber_count(), "WebSocket connection established");

    if !send_json(&mut socket, &StreamMessage::connected(CSV_HEADER)).await {
        return;
    }

    loop {
        tokio::select! {
            received = rx.recv() => {
                let message = match received {
                    Ok(record) => StreamMessage::swap(record),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "WebSocket subscriber lagging");
                        StreamMessage::lagged(skipped)
                    }
                    Err(RecvError::Closed) => break,
                };
                if !send_json(&mut socket, &message).await {
                    warn!("Failed to send message, closing connection");
                    break;
                }
            }

            Some(Ok(msg)) = socket.recv() => {
                match msg {
                    Message::Close(_) => {
                        info!("Client closed connection");
                        break;
                    }
                    Message::Ping(data) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    _ => {}
                }
            }

            else => break,
        }
    }

    info!("WebSocket connection closed");
}
