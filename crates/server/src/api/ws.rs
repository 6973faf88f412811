//! WebSocket status channel.
//!
//! Each connection gets a full snapshot on connect, after every command and
//! after every task-state change.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{stream::SplitSink, SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use dirforge_core::status::{parse_command, ServerMessage};

use crate::metrics::{
    WS_COMMANDS_TOTAL, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL, WS_LAG_EVENTS,
    WS_MESSAGES_SENT,
};
use crate::state::AppState;

/// WebSocket upgrade handler.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Handle a single WebSocket connection.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    // Subscribe before the first snapshot so no change slips between them
    let mut changes = state.orchestrator().board().subscribe();

    WS_CONNECTIONS_TOTAL.inc();
    WS_CONNECTIONS_ACTIVE.inc();
    info!("WebSocket client connected");

    let initial = ServerMessage::Snapshot(state.orchestrator().snapshot());
    if send(&mut sender, &initial).await {
        loop {
            tokio::select! {
                _ = state.closing().cancelled() => {
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
                change = changes.recv() => {
                    match change {
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!("WebSocket client lagged, skipped {} changes", n);
                            WS_LAG_EVENTS.inc();
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            debug!("Change feed closed");
                            break;
                        }
                    }
                    // A lagged client resyncs from the same full snapshot
                    let message = ServerMessage::Snapshot(state.orchestrator().snapshot());
                    if !send(&mut sender, &message).await {
                        break;
                    }
                }
                incoming = receiver.next() => {
                    match incoming {
                        Some(Ok(Message::Text(text))) => {
                            let reply = handle_command(&state, text.as_str());
                            if !send(&mut sender, &reply).await {
                                break;
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            debug!("WebSocket client requested close");
                            break;
                        }
                        Some(Ok(_)) => {
                            // Ping/pong handled by axum; binary frames ignored
                        }
                        Some(Err(e)) => {
                            warn!("WebSocket receive error: {}", e);
                            break;
                        }
                    }
                }
            }
        }
    }

    WS_CONNECTIONS_ACTIVE.dec();
    info!("WebSocket client disconnected");
}

/// Validate and dispatch one client command, returning the reply.
///
/// Never waits for a build to run; the connection goes straight back to
/// listening.
fn handle_command(state: &AppState, text: &str) -> ServerMessage {
    let command = match parse_command(text) {
        Ok(command) => command,
        Err(e) => {
            warn!("Rejected client message: {}", e);
            WS_COMMANDS_TOTAL
                .with_label_values(&["invalid", "rejected"])
                .inc();
            return ServerMessage::error(e);
        }
    };

    let action = command.action.as_str();
    match state.orchestrator().dispatch(command) {
        Ok(outcome) => {
            debug!(provider = %command.provider, ?outcome, "Command dispatched");
            WS_COMMANDS_TOTAL.with_label_values(&[action, "ok"]).inc();
            ServerMessage::Snapshot(state.orchestrator().snapshot())
        }
        Err(e) => {
            warn!(provider = %command.provider, action, "Command refused: {}", e);
            WS_COMMANDS_TOTAL
                .with_label_values(&[action, "refused"])
                .inc();
            ServerMessage::error(e)
        }
    }
}

/// Send one message; false once the client is gone.
async fn send(sender: &mut SplitSink<WebSocket, Message>, message: &ServerMessage) -> bool {
    let kind = match message {
        ServerMessage::Snapshot(_) => "snapshot",
        ServerMessage::Error(_) => "error",
    };
    WS_MESSAGES_SENT.with_label_values(&[kind]).inc();

    if sender
        .send(Message::Text(message.to_json().into()))
        .await
        .is_err()
    {
        debug!("WebSocket send failed, client disconnected");
        return false;
    }
    true
}
