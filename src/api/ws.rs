//! Push channel - Streams status snapshots to WebSocket clients

use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{Sink, SinkExt, Stream, StreamExt};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;

use crate::core::StatusSnapshot;

use super::AppState;

/// Frames sent to clients
#[derive(Debug, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub(super) enum FeedEvent<'a> {
    Connected,
    ServerStatus(&'a StatusSnapshot),
}

impl FeedEvent<'_> {
    fn to_message(&self) -> Option<Message> {
        match serde_json::to_string(self) {
            Ok(json) => Some(Message::Text(json)),
            Err(e) => {
                tracing::error!("Failed to encode feed event: {}", e);
                None
            }
        }
    }
}

pub(super) async fn status_feed(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_status_feed(socket, state))
}

async fn handle_status_feed(socket: WebSocket, state: AppState) {
    let (ws_tx, ws_rx) = socket.split();
    run_feed(ws_tx, ws_rx, state).await;
}

/// Drive one client: greeting, its own initial snapshot, then every broadcast until
/// the client leaves or the server shuts down
async fn run_feed<S, R>(mut ws_tx: S, mut ws_rx: R, state: AppState)
where
    S: Sink<Message> + Unpin,
    R: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    let mut updates = state.supervisor.broadcaster().subscribe();
    tracing::debug!(
        "Status feed client connected, {} subscriber(s)",
        state.supervisor.broadcaster().subscriber_count()
    );
    let mut shutdown_rx = state.shutdown.clone();

    if let Some(message) = FeedEvent::Connected.to_message() {
        if ws_tx.send(message).await.is_err() {
            return;
        }
    }

    // New clients get the current state without waiting for the next change
    let supervisor = state.supervisor.clone();
    match tokio::task::spawn_blocking(move || supervisor.status()).await {
        Ok(Ok(snapshot)) => {
            if let Some(message) = FeedEvent::ServerStatus(&snapshot).to_message() {
                if ws_tx.send(message).await.is_err() {
                    return;
                }
            }
        }
        Ok(Err(e)) => tracing::error!("Error broadcasting server status: {}", e),
        Err(e) => tracing::error!("Error broadcasting server status: {}", e),
    }

    loop {
        tokio::select! {
            update = updates.recv() => match update {
                Ok(snapshot) => {
                    let Some(message) = FeedEvent::ServerStatus(&snapshot).to_message() else {
                        continue;
                    };
                    if ws_tx.send(message).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!("Status feed lagged, skipped {} snapshots", skipped);
                }
                Err(RecvError::Closed) => break,
            },

            incoming = ws_rx.next() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },

            changed = shutdown_rx.changed() => {
                // A dropped sender counts as shutdown
                if changed.is_err() || *shutdown_rx.borrow() {
                    tracing::debug!("Status feed received shutdown signal, closing");
                    let close_frame = CloseFrame {
                        code: axum::extract::ws::close_code::AWAY,
                        reason: "server shutting down".into(),
                    };
                    let _ = ws_tx.send(Message::Close(Some(close_frame))).await;
                    break;
                }
            }
        }
    }
}
