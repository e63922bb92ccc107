//! Live control channel: snapshots out, kill commands in.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;

use super::ControlMessage;
use crate::api::AppState;
use crate::tracker::{Snapshot, Tracker};

/// GET /ws
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    // Subscribe before reading the initial snapshot so no change is missed.
    let (mut subscription, initial) = state.tracker.subscribe();
    let subscriber_id = subscription.id();
    tracing::debug!(subscriber_id, "Control channel opened");

    let mut send_task = tokio::spawn(async move {
        if send_snapshot(&mut sender, &initial).await.is_err() {
            return;
        }
        while let Some(snapshot) = subscription.recv().await {
            if send_snapshot(&mut sender, &snapshot).await.is_err() {
                break;
            }
        }
    });

    let tracker = Arc::clone(&state.tracker);
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => handle_control(&tracker, &text),
                Message::Close(_) => break,
                // axum answers pings itself
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    state.tracker.unsubscribe(subscriber_id);
    tracing::debug!(subscriber_id, "Control channel closed");
}

async fn send_snapshot(
    sender: &mut SplitSink<WebSocket, Message>,
    snapshot: &Snapshot,
) -> Result<(), axum::Error> {
    match serde_json::to_string(snapshot) {
        Ok(json) => sender.send(Message::Text(json)).await,
        Err(e) => {
            tracing::error!("Failed to serialize snapshot: {}", e);
            Ok(())
        }
    }
}

/// Apply one inbound control message. Unknown or malformed input is ignored.
fn handle_control(tracker: &Tracker, text: &str) {
    match serde_json::from_str::<ControlMessage>(text) {
        Ok(ControlMessage::Kill { request_id }) => match tracker.kill(&request_id) {
            Some(_) => tracing::info!(request_id = %request_id, "Request killed over control channel"),
            None => tracing::debug!(request_id = %request_id, "Kill for unknown or finished request"),
        },
        Err(e) => tracing::debug!(error = %e, "Ignoring control message"),
    }
}
