// =============================================================================
// WebSocket Handlers — live alert and metrics subscribers
// =============================================================================
//
// Each connection registers a mailbox with the SubscriberHub and then runs a
// select loop: drain the mailbox to the socket, answer client traffic, and
// (alerts only) emit a heartbeat after 30 quiet seconds. The hub never
// touches the socket — if this task falls behind, the hub drops the mailbox
// and the loop ends on the closed channel.
//
// Both endpoints reply "pong" to a literal "ping" text frame.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use tokio::time::{sleep, Duration};
use tracing::debug;

use crate::app_state::AppState;

/// Quiet period after which an alert subscriber receives a heartbeat.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

// =============================================================================
// Upgrade handlers
// =============================================================================

/// `GET /ws/alerts` — welcome frame, then one frame per fraud alert.
pub async fn alerts_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_alerts_socket(socket, state))
}

/// `GET /ws/metrics` — one snapshot frame per second.
pub async fn metrics_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_metrics_socket(socket, state))
}

// =============================================================================
// Connection loops
// =============================================================================

async fn handle_alerts_socket(socket: WebSocket, state: Arc<AppState>) {
    let (id, mut mailbox) = state.hub.join_alerts();
    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            // ── Mailbox: welcome frame + per-alert frames ───────────────
            frame = mailbox.recv() => {
                match frame {
                    Some(frame) => {
                        if sender.send(Message::Text(frame)).await.is_err() {
                            break;
                        }
                    }
                    // The hub dropped us (disconnect-on-full).
                    None => break,
                }
            }

            // ── Heartbeat after 30 quiet seconds ────────────────────────
            _ = sleep(HEARTBEAT_INTERVAL) => {
                let heartbeat = serde_json::json!({
                    "type": "heartbeat",
                    "timestamp": chrono::Utc::now().to_rfc3339(),
                });
                if sender.send(Message::Text(heartbeat.to_string())).await.is_err() {
                    break;
                }
            }

            // ── Client traffic ──────────────────────────────────────────
            msg = receiver.next() => {
                if !handle_client_message(msg, &mut sender).await {
                    break;
                }
            }
        }
    }

    state.hub.leave_alerts(id);
}

async fn handle_metrics_socket(socket: WebSocket, state: Arc<AppState>) {
    let (id, mut mailbox) = state.hub.join_metrics();
    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            frame = mailbox.recv() => {
                match frame {
                    Some(frame) => {
                        if sender.send(Message::Text(frame)).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }

            msg = receiver.next() => {
                if !handle_client_message(msg, &mut sender).await {
                    break;
                }
            }
        }
    }

    state.hub.leave_metrics(id);
}

/// Process one inbound client message. Returns false when the connection
/// should close.
async fn handle_client_message<S>(
    msg: Option<Result<Message, axum::Error>>,
    sender: &mut S,
) -> bool
where
    S: futures_util::Sink<Message, Error = axum::Error> + Unpin,
{
    match msg {
        Some(Ok(Message::Text(text))) => {
            if text == "ping" {
                return sender.send(Message::Text("pong".to_string())).await.is_ok();
            }
            debug!(msg = %text, "ignoring client text frame");
            true
        }
        Some(Ok(Message::Ping(data))) => sender.send(Message::Pong(data)).await.is_ok(),
        Some(Ok(Message::Pong(_))) | Some(Ok(Message::Binary(_))) => true,
        Some(Ok(Message::Close(_))) => false,
        Some(Err(e)) => {
            debug!(error = %e, "websocket receive error");
            false
        }
        None => false,
    }
}
