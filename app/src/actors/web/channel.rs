//! Broadcast channel endpoint.
//!
//! GET /api/channel speaks the raw wire format: one `{ action, params }`
//! JSON object per text frame, no handshake. Every participant (each linked
//! client plus the local replica) sees every message except its own:
//!
//!   - a message from a client is published on the bus as `Inbound` for
//!     the local replica and fanned out to the other clients;
//!   - the local replica's `Outbound` messages go to every client.
//!
//! Delivery is best effort. A slow client that lags the fan-out loses
//! messages.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast;

use super::{ChannelFrame, WebState, emit_telemetry};
use crate::state::config;
use climbar::{BroadcastMessage, ClimbarEvent, ClimbarMessage};

/// GET /api/channel: upgrade to WebSocket.
pub async fn channel_upgrade(
    State(state): State<Arc<WebState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_channel(socket, state))
}

async fn handle_channel(socket: WebSocket, state: Arc<WebState>) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let client_id = format!("channel.{}", config::generate_id());
    state.channel_count.fetch_add(1, Ordering::Relaxed);
    emit_telemetry(&state, &state.bus_tx);
    tracing::info!("channel: {client_id} joined");

    let mut frames = state.channel_tx.subscribe();
    let send_id = client_id.clone();
    let mut send_task = tokio::spawn(async move {
        loop {
            match frames.recv().await {
                Ok(frame) => {
                    if !frame.is_for(&send_id) {
                        continue;
                    }
                    if let Ok(json) = serde_json::to_string(&frame.message)
                        && ws_tx.send(Message::text(json)).await.is_err()
                    {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Closed) => break,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("channel: {send_id} lagged, dropped {n} messages");
                }
            }
        }
    });

    let recv_id = client_id.clone();
    let recv_state = Arc::clone(&state);
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_rx.next().await {
            match msg {
                Message::Text(text) => accept(&recv_state, &recv_id, &text),
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    state.channel_count.fetch_sub(1, Ordering::Relaxed);
    emit_telemetry(&state, &state.bus_tx);
    tracing::info!("channel: {client_id} left");
}

/// Take one wire message from a client: replay it locally and pass it on
/// to the other clients. Malformed messages are dropped.
fn accept(state: &WebState, client_id: &str, text: &str) {
    let message = match serde_json::from_str::<BroadcastMessage>(text) {
        Ok(message) => message,
        Err(e) => {
            tracing::debug!("channel: dropping malformed message from {client_id}: {e}");
            return;
        }
    };
    tracing::debug!("channel: {client_id} -> {}", message.action);
    let _ = state.bus_tx.send(
        ClimbarMessage::new(ClimbarEvent::Inbound(message.clone())).source(client_id),
    );
    let _ = state.channel_tx.send(ChannelFrame {
        from: Some(client_id.to_string()),
        message,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actors::web::tests::web_state;
    use climbar::BroadcastAction;

    #[test]
    fn client_message_reaches_replica_and_other_clients() {
        let (state, _dir) = web_state();
        let mut bus_rx = state.bus_tx.subscribe();
        let mut frames = state.channel_tx.subscribe();

        accept(&state, "channel.a", r#"{"action":"ADD_CIRCLE","params":{}}"#);

        let msg = bus_rx.try_recv().unwrap();
        assert_eq!(msg.source, "channel.a");
        match msg.event {
            ClimbarEvent::Inbound(wire) => assert_eq!(wire.action, BroadcastAction::AddCircle),
            other => panic!("unexpected event {other:?}"),
        }

        let frame = frames.try_recv().unwrap();
        assert!(!frame.is_for("channel.a"));
        assert!(frame.is_for("channel.b"));
    }

    #[test]
    fn malformed_messages_are_dropped() {
        let (state, _dir) = web_state();
        let mut bus_rx = state.bus_tx.subscribe();
        let mut frames = state.channel_tx.subscribe();
        accept(&state, "channel.a", "{not json");
        assert!(bus_rx.try_recv().is_err());
        assert!(frames.try_recv().is_err());
    }
}
