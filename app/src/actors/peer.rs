//! Peer link: joins this process to another one's broadcast channel.
//!
//! Connects to the peer's `/api/channel` WebSocket, forwards every message
//! the local replica broadcasts (`Outbound`) and publishes whatever arrives
//! as `Inbound` for the surface actor to replay. Inbound traffic is never
//! forwarded again. Messages produced while disconnected are dropped.
//! Reconnects every 3 seconds until shut down.

use std::collections::HashMap;
use std::fmt;
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Message, WebSocket};

use super::Actor;
use crate::bus::{BusReceiver, BusSender, PollError};
use crate::state::SystemState;
use climbar::{
    ActorState, ActorStatus, AlertLevel, AlertMessage, BroadcastMessage, ClimbarEvent,
    ClimbarMessage,
};

const RECONNECT_DELAY: Duration = Duration::from_secs(3);
const READ_TIMEOUT: Duration = Duration::from_millis(50);

/// Link-internal error type.
pub(crate) enum PeerError {
    Ws(tungstenite::Error),
    Closed,
    Shutdown,
}

impl fmt::Display for PeerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ws(e) => write!(f, "websocket error: {e}"),
            Self::Closed => write!(f, "closed by peer"),
            Self::Shutdown => write!(f, "shutdown"),
        }
    }
}

impl From<tungstenite::Error> for PeerError {
    fn from(e: tungstenite::Error) -> Self {
        Self::Ws(e)
    }
}

/// Peer link actor. One per `[peer.<n>]` section.
pub struct PeerActor {
    pub url: String,
}

impl Actor for PeerActor {
    fn start(&self, _state: Arc<SystemState>, sender: BusSender, receiver: BusReceiver) {
        let url = self.url.clone();
        let thread_name = format!("peer:{}", sender.actor_id());

        std::thread::Builder::new()
            .name(thread_name)
            .spawn(move || run(url, sender, receiver))
            .expect("failed to spawn peer thread");
    }
}

fn emit_status(sender: &BusSender, status: ActorStatus, url: &str, counts: (u64, u64)) {
    let mut telemetry = HashMap::new();
    telemetry.insert("url".into(), url.to_string());
    telemetry.insert("sent".into(), counts.0.to_string());
    telemetry.insert("received".into(), counts.1.to_string());
    sender.send(ClimbarMessage::new(ActorState::new(status, telemetry)));
}

/// Main link loop. Reconnects until shutdown.
fn run(url: String, sender: BusSender, mut receiver: BusReceiver) {
    let name = sender.actor_id().to_string();
    emit_status(&sender, ActorStatus::Starting, &url, (0, 0));

    loop {
        if receiver.is_shutdown() {
            break;
        }
        // Stale local traffic from before this connection is not replayed.
        if skip_pending(&mut receiver).is_err() {
            break;
        }
        match connect_and_run(&url, &sender, &mut receiver) {
            Ok(()) | Err(PeerError::Shutdown) => break,
            Err(e) => {
                tracing::info!("peer '{name}': {e}, reconnecting in {RECONNECT_DELAY:?}");
                sender.send(ClimbarMessage::new(AlertMessage {
                    level: AlertLevel::Warn,
                    message: format!("peer {url}: {e}"),
                }));
                emit_status(&sender, ActorStatus::Reconnecting, &url, (0, 0));
                if !wait(&receiver, RECONNECT_DELAY) {
                    break;
                }
            }
        }
    }
    tracing::info!("peer '{name}': shutting down");
    emit_status(&sender, ActorStatus::Disconnected, &url, (0, 0));
}

fn skip_pending(receiver: &mut BusReceiver) -> Result<(), PeerError> {
    loop {
        match receiver.poll() {
            Err(PollError::Shutdown) => return Err(PeerError::Shutdown),
            Ok(None) => return Ok(()),
            Ok(Some(_)) => {}
        }
    }
}

/// Sleep in short steps; `false` once shutdown is requested.
fn wait(receiver: &BusReceiver, total: Duration) -> bool {
    let step = Duration::from_millis(100);
    let mut waited = Duration::ZERO;
    while waited < total {
        if receiver.is_shutdown() {
            return false;
        }
        std::thread::sleep(step);
        waited += step;
    }
    !receiver.is_shutdown()
}

fn is_timeout(e: &tungstenite::Error) -> bool {
    matches!(
        e,
        tungstenite::Error::Io(io)
            if io.kind() == std::io::ErrorKind::WouldBlock
                || io.kind() == std::io::ErrorKind::TimedOut
    )
}

fn connect_and_run(
    url: &str,
    sender: &BusSender,
    receiver: &mut BusReceiver,
) -> Result<(), PeerError> {
    let name = sender.actor_id();
    let (mut socket, _response) = tungstenite::connect(url)?;
    set_read_timeout(&mut socket)?;

    tracing::info!("peer '{name}': connected to {url}");
    let mut sent: u64 = 0;
    let mut received: u64 = 0;
    emit_status(sender, ActorStatus::Connected, url, (sent, received));

    loop {
        if receiver.is_shutdown() {
            let _ = socket.close(None);
            return Err(PeerError::Shutdown);
        }
        let mut activity = false;

        // 1. Read from the peer
        match socket.read() {
            Ok(Message::Text(text)) => {
                match serde_json::from_str::<BroadcastMessage>(text.as_str()) {
                    Ok(wire) => {
                        tracing::debug!("peer '{name}' <- {}", wire.action);
                        received += 1;
                        sender.send(ClimbarMessage::new(ClimbarEvent::Inbound(wire)));
                    }
                    Err(e) => tracing::debug!("peer '{name}': dropping malformed message: {e}"),
                }
                activity = true;
            }
            Ok(Message::Close(_)) => return Err(PeerError::Closed),
            Ok(_) => {}
            Err(e) if is_timeout(&e) => {}
            Err(e) => return Err(e.into()),
        }

        // 2. Forward what the local replica broadcast
        loop {
            match receiver.poll() {
                Err(PollError::Shutdown) => {
                    let _ = socket.close(None);
                    return Err(PeerError::Shutdown);
                }
                Ok(None) => break,
                Ok(Some(msg)) => {
                    if let ClimbarEvent::Outbound(wire) = &msg.event {
                        let Ok(json) = serde_json::to_string(wire) else {
                            continue;
                        };
                        tracing::debug!("peer '{name}' -> {}", wire.action);
                        socket.send(Message::text(json))?;
                        sent += 1;
                        activity = true;
                    }
                }
            }
        }

        if activity {
            emit_status(sender, ActorStatus::Connected, url, (sent, received));
        }
    }
}

fn set_read_timeout(socket: &mut WebSocket<MaybeTlsStream<TcpStream>>) -> Result<(), PeerError> {
    if let MaybeTlsStream::Plain(stream) = socket.get_mut() {
        stream
            .set_read_timeout(Some(READ_TIMEOUT))
            .map_err(|e| PeerError::Ws(tungstenite::Error::Io(e)))?;
    }
    Ok(())
}
