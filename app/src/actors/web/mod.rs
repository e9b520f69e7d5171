//! Axum web server: REST endpoints, WebSocket event streaming, and the
//! broadcast channel endpoint other processes link to.

pub mod channel;
pub mod routes;
pub mod ws;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::routing::{get, post};
use tokio::sync::{RwLock, broadcast};
use tower_http::cors::CorsLayer;

use crate::actors::{Actor, actor_names};
use crate::bus::{BusReceiver, BusSender};
use crate::state::SystemState;
use climbar::{
    ActorState, ActorStatus, ActorStatusResponse, BroadcastMessage, ClimbarEvent, ClimbarMessage,
};

const CHANNEL_CAPACITY: usize = 256;

fn new_actor(name: String) -> ActorStatusResponse {
    ActorStatusResponse {
        name,
        status: ActorStatus::Disconnected,
        telemetry: HashMap::new(),
    }
}

/// One message on the channel fan-out. `from` is the channel client that
/// sent it, `None` for the local replica.
#[derive(Debug, Clone)]
pub struct ChannelFrame {
    pub from: Option<String>,
    pub message: BroadcastMessage,
}

impl ChannelFrame {
    /// Every participant sees every message except its own.
    pub fn is_for(&self, client_id: &str) -> bool {
        self.from.as_deref() != Some(client_id)
    }
}

/// Shared state for the web layer.
pub struct WebState {
    pub root: Arc<SystemState>,
    pub bus_tx: broadcast::Sender<ClimbarMessage>,
    pub channel_tx: broadcast::Sender<ChannelFrame>,
    pub actors: RwLock<HashMap<String, ActorStatusResponse>>,
    pub addr: SocketAddr,
    pub actor_id: String,
    pub ws_count: AtomicU64,
    pub channel_count: AtomicU64,
    pub request_count: AtomicU64,
}

impl WebState {
    pub fn new(
        root: Arc<SystemState>,
        bus_tx: broadcast::Sender<ClimbarMessage>,
        addr: SocketAddr,
        actor_id: String,
    ) -> Self {
        // Pre-populate per-actor state from config
        let snap = root.system.snapshot();
        let actors = actor_names(&snap)
            .into_iter()
            .map(|(id, name)| (id, new_actor(name)))
            .collect();
        let (channel_tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            root,
            bus_tx,
            channel_tx,
            actors: RwLock::new(actors),
            addr,
            actor_id,
            ws_count: AtomicU64::new(0),
            channel_count: AtomicU64::new(0),
            request_count: AtomicU64::new(0),
        }
    }
}

/// Emit current telemetry as an ActorStatus event on the bus.
fn emit_status(
    status: ActorStatus,
    state: &WebState,
    bus_tx: &broadcast::Sender<ClimbarMessage>,
) {
    let mut telemetry = HashMap::from([
        ("bind".into(), state.addr.to_string()),
        (
            "websockets".into(),
            state.ws_count.load(Ordering::Relaxed).to_string(),
        ),
        (
            "channel_clients".into(),
            state.channel_count.load(Ordering::Relaxed).to_string(),
        ),
        (
            "requests".into(),
            state.request_count.load(Ordering::Relaxed).to_string(),
        ),
    ]);
    if status == ActorStatus::Disconnected {
        telemetry.insert("error".into(), "bind failed".into());
    }
    let _ = bus_tx
        .send(ClimbarMessage::new(ActorState::new(status, telemetry)).source(&state.actor_id));
}

/// Emit Connected telemetry (convenience for periodic emitter + ws handlers).
pub(super) fn emit_telemetry(state: &WebState, bus_tx: &broadcast::Sender<ClimbarMessage>) {
    emit_status(ActorStatus::Connected, state, bus_tx);
}

// ---------------------------------------------------------------------------
// WebActor: wraps the axum web server as a normal actor
// ---------------------------------------------------------------------------

/// Web server actor. Spawns a dedicated thread with its own tokio runtime
/// to run the axum server and state_updater task.
pub struct WebActor {
    addr: SocketAddr,
    shutdown_tx: Mutex<Option<tokio::sync::oneshot::Sender<()>>>,
}

impl WebActor {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            shutdown_tx: Mutex::new(None),
        }
    }
}

impl Actor for WebActor {
    fn start(&self, state: Arc<SystemState>, sender: BusSender, _receiver: BusReceiver) {
        let addr = self.addr;
        let actor_id = sender.actor_id().to_string();
        let bus_tx = sender.raw_sender().clone();
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
        *self.shutdown_tx.lock().unwrap_or_else(|e| e.into_inner()) = Some(shutdown_tx);

        let thread_name = actor_id.clone();
        std::thread::Builder::new()
            .name(thread_name)
            .spawn(move || {
                let rt = tokio::runtime::Runtime::new()
                    .expect("failed to create webserver tokio runtime");
                rt.block_on(run(addr, actor_id, state, bus_tx, shutdown_rx));
            })
            .expect("failed to spawn webserver thread");
    }

    fn stop(&self) {
        if let Some(tx) = self
            .shutdown_tx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            let _ = tx.send(());
        }
    }
}

// ---------------------------------------------------------------------------
// Web server run loop
// ---------------------------------------------------------------------------

pub(crate) fn router(state: Arc<WebState>) -> Router {
    // Request counter middleware
    let counter_state = Arc::clone(&state);
    let count_middleware = axum::middleware::from_fn(move |req, next: axum::middleware::Next| {
        let st = Arc::clone(&counter_state);
        async move {
            st.request_count.fetch_add(1, Ordering::Relaxed);
            next.run(req).await
        }
    });

    Router::new()
        .route("/api/status", get(routes::get_status))
        .route("/api/session", get(routes::get_session))
        .route("/api/config", get(routes::get_config))
        .route("/api/command", post(routes::post_command))
        .route("/api/ws", get(ws::ws_upgrade))
        .route("/api/channel", get(channel::channel_upgrade))
        .layer(count_middleware)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Run the web server. Blocks until shutdown signal or bus close.
async fn run(
    addr: SocketAddr,
    actor_id: String,
    root: Arc<SystemState>,
    bus_tx: broadcast::Sender<ClimbarMessage>,
    shutdown_rx: tokio::sync::oneshot::Receiver<()>,
) {
    let state = Arc::new(WebState::new(root, bus_tx.clone(), addr, actor_id));

    // Background task: subscribe to bus and update web state
    let updater_state = Arc::clone(&state);
    let bus_rx = bus_tx.subscribe();
    tokio::spawn(state_updater(updater_state, bus_rx));

    // Periodic telemetry emitter (every 5s)
    let telemetry_state = Arc::clone(&state);
    let telemetry_bus = bus_tx.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(5));
        loop {
            interval.tick().await;
            emit_telemetry(&telemetry_state, &telemetry_bus);
        }
    });

    let app = router(Arc::clone(&state));

    // Retry bind until success or shutdown
    let mut shutdown_rx = shutdown_rx;
    let listener = loop {
        match tokio::net::TcpListener::bind(addr).await {
            Ok(l) => break l,
            Err(e) => {
                tracing::warn!("web server: failed to bind {addr}: {e}, retrying in 3s");
                emit_status(ActorStatus::Disconnected, &state, &bus_tx);
                tokio::select! {
                    _ = tokio::time::sleep(std::time::Duration::from_secs(3)) => continue,
                    _ = &mut shutdown_rx => return,
                }
            }
        }
    };

    tracing::info!("web server listening on {addr}");
    emit_status(ActorStatus::Connected, &state, &bus_tx);

    axum::serve(listener, app)
        .with_graceful_shutdown(async { drop(shutdown_rx.await) })
        .await
        .ok();
}

/// Background task that subscribes to the bus and keeps WebState current.
async fn state_updater(state: Arc<WebState>, mut bus_rx: broadcast::Receiver<ClimbarMessage>) {
    loop {
        match bus_rx.recv().await {
            Ok(msg) => apply_bus_event(&state, &msg).await,
            Err(broadcast::error::RecvError::Closed) => break,
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!("web state updater: lagged, dropped {n} events");
            }
        }
    }
}

async fn apply_bus_event(state: &WebState, msg: &ClimbarMessage) {
    match &msg.event {
        ClimbarEvent::ActorStatus(update) => {
            let mut actors = state.actors.write().await;
            let actor = actors
                .entry(msg.source.clone())
                .or_insert_with(|| new_actor(String::new()));
            actor.status = update.status;
            actor.telemetry = update.telemetry.clone();
        }
        ClimbarEvent::Outbound(message) => {
            // No receivers is fine: nobody linked yet.
            let _ = state.channel_tx.send(ChannelFrame {
                from: None,
                message: message.clone(),
            });
        }
        // Commands, inbound traffic, snapshots, alerts: nothing cached here
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::config::{Overrides, SystemConfig};
    use climbar::BroadcastAction;

    pub(super) fn web_state() -> (Arc<WebState>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let system = SystemConfig::new(dir.path().join("config.toml"), &Overrides::default());
        let (root, _writer) = SystemState::new(system);
        let (bus_tx, _) = broadcast::channel(64);
        let state = WebState::new(
            Arc::new(root),
            bus_tx,
            "127.0.0.1:0".parse().unwrap(),
            "webserver.0".into(),
        );
        (Arc::new(state), dir)
    }

    #[test]
    fn frames_skip_their_sender() {
        let local = ChannelFrame {
            from: None,
            message: BroadcastMessage::new(BroadcastAction::AddCircle),
        };
        let remote = ChannelFrame {
            from: Some("channel.a".into()),
            ..local.clone()
        };
        assert!(local.is_for("channel.a"));
        assert!(!remote.is_for("channel.a"));
        assert!(remote.is_for("channel.b"));
    }

    #[test]
    fn bus_events_update_web_state() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let (state, _dir) = web_state();
        let mut channel_rx = state.channel_tx.subscribe();

        rt.block_on(async {
            let status = ClimbarMessage::new(ActorState::new(
                ActorStatus::Connected,
                HashMap::from([("fps".to_string(), "30".to_string())]),
            ))
            .source("surface");
            apply_bus_event(&state, &status).await;

            let outbound = ClimbarMessage::new(ClimbarEvent::Outbound(BroadcastMessage::new(
                BroadcastAction::StartGame,
            )));
            apply_bus_event(&state, &outbound).await;

            let inbound = ClimbarMessage::new(ClimbarEvent::Inbound(BroadcastMessage::new(
                BroadcastAction::StopGame,
            )));
            apply_bus_event(&state, &inbound).await;
        });

        let actors = rt.block_on(state.actors.read());
        assert_eq!(actors["surface"].status, ActorStatus::Connected);
        assert_eq!(actors["surface"].telemetry["fps"], "30");
        assert_eq!(actors["surface"].name, "Game Surface");
        drop(actors);

        let frame = channel_rx.try_recv().unwrap();
        assert_eq!(frame.from, None);
        assert_eq!(frame.message.action, BroadcastAction::StartGame);
        assert!(channel_rx.try_recv().is_err());
    }
}
