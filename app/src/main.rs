use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use clap::Parser;
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

mod actors;
mod bus;
mod state;

use actors::Actor;
use actors::surface::{SURFACE_ID, SurfaceActor};
use bus::BusSender;
use climbar::{CHANNEL_NAME, ClimbarMessage, SurfaceRole};
use state::SystemState;
use state::config::{Overrides, SystemConfig};

#[derive(Parser, Debug, Clone)]
#[command(name = "climbar", about = "Pose-tracked target touching game")]
struct Config {
    /// Config file path (default: ~/.config/climbar/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Run as the tracking stage or as a menu-driven control surface
    #[arg(long, value_enum)]
    role: Option<SurfaceRole>,

    /// Web server bind address, replacing the configured ones
    #[arg(long)]
    bind: Option<String>,

    /// Broadcast channel of another process to link to, e.g.
    /// ws://192.168.1.20:3030/api/channel (repeatable)
    #[arg(long)]
    peer: Vec<String>,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> anyhow::Result<()> {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::new("climbar=info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::debug!("debug logging enabled");

    let cli = Config::parse();

    // Load (or create) config file, then apply command-line overrides
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(state::config::default_config_path);
    let overrides = Overrides {
        role: cli.role,
        bind: cli.bind.clone(),
        peers: cli.peer.clone(),
    };
    let system = SystemConfig::new(config_path, &overrides);
    tracing::info!(
        "config: {} ({} replica on channel '{CHANNEL_NAME}')",
        system.path().display(),
        system.snapshot().surface.role
    );

    let rt = tokio::runtime::Runtime::new()?;
    let _guard = rt.enter();

    // Single unified bus
    let (bus_tx, _) = broadcast::channel::<ClimbarMessage>(1024);

    // Build shared state root
    let (system_state, session_writer) = SystemState::new(system);
    let state = Arc::new(system_state);

    // Surface actor: owns the game replica. Must be fully up before other
    // actors start so no command or inbound message is missed.
    {
        let shutdown = Arc::new(AtomicBool::new(false));
        let sender = BusSender::new(SURFACE_ID.into(), bus_tx.clone(), Arc::clone(&shutdown));
        let receiver = sender.subscribe();
        let (actor, ready_rx) = SurfaceActor::new(session_writer);
        actor.start(Arc::clone(&state), sender, receiver);
        ready_rx.recv()?;
        state.register_actor(SURFACE_ID.into(), Box::new(actor), shutdown);
    }

    // Start all actors from config (peer links, webservers)
    let snap = state.system.snapshot();
    for ra in actors::resolve_actors(&snap) {
        tracing::info!("starting actor '{}' ({})", ra.id, ra.name);
        actors::start_actor(ra.id, ra.actor, &state, &bus_tx);
    }

    // Drain bus (keeps broadcast channel healthy when no other subscriber)
    let mut drain_rx = bus_tx.subscribe();
    let drain_handle = tokio::spawn(async move {
        loop {
            match drain_rx.recv().await {
                Ok(_) => {}
                Err(broadcast::error::RecvError::Closed) => break,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("drain subscriber lagged, dropped {n} events");
                }
            }
        }
    });

    rt.block_on(async { tokio::signal::ctrl_c().await })?;

    // Shutdown: stop all actors (including webservers) via registry
    tracing::info!("shutting down...");
    for id in state.actor_ids() {
        state.stop_actor(&id);
    }
    // Drop bus_tx closes the broadcast channel as secondary signal
    drop(bus_tx);
    drain_handle.abort();

    Ok(())
}
