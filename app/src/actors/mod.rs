//! Actor infrastructure: shared trait, bus helpers, and actor resolution.

pub mod peer;
pub mod surface;
pub mod tracking;
pub mod web;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use tokio::sync::broadcast;

use crate::bus::{BusReceiver, BusSender};
use crate::state::SystemState;
use crate::state::config::{ClimbarConfig, global_id};
use climbar::ClimbarMessage;

// ---------------------------------------------------------------------------
// Actor trait
// ---------------------------------------------------------------------------

/// Common trait for self-managed actors. Each actor struct holds its own config;
/// `start()` clones what it needs and spawns a thread.
pub trait Actor: Send + Sync {
    /// Spawn the actor's run loop.
    fn start(&self, state: Arc<SystemState>, sender: BusSender, receiver: BusReceiver);

    /// Request the actor to stop. Default: no-op (actors check the shutdown
    /// flag via `BusReceiver::is_shutdown()`).
    fn stop(&self) {}
}

// ---------------------------------------------------------------------------
// Actor resolution
// ---------------------------------------------------------------------------

/// A concrete actor ready to be started, resolved from config.
pub struct ResolvedActor {
    pub id: String,
    pub name: String,
    pub actor: Box<dyn Actor>,
}

/// Build a flat list of the config-driven actors (peer links, webservers).
///
/// The surface actor is not in here: it always runs and is started first.
/// Invalid addresses are logged and skipped.
pub fn resolve_actors(config: &ClimbarConfig) -> Vec<ResolvedActor> {
    let mut actors = Vec::new();

    // Peer links
    for (index, section) in &config.peer {
        let id = global_id("peer", index);
        if !section.url.starts_with("ws://") {
            tracing::warn!("peer '{id}': unsupported url '{}'", section.url);
            continue;
        }
        actors.push(ResolvedActor {
            id,
            name: section.name.clone(),
            actor: Box::new(peer::PeerActor {
                url: section.url.clone(),
            }),
        });
    }

    // Webservers
    for (index, ws) in &config.webserver {
        let id = global_id("webserver", index);
        match ws.bind.parse::<SocketAddr>() {
            Ok(addr) => {
                actors.push(ResolvedActor {
                    id,
                    name: ws.name.clone(),
                    actor: Box::new(web::WebActor::new(addr)),
                });
            }
            Err(e) => {
                tracing::warn!("webserver '{id}': invalid bind address '{}': {e}", ws.bind);
            }
        }
    }

    actors
}

/// Start a resolved actor: create bus wrappers, call start(), register in state.
pub fn start_actor(
    id: String,
    actor: Box<dyn Actor>,
    state: &Arc<SystemState>,
    bus_tx: &broadcast::Sender<ClimbarMessage>,
) {
    let shutdown = Arc::new(AtomicBool::new(false));
    let sender = BusSender::new(id.clone(), bus_tx.clone(), Arc::clone(&shutdown));
    let receiver = sender.subscribe();
    actor.start(Arc::clone(state), sender, receiver);
    state.register_actor(id, actor, shutdown);
}

/// Build a map of actor IDs to display names from config (for status output).
pub fn actor_names(config: &ClimbarConfig) -> HashMap<String, String> {
    let mut names = HashMap::new();
    names.insert(surface::SURFACE_ID.to_string(), "Game Surface".to_string());
    for (index, section) in &config.peer {
        names.insert(global_id("peer", index), section.name.clone());
    }
    for (index, ws) in &config.webserver {
        names.insert(global_id("webserver", index), ws.name.clone());
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use climbar::{PeerSection, WebserverSection};

    #[test]
    fn resolves_peers_and_webservers() {
        let mut config = ClimbarConfig::default();
        config.peer.insert(
            "0".into(),
            PeerSection {
                name: "Control".into(),
                url: "ws://127.0.0.1:3031/api/channel".into(),
            },
        );
        config.peer.insert(
            "1".into(),
            PeerSection {
                name: "Bad".into(),
                url: "http://nope".into(),
            },
        );
        config.webserver.insert(
            "1".into(),
            WebserverSection {
                name: "Broken".into(),
                bind: "not-an-address".into(),
            },
        );

        let mut ids: Vec<String> = resolve_actors(&config).into_iter().map(|a| a.id).collect();
        ids.sort();
        assert_eq!(ids, vec!["peer.0", "webserver.0"]);

        let names = actor_names(&config);
        assert_eq!(names["peer.0"], "Control");
        assert!(names.contains_key(surface::SURFACE_ID));
    }
}
