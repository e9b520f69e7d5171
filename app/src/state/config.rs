//! Configuration loading, overrides and persistence.
//!
//! Handles the TOML config file (~/.config/climbar/config.toml) with
//! type-prefixed sections: `[webserver.<id>]`, `[peer.<id>]`, etc.

use std::path::{Path, PathBuf};
use std::sync::RwLock;

pub use climbar::ClimbarConfig;
use climbar::{PeerSection, SurfaceRole, WebserverSection};

/// Build a global ID from a type prefix and index: `"peer.0"`, `"webserver.0"`.
pub fn global_id(prefix: &str, index: &str) -> String {
    format!("{prefix}.{index}")
}

/// Short unique ID (8 hex chars). Used for WebSocket source IDs (`ws.{hex}`).
pub fn generate_id() -> String {
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(8);
    id
}

// ---------------------------------------------------------------------------
// Persistence I/O
// ---------------------------------------------------------------------------

/// Returns `~/.config/climbar/config.toml`.
pub fn default_config_path() -> PathBuf {
    let dir = dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("climbar");
    dir.join("config.toml")
}

/// Load persisted config from disk. A missing file is created with
/// defaults; an unreadable or invalid one falls back to defaults.
pub fn load(path: &Path) -> ClimbarConfig {
    match std::fs::read_to_string(path) {
        Ok(contents) => match toml::from_str::<ClimbarConfig>(&contents) {
            Ok(config) => {
                tracing::info!("loaded config from {}", path.display());
                config
            }
            Err(e) => {
                tracing::warn!("failed to parse {}: {e}", path.display());
                ClimbarConfig::default()
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            let defaults = ClimbarConfig::default();
            tracing::info!("no config file found, creating {}", path.display());
            save_to(path, &defaults);
            defaults
        }
        Err(e) => {
            tracing::warn!("failed to read {}: {e}", path.display());
            ClimbarConfig::default()
        }
    }
}

/// Write config to a specific path. Creates parent dirs if needed. Never panics.
pub fn save_to(path: &Path, config: &ClimbarConfig) {
    if let Some(dir) = path.parent()
        && let Err(e) = std::fs::create_dir_all(dir)
    {
        tracing::warn!("failed to create config dir {}: {e}", dir.display());
        return;
    }
    match toml::to_string_pretty(config) {
        Ok(contents) => {
            if let Err(e) = std::fs::write(path, contents) {
                tracing::warn!("failed to write {}: {e}", path.display());
            }
        }
        Err(e) => {
            tracing::warn!("failed to serialize config: {e}");
        }
    }
}

// ---------------------------------------------------------------------------
// Command-line overrides
// ---------------------------------------------------------------------------

/// Settings given on the command line. They apply to this run only and are
/// never written back to the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub role: Option<SurfaceRole>,
    pub bind: Option<String>,
    pub peers: Vec<String>,
}

impl Overrides {
    pub fn apply(&self, config: &mut ClimbarConfig) {
        if let Some(role) = self.role {
            config.surface.role = role;
        }
        if let Some(bind) = &self.bind {
            config.webserver.clear();
            config.webserver.insert(
                "0".into(),
                WebserverSection {
                    name: "Web Server".into(),
                    bind: bind.clone(),
                },
            );
        }
        if !self.peers.is_empty() {
            config.peer = self
                .peers
                .iter()
                .enumerate()
                .map(|(i, url)| {
                    (
                        i.to_string(),
                        PeerSection {
                            name: format!("Peer {i}"),
                            url: url.clone(),
                        },
                    )
                })
                .collect();
        }
        // A control surface never tracks.
        if config.surface.role == SurfaceRole::Control {
            config.sim_tracking.clear();
            config.replay_tracking.clear();
        }
    }
}

// ---------------------------------------------------------------------------
// Cached config
// ---------------------------------------------------------------------------

/// Configuration loaded once at startup, with overrides applied.
///
/// Reads are cheap (RwLock read guard + clone).
pub struct SystemConfig {
    path: PathBuf,
    inner: RwLock<ClimbarConfig>,
}

impl SystemConfig {
    pub fn new(path: PathBuf, overrides: &Overrides) -> Self {
        let mut config = load(&path);
        overrides.apply(&mut config);
        Self {
            path,
            inner: RwLock::new(config),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn snapshot(&self) -> ClimbarConfig {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_created_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let config = load(&path);
        assert_eq!(config, ClimbarConfig::default());
        assert!(path.exists());
        assert_eq!(load(&path), config);
    }

    #[test]
    fn invalid_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[surface\nrole = ").unwrap();
        assert_eq!(load(&path), ClimbarConfig::default());
    }

    #[test]
    fn overrides_apply_without_touching_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let overrides = Overrides {
            role: Some(SurfaceRole::Control),
            bind: Some("127.0.0.1:4040".into()),
            peers: vec!["ws://10.0.0.5:3030/api/channel".into()],
        };
        let system = SystemConfig::new(path.clone(), &overrides);
        let snap = system.snapshot();
        assert_eq!(snap.surface.role, SurfaceRole::Control);
        assert_eq!(snap.webserver["0"].bind, "127.0.0.1:4040");
        assert_eq!(snap.peer["0"].url, "ws://10.0.0.5:3030/api/channel");
        assert!(snap.sim_tracking.is_empty());

        assert_eq!(load(&path), ClimbarConfig::default());
    }

    #[test]
    fn generated_ids_are_short_hex() {
        let id = generate_id();
        assert_eq!(id.len(), 8);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(id, generate_id());
    }
}
