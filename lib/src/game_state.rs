//! Snapshot types: session state as seen by renderers, REST and WS clients,
//! plus actor lifecycle status.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{CheckpointPhase, CircleGeometry, ScoreGeometry, Target};

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Controller state: `NotStarted` until the first start, then `Running` or
/// `Stopped`. A game reset returns to `NotStarted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    NotStarted,
    Running,
    Stopped,
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotStarted => write!(f, "not started"),
            Self::Running => write!(f, "running"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointSnapshot {
    pub touched: bool,
    pub active: bool,
    pub phase: CheckpointPhase,
    /// The "touch and hold" pulse is running.
    #[serde(default)]
    pub pulsing: bool,
    pub geometry: CircleGeometry,
}

/// Display toggles driven by `TRACK`, `SHOW_CAMERA` and `SHOW_TRACKING`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplaySettings {
    pub show_camera: bool,
    pub show_landmarks: bool,
    pub tracking_enabled: bool,
    pub detect_collisions: bool,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            show_camera: false,
            show_landmarks: true,
            tracking_enabled: false,
            detect_collisions: true,
        }
    }
}

/// Immutable snapshot of one session replica.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub phase: SessionPhase,
    pub targets: Vec<Target>,
    pub score: u32,
    pub score_geometry: ScoreGeometry,
    pub checkpoint: CheckpointSnapshot,
    pub elapsed_ms: i64,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub stopped_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub display: DisplaySettings,
}

impl SessionSnapshot {
    /// `mm:ss.t` readout of the elapsed time.
    pub fn elapsed_display(&self) -> String {
        let ms = self.elapsed_ms.max(0);
        format!(
            "{:02}:{:02}.{}",
            ms / 60_000,
            (ms / 1000) % 60,
            (ms % 1000) / 100
        )
    }
}

// ---------------------------------------------------------------------------
// ActorStatus: generic actor lifecycle
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorStatus {
    Starting,
    Disconnected,
    Connected,
    Reconnecting,
}

impl std::fmt::Display for ActorStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Starting => write!(f, "starting"),
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connected => write!(f, "connected"),
            Self::Reconnecting => write!(f, "reconnecting"),
        }
    }
}

/// Actor state emitted on the bus: lifecycle status plus free-form
/// key/value telemetry (fps, peer url, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActorState {
    pub status: ActorStatus,
    #[serde(default)]
    pub telemetry: HashMap<String, String>,
}

impl ActorState {
    pub fn new(status: ActorStatus, telemetry: HashMap<String, String>) -> Self {
        Self { status, telemetry }
    }
}
