use std::collections::HashMap;
use std::fmt;

use chrono::TimeDelta;
use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

use crate::{CheckpointTiming, ControllerSettings, LastTargetRule, Viewport};
use crate::{DEFAULT_HOLD_MS, DEFAULT_POINT_RADIUS, DEFAULT_TIMEOUT_MS};

/// Which half of a control/stage pair this process is.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[serde(rename_all = "snake_case")]
pub enum SurfaceRole {
    /// Runs tracking and collision detection, draws the game.
    #[default]
    Stage,
    /// Menu-driven replica; sends commands, never tracks.
    Control,
}

impl fmt::Display for SurfaceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stage => write!(f, "stage"),
            Self::Control => write!(f, "control"),
        }
    }
}

/// A time interval with unit. Serializes as a suffix string: `"2000ms"`,
/// `"5s"`, `"1.5s"`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Interval {
    Millis(i64),
    Seconds(f64),
}

impl Serialize for Interval {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Interval {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

impl std::str::FromStr for Interval {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        // "ms" before "s"
        if let Some(num) = s.strip_suffix("ms") {
            let v: i64 = num
                .trim()
                .parse()
                .map_err(|_| format!("invalid number in interval: {s:?}"))?;
            if v < 0 {
                return Err(format!("negative interval: {s:?}"));
            }
            return Ok(Self::Millis(v));
        }
        if let Some(num) = s.strip_suffix('s') {
            let v: f64 = num
                .trim()
                .parse()
                .map_err(|_| format!("invalid number in interval: {s:?}"))?;
            if !v.is_finite() || v < 0.0 {
                return Err(format!("invalid interval: {s:?}"));
            }
            return Ok(Self::Seconds(v));
        }
        Err(format!(
            "invalid interval {s:?}: expected number with suffix (ms, s)"
        ))
    }
}

impl Interval {
    pub fn as_millis(self) -> i64 {
        match self {
            Self::Millis(v) => v,
            Self::Seconds(v) => (v * 1000.0).round() as i64,
        }
    }

    pub fn as_delta(self) -> TimeDelta {
        TimeDelta::milliseconds(self.as_millis())
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Millis(v) => write!(f, "{v}ms"),
            Self::Seconds(v) => write!(f, "{v}s"),
        }
    }
}

// ---------------------------------------------------------------------------
// Persisted config types
// ---------------------------------------------------------------------------

/// Top-level persisted config. Everything is hand-editable TOML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClimbarConfig {
    #[serde(default)]
    pub surface: SurfaceSection,
    #[serde(default)]
    pub game: GameSection,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub webserver: HashMap<String, WebserverSection>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub peer: HashMap<String, PeerSection>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub sim_tracking: HashMap<String, SimTrackingSection>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub replay_tracking: HashMap<String, ReplayTrackingSection>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurfaceSection {
    #[serde(default)]
    pub role: SurfaceRole,
    #[serde(default = "default_width")]
    pub width: f64,
    #[serde(default = "default_height")]
    pub height: f64,
}

fn default_width() -> f64 {
    Viewport::default().width
}

fn default_height() -> f64 {
    Viewport::default().height
}

impl Default for SurfaceSection {
    fn default() -> Self {
        Self {
            role: SurfaceRole::default(),
            width: default_width(),
            height: default_height(),
        }
    }
}

impl SurfaceSection {
    pub fn viewport(&self) -> Viewport {
        Viewport::new(self.width, self.height)
    }
}

/// Gameplay tuning. Every field is optional in the file.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GameSection {
    /// Detection radius of each landmark point, in pixels.
    pub point_radius: Option<f64>,
    pub checkpoint_hold: Option<Interval>,
    pub checkpoint_timeout: Option<Interval>,
    /// Score/timer refresh rate while running.
    pub refresh_hz: Option<u32>,
    pub last_target_rule: Option<LastTargetRule>,
    pub target_radius: Option<f64>,
    pub stroke_width: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebserverSection {
    #[serde(default)]
    pub name: String,
    pub bind: String,
}

/// Another process's broadcast channel endpoint to link to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerSection {
    #[serde(default)]
    pub name: String,
    /// e.g. `ws://192.168.1.20:3030/api/channel`
    pub url: String,
}

/// Synthetic landmark source (no camera needed).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimTrackingSection {
    #[serde(default)]
    pub name: String,
    pub fps: Option<u32>,
    pub seed: Option<u64>,
}

/// Landmark frames read from a JSON-lines recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayTrackingSection {
    #[serde(default)]
    pub name: String,
    pub path: String,
    pub fps: Option<u32>,
    #[serde(default)]
    pub looped: bool,
}

impl Default for ClimbarConfig {
    /// A stage surface with one web server and a simulated tracker.
    fn default() -> Self {
        let mut webserver = HashMap::new();
        webserver.insert(
            "0".into(),
            WebserverSection {
                name: "Web Server".into(),
                bind: "0.0.0.0:3030".into(),
            },
        );
        let mut sim_tracking = HashMap::new();
        sim_tracking.insert(
            "0".into(),
            SimTrackingSection {
                name: "Simulated Tracking".into(),
                fps: Some(30),
                seed: None,
            },
        );
        Self {
            surface: SurfaceSection::default(),
            game: GameSection::default(),
            webserver,
            peer: HashMap::new(),
            sim_tracking,
            replay_tracking: HashMap::new(),
        }
    }
}

impl ClimbarConfig {
    /// Resolve the game section against built-in defaults.
    pub fn controller_settings(&self) -> ControllerSettings {
        let defaults = ControllerSettings::default();
        let game = &self.game;
        ControllerSettings {
            viewport: self.surface.viewport(),
            point_radius: game.point_radius.unwrap_or(DEFAULT_POINT_RADIUS),
            checkpoint: CheckpointTiming {
                hold: game
                    .checkpoint_hold
                    .unwrap_or(Interval::Millis(DEFAULT_HOLD_MS))
                    .as_delta(),
                timeout: game
                    .checkpoint_timeout
                    .unwrap_or(Interval::Millis(DEFAULT_TIMEOUT_MS))
                    .as_delta(),
            },
            refresh_hz: game.refresh_hz.unwrap_or(defaults.refresh_hz),
            last_target_rule: game.last_target_rule.unwrap_or_default(),
            target_radius: game.target_radius.unwrap_or(defaults.target_radius),
            stroke_width: game.stroke_width.unwrap_or(defaults.stroke_width),
            ..defaults
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_parses_suffixes() {
        assert_eq!("2000ms".parse::<Interval>(), Ok(Interval::Millis(2000)));
        assert_eq!("5s".parse::<Interval>(), Ok(Interval::Seconds(5.0)));
        assert_eq!(" 1.5s ".parse::<Interval>().unwrap().as_millis(), 1500);
        assert!("5".parse::<Interval>().is_err());
        assert!("-3ms".parse::<Interval>().is_err());
        assert_eq!(Interval::Millis(250).to_string(), "250ms");
    }

    #[test]
    fn empty_file_gives_defaults() {
        let cfg: ClimbarConfig = toml::from_str("").unwrap();
        assert_eq!(cfg.surface.role, SurfaceRole::Stage);
        assert!(cfg.webserver.is_empty());
        let settings = cfg.controller_settings();
        assert_eq!(settings.point_radius, DEFAULT_POINT_RADIUS);
        assert_eq!(settings.checkpoint, CheckpointTiming::default());
        assert_eq!(settings.last_target_rule, LastTargetRule::AnyPoint);
    }

    #[test]
    fn game_section_overrides_defaults() {
        let cfg: ClimbarConfig = toml::from_str(
            r#"
            [surface]
            role = "control"
            width = 800.0
            height = 600.0

            [game]
            checkpoint_hold = "1.5s"
            checkpoint_timeout = "8000ms"
            last_target_rule = "both_hands"

            [peer.0]
            url = "ws://10.0.0.2:3030/api/channel"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.surface.role, SurfaceRole::Control);
        assert_eq!(cfg.peer["0"].url, "ws://10.0.0.2:3030/api/channel");

        let settings = cfg.controller_settings();
        assert_eq!(settings.viewport, Viewport::new(800.0, 600.0));
        assert_eq!(settings.checkpoint.hold, TimeDelta::milliseconds(1500));
        assert_eq!(settings.checkpoint.timeout, TimeDelta::milliseconds(8000));
        assert_eq!(settings.last_target_rule, LastTargetRule::BothHands);
    }

    #[test]
    fn default_config_round_trips_through_toml() {
        let cfg = ClimbarConfig::default();
        let text = toml::to_string_pretty(&cfg).unwrap();
        let back: ClimbarConfig = toml::from_str(&text).unwrap();
        assert_eq!(back, cfg);
    }
}
