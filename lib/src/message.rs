//! Wire and bus message types.
//!
//! Two layers live here. The broadcast wire format (`BroadcastMessage`) is
//! what replicas exchange over the shared channel: `{ action, params }`
//! JSON. The in-process bus (`ClimbarMessage`) carries local commands, wire
//! traffic in both directions, snapshots and actor status between actors.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::{ActorState, CheckpointState, SessionSnapshot, TargetId};
use crate::{CircleGeometry, InputState, ScoreGeometry};

/// Logical name of the channel shared by every participating process.
pub const CHANNEL_NAME: &str = "climbing-ar-main-channel";

/// `circleNumber` used on the wire for the start checkpoint.
pub const CHECKPOINT_CIRCLE_NUMBER: i64 = -1;

// ---------------------------------------------------------------------------
// Broadcast wire format
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BroadcastAction {
    AddCircle,
    StartGame,
    /// Older senders spell this `STOP_GMAE`.
    #[serde(alias = "STOP_GMAE")]
    StopGame,
    ResetCircles,
    ResetGame,
    Track,
    ShowCamera,
    ShowTracking,
    Restart,
    CircleInteraction,
    CircleTouched,
    CircleRemoved,
    /// Anything this build does not know. Receivers drop it.
    #[serde(other)]
    Unknown,
}

impl fmt::Display for BroadcastAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::AddCircle => "ADD_CIRCLE",
            Self::StartGame => "START_GAME",
            Self::StopGame => "STOP_GAME",
            Self::ResetCircles => "RESET_CIRCLES",
            Self::ResetGame => "RESET_GAME",
            Self::Track => "TRACK",
            Self::ShowCamera => "SHOW_CAMERA",
            Self::ShowTracking => "SHOW_TRACKING",
            Self::Restart => "RESTART",
            Self::CircleInteraction => "CIRCLE_INTERACTION",
            Self::CircleTouched => "CIRCLE_TOUCHED",
            Self::CircleRemoved => "CIRCLE_REMOVED",
            Self::Unknown => "UNKNOWN",
        };
        f.write_str(name)
    }
}

/// One message on the broadcast channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BroadcastMessage {
    pub action: BroadcastAction,
    #[serde(default = "empty_params")]
    pub params: serde_json::Value,
}

fn empty_params() -> serde_json::Value {
    serde_json::Value::Object(Default::default())
}

/// Params of `CIRCLE_TOUCHED` and `CIRCLE_REMOVED`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CircleNumberParams {
    pub circle_number: i64,
}

/// Params of the display toggles (`TRACK`, `SHOW_CAMERA`, `SHOW_TRACKING`).
/// A toggle without them asks receivers to flip their current value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToggleParams {
    pub enabled: bool,
}

/// Params of `CIRCLE_INTERACTION`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CircleInteractionParams {
    pub circle_number: i64,
    pub params: CheckpointState,
}

impl BroadcastMessage {
    /// Message with empty `{}` params.
    pub fn new(action: BroadcastAction) -> Self {
        Self {
            action,
            params: empty_params(),
        }
    }

    pub fn with_params(action: BroadcastAction, params: impl Serialize) -> Self {
        Self {
            action,
            params: serde_json::to_value(params).unwrap_or_else(|_| empty_params()),
        }
    }

    pub fn circle_touched(id: TargetId) -> Self {
        Self::with_params(
            BroadcastAction::CircleTouched,
            CircleNumberParams {
                circle_number: i64::from(id),
            },
        )
    }

    pub fn circle_removed(id: TargetId) -> Self {
        Self::with_params(
            BroadcastAction::CircleRemoved,
            CircleNumberParams {
                circle_number: i64::from(id),
            },
        )
    }

    pub fn checkpoint_interaction(state: CheckpointState) -> Self {
        Self::with_params(
            BroadcastAction::CircleInteraction,
            CircleInteractionParams {
                circle_number: CHECKPOINT_CIRCLE_NUMBER,
                params: state,
            },
        )
    }

    /// A display toggle that carries the value it switched to.
    pub fn display_toggle(action: BroadcastAction, enabled: bool) -> Self {
        Self::with_params(action, ToggleParams { enabled })
    }

    /// Value requested by a display toggle, `None` for a plain flip.
    pub fn toggle_state(&self) -> Option<bool> {
        self.params_as::<ToggleParams>().map(|p| p.enabled)
    }

    /// Decode `params` into a typed payload. `None` when the shape is wrong.
    pub fn params_as<T: DeserializeOwned>(&self) -> Option<T> {
        serde_json::from_value(self.params.clone()).ok()
    }

    /// Target id carried in `circleNumber`, if it is a valid target id.
    pub fn target_id(&self) -> Option<TargetId> {
        self.params_as::<CircleNumberParams>()
            .and_then(|p| TargetId::try_from(p.circle_number).ok())
    }
}

// ---------------------------------------------------------------------------
// Bus envelope
// ---------------------------------------------------------------------------

/// A single event on the in-process bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClimbarMessage {
    #[serde(default)]
    pub source: String,
    pub timestamp: DateTime<Utc>,
    pub event: ClimbarEvent,
}

impl ClimbarMessage {
    /// New message stamped with the current time. Use `.source()` to tag it.
    pub fn new(event: impl Into<ClimbarEvent>) -> Self {
        Self {
            source: String::new(),
            timestamp: Utc::now(),
            event: event.into(),
        }
    }

    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClimbarEvent {
    /// Local control request: execute against the local replica, then
    /// broadcast.
    Command(GameCommand),
    /// Wire message produced by the local replica, to be sent to peers.
    Outbound(BroadcastMessage),
    /// Wire message received from a peer. Replayed locally, never forwarded.
    Inbound(BroadcastMessage),
    /// Session state after a change (emitted by the surface actor).
    SessionSnapshot(Box<SessionSnapshot>),
    ActorStatus(ActorState),
    Alert(AlertMessage),
}

impl From<GameCommand> for ClimbarEvent {
    fn from(cmd: GameCommand) -> Self {
        ClimbarEvent::Command(cmd)
    }
}

impl From<SessionSnapshot> for ClimbarEvent {
    fn from(snapshot: SessionSnapshot) -> Self {
        ClimbarEvent::SessionSnapshot(Box::new(snapshot))
    }
}

impl From<ActorState> for ClimbarEvent {
    fn from(state: ActorState) -> Self {
        ClimbarEvent::ActorStatus(state)
    }
}

impl From<AlertMessage> for ClimbarEvent {
    fn from(alert: AlertMessage) -> Self {
        ClimbarEvent::Alert(alert)
    }
}

// ---------------------------------------------------------------------------
// GameCommand: control requests (menu, REST, WS clients)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GameCommand {
    AddTarget,
    RemoveTarget {
        id: TargetId,
    },
    Start,
    Stop,
    ResetGame,
    ResetCircles,
    Touch {
        id: TargetId,
    },
    ClickTarget {
        id: TargetId,
        #[serde(default)]
        input: InputState,
    },
    ClickCheckpoint,
    UpdateTargetGeometry {
        id: TargetId,
        geometry: CircleGeometry,
    },
    UpdateScoreGeometry {
        geometry: ScoreGeometry,
    },
    UpdateCheckpointGeometry {
        geometry: CircleGeometry,
    },
    ToggleTracking,
    ToggleCamera,
    ToggleLandmarks,
    ToggleCollisions,
    Restart,
}

// ---------------------------------------------------------------------------
// AlertMessage: user-visible warn/error notifications
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertLevel {
    Warn,
    Error,
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertLevel::Warn => write!(f, "warn"),
            AlertLevel::Error => write!(f, "error"),
        }
    }
}

/// Warn/error conditions surfaced to WS clients. Info and below stays in
/// the tracing backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertMessage {
    pub level: AlertLevel,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn actions_use_wire_names() {
        let msg = BroadcastMessage::new(BroadcastAction::AddCircle);
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({"action": "ADD_CIRCLE", "params": {}})
        );
        assert_eq!(BroadcastAction::ResetCircles.to_string(), "RESET_CIRCLES");
    }

    #[test]
    fn legacy_stop_spelling_is_accepted() {
        let msg: BroadcastMessage =
            serde_json::from_value(json!({"action": "STOP_GMAE", "params": {}})).unwrap();
        assert_eq!(msg.action, BroadcastAction::StopGame);
        let msg: BroadcastMessage = serde_json::from_value(json!({"action": "STOP_GAME"})).unwrap();
        assert_eq!(msg.action, BroadcastAction::StopGame);
    }

    #[test]
    fn unknown_action_decodes_as_unknown() {
        let msg: BroadcastMessage =
            serde_json::from_value(json!({"action": "PAINT_IT_BLACK", "params": {"x": 1}})).unwrap();
        assert_eq!(msg.action, BroadcastAction::Unknown);
    }

    #[test]
    fn circle_params_use_circle_number() {
        let msg = BroadcastMessage::circle_touched(7);
        assert_eq!(msg.params, json!({"circleNumber": 7}));
        assert_eq!(msg.target_id(), Some(7));

        let checkpoint = BroadcastMessage::checkpoint_interaction(CheckpointState {
            touched: true,
            active: false,
        });
        assert_eq!(
            checkpoint.params,
            json!({"circleNumber": -1, "params": {"touched": true, "active": false}})
        );
        assert_eq!(checkpoint.target_id(), None);
    }

    #[test]
    fn toggles_carry_the_requested_value() {
        let msg = BroadcastMessage::display_toggle(BroadcastAction::Track, true);
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({"action": "TRACK", "params": {"enabled": true}})
        );
        assert_eq!(msg.toggle_state(), Some(true));
        assert_eq!(BroadcastMessage::new(BroadcastAction::Track).toggle_state(), None);
    }

    #[test]
    fn commands_are_tagged_by_type() {
        let cmd: GameCommand = serde_json::from_value(json!({"type": "remove_target", "id": 3})).unwrap();
        assert_eq!(cmd, GameCommand::RemoveTarget { id: 3 });

        let click: GameCommand =
            serde_json::from_value(json!({"type": "click_target", "id": 1})).unwrap();
        assert_eq!(
            click,
            GameCommand::ClickTarget {
                id: 1,
                input: InputState::default()
            }
        );
    }
}
