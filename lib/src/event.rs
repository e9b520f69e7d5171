//! Domain events emitted by the controller to its listeners.

use serde::{Deserialize, Serialize};

use crate::TargetId;

/// Where the mutation behind an event came from.
///
/// Only `Local` mutations are forwarded to the broadcast channel; replayed
/// `Remote` ones never are, which is what keeps replicas from echoing
/// messages back and forth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    Local,
    Remote,
}

/// Observable flags of the start checkpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointState {
    pub touched: bool,
    pub active: bool,
}

/// `Idle` -> `Touched` -> `Active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointPhase {
    Idle,
    Touched,
    Active,
}

impl From<CheckpointState> for CheckpointPhase {
    fn from(state: CheckpointState) -> Self {
        match (state.touched, state.active) {
            (_, true) => CheckpointPhase::Active,
            (true, false) => CheckpointPhase::Touched,
            (false, false) => CheckpointPhase::Idle,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GameEvent {
    Started,
    Stopped,
    CircleTouched { id: TargetId },
    CircleRemoved { id: TargetId },
    CircleInteraction { state: CheckpointState },
}

impl std::fmt::Display for GameEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Started => write!(f, "started"),
            Self::Stopped => write!(f, "stopped"),
            Self::CircleTouched { id } => write!(f, "circle {id} touched"),
            Self::CircleRemoved { id } => write!(f, "circle {id} removed"),
            Self::CircleInteraction { state } => write!(
                f,
                "checkpoint touched={} active={}",
                state.touched, state.active
            ),
        }
    }
}
