//! REST API request/response types.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{ActorStatus, SessionPhase, SurfaceRole};

/// GET /api/status response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub role: SurfaceRole,
    #[serde(default)]
    pub phase: Option<SessionPhase>,
    #[serde(default)]
    pub actors: HashMap<String, ActorStatusResponse>,
}

/// Per-actor status within the status response. Also the cached per-actor
/// state in the web layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActorStatusResponse {
    #[serde(default)]
    pub name: String,
    pub status: ActorStatus,
    #[serde(default)]
    pub telemetry: HashMap<String, String>,
}

/// POST /api/command response. The command is queued on the bus; `accepted`
/// only says it parsed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResponse {
    pub accepted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
