//! REST endpoint handlers.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;

use super::WebState;
use crate::state::config::ClimbarConfig;
use climbar::{ClimbarMessage, CommandResponse, GameCommand, SessionSnapshot, StatusResponse};

/// GET /api/status
pub async fn get_status(State(state): State<Arc<WebState>>) -> Json<StatusResponse> {
    let actors_guard = state.actors.read().await;
    let actors = actors_guard
        .iter()
        .map(|(id, a)| (id.clone(), a.clone()))
        .collect();

    let role = state.root.system.snapshot().surface.role;
    let phase = state.root.session.snapshot().map(|s| s.phase);
    Json(StatusResponse {
        role,
        phase,
        actors,
    })
}

/// GET /api/session. 503 until the surface actor has rendered once.
pub async fn get_session(
    State(state): State<Arc<WebState>>,
) -> Result<Json<SessionSnapshot>, StatusCode> {
    state
        .root
        .session
        .snapshot()
        .map(Json)
        .ok_or(StatusCode::SERVICE_UNAVAILABLE)
}

/// GET /api/config: the running config, command-line overrides included.
pub async fn get_config(State(state): State<Arc<WebState>>) -> Json<ClimbarConfig> {
    Json(state.root.system.snapshot())
}

/// POST /api/command
///
/// Queues a `GameCommand` on the bus for the surface actor. The response
/// only says whether the body parsed; execution failures surface as alerts.
pub async fn post_command(
    State(state): State<Arc<WebState>>,
    body: Result<Json<GameCommand>, JsonRejection>,
) -> (StatusCode, Json<CommandResponse>) {
    match body {
        Ok(Json(cmd)) => {
            tracing::debug!("web: command {cmd:?}");
            let _ = state.bus_tx.send(ClimbarMessage::new(cmd).source("web"));
            (
                StatusCode::ACCEPTED,
                Json(CommandResponse {
                    accepted: true,
                    error: None,
                }),
            )
        }
        Err(rejection) => (
            StatusCode::BAD_REQUEST,
            Json(CommandResponse {
                accepted: false,
                error: Some(rejection.body_text()),
            }),
        ),
    }
}
