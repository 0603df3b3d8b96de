//! System endpoints

use std::sync::Arc;

use axum::{Json, extract::State};

use fleetmaster_api::responses::HealthResponse;

use crate::api::error::AppError;
use crate::state::AppState;

/// Liveness and fleet size
#[utoipa::path(
    get,
    path = "/health",
    tag = "system",
    responses((status = 200, body = HealthResponse))
)]
pub async fn health(State(state): State<Arc<AppState>>) -> Result<Json<HealthResponse>, AppError> {
    let live_servers = state.manager.list_servers().await?.len();
    let status = if state.manager.is_accepting() {
        "ok"
    } else {
        "shutting_down"
    };

    Ok(Json(HealthResponse {
        status: status.to_string(),
        fleet: state.config.fleet.name.clone(),
        live_servers,
    }))
}
