//! Fleet-wide operations

use std::sync::Arc;

use axum::{Json, extract::State};

use fleetmaster_api::responses::{FleetActionResponse, ReconcileSummary};

use crate::api::error::AppError;
use crate::state::AppState;

/// Run a reconciliation pass now
///
/// # Errors
/// Returns `AppError` once shutdown has started
#[utoipa::path(
    post,
    path = "/fleet/reconcile",
    tag = "fleet",
    responses((status = 200, body = ReconcileSummary))
)]
pub async fn reconcile(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ReconcileSummary>, AppError> {
    Ok(Json(state.manager.reconcile().await?))
}

/// Start every live server's container
///
/// # Errors
/// Returns `AppError` if the registry is unavailable
#[utoipa::path(
    post,
    path = "/fleet/start-all",
    tag = "fleet",
    responses((status = 200, body = FleetActionResponse))
)]
pub async fn start_all(
    State(state): State<Arc<AppState>>,
) -> Result<Json<FleetActionResponse>, AppError> {
    Ok(Json(state.manager.start_all().await?))
}

/// Stop every managed container
///
/// # Errors
/// Returns `AppError` once shutdown has started
#[utoipa::path(
    post,
    path = "/fleet/stop-all",
    tag = "fleet",
    responses((status = 200, body = FleetActionResponse))
)]
pub async fn stop_all(
    State(state): State<Arc<AppState>>,
) -> Result<Json<FleetActionResponse>, AppError> {
    Ok(Json(state.manager.stop_all().await?))
}
