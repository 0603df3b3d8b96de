//! Server management endpoints

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;

use fleetmaster_api::heartbeat::HeartbeatReport;
use fleetmaster_api::requests::{CreateServerRequest, PlayerCountRequest};
use fleetmaster_api::responses::{ServerHistoryResponse, ServerSummary};
use fleetmaster_core::{HeartbeatOutcome, ProvisionRequest};

use crate::api::error::AppError;
use crate::state::AppState;

/// Query parameters for listing servers
#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListServersQuery {
    /// Only return servers at or over capacity
    #[serde(default)]
    pub full: bool,
}

/// List live servers
///
/// # Errors
/// Returns `AppError` if the registry is unavailable
#[utoipa::path(
    get,
    path = "/servers",
    tag = "servers",
    params(ListServersQuery),
    responses((status = 200, body = [ServerSummary]))
)]
pub async fn list_servers(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListServersQuery>,
) -> Result<Json<Vec<ServerSummary>>, AppError> {
    let servers = state.manager.list_servers().await?;
    let summaries = servers
        .iter()
        .filter(|s| !query.full || s.is_full())
        .map(|s| s.summary())
        .collect();
    Ok(Json(summaries))
}

/// Provision a server by hand
///
/// # Errors
/// Returns `AppError` if creation is disabled, the fleet is full, or the
/// container could not be started
#[utoipa::path(
    post,
    path = "/servers",
    tag = "servers",
    request_body = CreateServerRequest,
    responses(
        (status = 201, body = ServerSummary),
        (status = 403, body = crate::api::ApiError),
        (status = 503, body = crate::api::ApiError)
    )
)]
pub async fn create_server(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateServerRequest>,
) -> Result<impl IntoResponse, AppError> {
    let instance = state
        .manager
        .create_server(ProvisionRequest {
            standby: request.standby,
            port: request.port,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(instance.summary())))
}

/// Get the live server on a port
///
/// # Errors
/// Returns `AppError` (404) if no live server uses the port
#[utoipa::path(
    get,
    path = "/servers/{port}",
    tag = "servers",
    params(("port" = u16, Path, description = "Host port of the server")),
    responses((status = 200, body = ServerSummary), (status = 404, body = crate::api::ApiError))
)]
pub async fn get_server(
    State(state): State<Arc<AppState>>,
    Path(port): Path<u16>,
) -> Result<Json<ServerSummary>, AppError> {
    let instance = state.manager.server_by_port(port).await?;
    Ok(Json(instance.summary()))
}

/// Get a live server by id
///
/// # Errors
/// Returns `AppError` (404) if no live server has the id
#[utoipa::path(
    get,
    path = "/servers/by-id/{server_id}",
    tag = "servers",
    params(("server_id" = String, Path, description = "Server id")),
    responses((status = 200, body = ServerSummary), (status = 404, body = crate::api::ApiError))
)]
pub async fn get_server_by_id(
    State(state): State<Arc<AppState>>,
    Path(server_id): Path<String>,
) -> Result<Json<ServerSummary>, AppError> {
    let instance = state.manager.server_by_id(&server_id).await?;
    Ok(Json(instance.summary()))
}

/// A server's occupancy log, including removed servers
///
/// # Errors
/// Returns `AppError` (404) if no server ever had the id
#[utoipa::path(
    get,
    path = "/servers/by-id/{server_id}/history",
    tag = "servers",
    params(("server_id" = String, Path, description = "Server id")),
    responses(
        (status = 200, body = ServerHistoryResponse),
        (status = 404, body = crate::api::ApiError)
    )
)]
pub async fn server_history(
    State(state): State<Arc<AppState>>,
    Path(server_id): Path<String>,
) -> Result<Json<ServerHistoryResponse>, AppError> {
    let history = state.manager.history(&server_id).await?;
    Ok(Json(ServerHistoryResponse {
        server: history.instance.summary(),
        history: history.history.iter().map(|r| r.entry()).collect(),
    }))
}

/// Tear down the server on a port
///
/// The record is removed even when the container could not be; the driver
/// failure is logged.
///
/// # Errors
/// Returns `AppError` (404) if no live server uses the port
#[utoipa::path(
    delete,
    path = "/servers/{port}",
    tag = "servers",
    params(("port" = u16, Path, description = "Host port of the server")),
    responses((status = 200, body = ServerSummary), (status = 404, body = crate::api::ApiError))
)]
pub async fn remove_server(
    State(state): State<Arc<AppState>>,
    Path(port): Path<u16>,
) -> Result<Json<ServerSummary>, AppError> {
    let removed = state.manager.remove_server(port).await?;
    if let Some(e) = &removed.teardown_error {
        tracing::warn!(port, error = %e, "server removed but container teardown failed");
    }
    Ok(Json(removed.instance.summary()))
}

/// Overwrite a server's player count
///
/// # Errors
/// Returns `AppError` (404) if no live server uses the port
#[utoipa::path(
    put,
    path = "/servers/{port}/player-count",
    tag = "servers",
    params(("port" = u16, Path, description = "Host port of the server")),
    request_body = PlayerCountRequest,
    responses((status = 200, body = ServerSummary), (status = 404, body = crate::api::ApiError))
)]
pub async fn override_player_count(
    State(state): State<Arc<AppState>>,
    Path(port): Path<u16>,
    Json(request): Json<PlayerCountRequest>,
) -> Result<Json<ServerSummary>, AppError> {
    let instance = state
        .manager
        .override_player_count(port, request.player_count)
        .await?;
    Ok(Json(instance.summary()))
}

/// Heartbeat delivered over HTTP
///
/// # Errors
/// Returns `AppError` (404) for an unknown server and (422) for a rejected
/// report
#[utoipa::path(
    post,
    path = "/servers/{server_id}/player-count",
    tag = "servers",
    params(("server_id" = String, Path, description = "Server id")),
    request_body = PlayerCountRequest,
    responses(
        (status = 204),
        (status = 404, body = crate::api::ApiError),
        (status = 422, body = crate::api::ApiError)
    )
)]
pub async fn report_player_count(
    State(state): State<Arc<AppState>>,
    Path(server_id): Path<String>,
    Json(request): Json<PlayerCountRequest>,
) -> Result<StatusCode, AppError> {
    let report = HeartbeatReport::new(server_id, request.player_count);
    match state.manager.report_heartbeat(&report).await? {
        HeartbeatOutcome::Applied => Ok(StatusCode::NO_CONTENT),
        HeartbeatOutcome::UnknownServer(id) => Err(AppError::new(
            StatusCode::NOT_FOUND,
            "SERVER_NOT_FOUND",
            format!("server not found: {id}"),
        )),
        HeartbeatOutcome::Rejected(reason) | HeartbeatOutcome::ReadFailed(reason) => Err(
            AppError::new(StatusCode::UNPROCESSABLE_ENTITY, "HEARTBEAT_REJECTED", reason),
        ),
    }
}
