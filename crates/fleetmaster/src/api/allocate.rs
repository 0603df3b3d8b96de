//! Allocation endpoints

use std::sync::Arc;

use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
};

use fleetmaster_api::requests::AllocateRequest;
use fleetmaster_api::responses::AllocateResponse;
use fleetmaster_core::{AllocationRequest, CoreError};

use crate::api::error::AppError;
use crate::state::AppState;

/// Place a party, parameters in the query string
///
/// # Errors
/// Returns `AppError` for failures other than a policy or capacity rejection
#[utoipa::path(
    get,
    path = "/connect",
    tag = "allocation",
    params(
        ("partySize" = u32, Query, description = "Players to place together"),
        ("identity" = Option<String>, Query, description = "Player identity for the ban check")
    ),
    responses(
        (status = 200, body = AllocateResponse),
        (status = 403, body = AllocateResponse),
        (status = 503, body = AllocateResponse)
    )
)]
pub async fn connect(
    State(state): State<Arc<AppState>>,
    Query(request): Query<AllocateRequest>,
) -> Result<(StatusCode, Json<AllocateResponse>), AppError> {
    allocate_party(&state, request).await
}

/// Place a party, parameters in the body
///
/// # Errors
/// Returns `AppError` for failures other than a policy or capacity rejection
#[utoipa::path(
    post,
    path = "/allocate",
    tag = "allocation",
    request_body = AllocateRequest,
    responses(
        (status = 200, body = AllocateResponse),
        (status = 403, body = AllocateResponse),
        (status = 503, body = AllocateResponse)
    )
)]
pub async fn allocate(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AllocateRequest>,
) -> Result<(StatusCode, Json<AllocateResponse>), AppError> {
    allocate_party(&state, request).await
}

async fn allocate_party(
    state: &AppState,
    request: AllocateRequest,
) -> Result<(StatusCode, Json<AllocateResponse>), AppError> {
    let result = state
        .manager
        .allocate(AllocationRequest {
            party_size: request.party_size,
            identity: request.identity,
        })
        .await;

    let (status, response) = match result {
        Ok(allocation) => {
            let server = allocation.instance;
            tracing::info!(
                server_id = %server.server_id,
                port = server.port,
                placement = ?allocation.placement,
                "party allocated"
            );
            (
                StatusCode::OK,
                AllocateResponse::Assigned {
                    ip_address: server.public_address,
                    port: server.port,
                    server_id: server.server_id,
                    player_count: server.player_count,
                    max_capacity: server.max_capacity,
                },
            )
        }
        Err(e) => rejection(e)?,
    };
    Ok((status, Json(response)))
}

/// Client-facing answer for an allocation that placed nobody
fn rejection(e: CoreError) -> Result<(StatusCode, AllocateResponse), AppError> {
    let message = e.to_string();
    let rejected = match e {
        CoreError::NoCapacity
        | CoreError::FleetFull { .. }
        | CoreError::PortPoolExhausted
        | CoreError::CreationDisabled => (
            StatusCode::SERVICE_UNAVAILABLE,
            AllocateResponse::NoCapacity { message },
        ),
        CoreError::JoiningDisabled => (
            StatusCode::FORBIDDEN,
            AllocateResponse::JoiningDisabled { message },
        ),
        CoreError::Denied(_) | CoreError::IdentityRequired => {
            (StatusCode::FORBIDDEN, AllocateResponse::Denied { message })
        }
        other => return Err(other.into()),
    };
    Ok(rejected)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_mapping() {
        let (status, response) = rejection(CoreError::NoCapacity).unwrap();
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(matches!(response, AllocateResponse::NoCapacity { .. }));

        let (status, response) = rejection(CoreError::Denied("banned".into())).unwrap();
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert!(matches!(response, AllocateResponse::Denied { .. }));

        let (_, response) = rejection(CoreError::JoiningDisabled).unwrap();
        assert!(matches!(response, AllocateResponse::JoiningDisabled { .. }));

        let err = rejection(CoreError::InvalidPartySize { size: 9, max: 5 }).unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }
}
