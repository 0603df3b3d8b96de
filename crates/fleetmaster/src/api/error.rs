//! API error types

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use fleetmaster_core::CoreError;

/// API error response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// Error code
    pub code: String,
    /// Error message
    pub message: String,
}

/// Wrapper for API errors with status codes
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub error: ApiError,
}

impl AppError {
    pub fn new(status: StatusCode, code: &str, message: impl Into<String>) -> Self {
        Self {
            status,
            error: ApiError {
                code: code.to_string(),
                message: message.into(),
            },
        }
    }
}

impl From<CoreError> for AppError {
    fn from(e: CoreError) -> Self {
        let (status, code) = match &e {
            CoreError::ServerNotFound(_) => (StatusCode::NOT_FOUND, "SERVER_NOT_FOUND"),
            CoreError::DuplicateEndpoint { .. } | CoreError::DuplicateServerId(_) => {
                (StatusCode::CONFLICT, "DUPLICATE_SERVER")
            }
            CoreError::InvalidTransition { .. } | CoreError::CapacityConflict(_) => {
                (StatusCode::CONFLICT, "CONFLICT")
            }
            CoreError::CreationDisabled => (StatusCode::FORBIDDEN, "CREATION_DISABLED"),
            CoreError::JoiningDisabled => (StatusCode::FORBIDDEN, "JOINING_DISABLED"),
            CoreError::Denied(_) => (StatusCode::FORBIDDEN, "DENIED"),
            CoreError::IdentityRequired => (StatusCode::UNAUTHORIZED, "IDENTITY_REQUIRED"),
            CoreError::FleetFull { .. } | CoreError::NoCapacity | CoreError::PortPoolExhausted => {
                (StatusCode::SERVICE_UNAVAILABLE, "NO_CAPACITY")
            }
            CoreError::InvalidPartySize { .. } => (StatusCode::BAD_REQUEST, "INVALID_PARTY_SIZE"),
            CoreError::ShuttingDown => (StatusCode::SERVICE_UNAVAILABLE, "SHUTTING_DOWN"),
            CoreError::Driver(_) => (StatusCode::BAD_GATEWAY, "DRIVER_ERROR"),
            CoreError::Entitlement(_) => (StatusCode::BAD_GATEWAY, "ENTITLEMENT_ERROR"),
            CoreError::Store(_)
            | CoreError::Io(_)
            | CoreError::ActorError(_)
            | CoreError::ConfigError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };

        if status.is_server_error() {
            tracing::error!(error = %e, code, "request failed");
        }
        Self::new(status, code, e.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status, Json(self.error)).into_response()
    }
}
