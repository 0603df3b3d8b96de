//! Request types for the API

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Ask for a seat for a party
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AllocateRequest {
    /// Number of players to place together (0 seats nobody)
    #[serde(default)]
    pub party_size: u32,
    /// Player identity used for the ban check
    #[serde(default, alias = "playfabId", skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,
}

/// Provision a server by hand
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateServerRequest {
    /// Exempt the server from idle reaping
    #[serde(default)]
    pub standby: bool,
    /// Host port to use instead of the next pool port
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

/// Overwrite a server's player count
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlayerCountRequest {
    pub player_count: u32,
}
