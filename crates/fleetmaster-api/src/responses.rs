//! Response types for the API

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    /// Fleet name from configuration
    pub fleet: String,
    pub live_servers: usize,
}

/// One server as shown to clients and operators
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServerSummary {
    pub server_id: String,
    pub ip_address: String,
    pub port: u16,
    pub player_count: u32,
    pub max_capacity: u32,
    pub state: String,
    pub population: String,
    pub standby: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_heartbeat_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Result of an allocation request
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(tag = "outcome", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum AllocateResponse {
    Assigned {
        ip_address: String,
        port: u16,
        server_id: String,
        player_count: u32,
        max_capacity: u32,
    },
    NoCapacity { message: String },
    JoiningDisabled { message: String },
    Denied { message: String },
}

/// One entry of a server's occupancy log
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OccupancyEntry {
    pub player_count: u32,
    pub source: String,
    pub recorded_at: DateTime<Utc>,
}

/// A server and its full occupancy log, soft-deleted servers included
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServerHistoryResponse {
    pub server: ServerSummary,
    pub history: Vec<OccupancyEntry>,
}

/// Outcome of a reconciliation pass
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileSummary {
    pub orphans_removed: usize,
    pub stale_records_removed: usize,
    pub replacements_provisioned: usize,
    pub bootstrapped: usize,
    pub errors: Vec<String>,
}

/// Outcome of a bulk container action
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FleetActionResponse {
    pub affected: usize,
    pub errors: Vec<String>,
}
