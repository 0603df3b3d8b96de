//! Live fleet events, streamed over WebSocket

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum FleetEvent {
    ServerProvisioned {
        server_id: String,
        port: u16,
        standby: bool,
    },
    ServerStateChanged {
        server_id: String,
        from: String,
        to: String,
    },
    OccupancyChanged {
        server_id: String,
        player_count: u32,
        max_capacity: u32,
        source: String,
    },
    ServerRemoved {
        server_id: String,
        port: u16,
        reason: String,
    },
}

impl FleetEvent {
    /// Server the event is about
    #[must_use]
    pub fn server_id(&self) -> &str {
        match self {
            Self::ServerProvisioned { server_id, .. }
            | Self::ServerStateChanged { server_id, .. }
            | Self::OccupancyChanged { server_id, .. }
            | Self::ServerRemoved { server_id, .. } => server_id,
        }
    }
}
