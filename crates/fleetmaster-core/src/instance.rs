//! Server instance records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use fleetmaster_api::responses::{OccupancyEntry, ServerSummary};

use crate::state::{OccupancySource, Population, ServerState};

/// One game server known to the fleet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInstance {
    /// Store-assigned id, never reused
    pub id: i64,
    /// Unique id handed to the game server
    pub server_id: String,
    /// Runtime container id, once created
    pub container_id: Option<String>,
    pub public_address: String,
    pub private_address: String,
    /// Host port the game is published on
    pub port: u16,
    pub max_capacity: u32,
    pub player_count: u32,
    pub state: ServerState,
    /// Standby servers are never reaped for being empty
    pub is_standby: bool,
    pub last_heartbeat_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    /// Set when the record is soft-deleted
    pub deleted_at: Option<DateTime<Utc>>,
}

impl ServerInstance {
    /// Check if the record has not been soft-deleted
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.deleted_at.is_none()
    }

    /// Check if a party of `party_size` fits without exceeding capacity
    #[must_use]
    pub fn fits(&self, party_size: u32) -> bool {
        self.player_count
            .checked_add(party_size)
            .is_some_and(|total| total <= self.max_capacity)
    }

    /// Check if a party can be placed here right now
    #[must_use]
    pub fn accepts(&self, party_size: u32) -> bool {
        self.is_live() && self.state.is_allocatable() && self.fits(party_size)
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.player_count >= self.max_capacity
    }

    #[must_use]
    pub fn population(&self) -> Population {
        Population::classify(self.player_count, self.max_capacity)
    }

    /// State an idle, healthy server rests in
    #[must_use]
    pub fn resting_state(&self) -> ServerState {
        if self.is_standby {
            ServerState::Standby
        } else {
            ServerState::Ready
        }
    }

    /// Last sign of life: the latest heartbeat, or creation
    #[must_use]
    pub fn last_seen(&self) -> DateTime<Utc> {
        self.last_heartbeat_at.unwrap_or(self.created_at)
    }

    /// Client-facing view of the record
    #[must_use]
    pub fn summary(&self) -> ServerSummary {
        ServerSummary {
            server_id: self.server_id.clone(),
            ip_address: self.public_address.clone(),
            port: self.port,
            player_count: self.player_count,
            max_capacity: self.max_capacity,
            state: self.state.to_string(),
            population: self.population().to_string(),
            standby: self.is_standby,
            container_id: self.container_id.clone(),
            last_heartbeat_at: self.last_heartbeat_at,
            created_at: self.created_at,
            deleted_at: self.deleted_at,
        }
    }
}

/// Fields supplied when a new record is created
#[derive(Debug, Clone)]
pub struct NewInstance {
    pub server_id: String,
    pub public_address: String,
    pub private_address: String,
    pub port: u16,
    pub max_capacity: u32,
    pub is_standby: bool,
}

impl NewInstance {
    /// Materialize the record in `Provisioning` with no players
    #[must_use]
    pub fn into_instance(self, id: i64, now: DateTime<Utc>) -> ServerInstance {
        ServerInstance {
            id,
            server_id: self.server_id,
            container_id: None,
            public_address: self.public_address,
            private_address: self.private_address,
            port: self.port,
            max_capacity: self.max_capacity,
            player_count: 0,
            state: ServerState::Provisioning,
            is_standby: self.is_standby,
            last_heartbeat_at: None,
            created_at: now,
            deleted_at: None,
        }
    }
}

/// One entry of the append-only occupancy log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OccupancyRecord {
    pub player_count: u32,
    pub source: OccupancySource,
    pub recorded_at: DateTime<Utc>,
}

impl OccupancyRecord {
    #[must_use]
    pub fn new(player_count: u32, source: OccupancySource) -> Self {
        Self {
            player_count,
            source,
            recorded_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn entry(&self) -> OccupancyEntry {
        OccupancyEntry {
            player_count: self.player_count,
            source: self.source.to_string(),
            recorded_at: self.recorded_at,
        }
    }
}

/// A record together with its occupancy log
#[derive(Debug, Clone)]
pub struct InstanceHistory {
    pub instance: ServerInstance,
    pub history: Vec<OccupancyRecord>,
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// A live record on `port` in `Ready`
    pub fn instance(id: i64, port: u16, player_count: u32) -> ServerInstance {
        let mut instance = NewInstance {
            server_id: format!("server-{id}"),
            public_address: "203.0.113.7".to_string(),
            private_address: "10.0.0.7".to_string(),
            port,
            max_capacity: 10,
            is_standby: false,
        }
        .into_instance(id, Utc::now());
        instance.player_count = player_count;
        instance.state = ServerState::Ready;
        instance
    }
}
