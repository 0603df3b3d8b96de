//! Message types for the registry actor
//!
//! Handlers live in `actor::registry`.

use chrono::{DateTime, Utc};

use crate::instance::NewInstance;
use crate::state::OccupancySource;

/// List every live record
#[derive(Debug)]
pub struct ListInstances;

/// Look up a live record by host port
#[derive(Debug)]
pub struct GetByPort {
    pub port: u16,
}

/// Look up a live record by server id
#[derive(Debug)]
pub struct GetByServerId {
    pub server_id: String,
}

/// Fetch a record and its occupancy log, soft-deleted records included
#[derive(Debug)]
pub struct GetHistory {
    pub server_id: String,
}

/// Create a record in `Provisioning`
#[derive(Debug)]
pub struct InsertInstance {
    pub draft: NewInstance,
    /// Reject when this many live records already exist
    pub fleet_limit: Option<usize>,
}

/// Attach the created container and move to the resting state
#[derive(Debug)]
pub struct MarkProvisioned {
    pub id: i64,
    pub container_id: String,
}

/// Set the player count of a live record
#[derive(Debug)]
pub struct ApplyOccupancy {
    pub server_id: String,
    pub player_count: u32,
    pub source: OccupancySource,
}

/// Overwrite the player count of the live record on `port`
#[derive(Debug)]
pub struct OverridePlayerCount {
    pub port: u16,
    pub player_count: u32,
}

/// Add a party to a record, re-checking capacity at commit
#[derive(Debug)]
pub struct ReserveSeats {
    pub id: i64,
    pub party_size: u32,
    /// Accept the party even if it exceeds capacity
    pub allow_overfill: bool,
}

/// Move a live record to `Terminating`
#[derive(Debug)]
pub struct BeginTeardown {
    pub id: i64,
    /// Only proceed if the record is an empty, non-standby server
    pub only_if_idle: bool,
}

/// Soft-delete a record
#[derive(Debug)]
pub struct SoftDelete {
    pub id: i64,
    pub reason: String,
}

/// Mark records silent since `cutoff` as `Unresponsive`
#[derive(Debug)]
pub struct MarkStale {
    pub cutoff: DateTime<Utc>,
}

/// Make all writes durable
#[derive(Debug)]
pub struct Flush;
