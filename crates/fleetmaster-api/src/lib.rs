//! fleetmaster-api: Shared wire and API types
//!
//! Contains the heartbeat wire contract spoken by game-server processes,
//! request/response types for the HTTP surface, and live fleet events
//! used across the daemon, client and CLI.

pub mod events;
pub mod heartbeat;
pub mod requests;
pub mod responses;

pub use events::FleetEvent;
pub use heartbeat::{HeartbeatParseError, HeartbeatReport};
