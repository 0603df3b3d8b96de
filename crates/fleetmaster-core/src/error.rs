//! Core error types for fleetmaster-core

use thiserror::Error;

use fleetmaster_driver::DriverError;

use crate::state::ServerState;

/// Errors that can occur in fleet operations
#[derive(Error, Debug, Clone)]
pub enum CoreError {
    /// No live server matches the lookup
    #[error("server not found: {0}")]
    ServerNotFound(String),

    /// Another live server already uses this address and port
    #[error("endpoint already in use: {address}:{port}")]
    DuplicateEndpoint {
        /// Public address
        address: String,
        /// Host port
        port: u16,
    },

    /// Another live server already uses this server id
    #[error("server id already in use: {0}")]
    DuplicateServerId(String),

    /// Invalid state transition attempted
    #[error("invalid state transition from {from} to {to}")]
    InvalidTransition {
        /// Current state
        from: ServerState,
        /// Attempted target state
        to: ServerState,
    },

    /// Server changed between selection and commit; selection should be retried
    #[error("server {0} no longer fits the request")]
    CapacityConflict(String),

    /// Policy forbids provisioning new servers
    #[error("server creation is disabled")]
    CreationDisabled,

    /// Fleet already holds the maximum number of live servers
    #[error("maximum fleet size reached ({max})")]
    FleetFull {
        /// Configured maximum
        max: usize,
    },

    /// Policy forbids placing players
    #[error("server joining is disabled")]
    JoiningDisabled,

    /// No server could take the party
    #[error("no server capacity available")]
    NoCapacity,

    /// Entitlement check refused the player
    #[error("player is not allowed to join: {0}")]
    Denied(String),

    /// Entitlement check is enabled but no identity was supplied
    #[error("an identity token is required to join")]
    IdentityRequired,

    /// Party size outside the accepted range
    #[error("invalid party size {size} (maximum {max})")]
    InvalidPartySize {
        /// Requested size
        size: u32,
        /// Largest accepted size
        max: u32,
    },

    /// No host ports left in the configured range
    #[error("port pool exhausted")]
    PortPoolExhausted,

    /// Fleet manager is shutting down
    #[error("fleet manager is shutting down")]
    ShuttingDown,

    /// Container runtime operation failed
    #[error("container driver error: {0}")]
    Driver(#[from] DriverError),

    /// Persistence store operation failed
    #[error("store error: {0}")]
    Store(String),

    /// Entitlement service failed
    #[error("entitlement check failed: {0}")]
    Entitlement(String),

    /// Network I/O failed
    #[error("I/O error: {0}")]
    Io(String),

    /// Actor communication error
    #[error("actor communication error: {0}")]
    ActorError(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    ConfigError(String),
}

impl CoreError {
    /// Check if the error is a typed, user-facing policy or capacity rejection
    #[must_use]
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            CoreError::CreationDisabled
                | CoreError::FleetFull { .. }
                | CoreError::JoiningDisabled
                | CoreError::NoCapacity
                | CoreError::Denied(_)
                | CoreError::IdentityRequired
                | CoreError::InvalidPartySize { .. }
                | CoreError::PortPoolExhausted
                | CoreError::ShuttingDown
        )
    }

    /// Check if the error means the server is not (or no longer) live
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, CoreError::ServerNotFound(_))
    }
}

impl From<std::io::Error> for CoreError {
    fn from(e: std::io::Error) -> Self {
        CoreError::Io(e.to_string())
    }
}
