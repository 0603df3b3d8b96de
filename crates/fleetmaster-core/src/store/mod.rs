//! Durable storage for server records and their occupancy logs
//!
//! The registry actor is the only writer; stores are therefore plain
//! synchronous objects owned by that actor.

pub mod memory;
pub mod sqlite;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::error::CoreError;
use crate::instance::{NewInstance, OccupancyRecord, ServerInstance};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Errors from store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("record not found: {0}")]
    NotFound(i64),

    #[error("invalid stored data: {0}")]
    Invalid(String),
}

impl From<StoreError> for CoreError {
    fn from(e: StoreError) -> Self {
        CoreError::Store(e.to_string())
    }
}

/// Persistence capability consumed by the registry
pub trait InstanceStore: Send {
    /// All records that have not been soft-deleted
    fn load_live(&self) -> Result<Vec<ServerInstance>, StoreError>;

    /// Persist a new record in `Provisioning`, assigning its id
    fn insert(
        &mut self,
        draft: NewInstance,
        now: DateTime<Utc>,
    ) -> Result<ServerInstance, StoreError>;

    /// Overwrite the mutable fields of an existing record
    fn update(&mut self, instance: &ServerInstance) -> Result<(), StoreError>;

    /// Overwrite a record and append to its occupancy log as one unit
    ///
    /// Either both writes land or neither does.
    fn record_occupancy(
        &mut self,
        instance: &ServerInstance,
        record: &OccupancyRecord,
    ) -> Result<(), StoreError>;

    /// Newest record carrying `server_id`, soft-deleted ones included
    fn find_by_server_id(&self, server_id: &str) -> Result<Option<ServerInstance>, StoreError>;

    /// Occupancy log of a record, oldest first
    fn history(&self, instance_id: i64) -> Result<Vec<OccupancyRecord>, StoreError>;

    /// Make every write so far durable
    fn flush(&mut self) -> Result<(), StoreError>;

    /// Short name for logs
    fn store_type(&self) -> &'static str;
}
