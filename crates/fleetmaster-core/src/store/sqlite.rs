//! SQLite-backed store

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::debug;

use super::{InstanceStore, StoreError};
use crate::instance::{NewInstance, OccupancyRecord, ServerInstance};
use crate::state::{OccupancySource, ServerState};

const INSTANCE_COLUMNS: &str = "id, server_id, container_id, public_address, private_address, \
     port, max_capacity, player_count, state, is_standby, last_heartbeat_at, created_at, \
     deleted_at";

/// Store persisting records in a SQLite database
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open or create a store at the given path
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    /// Open an in-memory store
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be created
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let store = Self {
            conn: Connection::open_in_memory()?,
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(
            r"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS server_instances (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                server_id TEXT NOT NULL,
                container_id TEXT,
                public_address TEXT NOT NULL,
                private_address TEXT NOT NULL,
                port INTEGER NOT NULL,
                max_capacity INTEGER NOT NULL,
                player_count INTEGER NOT NULL DEFAULT 0,
                state TEXT NOT NULL,
                is_standby INTEGER NOT NULL DEFAULT 0,
                last_heartbeat_at INTEGER,
                created_at INTEGER NOT NULL,
                deleted_at INTEGER
            );

            CREATE UNIQUE INDEX IF NOT EXISTS idx_live_endpoint
                ON server_instances(public_address, port) WHERE deleted_at IS NULL;
            CREATE UNIQUE INDEX IF NOT EXISTS idx_live_server_id
                ON server_instances(server_id) WHERE deleted_at IS NULL;

            CREATE TABLE IF NOT EXISTS occupancy_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                instance_id INTEGER NOT NULL REFERENCES server_instances(id),
                player_count INTEGER NOT NULL,
                source TEXT NOT NULL,
                recorded_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_history_instance
                ON occupancy_history(instance_id);
            ",
        )?;

        debug!("instance store schema initialized");
        Ok(())
    }

    fn get(&self, id: i64) -> Result<ServerInstance, StoreError> {
        let sql = format!("SELECT {INSTANCE_COLUMNS} FROM server_instances WHERE id = ?1");
        let raw = self
            .conn
            .query_row(&sql, params![id], RawInstance::from_row)
            .optional()?
            .ok_or(StoreError::NotFound(id))?;
        raw.into_instance()
    }
}

impl InstanceStore for SqliteStore {
    fn load_live(&self) -> Result<Vec<ServerInstance>, StoreError> {
        let sql = format!(
            "SELECT {INSTANCE_COLUMNS} FROM server_instances WHERE deleted_at IS NULL ORDER BY id"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], RawInstance::from_row)?;

        let mut instances = Vec::new();
        for row in rows {
            instances.push(row?.into_instance()?);
        }
        Ok(instances)
    }

    fn insert(
        &mut self,
        draft: NewInstance,
        now: DateTime<Utc>,
    ) -> Result<ServerInstance, StoreError> {
        self.conn.execute(
            "INSERT INTO server_instances
                (server_id, public_address, private_address, port, max_capacity,
                 player_count, state, is_standby, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?7, ?8)",
            params![
                draft.server_id,
                draft.public_address,
                draft.private_address,
                draft.port,
                draft.max_capacity,
                ServerState::Provisioning.as_str(),
                draft.is_standby,
                now.timestamp_millis(),
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get(id)
    }

    fn update(&mut self, instance: &ServerInstance) -> Result<(), StoreError> {
        write_instance(&self.conn, instance)
    }

    fn record_occupancy(
        &mut self,
        instance: &ServerInstance,
        record: &OccupancyRecord,
    ) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;
        write_history(&tx, instance.id, record)?;
        write_instance(&tx, instance)?;
        tx.commit()?;
        Ok(())
    }

    fn find_by_server_id(&self, server_id: &str) -> Result<Option<ServerInstance>, StoreError> {
        let sql = format!(
            "SELECT {INSTANCE_COLUMNS} FROM server_instances
             WHERE server_id = ?1 ORDER BY id DESC LIMIT 1"
        );
        self.conn
            .query_row(&sql, params![server_id], RawInstance::from_row)
            .optional()?
            .map(RawInstance::into_instance)
            .transpose()
    }

    fn history(&self, instance_id: i64) -> Result<Vec<OccupancyRecord>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT player_count, source, recorded_at FROM occupancy_history
             WHERE instance_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![instance_id], |row| {
            Ok((
                row.get::<_, u32>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
            ))
        })?;

        let mut history = Vec::new();
        for row in rows {
            let (player_count, source, recorded_at) = row?;
            history.push(OccupancyRecord {
                player_count,
                source: OccupancySource::parse(&source)
                    .ok_or_else(|| StoreError::Invalid(format!("occupancy source {source}")))?,
                recorded_at: timestamp(recorded_at)?,
            });
        }
        Ok(history)
    }

    fn flush(&mut self) -> Result<(), StoreError> {
        self.conn
            .query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))?;
        Ok(())
    }

    fn store_type(&self) -> &'static str {
        "sqlite"
    }
}

/// Row as stored, before validation
struct RawInstance {
    id: i64,
    server_id: String,
    container_id: Option<String>,
    public_address: String,
    private_address: String,
    port: u16,
    max_capacity: u32,
    player_count: u32,
    state: String,
    is_standby: bool,
    last_heartbeat_at: Option<i64>,
    created_at: i64,
    deleted_at: Option<i64>,
}

impl RawInstance {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            server_id: row.get(1)?,
            container_id: row.get(2)?,
            public_address: row.get(3)?,
            private_address: row.get(4)?,
            port: row.get(5)?,
            max_capacity: row.get(6)?,
            player_count: row.get(7)?,
            state: row.get(8)?,
            is_standby: row.get(9)?,
            last_heartbeat_at: row.get(10)?,
            created_at: row.get(11)?,
            deleted_at: row.get(12)?,
        })
    }

    fn into_instance(self) -> Result<ServerInstance, StoreError> {
        let state = ServerState::parse(&self.state)
            .ok_or_else(|| StoreError::Invalid(format!("server state {}", self.state)))?;

        Ok(ServerInstance {
            id: self.id,
            server_id: self.server_id,
            container_id: self.container_id,
            public_address: self.public_address,
            private_address: self.private_address,
            port: self.port,
            max_capacity: self.max_capacity,
            player_count: self.player_count,
            state,
            is_standby: self.is_standby,
            last_heartbeat_at: self.last_heartbeat_at.map(timestamp).transpose()?,
            created_at: timestamp(self.created_at)?,
            deleted_at: self.deleted_at.map(timestamp).transpose()?,
        })
    }
}

fn write_instance(conn: &Connection, instance: &ServerInstance) -> Result<(), StoreError> {
    let changed = conn.execute(
        "UPDATE server_instances SET
            container_id = ?2, player_count = ?3, state = ?4, is_standby = ?5,
            last_heartbeat_at = ?6, deleted_at = ?7
         WHERE id = ?1",
        params![
            instance.id,
            instance.container_id,
            instance.player_count,
            instance.state.as_str(),
            instance.is_standby,
            instance.last_heartbeat_at.map(|t| t.timestamp_millis()),
            instance.deleted_at.map(|t| t.timestamp_millis()),
        ],
    )?;
    if changed == 0 {
        return Err(StoreError::NotFound(instance.id));
    }
    Ok(())
}

fn write_history(
    conn: &Connection,
    instance_id: i64,
    record: &OccupancyRecord,
) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO occupancy_history (instance_id, player_count, source, recorded_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            instance_id,
            record.player_count,
            record.source.as_str(),
            record.recorded_at.timestamp_millis(),
        ],
    )?;
    Ok(())
}

fn timestamp(millis: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| StoreError::Invalid(format!("timestamp {millis}")))
}
