//! In-memory store for tests and ephemeral fleets

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use super::{InstanceStore, StoreError};
use crate::instance::{NewInstance, OccupancyRecord, ServerInstance};

/// Store that keeps everything in process memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    instances: Vec<ServerInstance>,
    history: HashMap<i64, Vec<OccupancyRecord>>,
    next_id: i64,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a store with existing records
    #[must_use]
    pub fn with_instances(instances: Vec<ServerInstance>) -> Self {
        let next_id = instances.iter().map(|i| i.id).max().unwrap_or(0);
        Self {
            instances,
            history: HashMap::new(),
            next_id,
        }
    }
}

impl InstanceStore for MemoryStore {
    fn load_live(&self) -> Result<Vec<ServerInstance>, StoreError> {
        Ok(self
            .instances
            .iter()
            .filter(|i| i.is_live())
            .cloned()
            .collect())
    }

    fn insert(
        &mut self,
        draft: NewInstance,
        now: DateTime<Utc>,
    ) -> Result<ServerInstance, StoreError> {
        self.next_id += 1;
        let instance = draft.into_instance(self.next_id, now);
        self.instances.push(instance.clone());
        Ok(instance)
    }

    fn update(&mut self, instance: &ServerInstance) -> Result<(), StoreError> {
        let slot = self
            .instances
            .iter_mut()
            .find(|i| i.id == instance.id)
            .ok_or(StoreError::NotFound(instance.id))?;
        *slot = instance.clone();
        Ok(())
    }

    fn record_occupancy(
        &mut self,
        instance: &ServerInstance,
        record: &OccupancyRecord,
    ) -> Result<(), StoreError> {
        self.update(instance)?;
        self.history
            .entry(instance.id)
            .or_default()
            .push(record.clone());
        Ok(())
    }

    fn find_by_server_id(&self, server_id: &str) -> Result<Option<ServerInstance>, StoreError> {
        Ok(self
            .instances
            .iter()
            .filter(|i| i.server_id == server_id)
            .max_by_key(|i| i.id)
            .cloned())
    }

    fn history(&self, instance_id: i64) -> Result<Vec<OccupancyRecord>, StoreError> {
        Ok(self.history.get(&instance_id).cloned().unwrap_or_default())
    }

    fn flush(&mut self) -> Result<(), StoreError> {
        Ok(())
    }

    fn store_type(&self) -> &'static str {
        "memory"
    }
}
