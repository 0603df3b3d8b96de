//! Container driver trait

use std::time::Duration;

use async_trait::async_trait;

use crate::error::DriverError;
use crate::types::{ContainerInfo, ContainerSpec};

/// Create, start, stop, remove and enumerate fleet containers
///
/// Implementations hold no fleet state; every call reads the runtime fresh.
/// Failures are returned to the caller and never retried here.
#[async_trait]
pub trait ContainerDriver: Send + Sync {
    /// Create a container from `spec` and start it, returning its id
    async fn create_and_start(&self, spec: &ContainerSpec) -> Result<String, DriverError>;

    /// Start an existing (stopped) container
    async fn start(&self, container_id: &str) -> Result<(), DriverError>;

    /// Stop a container, killing it after `grace`
    async fn stop(&self, container_id: &str, grace: Duration) -> Result<(), DriverError>;

    /// Remove a container; `force` also kills a running one
    async fn remove(&self, container_id: &str, force: bool) -> Result<(), DriverError>;

    /// List containers carrying the fleet's label or name prefix
    async fn list_managed(&self) -> Result<Vec<ContainerInfo>, DriverError>;

    /// Short name used in logs
    fn driver_type(&self) -> &'static str;
}
