//! Provisioning and teardown of game-server containers

use std::sync::Arc;

use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use fleetmaster_driver::{ContainerDriver, DriverError};

use crate::actor::RegistryHandle;
use crate::config::{ContainerTemplate, FleetConfig};
use crate::error::CoreError;
use crate::instance::{NewInstance, ServerInstance};
use crate::ports::PortPool;

/// Pool ports tried before giving up on finding a free one
const MAX_PORT_SKIPS: usize = 64;

/// What to provision
#[derive(Debug, Clone, Copy, Default)]
pub struct ProvisionRequest {
    /// Exempt the server from idle reaping
    pub standby: bool,
    /// Use this host port instead of the next one from the pool
    pub port: Option<u16>,
}

impl ProvisionRequest {
    /// On-demand server from the pool
    #[must_use]
    pub fn on_demand() -> Self {
        Self::default()
    }

    /// Standby server from the pool
    #[must_use]
    pub fn standby() -> Self {
        Self {
            standby: true,
            port: None,
        }
    }
}

/// Creates and destroys the containers behind server records
pub struct Provisioner {
    registry: RegistryHandle,
    driver: Arc<dyn ContainerDriver>,
    ports: PortPool,
    fleet: FleetConfig,
    template: ContainerTemplate,
}

impl Provisioner {
    #[must_use]
    pub fn new(
        registry: RegistryHandle,
        driver: Arc<dyn ContainerDriver>,
        ports: PortPool,
        fleet: FleetConfig,
        template: ContainerTemplate,
    ) -> Self {
        Self {
            registry,
            driver,
            ports,
            fleet,
            template,
        }
    }

    #[must_use]
    pub fn template(&self) -> &ContainerTemplate {
        &self.template
    }

    #[must_use]
    pub fn driver(&self) -> &Arc<dyn ContainerDriver> {
        &self.driver
    }

    /// Provision a server: record first, then container
    ///
    /// A failed container start soft-deletes the record again so the fleet
    /// never counts a server that does not exist.
    ///
    /// # Errors
    ///
    /// Returns a policy rejection (`CreationDisabled`, `FleetFull`,
    /// `PortPoolExhausted`), a uniqueness violation, or the driver failure
    #[instrument(skip(self), fields(standby = request.standby))]
    pub async fn create_server(
        &self,
        request: ProvisionRequest,
    ) -> Result<ServerInstance, CoreError> {
        if !self.fleet.allow_server_creation {
            return Err(CoreError::CreationDisabled);
        }

        let instance = match request.port {
            Some(port) => {
                self.registry
                    .insert(self.draft(port, request.standby), Some(self.fleet.max_servers))
                    .await?
            }
            None => self.insert_from_pool(request.standby).await?,
        };
        let port = instance.port;

        let spec = self.template.spec_for(&instance);
        match self.driver.create_and_start(&spec).await {
            Ok(container_id) => {
                info!(
                    server_id = %instance.server_id,
                    port,
                    container_id = %container_id,
                    "game server provisioned"
                );
                self.registry
                    .mark_provisioned(instance.id, container_id)
                    .await
            }
            Err(e) => {
                error!(
                    server_id = %instance.server_id,
                    port,
                    error = %e,
                    "container failed to start"
                );
                if let Err(cleanup) = self
                    .registry
                    .soft_delete(instance.id, "provisioning failed")
                    .await
                {
                    warn!(error = %cleanup, "failed to discard record of unprovisioned server");
                }
                Err(CoreError::Driver(e))
            }
        }
    }

    /// Insert a record on the next pool port that no live server holds
    ///
    /// Servers placed on an explicit port can sit ahead of the pool counter.
    async fn insert_from_pool(&self, standby: bool) -> Result<ServerInstance, CoreError> {
        for _ in 0..MAX_PORT_SKIPS {
            let port = self.ports.claim()?;
            match self
                .registry
                .insert(self.draft(port, standby), Some(self.fleet.max_servers))
                .await
            {
                Err(CoreError::DuplicateEndpoint { .. }) => {
                    debug!(port, "pool port held by a live server, skipping");
                }
                result => return result,
            }
        }
        Err(CoreError::PortPoolExhausted)
    }

    fn draft(&self, port: u16, standby: bool) -> NewInstance {
        NewInstance {
            server_id: Uuid::new_v4().to_string(),
            public_address: self.fleet.public_address.clone(),
            private_address: self.fleet.private_address.clone(),
            port,
            max_capacity: self.fleet.max_players_per_server,
            is_standby: standby,
        }
    }

    /// Remove (or, when deletion is disabled, stop) a server's container
    ///
    /// # Errors
    ///
    /// Returns the driver failure; a container that is already gone is not
    /// an error
    pub async fn teardown(&self, instance: &ServerInstance) -> Result<(), DriverError> {
        let Some(container_id) = instance.container_id.as_deref() else {
            return Ok(());
        };

        let result = if self.fleet.allow_server_deletion {
            self.driver.remove(container_id, true).await
        } else {
            self.driver
                .stop(container_id, self.template.stop_grace())
                .await
        };

        match result {
            Err(e) if e.is_not_found() => {
                warn!(
                    server_id = %instance.server_id,
                    container_id,
                    "container already gone"
                );
                Ok(())
            }
            other => other,
        }
    }
}
