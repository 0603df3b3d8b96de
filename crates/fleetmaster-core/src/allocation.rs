//! Party placement
//!
//! Selection runs against a snapshot of the registry. The chosen server is
//! then committed through the registry, which re-checks capacity; a server
//! that filled up in between is reported as a conflict and selection runs
//! again.

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::actor::RegistryHandle;
use crate::error::CoreError;
use crate::instance::ServerInstance;
use crate::provision::{ProvisionRequest, Provisioner};

/// Selection rounds before giving up under contention
const MAX_ATTEMPTS: usize = 8;

/// How a party ended up on its server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Joined an existing server with room
    Existing,
    /// A server was provisioned for the party
    Provisioned,
    /// Placed over capacity on the least-loaded server
    Overfilled,
}

/// A committed placement
#[derive(Debug, Clone)]
pub struct Allocation {
    /// Server state after the party was added
    pub instance: ServerInstance,
    pub placement: Placement,
}

/// Least-loaded allocatable server with room for `party_size`
///
/// Ties go to the oldest record.
#[must_use]
pub fn select_candidate(instances: &[ServerInstance], party_size: u32) -> Option<&ServerInstance> {
    instances
        .iter()
        .filter(|i| i.accepts(party_size))
        .min_by_key(|i| (i.player_count, i.id))
}

/// Least-loaded allocatable server regardless of room
#[must_use]
pub fn least_loaded(instances: &[ServerInstance]) -> Option<&ServerInstance> {
    instances
        .iter()
        .filter(|i| i.is_live() && i.state.is_allocatable())
        .min_by_key(|i| (i.player_count, i.id))
}

/// Places parties on servers
pub struct Allocator {
    registry: RegistryHandle,
    provisioner: Arc<Provisioner>,
    overfill_fallback: bool,
}

impl Allocator {
    #[must_use]
    pub fn new(
        registry: RegistryHandle,
        provisioner: Arc<Provisioner>,
        overfill_fallback: bool,
    ) -> Self {
        Self {
            registry,
            provisioner,
            overfill_fallback,
        }
    }

    /// Place a party of `party_size`
    ///
    /// # Errors
    ///
    /// Returns `NoCapacity` when contention outlasts every retry, and the
    /// provisioning rejection when a new server was needed but could not be
    /// created
    #[instrument(skip(self))]
    pub async fn allocate(&self, party_size: u32) -> Result<Allocation, CoreError> {
        for attempt in 1..=MAX_ATTEMPTS {
            let snapshot = self.registry.list().await?;

            if let Some(candidate) = select_candidate(&snapshot, party_size) {
                match self.registry.reserve(candidate.id, party_size, false).await {
                    Ok(instance) => {
                        return Ok(placed(instance, Placement::Existing, party_size));
                    }
                    Err(CoreError::CapacityConflict(server_id)) => {
                        debug!(%server_id, attempt, "candidate changed before commit, retrying");
                        continue;
                    }
                    Err(e) if e.is_not_found() => continue,
                    Err(e) => return Err(e),
                }
            }

            if self.overfill_fallback
                && let Some(fallback) = least_loaded(&snapshot)
            {
                match self.registry.reserve(fallback.id, party_size, true).await {
                    Ok(instance) => {
                        warn!(
                            server_id = %instance.server_id,
                            player_count = instance.player_count,
                            max_capacity = instance.max_capacity,
                            "no server had room, overfilling least-loaded server"
                        );
                        return Ok(placed(instance, Placement::Overfilled, party_size));
                    }
                    Err(CoreError::CapacityConflict(_)) => continue,
                    Err(e) if e.is_not_found() => continue,
                    Err(e) => return Err(e),
                }
            }

            let fresh = self
                .provisioner
                .create_server(ProvisionRequest::on_demand())
                .await?;
            match self.registry.reserve(fresh.id, party_size, false).await {
                Ok(instance) => {
                    return Ok(placed(instance, Placement::Provisioned, party_size));
                }
                Err(CoreError::CapacityConflict(_)) => continue,
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e),
            }
        }

        warn!(party_size, "allocation gave up after repeated conflicts");
        Err(CoreError::NoCapacity)
    }
}

fn placed(instance: ServerInstance, placement: Placement, party_size: u32) -> Allocation {
    info!(
        server_id = %instance.server_id,
        port = instance.port,
        party_size,
        player_count = instance.player_count,
        placement = ?placement,
        "party placed"
    );
    Allocation {
        instance,
        placement,
    }
}
