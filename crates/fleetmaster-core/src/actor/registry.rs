//! `RegistryActor`: authoritative record of every game server
//!
//! All mutations are messages handled one at a time, so every change to a
//! record is linearizable. Each mutation is persisted before it is applied
//! in memory and before the caller gets its reply.

use std::collections::BTreeMap;

use chrono::Utc;
use kameo::actor::{ActorRef, WeakActorRef};
use kameo::error::{ActorStopReason, SendError};
use kameo::message::{Context, Message};
use kameo::prelude::*;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use fleetmaster_api::events::FleetEvent;

use crate::error::CoreError;
use crate::instance::{InstanceHistory, NewInstance, OccupancyRecord, ServerInstance};
use crate::message::{
    ApplyOccupancy, BeginTeardown, Flush, GetByPort, GetByServerId, GetHistory, InsertInstance,
    ListInstances, MarkProvisioned, MarkStale, OverridePlayerCount, ReserveSeats, SoftDelete,
};
use crate::state::{OccupancySource, ServerState};
use crate::store::InstanceStore;

/// Arguments for spawning a `RegistryActor`
pub struct RegistryActorArgs {
    /// Backing store
    pub store: Box<dyn InstanceStore>,
    /// Live records already loaded from the store
    pub instances: Vec<ServerInstance>,
    /// Event broadcast sender
    pub event_tx: broadcast::Sender<FleetEvent>,
}

/// Single writer over the fleet's records
pub struct RegistryActor {
    /// Live records by id
    instances: BTreeMap<i64, ServerInstance>,
    store: Box<dyn InstanceStore>,
    event_tx: broadcast::Sender<FleetEvent>,
}

impl RegistryActor {
    fn live(&self, id: i64) -> Result<&ServerInstance, CoreError> {
        self.instances
            .get(&id)
            .ok_or_else(|| CoreError::ServerNotFound(format!("#{id}")))
    }

    fn live_by_server_id(&self, server_id: &str) -> Result<&ServerInstance, CoreError> {
        self.instances
            .values()
            .find(|i| i.server_id == server_id)
            .ok_or_else(|| CoreError::ServerNotFound(server_id.to_string()))
    }

    fn live_by_port(&self, port: u16) -> Result<&ServerInstance, CoreError> {
        self.instances
            .values()
            .find(|i| i.port == port)
            .ok_or_else(|| CoreError::ServerNotFound(format!("port {port}")))
    }

    /// Persist `updated`, then replace the in-memory copy and announce changes
    fn commit(&mut self, updated: ServerInstance) -> Result<ServerInstance, CoreError> {
        self.store.update(&updated)?;
        Ok(self.remember(updated))
    }

    /// Replace the in-memory copy of an already persisted record
    fn remember(&mut self, updated: ServerInstance) -> ServerInstance {
        let previous = self.instances.insert(updated.id, updated.clone());
        if let Some(previous) = previous
            && previous.state != updated.state
        {
            debug!(
                server_id = %updated.server_id,
                from = %previous.state,
                to = %updated.state,
                "server state changed"
            );
            self.emit(FleetEvent::ServerStateChanged {
                server_id: updated.server_id.clone(),
                from: previous.state.to_string(),
                to: updated.state.to_string(),
            });
        }
        updated
    }

    /// Set an absolute player count and derive the resulting state
    fn apply_count(
        &mut self,
        id: i64,
        player_count: u32,
        source: OccupancySource,
    ) -> Result<ServerInstance, CoreError> {
        let mut updated = self.live(id)?.clone();
        let now = Utc::now();

        if player_count > updated.max_capacity {
            warn!(
                server_id = %updated.server_id,
                player_count,
                max_capacity = updated.max_capacity,
                "reported player count exceeds capacity"
            );
        }

        let changed = updated.player_count != player_count;
        updated.player_count = player_count;
        if source == OccupancySource::Heartbeat {
            updated.last_heartbeat_at = Some(now);
        }

        if player_count > 0 && updated.state.can_transition_to(ServerState::Running) {
            updated.state = ServerState::Running;
        } else if player_count == 0 && updated.state == ServerState::Unresponsive {
            updated.state = updated.resting_state();
        }

        let record = OccupancyRecord {
            player_count,
            source,
            recorded_at: now,
        };
        self.store.record_occupancy(&updated, &record)?;
        let updated = self.remember(updated);

        if changed {
            self.emit(FleetEvent::OccupancyChanged {
                server_id: updated.server_id.clone(),
                player_count,
                max_capacity: updated.max_capacity,
                source: source.to_string(),
            });
        }
        Ok(updated)
    }

    fn emit(&self, event: FleetEvent) {
        // No subscribers is fine
        let _ = self.event_tx.send(event);
    }
}

impl Actor for RegistryActor {
    type Args = RegistryActorArgs;
    type Error = CoreError;

    async fn on_start(args: Self::Args, actor_ref: ActorRef<Self>) -> Result<Self, Self::Error> {
        info!(
            id = %actor_ref.id(),
            store = args.store.store_type(),
            live = args.instances.len(),
            "RegistryActor starting"
        );

        let instances = args
            .instances
            .into_iter()
            .filter(ServerInstance::is_live)
            .map(|i| (i.id, i))
            .collect();

        Ok(Self {
            instances,
            store: args.store,
            event_tx: args.event_tx,
        })
    }

    async fn on_stop(
        &mut self,
        _actor_ref: WeakActorRef<Self>,
        reason: ActorStopReason,
    ) -> Result<(), Self::Error> {
        info!(reason = ?reason, "RegistryActor stopping");

        if let Err(e) = self.store.flush() {
            error!(error = %e, "failed to flush instance store");
        }
        Ok(())
    }
}

// ============================================================================
// Message Handlers
// ============================================================================

impl Message<ListInstances> for RegistryActor {
    type Reply = Result<Vec<ServerInstance>, CoreError>;

    async fn handle(
        &mut self,
        _msg: ListInstances,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        Ok(self.instances.values().cloned().collect())
    }
}

impl Message<GetByPort> for RegistryActor {
    type Reply = Result<ServerInstance, CoreError>;

    async fn handle(
        &mut self,
        msg: GetByPort,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        self.live_by_port(msg.port).cloned()
    }
}

impl Message<GetByServerId> for RegistryActor {
    type Reply = Result<ServerInstance, CoreError>;

    async fn handle(
        &mut self,
        msg: GetByServerId,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        self.live_by_server_id(&msg.server_id).cloned()
    }
}

impl Message<GetHistory> for RegistryActor {
    type Reply = Result<InstanceHistory, CoreError>;

    async fn handle(
        &mut self,
        msg: GetHistory,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        let instance = self
            .store
            .find_by_server_id(&msg.server_id)?
            .ok_or_else(|| CoreError::ServerNotFound(msg.server_id.clone()))?;
        let history = self.store.history(instance.id)?;

        Ok(InstanceHistory { instance, history })
    }
}

impl Message<InsertInstance> for RegistryActor {
    type Reply = Result<ServerInstance, CoreError>;

    async fn handle(
        &mut self,
        msg: InsertInstance,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        let NewInstance {
            ref server_id,
            ref public_address,
            port,
            ..
        } = msg.draft;

        if let Some(max) = msg.fleet_limit
            && self.instances.len() >= max
        {
            return Err(CoreError::FleetFull { max });
        }
        if self
            .instances
            .values()
            .any(|i| i.public_address == *public_address && i.port == port)
        {
            return Err(CoreError::DuplicateEndpoint {
                address: public_address.clone(),
                port,
            });
        }
        if self.instances.values().any(|i| i.server_id == *server_id) {
            return Err(CoreError::DuplicateServerId(server_id.clone()));
        }

        let instance = self.store.insert(msg.draft, Utc::now())?;
        info!(
            server_id = %instance.server_id,
            port = instance.port,
            standby = instance.is_standby,
            "server record created"
        );
        self.instances.insert(instance.id, instance.clone());
        Ok(instance)
    }
}

impl Message<MarkProvisioned> for RegistryActor {
    type Reply = Result<ServerInstance, CoreError>;

    async fn handle(
        &mut self,
        msg: MarkProvisioned,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        let mut updated = self.live(msg.id)?.clone();
        if updated.state != ServerState::Provisioning {
            return Err(CoreError::InvalidTransition {
                from: updated.state,
                to: updated.resting_state(),
            });
        }

        updated.container_id = Some(msg.container_id);
        // A heartbeat may have arrived while the container was starting
        updated.state = if updated.player_count > 0 {
            ServerState::Running
        } else {
            updated.resting_state()
        };

        let updated = self.commit(updated)?;
        self.emit(FleetEvent::ServerProvisioned {
            server_id: updated.server_id.clone(),
            port: updated.port,
            standby: updated.is_standby,
        });
        Ok(updated)
    }
}

impl Message<ApplyOccupancy> for RegistryActor {
    type Reply = Result<ServerInstance, CoreError>;

    async fn handle(
        &mut self,
        msg: ApplyOccupancy,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        let id = self.live_by_server_id(&msg.server_id)?.id;
        self.apply_count(id, msg.player_count, msg.source)
    }
}

impl Message<OverridePlayerCount> for RegistryActor {
    type Reply = Result<ServerInstance, CoreError>;

    async fn handle(
        &mut self,
        msg: OverridePlayerCount,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        let id = self.live_by_port(msg.port)?.id;
        self.apply_count(id, msg.player_count, OccupancySource::Override)
    }
}

impl Message<ReserveSeats> for RegistryActor {
    type Reply = Result<ServerInstance, CoreError>;

    async fn handle(
        &mut self,
        msg: ReserveSeats,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        let current = self.live(msg.id)?;

        if !current.state.is_allocatable()
            || (!msg.allow_overfill && !current.fits(msg.party_size))
        {
            return Err(CoreError::CapacityConflict(current.server_id.clone()));
        }
        if msg.party_size == 0 {
            return Ok(current.clone());
        }

        let player_count = current.player_count.saturating_add(msg.party_size);
        self.apply_count(msg.id, player_count, OccupancySource::Allocation)
    }
}

impl Message<BeginTeardown> for RegistryActor {
    /// `None` when the record no longer qualifies for an idle teardown
    type Reply = Result<Option<ServerInstance>, CoreError>;

    async fn handle(
        &mut self,
        msg: BeginTeardown,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        let current = self.live(msg.id)?;

        if msg.only_if_idle
            && (current.is_standby
                || current.player_count > 0
                || current.state == ServerState::Provisioning
                || current.state.is_stopping())
        {
            return Ok(None);
        }
        if !current.state.can_transition_to(ServerState::Terminating) {
            return Err(CoreError::InvalidTransition {
                from: current.state,
                to: ServerState::Terminating,
            });
        }

        let mut updated = current.clone();
        updated.state = ServerState::Terminating;
        self.commit(updated).map(Some)
    }
}

impl Message<SoftDelete> for RegistryActor {
    type Reply = Result<ServerInstance, CoreError>;

    async fn handle(
        &mut self,
        msg: SoftDelete,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        let mut deleted = self.live(msg.id)?.clone();
        deleted.state = ServerState::Terminated;
        deleted.deleted_at = Some(Utc::now());

        self.store.update(&deleted)?;
        self.instances.remove(&deleted.id);

        info!(
            server_id = %deleted.server_id,
            port = deleted.port,
            reason = %msg.reason,
            "server record soft-deleted"
        );
        self.emit(FleetEvent::ServerRemoved {
            server_id: deleted.server_id.clone(),
            port: deleted.port,
            reason: msg.reason,
        });
        Ok(deleted)
    }
}

impl Message<MarkStale> for RegistryActor {
    type Reply = Result<Vec<ServerInstance>, CoreError>;

    async fn handle(
        &mut self,
        msg: MarkStale,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        let stale: Vec<ServerInstance> = self
            .instances
            .values()
            .filter(|i| i.state.is_allocatable() && i.last_seen() < msg.cutoff)
            .cloned()
            .collect();

        let mut marked = Vec::with_capacity(stale.len());
        for mut instance in stale {
            warn!(
                server_id = %instance.server_id,
                last_seen = %instance.last_seen(),
                "server stopped reporting, marking unresponsive"
            );
            instance.state = ServerState::Unresponsive;
            marked.push(self.commit(instance)?);
        }
        Ok(marked)
    }
}

impl Message<Flush> for RegistryActor {
    type Reply = Result<(), CoreError>;

    async fn handle(&mut self, _msg: Flush, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        self.store.flush().map_err(Into::into)
    }
}

// ============================================================================
// Handle
// ============================================================================

/// Cloneable front for the registry actor
#[derive(Clone)]
pub struct RegistryHandle {
    actor: ActorRef<RegistryActor>,
    event_tx: broadcast::Sender<FleetEvent>,
}

fn flatten<M>(err: SendError<M, CoreError>) -> CoreError {
    match err {
        SendError::HandlerError(e) => e,
        other => CoreError::ActorError(other.to_string()),
    }
}

impl RegistryHandle {
    /// Spawn the registry actor over `store` and its live records
    #[must_use]
    pub fn spawn(
        store: Box<dyn InstanceStore>,
        instances: Vec<ServerInstance>,
        event_capacity: usize,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(event_capacity.max(1));
        let actor = RegistryActor::spawn(RegistryActorArgs {
            store,
            instances,
            event_tx: event_tx.clone(),
        });
        Self { actor, event_tx }
    }

    /// Get an event receiver
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<FleetEvent> {
        self.event_tx.subscribe()
    }

    pub async fn list(&self) -> Result<Vec<ServerInstance>, CoreError> {
        self.actor.ask(ListInstances).await.map_err(flatten)
    }

    pub async fn by_port(&self, port: u16) -> Result<ServerInstance, CoreError> {
        self.actor.ask(GetByPort { port }).await.map_err(flatten)
    }

    pub async fn by_server_id(&self, server_id: &str) -> Result<ServerInstance, CoreError> {
        self.actor
            .ask(GetByServerId {
                server_id: server_id.to_string(),
            })
            .await
            .map_err(flatten)
    }

    pub async fn history(&self, server_id: &str) -> Result<InstanceHistory, CoreError> {
        self.actor
            .ask(GetHistory {
                server_id: server_id.to_string(),
            })
            .await
            .map_err(flatten)
    }

    pub async fn insert(
        &self,
        draft: NewInstance,
        fleet_limit: Option<usize>,
    ) -> Result<ServerInstance, CoreError> {
        self.actor
            .ask(InsertInstance { draft, fleet_limit })
            .await
            .map_err(flatten)
    }

    pub async fn mark_provisioned(
        &self,
        id: i64,
        container_id: String,
    ) -> Result<ServerInstance, CoreError> {
        self.actor
            .ask(MarkProvisioned { id, container_id })
            .await
            .map_err(flatten)
    }

    pub async fn apply_occupancy(
        &self,
        server_id: &str,
        player_count: u32,
        source: OccupancySource,
    ) -> Result<ServerInstance, CoreError> {
        self.actor
            .ask(ApplyOccupancy {
                server_id: server_id.to_string(),
                player_count,
                source,
            })
            .await
            .map_err(flatten)
    }

    pub async fn override_player_count(
        &self,
        port: u16,
        player_count: u32,
    ) -> Result<ServerInstance, CoreError> {
        self.actor
            .ask(OverridePlayerCount { port, player_count })
            .await
            .map_err(flatten)
    }

    pub async fn reserve(
        &self,
        id: i64,
        party_size: u32,
        allow_overfill: bool,
    ) -> Result<ServerInstance, CoreError> {
        self.actor
            .ask(ReserveSeats {
                id,
                party_size,
                allow_overfill,
            })
            .await
            .map_err(flatten)
    }

    pub async fn begin_teardown(
        &self,
        id: i64,
        only_if_idle: bool,
    ) -> Result<Option<ServerInstance>, CoreError> {
        self.actor
            .ask(BeginTeardown { id, only_if_idle })
            .await
            .map_err(flatten)
    }

    pub async fn soft_delete(
        &self,
        id: i64,
        reason: impl Into<String>,
    ) -> Result<ServerInstance, CoreError> {
        self.actor
            .ask(SoftDelete {
                id,
                reason: reason.into(),
            })
            .await
            .map_err(flatten)
    }

    pub async fn mark_stale(
        &self,
        cutoff: chrono::DateTime<Utc>,
    ) -> Result<Vec<ServerInstance>, CoreError> {
        self.actor.ask(MarkStale { cutoff }).await.map_err(flatten)
    }

    pub async fn flush(&self) -> Result<(), CoreError> {
        self.actor.ask(Flush).await.map_err(flatten)
    }

    /// Stop the actor after it drains its mailbox
    pub async fn stop(&self) {
        if let Err(e) = self.actor.stop_gracefully().await {
            warn!(error = %e, "registry actor already stopped");
        }
    }
}
