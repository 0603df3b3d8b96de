//! fleetmaster-core: Fleet registry, allocation, and lifecycle workers
//!
//! Implements the `RegistryActor` using the kameo framework, the allocation
//! engine, the heartbeat listener, the idle reaper, the reconciler, and the
//! `FleetManager` façade that ties them together.

pub mod actor;
pub mod allocation;
pub mod config;
pub mod entitlement;
pub mod error;
pub mod heartbeat;
pub mod instance;
pub mod manager;
pub mod message;
pub mod ports;
pub mod provision;
pub mod reaper;
pub mod reconciler;
pub mod state;
pub mod store;

pub use actor::{RegistryActor, RegistryActorArgs, RegistryHandle};
pub use allocation::{Allocation, Allocator, Placement};
pub use config::{
    ContainerTemplate, FleetConfig, FleetManagerConfig, HeartbeatConfig, ReaperConfig,
    ReconcilerConfig,
};
pub use entitlement::{EntitlementCheck, EntitlementConfig, EntitlementGate, PlayFabBanCheck};
pub use error::CoreError;
pub use heartbeat::{HeartbeatListener, HeartbeatOutcome};
pub use instance::{InstanceHistory, NewInstance, OccupancyRecord, ServerInstance};
pub use manager::{AllocationRequest, FleetManager, FleetManagerArgs, RemovedServer};
pub use ports::PortPool;
pub use provision::{ProvisionRequest, Provisioner};
pub use reaper::{Reaper, SweepReport};
pub use reconciler::Reconciler;
pub use state::{OccupancySource, Population, ServerState};
pub use store::{InstanceStore, MemoryStore, SqliteStore, StoreError};
