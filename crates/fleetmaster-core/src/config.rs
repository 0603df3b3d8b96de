//! Configuration types for the fleet and its background workers

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use fleetmaster_driver::{ContainerSpec, PortProtocol};

use crate::error::CoreError;
use crate::instance::ServerInstance;

/// Fleet sizing and policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    /// Display name of the fleet
    pub name: String,
    /// Address handed to players
    pub public_address: String,
    /// Address on the private network
    pub private_address: String,
    /// Maximum number of live servers
    pub max_servers: usize,
    /// Capacity given to each new server
    pub max_players_per_server: u32,
    /// Largest party accepted by allocation
    pub max_party_size: u32,
    /// First host port handed out
    pub port_pool_start: u16,
    /// Last host port handed out (inclusive)
    pub port_pool_end: Option<u16>,
    /// Allow provisioning new servers
    pub allow_server_creation: bool,
    /// Allow removing containers (when false they are only stopped)
    pub allow_server_deletion: bool,
    /// Allow placing players
    pub allow_server_joining: bool,
    /// Provision standby servers when the fleet is empty
    pub create_initial_servers: bool,
    /// Number of standby servers in the initial fleet
    pub initial_servers: usize,
    /// Re-provision servers whose container died
    pub replace_dead_servers: bool,
    /// Overfill the least-loaded server when nothing fits
    pub overfill_fallback: bool,
    /// Stop every managed container when the manager shuts down
    pub stop_containers_on_shutdown: bool,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            public_address: "127.0.0.1".to_string(),
            private_address: "127.0.0.1".to_string(),
            max_servers: 100,
            max_players_per_server: 50,
            max_party_size: 5,
            port_pool_start: 5100,
            port_pool_end: None,
            allow_server_creation: true,
            allow_server_deletion: true,
            allow_server_joining: true,
            create_initial_servers: true,
            initial_servers: 2,
            replace_dead_servers: true,
            overfill_fallback: false,
            stop_containers_on_shutdown: false,
        }
    }
}

impl FleetConfig {
    /// Largest party that can ever be placed
    #[must_use]
    pub fn party_limit(&self) -> u32 {
        self.max_party_size.min(self.max_players_per_server)
    }
}

/// Template used to turn a server record into a container
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerTemplate {
    /// Image repository
    pub image: String,
    /// Image tag
    pub tag: String,
    /// Port the game server listens on inside the container
    pub container_port: u16,
    /// Transport of the game port
    pub protocol: PortProtocol,
    /// Prefix of every managed container name
    pub name_prefix: String,
    /// Seconds a container gets to stop before it is killed
    pub stop_grace_secs: u64,
    /// Additional environment passed to every container
    pub env: BTreeMap<String, String>,
}

impl Default for ContainerTemplate {
    fn default() -> Self {
        Self {
            image: String::new(),
            tag: "latest".to_string(),
            container_port: 7777,
            protocol: PortProtocol::Udp,
            name_prefix: fleetmaster_driver::docker::default_name_prefix(),
            stop_grace_secs: 10,
            env: BTreeMap::new(),
        }
    }
}

/// Environment variable carrying the server id
pub const ENV_SERVER_ID: &str = "Server-ID";
/// Environment variable carrying the public address
pub const ENV_IP_ADDRESS: &str = "IP-Address";

impl ContainerTemplate {
    /// Container name for a server record
    #[must_use]
    pub fn container_name(&self, instance: &ServerInstance) -> String {
        let short: String = instance.server_id.chars().take(8).collect();
        format!("{}{}-{short}", self.name_prefix, instance.port)
    }

    /// Build the container specification for a server record
    #[must_use]
    pub fn spec_for(&self, instance: &ServerInstance) -> ContainerSpec {
        let mut spec = ContainerSpec::new(
            self.container_name(instance),
            self.image.clone(),
            self.tag.clone(),
        )
        .with_port(instance.port, self.container_port, self.protocol)
        .with_env(ENV_SERVER_ID, instance.server_id.clone())
        .with_env(ENV_IP_ADDRESS, instance.public_address.clone());

        for (key, value) in &self.env {
            spec = spec.with_env(key.clone(), value.clone());
        }
        spec
    }

    /// Grace period for stopping containers
    #[must_use]
    pub fn stop_grace(&self) -> Duration {
        Duration::from_secs(self.stop_grace_secs)
    }
}

/// Heartbeat listener settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    /// TCP address to listen on
    pub bind: String,
    /// Time a connection gets to deliver its report
    pub read_timeout_ms: u64,
    /// Mark servers unresponsive after this long without a heartbeat
    pub stale_after_secs: Option<u64>,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:13000".to_string(),
            read_timeout_ms: 5_000,
            stale_after_secs: Some(900),
        }
    }
}

impl HeartbeatConfig {
    #[must_use]
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    #[must_use]
    pub fn stale_after(&self) -> Option<Duration> {
        self.stale_after_secs.map(Duration::from_secs)
    }
}

/// Idle reaper settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaperConfig {
    /// Run the periodic sweep
    pub enabled: bool,
    /// Seconds between sweeps
    pub interval_secs: u64,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 300,
        }
    }
}

impl ReaperConfig {
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

/// Reconciliation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcilerConfig {
    /// Reconcile once before serving
    pub run_on_startup: bool,
    /// Seconds between periodic passes (disabled when unset)
    pub interval_secs: Option<u64>,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            run_on_startup: true,
            interval_secs: None,
        }
    }
}

impl ReconcilerConfig {
    #[must_use]
    pub fn interval(&self) -> Option<Duration> {
        self.interval_secs.map(|secs| Duration::from_secs(secs.max(1)))
    }
}

/// Everything the fleet manager needs besides its collaborators
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetManagerConfig {
    pub fleet: FleetConfig,
    pub container: ContainerTemplate,
    pub heartbeat: HeartbeatConfig,
    pub reaper: ReaperConfig,
    pub reconciler: ReconcilerConfig,
}

impl FleetManagerConfig {
    /// Reject settings the manager cannot run with
    ///
    /// # Errors
    ///
    /// Returns `CoreError::ConfigError` describing the first problem found
    pub fn validate(&self) -> Result<(), CoreError> {
        let fleet = &self.fleet;

        if fleet.max_players_per_server == 0 {
            return Err(CoreError::ConfigError(
                "fleet.max_players_per_server must be greater than zero".to_string(),
            ));
        }
        if fleet.public_address.trim().is_empty() {
            return Err(CoreError::ConfigError(
                "fleet.public_address must not be empty".to_string(),
            ));
        }
        if let Some(end) = fleet.port_pool_end
            && end < fleet.port_pool_start
        {
            return Err(CoreError::ConfigError(format!(
                "fleet.port_pool_end ({end}) is below port_pool_start ({})",
                fleet.port_pool_start
            )));
        }
        if fleet.create_initial_servers && fleet.initial_servers > fleet.max_servers {
            return Err(CoreError::ConfigError(format!(
                "fleet.initial_servers ({}) exceeds max_servers ({})",
                fleet.initial_servers, fleet.max_servers
            )));
        }
        if fleet.allow_server_creation && self.container.image.trim().is_empty() {
            return Err(CoreError::ConfigError(
                "container.image is required when server creation is allowed".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ServerState;
    use chrono::Utc;

    fn valid() -> FleetManagerConfig {
        let mut config = FleetManagerConfig::default();
        config.container.image = "registry.local/game".to_string();
        config
    }

    #[test]
    fn test_defaults() {
        let fleet = FleetConfig::default();
        assert_eq!(fleet.max_servers, 100);
        assert_eq!(fleet.max_players_per_server, 50);
        assert_eq!(fleet.max_party_size, 5);
        assert_eq!(fleet.port_pool_start, 5100);
        assert!(!fleet.overfill_fallback);
        assert_eq!(HeartbeatConfig::default().bind, "0.0.0.0:13000");
        assert_eq!(ReaperConfig::default().interval(), Duration::from_secs(300));
    }

    #[test]
    fn test_validate() {
        assert!(valid().validate().is_ok());

        let mut config = valid();
        config.container.image.clear();
        assert!(config.validate().is_err());
        config.fleet.allow_server_creation = false;
        assert!(config.validate().is_ok());

        let mut config = valid();
        config.fleet.port_pool_end = Some(5000);
        assert!(config.validate().is_err());

        let mut config = valid();
        config.fleet.max_players_per_server = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_party_limit_bounded_by_capacity() {
        let mut fleet = FleetConfig::default();
        fleet.max_players_per_server = 4;
        assert_eq!(fleet.party_limit(), 4);
    }

    #[test]
    fn test_spec_for_instance() {
        let mut template = ContainerTemplate {
            image: "game".to_string(),
            ..ContainerTemplate::default()
        };
        template
            .env
            .insert("REGION".to_string(), "eu".to_string());

        let instance = ServerInstance {
            id: 1,
            server_id: "0f8fad5b-d9cb-469f-a165-70867728950e".to_string(),
            container_id: None,
            public_address: "203.0.113.7".to_string(),
            private_address: "10.0.0.7".to_string(),
            port: 5104,
            max_capacity: 50,
            player_count: 0,
            state: ServerState::Provisioning,
            is_standby: false,
            last_heartbeat_at: None,
            created_at: Utc::now(),
            deleted_at: None,
        };

        let spec = template.spec_for(&instance);
        assert_eq!(spec.name, "GameServer-Instance--5104-0f8fad5b");
        assert_eq!(spec.host_port, 5104);
        assert_eq!(spec.container_port, 7777);
        assert_eq!(spec.env_value(ENV_SERVER_ID), Some(instance.server_id.as_str()));
        assert_eq!(spec.env_value(ENV_IP_ADDRESS), Some("203.0.113.7"));
        assert_eq!(spec.env_value("REGION"), Some("eu"));
    }
}
