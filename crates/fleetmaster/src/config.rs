//! Configuration loading and types

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use fleetmaster_core::{
    ContainerTemplate, EntitlementConfig, FleetConfig, FleetManagerConfig, HeartbeatConfig,
    ReaperConfig, ReconcilerConfig,
};
use fleetmaster_driver::DockerDriverConfig;

/// Top-level configuration for the fleetmaster daemon
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Daemon server settings
    #[serde(default)]
    pub daemon: DaemonConfig,
    /// Fleet sizing and policy
    #[serde(default)]
    pub fleet: FleetConfig,
    /// How game-server containers are built
    #[serde(default)]
    pub container: ContainerTemplate,
    /// Docker driver settings
    #[serde(default)]
    pub docker: DockerDriverConfig,
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,
    #[serde(default)]
    pub reaper: ReaperConfig,
    #[serde(default)]
    pub reconciler: ReconcilerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub entitlement: EntitlementConfig,
}

/// Daemon server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Address and port to bind to
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log output format
    #[serde(default)]
    pub log_format: LogFormat,
    /// Seconds background work gets to finish on shutdown
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            log_level: default_log_level(),
            log_format: LogFormat::default(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
        }
    }
}

impl DaemonConfig {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_shutdown_timeout_secs() -> u64 {
    10
}

/// Registry persistence
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    /// SQLite database file; records are kept in memory when unset
    pub path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from file
    ///
    /// # Errors
    /// Returns error if file cannot be read or parsed
    pub fn load(path: &Path) -> eyre::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML text
    ///
    /// # Errors
    /// Returns error if the text is not valid configuration
    pub fn parse(content: &str) -> eyre::Result<Self> {
        let mut config: Config = toml::from_str(content)?;
        // One prefix names containers and recognises them again
        config.docker.name_prefix = config.container.name_prefix.clone();
        Ok(config)
    }

    /// Load from an explicit path, the environment, or default paths
    ///
    /// # Errors
    /// Returns error if a config file exists but cannot be loaded
    pub fn load_default(explicit: Option<&Path>) -> eyre::Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }

        // Check environment variable
        if let Ok(path) = std::env::var("FLEETMASTER_CONFIG") {
            return Self::load(&PathBuf::from(path));
        }

        // Try common paths
        let mut paths = vec![
            PathBuf::from("fleetmaster.toml"),
            PathBuf::from("/etc/fleetmaster/fleetmaster.toml"),
        ];
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("fleetmaster/fleetmaster.toml"));
        }

        for path in paths {
            if path.exists() {
                return Self::load(&path);
            }
        }

        // Return default config if no file found
        tracing::warn!("no config file found, using defaults");
        Self::parse("")
    }

    /// Settings handed to the fleet manager
    pub fn manager_config(&self) -> FleetManagerConfig {
        FleetManagerConfig {
            fleet: self.fleet.clone(),
            container: self.container.clone(),
            heartbeat: self.heartbeat.clone(),
            reaper: self.reaper.clone(),
            reconciler: self.reconciler.clone(),
        }
    }
}
