//! Docker container management through the `docker` CLI

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fleetmaster_exec::{CommandExecutor, CommandResult, quote};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::error::DriverError;
use crate::traits::ContainerDriver;
use crate::types::{ContainerInfo, ContainerSpec, ContainerState};

const LIST_FORMAT: &str = "{{.ID}}|{{.Names}}|{{.State}}|{{.Labels}}";

/// Settings for the Docker driver
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DockerDriverConfig {
    /// Path or name of the docker binary
    #[serde(default = "default_binary")]
    pub binary: String,
    /// Daemon endpoint passed as `-H` (local socket when absent)
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Label key put on every container the fleet creates
    #[serde(default = "default_label_key")]
    pub label_key: String,
    /// Label value put on every container the fleet creates
    #[serde(default = "default_label_value")]
    pub label_value: String,
    /// Name prefix that also marks a container as managed
    #[serde(default = "default_name_prefix")]
    pub name_prefix: String,
    /// Upper bound on a single docker invocation
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,
}

fn default_binary() -> String {
    "docker".to_string()
}

fn default_label_key() -> String {
    "fleetmaster.managed".to_string()
}

fn default_label_value() -> String {
    "true".to_string()
}

/// Prefix used by existing deployments, kept so their containers are still found
pub fn default_name_prefix() -> String {
    "GameServer-Instance--".to_string()
}

fn default_command_timeout_secs() -> u64 {
    60
}

impl Default for DockerDriverConfig {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            endpoint: None,
            label_key: default_label_key(),
            label_value: default_label_value(),
            name_prefix: default_name_prefix(),
            command_timeout_secs: default_command_timeout_secs(),
        }
    }
}

/// Docker driver
///
/// Every call shells out to the docker CLI through a `CommandExecutor` and
/// reads state fresh from the daemon.
pub struct DockerDriver {
    executor: Arc<dyn CommandExecutor>,
    config: DockerDriverConfig,
}

impl DockerDriver {
    /// Create a new Docker driver
    pub fn new(executor: Arc<dyn CommandExecutor>, config: DockerDriverConfig) -> Self {
        Self { executor, config }
    }

    /// Driver settings
    #[must_use]
    pub fn config(&self) -> &DockerDriverConfig {
        &self.config
    }

    /// Build a docker command line from already-quoted arguments
    fn docker_cmd(&self, args: &str) -> String {
        match &self.config.endpoint {
            Some(endpoint) => format!("{} -H {} {args}", quote(&self.config.binary), quote(endpoint)),
            None => format!("{} {args}", quote(&self.config.binary)),
        }
    }

    fn managed_label(&self) -> String {
        format!("{}={}", self.config.label_key, self.config.label_value)
    }

    fn create_cmd(&self, spec: &ContainerSpec) -> String {
        let mut args = vec![
            "create".to_string(),
            "--name".to_string(),
            quote(&spec.name),
            "--label".to_string(),
            quote(&self.managed_label()),
        ];

        for (key, value) in &spec.labels {
            args.push("--label".to_string());
            args.push(quote(&format!("{key}={value}")));
        }

        for (key, value) in &spec.env {
            args.push("-e".to_string());
            args.push(quote(&format!("{key}={value}")));
        }

        if spec.host_port != 0 {
            args.push("-p".to_string());
            args.push(quote(&format!(
                "{}:{}/{}",
                spec.host_port, spec.container_port, spec.protocol
            )));
        }

        args.push(quote(&spec.image_ref()));
        self.docker_cmd(&args.join(" "))
    }

    /// Run a docker command, turning non-zero exits into classified errors
    async fn exec(&self, args: &str) -> Result<CommandResult, DriverError> {
        let cmd = self.docker_cmd(args);
        let result = self
            .executor
            .run_with_timeout(&cmd, Duration::from_secs(self.config.command_timeout_secs))
            .await?;

        if result.success() {
            Ok(result)
        } else {
            Err(DriverError::from_output(result.status, result.failure_message()))
        }
    }

    /// Parse `docker ps` output in `LIST_FORMAT`, keeping managed containers
    fn parse_list(&self, output: &str) -> Result<Vec<ContainerInfo>, DriverError> {
        let label = self.managed_label();
        let mut containers = Vec::new();

        for line in output.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let mut fields = line.splitn(4, '|');
            let (Some(id), Some(names), Some(state)) = (fields.next(), fields.next(), fields.next())
            else {
                return Err(DriverError::ParseError(format!("unexpected ps line: {line}")));
            };
            let labels = fields.next().unwrap_or_default();

            let info = ContainerInfo {
                id: id.trim().to_string(),
                names: names
                    .split(',')
                    .map(|n| n.trim().trim_start_matches('/').to_string())
                    .filter(|n| !n.is_empty())
                    .collect(),
                state: ContainerState::parse(state),
            };

            let labelled = labels.split(',').any(|l| l.trim() == label);
            if labelled || info.has_name_prefix(&self.config.name_prefix) {
                containers.push(info);
            }
        }

        Ok(containers)
    }
}

#[async_trait]
impl ContainerDriver for DockerDriver {
    #[instrument(skip(self, spec), fields(name = %spec.name, port = spec.host_port))]
    async fn create_and_start(&self, spec: &ContainerSpec) -> Result<String, DriverError> {
        let cmd = self.create_cmd(spec);
        let result = self
            .executor
            .run_with_timeout(&cmd, Duration::from_secs(self.config.command_timeout_secs))
            .await?;
        if !result.success() {
            return Err(DriverError::from_output(result.status, result.failure_message()));
        }

        let container_id = result
            .stdout
            .lines()
            .map(str::trim)
            .rfind(|l| !l.is_empty())
            .map(ToString::to_string)
            .ok_or_else(|| DriverError::ParseError("docker create returned no id".to_string()))?;

        debug!(container_id = %container_id, "container created");

        if let Err(e) = self.start(&container_id).await {
            warn!(container_id = %container_id, error = %e, "start failed, removing created container");
            if let Err(cleanup) = self.remove(&container_id, true).await {
                warn!(container_id = %container_id, error = %cleanup, "cleanup of unstarted container failed");
            }
            return Err(e);
        }

        info!(container_id = %container_id, image = %spec.image_ref(), "container started");
        Ok(container_id)
    }

    #[instrument(skip(self))]
    async fn start(&self, container_id: &str) -> Result<(), DriverError> {
        self.exec(&format!("start {}", quote(container_id))).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn stop(&self, container_id: &str, grace: Duration) -> Result<(), DriverError> {
        self.exec(&format!("stop -t {} {}", grace.as_secs(), quote(container_id)))
            .await?;
        debug!(container_id = %container_id, "container stopped");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn remove(&self, container_id: &str, force: bool) -> Result<(), DriverError> {
        let args = if force {
            format!("rm -f {}", quote(container_id))
        } else {
            format!("rm {}", quote(container_id))
        };
        self.exec(&args).await?;
        debug!(container_id = %container_id, force, "container removed");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_managed(&self) -> Result<Vec<ContainerInfo>, DriverError> {
        let result = self
            .exec(&format!("ps -a --no-trunc --format {}", quote(LIST_FORMAT)))
            .await?;
        let containers = self.parse_list(&result.stdout)?;
        debug!(count = containers.len(), "listed managed containers");
        Ok(containers)
    }

    fn driver_type(&self) -> &'static str {
        "docker"
    }
}
