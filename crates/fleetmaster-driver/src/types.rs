//! Type definitions for container management

use std::fmt;

use serde::{Deserialize, Serialize};

/// Transport protocol of a published port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortProtocol {
    Tcp,
    #[default]
    Udp,
}

impl fmt::Display for PortProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortProtocol::Tcp => write!(f, "tcp"),
            PortProtocol::Udp => write!(f, "udp"),
        }
    }
}

/// Everything needed to create one game-server container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    /// Container name
    pub name: String,
    /// Image repository
    pub image: String,
    /// Image tag
    pub tag: String,
    /// Port published on the host
    pub host_port: u16,
    /// Port the game server listens on inside the container
    pub container_port: u16,
    /// Protocol of the published port
    pub protocol: PortProtocol,
    /// Environment variables, in order
    pub env: Vec<(String, String)>,
    /// Extra labels besides the driver's managed label
    pub labels: Vec<(String, String)>,
}

impl ContainerSpec {
    /// Create a spec for `image:tag` with no port or environment
    pub fn new(name: impl Into<String>, image: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            tag: tag.into(),
            host_port: 0,
            container_port: 0,
            protocol: PortProtocol::default(),
            env: Vec::new(),
            labels: Vec::new(),
        }
    }

    /// Publish `container_port` on `host_port`
    #[must_use]
    pub fn with_port(mut self, host_port: u16, container_port: u16, protocol: PortProtocol) -> Self {
        self.host_port = host_port;
        self.container_port = container_port;
        self.protocol = protocol;
        self
    }

    /// Add an environment variable
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Add a label
    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.push((key.into(), value.into()));
        self
    }

    /// `image:tag` reference
    #[must_use]
    pub fn image_ref(&self) -> String {
        if self.tag.is_empty() {
            self.image.clone()
        } else {
            format!("{}:{}", self.image, self.tag)
        }
    }

    /// Value of an environment variable, if set
    #[must_use]
    pub fn env_value(&self, key: &str) -> Option<&str> {
        self.env
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Run state reported by the runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerState {
    Created,
    Running,
    Paused,
    Restarting,
    Removing,
    Exited,
    Dead,
    Unknown,
}

impl ContainerState {
    /// Parse the runtime's state string
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "created" => Self::Created,
            "running" => Self::Running,
            "paused" => Self::Paused,
            "restarting" => Self::Restarting,
            "removing" => Self::Removing,
            "exited" => Self::Exited,
            "dead" => Self::Dead,
            _ => Self::Unknown,
        }
    }

    /// Check if the container's process is alive
    #[must_use]
    pub fn is_running(self) -> bool {
        matches!(self, Self::Running)
    }
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Restarting => "restarting",
            Self::Removing => "removing",
            Self::Exited => "exited",
            Self::Dead => "dead",
            Self::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

/// One container as listed by the runtime
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerInfo {
    /// Full container id
    pub id: String,
    /// Container names
    pub names: Vec<String>,
    /// Run state
    pub state: ContainerState,
}

impl ContainerInfo {
    /// Create a container info
    pub fn new(id: impl Into<String>, name: impl Into<String>, state: ContainerState) -> Self {
        Self {
            id: id.into(),
            names: vec![name.into()],
            state,
        }
    }

    /// Check if any name starts with `prefix` (a leading `/` is ignored)
    #[must_use]
    pub fn has_name_prefix(&self, prefix: &str) -> bool {
        self.names
            .iter()
            .any(|n| n.trim_start_matches('/').starts_with(prefix))
    }

    /// Check if the container carries exactly `name` (a leading `/` is ignored)
    #[must_use]
    pub fn has_name(&self, name: &str) -> bool {
        self.names.iter().any(|n| n.trim_start_matches('/') == name)
    }

    /// Check if the container is running
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    /// Check if `other` names the same container, allowing short ids
    #[must_use]
    pub fn matches_id(&self, other: &str) -> bool {
        !other.is_empty() && (self.id.starts_with(other) || other.starts_with(&self.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_ref() {
        let spec = ContainerSpec::new("gs-1", "game", "1.2");
        assert_eq!(spec.image_ref(), "game:1.2");
        let spec = ContainerSpec::new("gs-1", "game", "");
        assert_eq!(spec.image_ref(), "game");
    }

    #[test]
    fn test_state_parse() {
        assert_eq!(ContainerState::parse("running"), ContainerState::Running);
        assert_eq!(ContainerState::parse("Exited"), ContainerState::Exited);
        assert_eq!(ContainerState::parse("weird"), ContainerState::Unknown);
        assert!(!ContainerState::Exited.is_running());
    }

    #[test]
    fn test_name_prefix_and_ids() {
        let info = ContainerInfo::new(
            "abcdef0123",
            "/GameServer-Instance--5100",
            ContainerState::Running,
        );
        assert!(info.has_name_prefix("GameServer-Instance--"));
        assert!(info.has_name("GameServer-Instance--5100"));
        assert!(!info.has_name("GameServer-Instance--51"));
        assert!(!info.has_name_prefix("Other"));
        assert!(info.matches_id("abcdef"));
        assert!(info.matches_id("abcdef0123456789"));
        assert!(!info.matches_id(""));
        assert!(!info.matches_id("ffff"));
    }
}
