//! Server lifecycle state machine
//!
//! ```text
//! Provisioning ──► Standby / Ready ──► Running
//!       │                │  ▲             │
//!       │                ▼  │             ▼
//!       │            Unresponsive ◄───────┘
//!       ▼                │
//!   Terminating ◄────────┘ (from any live state)
//!       │
//!       ▼
//!   Terminated
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state of a server instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerState {
    Provisioning,
    Standby,
    Ready,
    Running,
    Unresponsive,
    Terminating,
    Terminated,
}

impl ServerState {
    /// Check if a transition from `self` to `target` is allowed
    #[must_use]
    pub fn can_transition_to(self, target: ServerState) -> bool {
        use ServerState::{
            Provisioning, Ready, Running, Standby, Terminated, Terminating, Unresponsive,
        };

        match (self, target) {
            (Provisioning, Standby | Ready | Terminating | Terminated) => true,
            (Standby | Ready, Running | Unresponsive | Terminating | Terminated) => true,
            (Running, Unresponsive | Terminating | Terminated) => true,
            (Unresponsive, Standby | Ready | Running | Terminating | Terminated) => true,
            (Terminating, Terminated) => true,
            _ => false,
        }
    }

    /// Check if a party may be placed on a server in this state
    #[must_use]
    pub fn is_allocatable(self) -> bool {
        matches!(
            self,
            ServerState::Standby | ServerState::Ready | ServerState::Running
        )
    }

    /// Check if the state is final
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, ServerState::Terminated)
    }

    /// Check if the server is on its way out
    #[must_use]
    pub fn is_stopping(self) -> bool {
        matches!(self, ServerState::Terminating | ServerState::Terminated)
    }

    /// Parse the persisted name of a state
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "provisioning" => Some(Self::Provisioning),
            "standby" => Some(Self::Standby),
            "ready" => Some(Self::Ready),
            "running" => Some(Self::Running),
            "unresponsive" => Some(Self::Unresponsive),
            "terminating" => Some(Self::Terminating),
            "terminated" => Some(Self::Terminated),
            _ => None,
        }
    }

    /// Persisted name of the state
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Provisioning => "provisioning",
            Self::Standby => "standby",
            Self::Ready => "ready",
            Self::Running => "running",
            Self::Unresponsive => "unresponsive",
            Self::Terminating => "terminating",
            Self::Terminated => "terminated",
        }
    }
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who reported an occupancy change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OccupancySource {
    /// Reported by the game server itself
    Heartbeat,
    /// Seats reserved for a party by the allocator
    Allocation,
    /// Set by an operator
    Override,
}

impl OccupancySource {
    /// Persisted name of the source
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Heartbeat => "heartbeat",
            Self::Allocation => "allocation",
            Self::Override => "override",
        }
    }

    /// Parse the persisted name of a source
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "heartbeat" => Some(Self::Heartbeat),
            "allocation" => Some(Self::Allocation),
            "override" => Some(Self::Override),
            _ => None,
        }
    }
}

impl fmt::Display for OccupancySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse fill level shown to operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Population {
    Empty,
    Low,
    Medium,
    High,
    Full,
}

impl Population {
    /// Classify `player_count` out of `max_capacity`
    #[must_use]
    pub fn classify(player_count: u32, max_capacity: u32) -> Self {
        if player_count == 0 {
            return Self::Empty;
        }
        if max_capacity == 0 || player_count >= max_capacity {
            return Self::Full;
        }
        let percent = u64::from(player_count) * 100 / u64::from(max_capacity);
        match percent {
            0..=32 => Self::Low,
            33..=65 => Self::Medium,
            _ => Self::High,
        }
    }
}

impl fmt::Display for Population {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Empty => "empty",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Full => "full",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [ServerState; 7] = [
        ServerState::Provisioning,
        ServerState::Standby,
        ServerState::Ready,
        ServerState::Running,
        ServerState::Unresponsive,
        ServerState::Terminating,
        ServerState::Terminated,
    ];

    #[test]
    fn test_terminated_is_final() {
        for target in ALL {
            assert!(!ServerState::Terminated.can_transition_to(target));
        }
    }

    #[test]
    fn test_every_live_state_can_terminate() {
        for from in ALL.into_iter().filter(|s| !s.is_stopping()) {
            assert!(from.can_transition_to(ServerState::Terminated), "{from}");
            assert!(from.can_transition_to(ServerState::Terminating), "{from}");
        }
    }

    #[test]
    fn test_provisioning_cannot_run_directly() {
        assert!(!ServerState::Provisioning.can_transition_to(ServerState::Running));
        assert!(ServerState::Ready.can_transition_to(ServerState::Running));
        assert!(ServerState::Unresponsive.can_transition_to(ServerState::Running));
        assert!(!ServerState::Terminating.can_transition_to(ServerState::Running));
    }

    #[test]
    fn test_allocatable_states() {
        let allocatable: Vec<_> = ALL.into_iter().filter(|s| s.is_allocatable()).collect();
        assert_eq!(
            allocatable,
            vec![ServerState::Standby, ServerState::Ready, ServerState::Running]
        );
    }

    #[test]
    fn test_state_names_round_trip() {
        for state in ALL {
            assert_eq!(ServerState::parse(state.as_str()), Some(state));
        }
        assert_eq!(ServerState::parse("offline"), None);
    }

    #[test]
    fn test_population() {
        assert_eq!(Population::classify(0, 50), Population::Empty);
        assert_eq!(Population::classify(10, 50), Population::Low);
        assert_eq!(Population::classify(25, 50), Population::Medium);
        assert_eq!(Population::classify(40, 50), Population::High);
        assert_eq!(Population::classify(50, 50), Population::Full);
        assert_eq!(Population::classify(60, 50), Population::Full);
    }
}
