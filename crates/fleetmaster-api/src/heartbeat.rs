//! Heartbeat wire contract
//!
//! A game server opens a TCP connection, writes one JSON object and closes
//! (or ends it with a newline):
//!
//! ```text
//! {"serverId":"6f1c...","playerCount":12}
//! ```
//!
//! Older servers send `ServerId`/`PlayerCount`; both spellings are accepted.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Largest heartbeat payload accepted
pub const MAX_MESSAGE_BYTES: usize = 4096;

/// Longest accepted server id
pub const MAX_SERVER_ID_LEN: usize = 128;

/// Errors rejecting a heartbeat payload at the boundary
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HeartbeatParseError {
    /// Connection closed without data
    #[error("empty heartbeat payload")]
    Empty,

    /// Payload exceeded the size limit
    #[error("heartbeat payload exceeds {limit} bytes")]
    TooLarge {
        /// Size limit in bytes
        limit: usize,
    },

    /// Payload is not UTF-8
    #[error("heartbeat payload is not valid UTF-8")]
    NotUtf8,

    /// Payload is not the expected JSON object
    #[error("malformed heartbeat payload: {0}")]
    Malformed(String),

    /// Server id empty or too long
    #[error("invalid server id: {0:?}")]
    InvalidServerId(String),
}

/// One player-count report from a running game server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatReport {
    #[serde(alias = "ServerId", alias = "server_id")]
    pub server_id: String,
    #[serde(alias = "PlayerCount", alias = "player_count")]
    pub player_count: u32,
}

impl HeartbeatReport {
    /// Create a report
    pub fn new(server_id: impl Into<String>, player_count: u32) -> Self {
        Self {
            server_id: server_id.into(),
            player_count,
        }
    }

    /// Parse and validate a raw payload
    ///
    /// Only the first line is considered when the payload is
    /// newline-terminated.
    ///
    /// # Errors
    /// Returns `HeartbeatParseError` for anything that is not a well-formed
    /// report; such payloads never reach the registry.
    pub fn parse(bytes: &[u8]) -> Result<Self, HeartbeatParseError> {
        if bytes.len() > MAX_MESSAGE_BYTES {
            return Err(HeartbeatParseError::TooLarge {
                limit: MAX_MESSAGE_BYTES,
            });
        }

        let text = std::str::from_utf8(bytes).map_err(|_| HeartbeatParseError::NotUtf8)?;
        let line = text
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .ok_or(HeartbeatParseError::Empty)?;

        let report: Self = serde_json::from_str(line)
            .map_err(|e| HeartbeatParseError::Malformed(e.to_string()))?;
        report.validate()
    }

    fn validate(self) -> Result<Self, HeartbeatParseError> {
        let id = self.server_id.trim();
        if id.is_empty() || id.len() > MAX_SERVER_ID_LEN || id.len() != self.server_id.len() {
            return Err(HeartbeatParseError::InvalidServerId(self.server_id));
        }
        Ok(self)
    }

    /// Encode as a newline-terminated wire message
    #[must_use]
    pub fn to_line(&self) -> String {
        // A struct of a String and a u32 always serializes.
        let mut line = serde_json::to_string(self).unwrap_or_default();
        line.push('\n');
        line
    }
}
