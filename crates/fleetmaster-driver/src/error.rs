//! Error types for fleetmaster-driver

use thiserror::Error;

use fleetmaster_exec::ExecError;

/// Errors that can occur during container operations
#[derive(Error, Debug, Clone)]
pub enum DriverError {
    /// Container runtime cannot be reached
    #[error("container runtime unavailable: {0}")]
    Unavailable(String),

    /// Container does not exist
    #[error("container not found: {0}")]
    ContainerNotFound(String),

    /// Image missing locally and could not be pulled
    #[error("image not found: {0}")]
    ImageNotFound(String),

    /// Host port already bound by something else
    #[error("port already in use: {0}")]
    PortInUse(String),

    /// Runtime command failed for another reason
    #[error("command failed: {status} - {message}")]
    CommandFailed {
        /// Exit status
        status: i32,
        /// Error message
        message: String,
    },

    /// Failed to parse runtime output
    #[error("parse error: {0}")]
    ParseError(String),

    /// Execution error from the command executor
    #[error("execution error: {0}")]
    ExecutionError(#[from] ExecError),
}

impl DriverError {
    /// Classify a failed runtime command by its error output
    #[must_use]
    pub fn from_output(status: i32, message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();

        if lower.contains("cannot connect to the docker daemon")
            || lower.contains("error during connect")
            || lower.contains("connection refused")
        {
            DriverError::Unavailable(message)
        } else if lower.contains("no such container") {
            DriverError::ContainerNotFound(message)
        } else if lower.contains("unable to find image")
            || lower.contains("no such image")
            || lower.contains("pull access denied")
            || lower.contains("manifest unknown")
        {
            DriverError::ImageNotFound(message)
        } else if lower.contains("port is already allocated")
            || lower.contains("address already in use")
        {
            DriverError::PortInUse(message)
        } else {
            DriverError::CommandFailed { status, message }
        }
    }

    /// Check if the failure is likely to clear up on its own
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            DriverError::Unavailable(_) => true,
            DriverError::ExecutionError(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Check if the target container is already gone
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, DriverError::ContainerNotFound(_))
    }
}
