//! Error types for container discovery.

use thiserror::Error;

/// Result type for discovery operations.
pub type Result<T> = std::result::Result<T, DiscoveryError>;

/// Errors that can occur during container discovery.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// Docker is not available.
    #[error("Docker not available: {reason}")]
    DockerNotAvailable {
        /// Reason why Docker is unavailable.
        reason: String,
    },

    /// Failed to list running containers.
    #[error("Failed to list containers: {reason}")]
    ListFailed {
        /// Reason for failure.
        reason: String,
    },

    /// The container disappeared before inspection completed.
    #[error("Container '{id}' not found")]
    NotFound {
        /// Container ID.
        id: String,
    },

    /// Failed to inspect a container.
    #[error("Failed to inspect container '{id}': {reason}")]
    InspectFailed {
        /// Container ID.
        id: String,
        /// Reason for failure.
        reason: String,
    },

    /// The platform event stream reported an error.
    #[error("Event stream error: {reason}")]
    EventStream {
        /// Reason for failure.
        reason: String,
    },
}
