//! Error types for the proxy runtime.

use thiserror::Error;

/// Result type for proxy operations.
pub type Result<T> = std::result::Result<T, ProxyError>;

/// Errors that can occur while running a proxy.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// Failed to bind the listen address.
    #[error("Failed to bind '{addr}': {reason}")]
    Bind {
        /// Address that was attempted.
        addr: String,
        /// Reason for failure.
        reason: String,
    },

    /// The route target is not a valid URL.
    #[error("Invalid target '{target}': {reason}")]
    InvalidTarget {
        /// The offending target.
        target: String,
        /// Reason for failure.
        reason: String,
    },

    /// Failed to start the proxy.
    #[error("Failed to start proxy '{node_name}': {reason}")]
    StartFailed {
        /// Node name of the proxy.
        node_name: String,
        /// Reason for failure.
        reason: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
