//! Crate-level error types.
//!
//! Failure domains with their own module (`discovery`, `proxy`) define their
//! errors next to the code; only configuration errors live here because they
//! are produced before any subsystem exists.

use thiserror::Error;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("Failed to read config file '{path}': {source}")]
    Read {
        /// Path that was attempted.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The config file is not valid JSON.
    #[error("Failed to parse config file '{path}': {source}")]
    Parse {
        /// Path that was attempted.
        path: String,
        /// Underlying parse error.
        source: serde_json::Error,
    },

    /// A config value failed validation.
    #[error("Invalid config value for {key}: {message}")]
    InvalidValue {
        /// The offending field, e.g. `services[2].target`.
        key: String,
        /// What was wrong with it.
        message: String,
    },

    /// The loaded config describes nothing to run.
    #[error("No services configured and Docker discovery is disabled")]
    NothingToRun,

    /// Docker discovery was requested without the settings it needs.
    #[error("Docker discovery requires {key} to be set")]
    MissingDockerSetting {
        /// The missing field.
        key: String,
    },
}
