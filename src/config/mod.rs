//! Configuration loading and validation.
//!
//! Configuration is a JSON file (default `config.json`) with three sections:
//! statically configured services, Docker discovery settings, and listener
//! defaults. `ServiceConfig` doubles as the routing configuration the label
//! resolver derives for discovered containers, so a container and a config
//! file entry flow through the exact same proxy construction path.

use std::path::Path;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ConfigError;

/// Routing configuration for one proxied service.
///
/// Comes from either the `services` array of the config file or from the
/// label resolver when a container advertises itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Upstream target URL, e.g. `http://app.webtail:8080`.
    pub target: String,
    /// Name this service is advertised under.
    pub node_name: String,
    /// Explicit listen address (`host:port`). When absent the proxy binds an
    /// ephemeral port on the configured listen host.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listen_addr: Option<String>,
    /// Forward the client's original `Host` header to the upstream.
    #[serde(default)]
    pub pass_host_header: bool,
    /// Trust inbound `X-Forwarded-For` and append to it rather than replace.
    #[serde(default)]
    pub trust_forward_header: bool,
}

/// Docker discovery settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DockerConfig {
    /// Docker daemon address (`unix:///...` or `http(s)://...`). The
    /// `DOCKER_HOST` environment variable overrides this when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    /// Docker network containers must share for name-based routing.
    #[serde(default)]
    pub network: String,
}

/// Listener defaults for proxies without an explicit `listen_addr`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenConfig {
    /// Host address proxies bind to.
    #[serde(default = "default_listen_host")]
    pub host: String,
}

fn default_listen_host() -> String {
    "127.0.0.1".to_string()
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            host: default_listen_host(),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Statically configured services.
    #[serde(default)]
    pub services: Vec<ServiceConfig>,
    /// Docker discovery settings.
    #[serde(default)]
    pub docker: DockerConfig,
    /// Listener defaults.
    #[serde(default)]
    pub listen: ListenConfig,
}

impl Config {
    /// Load and validate configuration from a JSON file.
    pub fn load(path: impl AsRef<Path>, docker_enabled: bool) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;

        let config: Config = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;

        config.validate(docker_enabled)?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// Every service needs an http/https target and a node name. An empty
    /// service list is only acceptable when Docker discovery is enabled, and
    /// Docker discovery itself requires a network name.
    pub fn validate(&self, docker_enabled: bool) -> Result<(), ConfigError> {
        for (i, service) in self.services.iter().enumerate() {
            if service.target.is_empty() {
                return Err(ConfigError::InvalidValue {
                    key: format!("services[{i}].target"),
                    message: "target is required".to_string(),
                });
            }
            let url = Url::parse(&service.target).map_err(|e| ConfigError::InvalidValue {
                key: format!("services[{i}].target"),
                message: format!("not a valid URL: {e}"),
            })?;
            if url.scheme() != "http" && url.scheme() != "https" {
                return Err(ConfigError::InvalidValue {
                    key: format!("services[{i}].target"),
                    message: format!("unsupported scheme '{}'", url.scheme()),
                });
            }
            if service.node_name.is_empty() {
                return Err(ConfigError::InvalidValue {
                    key: format!("services[{i}].node_name"),
                    message: "node_name is required".to_string(),
                });
            }
        }

        if docker_enabled && self.docker.network.is_empty() {
            return Err(ConfigError::MissingDockerSetting {
                key: "docker.network".to_string(),
            });
        }

        if self.services.is_empty() && !docker_enabled {
            return Err(ConfigError::NothingToRun);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(target: &str, node_name: &str) -> ServiceConfig {
        ServiceConfig {
            target: target.to_string(),
            node_name: node_name.to_string(),
            listen_addr: None,
            pass_host_header: false,
            trust_forward_header: false,
        }
    }

    #[test]
    fn valid_config_with_http_target() {
        let config = Config {
            services: vec![service("http://localhost:8080", "test")],
            ..Default::default()
        };
        assert!(config.validate(false).is_ok());
    }

    #[test]
    fn valid_config_with_https_target() {
        let config = Config {
            services: vec![service("https://api.example.com", "api")],
            ..Default::default()
        };
        assert!(config.validate(false).is_ok());
    }

    #[test]
    fn missing_target_rejected() {
        let config = Config {
            services: vec![service("", "test")],
            ..Default::default()
        };
        assert!(matches!(
            config.validate(false),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn non_http_scheme_rejected() {
        let config = Config {
            services: vec![service("ftp://example.com", "test")],
            ..Default::default()
        };
        assert!(matches!(
            config.validate(false),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn empty_services_without_docker_rejected() {
        let config = Config::default();
        assert!(matches!(
            config.validate(false),
            Err(ConfigError::NothingToRun)
        ));
    }

    #[test]
    fn empty_services_with_docker_but_no_network_rejected() {
        let config = Config::default();
        assert!(matches!(
            config.validate(true),
            Err(ConfigError::MissingDockerSetting { .. })
        ));
    }

    #[test]
    fn empty_services_with_docker_and_network_accepted() {
        let config = Config {
            docker: DockerConfig {
                host: None,
                network: "webtail".to_string(),
            },
            ..Default::default()
        };
        assert!(config.validate(true).is_ok());
    }
}
