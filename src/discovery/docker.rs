//! Docker implementation of the container platform, via bollard.
//!
//! Thin mapping layer: connection setup, API error translation, and
//! conversion of bollard's models into the platform types. No lifecycle
//! logic lives here.

use std::collections::HashMap;

use bollard::Docker;
use bollard::container::ListContainersOptions;
use bollard::models::EventMessage;
use bollard::system::EventsOptions;
use futures::StreamExt;

use crate::config::DockerConfig;
use crate::discovery::error::{DiscoveryError, Result};
use crate::discovery::platform::{
    ContainerEvent, ContainerMetadata, ContainerPlatform, ContainerSummary, EventAction,
    EventFilter, EventStream,
};

/// Connection timeout for the Docker API, in seconds.
const CONNECT_TIMEOUT_SECS: u64 = 120;

/// Container platform backed by the local Docker daemon.
///
/// The bollard client is an `Arc` around its transport internally, so the
/// platform is cheap to share and the daemon connection is released when the
/// last clone drops.
pub struct DockerPlatform {
    docker: Docker,
}

impl DockerPlatform {
    /// Connect to the Docker daemon and verify it responds.
    ///
    /// `DOCKER_HOST` takes precedence over the configured host, matching the
    /// Docker CLI. With neither set, bollard's platform defaults apply
    /// (`/var/run/docker.sock` on Unix).
    pub async fn connect(config: &DockerConfig) -> Result<Self> {
        let host = std::env::var("DOCKER_HOST")
            .ok()
            .filter(|h| !h.is_empty())
            .or_else(|| config.host.clone());

        let docker = match host.as_deref() {
            Some(host) if host.starts_with("http://") || host.starts_with("https://") => {
                Docker::connect_with_http(host, CONNECT_TIMEOUT_SECS, bollard::API_DEFAULT_VERSION)
            }
            Some(host) => {
                // unix:// URLs and bare socket paths both go through the
                // socket transport.
                Docker::connect_with_unix(host, CONNECT_TIMEOUT_SECS, bollard::API_DEFAULT_VERSION)
            }
            None => Docker::connect_with_local_defaults(),
        }
        .map_err(|e| DiscoveryError::DockerNotAvailable {
            reason: e.to_string(),
        })?;

        docker
            .ping()
            .await
            .map_err(|e| DiscoveryError::DockerNotAvailable {
                reason: e.to_string(),
            })?;

        Ok(Self { docker })
    }
}

#[async_trait::async_trait]
impl ContainerPlatform for DockerPlatform {
    async fn list_running(&self) -> Result<Vec<ContainerSummary>> {
        let containers = self
            .docker
            .list_containers(Some(ListContainersOptions::<String> {
                all: false,
                ..Default::default()
            }))
            .await
            .map_err(|e| DiscoveryError::ListFailed {
                reason: e.to_string(),
            })?;

        Ok(containers
            .into_iter()
            .filter_map(|c| {
                let id = c.id?;
                let name = c.names.and_then(|names| names.into_iter().next());
                Some(ContainerSummary { id, name })
            })
            .collect())
    }

    async fn inspect(&self, id: &str) -> Result<ContainerMetadata> {
        let info = self
            .docker
            .inspect_container(id, None)
            .await
            .map_err(|e| match e {
                bollard::errors::Error::DockerResponseServerError {
                    status_code: 404, ..
                } => DiscoveryError::NotFound { id: id.to_string() },
                other => DiscoveryError::InspectFailed {
                    id: id.to_string(),
                    reason: other.to_string(),
                },
            })?;

        let config = info.config.unwrap_or_default();
        Ok(ContainerMetadata {
            id: info.id.unwrap_or_else(|| id.to_string()),
            name: info.name.unwrap_or_default(),
            labels: config.labels.unwrap_or_default(),
            exposed_ports: config
                .exposed_ports
                .map(|ports| ports.keys().filter_map(|key| parse_port_key(key)).collect())
                .unwrap_or_default(),
        })
    }

    fn subscribe(&self, filter: EventFilter) -> EventStream {
        let mut filters: HashMap<String, Vec<String>> = HashMap::new();
        filters.insert("type".to_string(), vec!["container".to_string()]);
        if !filter.actions.is_empty() {
            filters.insert(
                "event".to_string(),
                filter
                    .actions
                    .iter()
                    .map(|action| action.as_str().to_string())
                    .collect(),
            );
        }
        if let Some(id) = filter.container {
            filters.insert("container".to_string(), vec![id]);
        }

        self.docker
            .events(Some(EventsOptions::<String> {
                filters,
                ..Default::default()
            }))
            .filter_map(|item| async move {
                match item {
                    // Events for actions we don't track are dropped here.
                    Ok(message) => event_from_message(message).map(Ok),
                    Err(e) => Some(Err(DiscoveryError::EventStream {
                        reason: e.to_string(),
                    })),
                }
            })
            .boxed()
    }
}

/// Convert a bollard event into a [`ContainerEvent`], dropping events with
/// no actor ID or an action we don't track.
fn event_from_message(message: EventMessage) -> Option<ContainerEvent> {
    let id = message.actor.and_then(|actor| actor.id)?;
    let action = EventAction::parse(message.action.as_deref()?)?;
    Some(ContainerEvent { id, action })
}

/// Parse a Docker exposed-port key such as `"8080/tcp"`.
fn parse_port_key(key: &str) -> Option<u16> {
    key.split('/').next()?.parse().ok()
}
