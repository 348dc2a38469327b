//! Test doubles for the discovery core.
//!
//! Provides:
//! - [`MockProxy`] / [`MockProxyFactory`]: countable, optionally-failing
//!   stand-ins for the proxy runtime
//! - [`MockPlatform`]: an in-memory container platform with a scriptable
//!   event stream
//!
//! These are plain `pub` so integration tests under `tests/` can use them too.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::config::ServiceConfig;
use crate::discovery::{
    ContainerEvent, ContainerMetadata, ContainerPlatform, ContainerSummary, DiscoveryError,
    EventFilter, EventStream,
};
use crate::proxy::{ProxyError, ProxyFactory, ProxyHandle};

/// Proxy handle that counts start/stop calls instead of doing I/O.
pub struct MockProxy {
    node_name: String,
    target: String,
    starts: AtomicUsize,
    stops: AtomicUsize,
    fail_start: bool,
}

impl MockProxy {
    /// Create a mock that starts successfully.
    pub fn new(node_name: impl Into<String>) -> Self {
        Self {
            node_name: node_name.into(),
            target: "http://mock.invalid:0".to_string(),
            starts: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
            fail_start: false,
        }
    }

    /// Create a mock whose `start` always fails.
    pub fn failing(node_name: impl Into<String>) -> Self {
        Self {
            fail_start: true,
            ..Self::new(node_name)
        }
    }

    /// Number of `start` calls observed.
    pub fn start_count(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    /// Number of `stop` calls observed.
    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ProxyHandle for MockProxy {
    async fn start(&self) -> Result<(), ProxyError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        if self.fail_start {
            return Err(ProxyError::StartFailed {
                node_name: self.node_name.clone(),
                reason: "mock start failure".to_string(),
            });
        }
        Ok(())
    }

    async fn stop(&self) -> Result<(), ProxyError> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn node_name(&self) -> &str {
        &self.node_name
    }

    fn target(&self) -> &str {
        &self.target
    }
}

/// Factory that records every handle it creates.
#[derive(Default)]
pub struct MockProxyFactory {
    fail_start: bool,
    created: Mutex<Vec<Arc<MockProxy>>>,
}

impl MockProxyFactory {
    /// Factory producing proxies that start successfully.
    pub fn new() -> Self {
        Self::default()
    }

    /// Factory producing proxies whose `start` always fails.
    pub fn failing() -> Self {
        Self {
            fail_start: true,
            created: Mutex::new(Vec::new()),
        }
    }

    /// Handles created so far, in creation order.
    pub fn created(&self) -> Vec<Arc<MockProxy>> {
        self.created.lock().expect("factory lock").clone()
    }
}

impl ProxyFactory for MockProxyFactory {
    fn create(&self, service: ServiceConfig) -> Arc<dyn ProxyHandle> {
        let proxy = Arc::new(MockProxy {
            node_name: service.node_name,
            target: service.target,
            starts: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
            fail_start: self.fail_start,
        });
        self.created.lock().expect("factory lock").push(proxy.clone());
        proxy
    }
}

type EventSender = mpsc::UnboundedSender<Result<ContainerEvent, DiscoveryError>>;

/// In-memory container platform.
///
/// Containers are added up front or at any point during a test; events are
/// pushed with [`MockPlatform::emit`] and fan out to every subscription whose
/// filter matches, mirroring how the real platform delivers filtered streams.
#[derive(Default)]
pub struct MockPlatform {
    containers: Mutex<HashMap<String, ContainerMetadata>>,
    subscriptions: Mutex<Vec<(EventFilter, EventSender)>>,
}

impl MockPlatform {
    /// Create an empty platform.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a running container.
    pub fn add_container(&self, meta: ContainerMetadata) {
        self.containers
            .lock()
            .expect("containers lock")
            .insert(meta.id.clone(), meta);
    }

    /// Remove a container, as if it exited.
    pub fn remove_container(&self, id: &str) {
        self.containers.lock().expect("containers lock").remove(id);
    }

    /// Deliver an event to every matching subscription.
    pub fn emit(&self, event: ContainerEvent) {
        let subs = self.subscriptions.lock().expect("subscriptions lock");
        for (filter, tx) in subs.iter() {
            if filter.matches(&event) {
                let _ = tx.send(Ok(event.clone()));
            }
        }
    }

    /// Deliver a stream error to the subscriptions for one container, or to
    /// the unfiltered (top-level) subscriptions when `container` is `None`.
    pub fn emit_error(&self, container: Option<&str>, reason: &str) {
        let subs = self.subscriptions.lock().expect("subscriptions lock");
        for (filter, tx) in subs.iter() {
            if filter.container.as_deref() == container {
                let _ = tx.send(Err(DiscoveryError::EventStream {
                    reason: reason.to_string(),
                }));
            }
        }
    }

    /// Drop all subscription senders, ending every stream.
    pub fn close_streams(&self) {
        self.subscriptions
            .lock()
            .expect("subscriptions lock")
            .clear();
    }

    /// Number of live subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.lock().expect("subscriptions lock").len()
    }
}

#[async_trait::async_trait]
impl ContainerPlatform for MockPlatform {
    async fn list_running(&self) -> Result<Vec<ContainerSummary>, DiscoveryError> {
        Ok(self
            .containers
            .lock()
            .expect("containers lock")
            .values()
            .map(|meta| ContainerSummary {
                id: meta.id.clone(),
                name: Some(meta.name.clone()),
            })
            .collect())
    }

    async fn inspect(&self, id: &str) -> Result<ContainerMetadata, DiscoveryError> {
        self.containers
            .lock()
            .expect("containers lock")
            .get(id)
            .cloned()
            .ok_or_else(|| DiscoveryError::NotFound { id: id.to_string() })
    }

    fn subscribe(&self, filter: EventFilter) -> EventStream {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscriptions
            .lock()
            .expect("subscriptions lock")
            .push((filter, tx));
        UnboundedReceiverStream::new(rx).boxed()
    }
}

/// Build metadata for a container with `webtail.enabled=true`.
pub fn enabled_container(id: &str, name: &str, ports: &[u16]) -> ContainerMetadata {
    ContainerMetadata {
        id: id.to_string(),
        name: format!("/{name}"),
        labels: HashMap::from([("webtail.enabled".to_string(), "true".to_string())]),
        exposed_ports: ports.to_vec(),
    }
}
