//! Docker event watcher and proxy lifecycle manager.
//!
//! One watcher per process. Startup runs a reconciliation scan so containers
//! that were already running get proxied, then the event loop takes over:
//! every `start` event is dispatched as its own task (a slow inspection never
//! stalls the stream), and every successfully registered proxy gets a
//! single-shot stop watcher subscribed to that container's terminal events.
//!
//! Lifecycle per container:
//!
//! ```text
//! start event ──► inspect ──► resolve labels ──► guard ──► start proxy ──► register
//!                    │             │                │           │              │
//!                    ▼             ▼                ▼           ▼              ▼
//!                 vanished      not eligible     already     discarded    stop watcher
//!                 (skip)          (skip)         proxied     on failure     spawned
//! ```
//!
//! Teardown happens exactly once per container: either the stop watcher wins
//! (terminal event, or its stream dying) and removes the registry entry, or
//! global shutdown drains the registry wholesale. Removal-before-stop makes
//! the race benign; whoever removes the entry owns the stop call.

use std::sync::Arc;

use futures::StreamExt;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::discovery::error::{DiscoveryError, Result};
use crate::discovery::labels::{self, Resolution, SkipReason};
use crate::discovery::platform::{ContainerPlatform, EventFilter, EventStream};
use crate::discovery::registry::ProxyRegistry;
use crate::proxy::{ProxyFactory, ProxyHandle};

/// Watches container lifecycle events and manages one proxy per eligible
/// container.
///
/// Shared state lives behind an inner `Arc` so spawned tasks can hold onto it
/// while the watcher itself stays a plain value with `&self` methods.
pub struct DockerWatcher {
    inner: Arc<Inner>,
}

struct Inner {
    platform: Arc<dyn ContainerPlatform>,
    proxies: Arc<dyn ProxyFactory>,
    registry: ProxyRegistry,
    network: String,
    cancel: CancellationToken,
    tasks: TaskTracker,
}

impl DockerWatcher {
    /// Create a watcher. Nothing runs until [`DockerWatcher::start`].
    pub fn new(
        platform: Arc<dyn ContainerPlatform>,
        proxies: Arc<dyn ProxyFactory>,
        network: impl Into<String>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                platform,
                proxies,
                registry: ProxyRegistry::new(),
                network: network.into(),
                cancel: CancellationToken::new(),
                tasks: TaskTracker::new(),
            }),
        }
    }

    /// The registry of active proxies.
    pub fn registry(&self) -> &ProxyRegistry {
        &self.inner.registry
    }

    /// Run the reconciliation scan, then begin streaming events.
    ///
    /// Returns once the event subscription exists; the event loop runs in the
    /// background until [`DockerWatcher::stop`] or the stream dies.
    pub async fn start(&self) -> Result<()> {
        self.inner.clone().scan_existing_containers().await;

        let stream = self.inner.platform.subscribe(EventFilter::starts());

        let inner = self.inner.clone();
        self.inner
            .tasks
            .spawn(async move { inner.run_event_loop(stream).await });

        Ok(())
    }

    /// Shut the watcher down: cancel every task, drain the registry, stop all
    /// proxies concurrently, and wait for every spawned task to exit.
    ///
    /// Safe to call with nothing registered, or without `start` ever running.
    /// A container handler that passed the duplicate guard before
    /// cancellation can commit its insert after the drain; that proxy stays
    /// up until the process exits.
    pub async fn stop(&self) {
        self.inner.cancel.cancel();

        // Atomic drain: no task can observe a half-empty registry, and the
        // cancelled stop watchers leave teardown entirely to us.
        let handles = self.inner.registry.drain();
        if !handles.is_empty() {
            info!("Stopping {} managed proxies", handles.len());
        }

        let mut stops = JoinSet::new();
        for handle in handles {
            stops.spawn(async move {
                if let Err(e) = handle.stop().await {
                    error!("Error stopping proxy '{}': {}", handle.node_name(), e);
                }
            });
        }
        while stops.join_next().await.is_some() {}

        self.inner.tasks.close();
        self.inner.tasks.wait().await;
    }
}

impl Inner {
    /// Feed every already-running container through the same handling path
    /// used for live start events. Failures here are logged, never fatal.
    async fn scan_existing_containers(self: Arc<Self>) {
        let containers = match self.platform.list_running().await {
            Ok(containers) => containers,
            Err(e) => {
                warn!("Failed to scan existing containers: {}", e);
                return;
            }
        };

        for container in containers {
            if let Err(e) = self.clone().handle_container(&container.id).await {
                warn!(
                    "Error handling existing container {}: {}",
                    short_id(&container.id),
                    e
                );
            }
        }
    }

    /// Top-level event loop: dispatch start events until cancellation or the
    /// stream dies. No reconnection on stream failure.
    async fn run_event_loop(self: Arc<Self>, mut stream: EventStream) {
        info!("Docker watcher started, listening for container events");

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("Docker watcher stopping");
                    return;
                }
                item = stream.next() => match item {
                    Some(Ok(event)) => self.clone().dispatch(event.id),
                    Some(Err(e)) => {
                        if !self.cancel.is_cancelled() {
                            error!("Docker events error: {}", e);
                        }
                        return;
                    }
                    None => {
                        if !self.cancel.is_cancelled() {
                            error!("Docker event stream ended unexpectedly");
                        }
                        return;
                    }
                }
            }
        }
    }

    /// Handle one container on its own task so the event loop keeps draining.
    fn dispatch(self: Arc<Self>, id: String) {
        let tasks = self.tasks.clone();
        tasks.spawn(async move {
            if let Err(e) = self.handle_container(&id).await {
                warn!("Error handling container {}: {}", short_id(&id), e);
            }
        });
    }

    /// Inspect a container and start a proxy for it if its labels opt in.
    ///
    /// All ineligibility outcomes and proxy start failures are contained
    /// here; only unexpected platform failures propagate to the caller.
    async fn handle_container(self: Arc<Self>, id: &str) -> Result<()> {
        let meta = match self.platform.inspect(id).await {
            Ok(meta) => meta,
            Err(DiscoveryError::NotFound { .. }) => {
                debug!("Container {} vanished before inspection", short_id(id));
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        let service = match labels::resolve(&meta, &self.network) {
            Resolution::Route {
                service,
                auto_detected_port,
            } => {
                if let Some(port) = auto_detected_port {
                    info!(
                        "Auto-detected port {} for container {} (lowest exposed port)",
                        port,
                        short_id(id)
                    );
                }
                service
            }
            Resolution::Skip(SkipReason::NotEnabled) => {
                debug!("Container {} not enabled for webtail", short_id(id));
                return Ok(());
            }
            Resolution::Skip(SkipReason::NoPort) => {
                info!(
                    "Container {} has webtail.enabled=true but no webtail.port label and no exposed ports",
                    short_id(id)
                );
                return Ok(());
            }
        };

        // Best-effort duplicate guard; insert_if_absent below is the real
        // commit point.
        if self.registry.contains(id) {
            debug!(
                "Proxy already exists for container {} ({})",
                short_id(id),
                service.node_name
            );
            return Ok(());
        }

        info!(
            "Container {} started with webtail enabled: {} -> {}",
            short_id(id),
            service.node_name,
            service.target
        );

        let handle = self.proxies.create(service);

        // Start outside the registry lock. A handle that fails to start is
        // discarded and never registered; a future start event retries
        // naturally.
        if let Err(e) = handle.start().await {
            error!(
                "Failed to start proxy for container {} ({} -> {}): {}",
                short_id(id),
                handle.node_name(),
                handle.target(),
                e
            );
            return Ok(());
        }

        if !self.registry.insert_if_absent(id, handle.clone()) {
            // A concurrent start event for the same container won the race;
            // tear down the extra proxy so exactly one remains.
            warn!(
                "Duplicate proxy start for container {} ({}), stopping the extra instance",
                short_id(id),
                handle.node_name()
            );
            if let Err(e) = handle.stop().await {
                error!("Error stopping duplicate proxy: {}", e);
            }
            return Ok(());
        }

        info!(
            "Started proxy for container {} ({})",
            short_id(id),
            handle.node_name()
        );

        let watcher = self.clone();
        let id = id.to_string();
        let node_name = handle.node_name().to_string();
        self.tasks
            .spawn(async move { watcher.watch_container_stop(id, node_name).await });

        Ok(())
    }

    /// Single-shot watcher for one container's terminal events.
    ///
    /// Tears the proxy down on `stop`/`die`/`kill`, or on the container's
    /// stream dying without cancellation. On global shutdown it exits without
    /// teardown; the drain in [`DockerWatcher::stop`] owns that.
    async fn watch_container_stop(self: Arc<Self>, id: String, node_name: String) {
        let mut stream = self.platform.subscribe(EventFilter::terminal_for(&id));

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return,
                item = stream.next() => match item {
                    Some(Ok(event)) => {
                        if event.action.is_terminal() {
                            info!(
                                "Container {} ({}) stopped, shutting down proxy",
                                short_id(&id),
                                node_name
                            );
                            self.stop_proxy(&id).await;
                            return;
                        }
                    }
                    Some(Err(e)) => {
                        if self.cancel.is_cancelled() {
                            return;
                        }
                        warn!(
                            "Error watching container {}: {}; shutting down its proxy",
                            short_id(&id),
                            e
                        );
                        self.stop_proxy(&id).await;
                        return;
                    }
                    None => {
                        if self.cancel.is_cancelled() {
                            return;
                        }
                        warn!(
                            "Event stream for container {} ended; shutting down its proxy",
                            short_id(&id)
                        );
                        self.stop_proxy(&id).await;
                        return;
                    }
                }
            }
        }
    }

    /// Remove a container's proxy and stop it.
    ///
    /// Removal and stop are together idempotent: whoever removes the entry
    /// owns the stop call, and a container that is already gone is a no-op.
    async fn stop_proxy(&self, id: &str) {
        if let Some(handle) = self.registry.remove(id) {
            if let Err(e) = handle.stop().await {
                error!(
                    "Error stopping proxy for container {}: {}",
                    short_id(id),
                    e
                );
            }
        }
    }
}

/// Docker-style truncated container ID for log lines.
fn short_id(id: &str) -> &str {
    &id[..id.len().min(12)]
}
