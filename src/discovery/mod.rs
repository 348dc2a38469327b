//! Container discovery: finding proxy-eligible containers and keeping one
//! proxy alive per container.
//!
//! The module splits along a testable seam:
//! - [`platform`] defines the container-platform capabilities the watcher
//!   needs (list, inspect, filtered event streams); [`docker`] implements
//!   them over the local Docker daemon.
//! - [`labels`] is the pure routing policy: container metadata in, routing
//!   decision out.
//! - [`registry`] tracks which containers currently have a proxy.
//! - [`watcher`] ties them together: reconciliation scan, event loop,
//!   per-container stop watchers, and drained shutdown.

pub mod docker;
pub mod error;
pub mod labels;
pub mod platform;
pub mod registry;
pub mod watcher;

pub use docker::DockerPlatform;
pub use error::{DiscoveryError, Result};
pub use platform::{
    ContainerEvent, ContainerMetadata, ContainerPlatform, ContainerSummary, EventAction,
    EventFilter, EventStream,
};
pub use registry::ProxyRegistry;
pub use watcher::DockerWatcher;
