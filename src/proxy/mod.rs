//! Reverse-proxy runtime.
//!
//! The discovery core only ever sees proxies through the [`ProxyHandle`] /
//! [`ProxyFactory`] seam: construction is pure, `start` and `stop` are the
//! whole lifecycle contract. [`ProxyServer`] is the real implementation — a
//! hyper accept loop forwarding requests to the route target.
//!
//! Contract details the core relies on:
//! - `start` is called at most once per handle (caller guarantee);
//! - `stop` must be safe even if `start` never ran or never succeeded, and
//!   must tolerate racing a second logical teardown.

use std::sync::Arc;

use crate::config::ServiceConfig;

pub mod error;
pub mod server;

pub use error::{ProxyError, Result};
pub use server::{HttpProxyFactory, ProxyServer};

/// One running reverse-proxy instance, start/stop-able, nothing more.
#[async_trait::async_trait]
pub trait ProxyHandle: Send + Sync {
    /// Start serving. May block while acquiring resources.
    async fn start(&self) -> Result<()>;

    /// Stop serving and release resources.
    ///
    /// Must succeed (as a no-op) when no resources were ever acquired.
    async fn stop(&self) -> Result<()>;

    /// Name this proxy is advertised under.
    fn node_name(&self) -> &str;

    /// Upstream target URL.
    fn target(&self) -> &str;
}

/// Builds proxy handles from routing configuration. Pure construction, no I/O.
pub trait ProxyFactory: Send + Sync {
    /// Create a handle for one service. The proxy is not started.
    fn create(&self, service: ServiceConfig) -> Arc<dyn ProxyHandle>;
}
