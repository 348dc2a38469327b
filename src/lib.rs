//! webtail - reverse proxies for Docker containers, driven by labels.
//!
//! Containers opt in with a `webtail.enabled=true` label; webtail watches the
//! Docker event stream, starts an HTTP reverse proxy per eligible container,
//! and tears the proxy down when the container stops. Services can also be
//! proxied statically from the config file, without Docker at all.

pub mod config;
pub mod discovery;
pub mod error;
pub mod proxy;
pub mod testing;

pub use config::Config;
pub use error::ConfigError;
