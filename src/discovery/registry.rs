//! Registry of active proxies, keyed by container ID.
//!
//! Single source of truth for "is this container currently proxied". One
//! mutex guards the map; the lock is scoped strictly to map operations and is
//! never held across proxy start/stop I/O, so it is a plain `std::sync::Mutex`
//! rather than an async lock.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::proxy::ProxyHandle;

/// Concurrency-safe map from container ID to its running proxy.
#[derive(Default)]
pub struct ProxyRegistry {
    inner: Mutex<HashMap<String, Arc<dyn ProxyHandle>>>,
}

impl ProxyRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a proxy is registered for this container.
    pub fn contains(&self, id: &str) -> bool {
        self.lock().contains_key(id)
    }

    /// Insert a handle unless the container already has one.
    ///
    /// Returns `false` (leaving the existing entry untouched) when the
    /// container is already registered. This is the commit point of the
    /// duplicate-start guard: the caller must stop the rejected handle.
    pub fn insert_if_absent(&self, id: impl Into<String>, handle: Arc<dyn ProxyHandle>) -> bool {
        use std::collections::hash_map::Entry;
        match self.lock().entry(id.into()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(entry) => {
                entry.insert(handle);
                true
            }
        }
    }

    /// Remove and return the handle for a container.
    ///
    /// Returns `None` when the container was never registered or a concurrent
    /// teardown already removed it, making removal idempotent.
    pub fn remove(&self, id: &str) -> Option<Arc<dyn ProxyHandle>> {
        self.lock().remove(id)
    }

    /// Atomically empty the registry, returning every handle.
    ///
    /// Used at shutdown so no task can observe a partially-drained map.
    pub fn drain(&self) -> Vec<Arc<dyn ProxyHandle>> {
        std::mem::take(&mut *self.lock()).into_values().collect()
    }

    /// Number of registered proxies.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<dyn ProxyHandle>>> {
        // Proxy handles are stopped outside the lock, so a poisoned mutex can
        // only come from a panic in a map operation; recover the map rather
        // than cascading the panic through every teardown path.
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
