//! Live connection pair registry
//!
//! Not needed for forwarding; pairs never look at each other. It exists so
//! operators (and tests) can see what is currently connected.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::SystemTime;

/// Connection information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    /// Pair id, unique for the lifetime of the proxy
    pub id: u64,
    /// Client address
    pub client: SocketAddr,
    /// Backend address
    pub backend: SocketAddr,
    /// Time the pair was created
    pub timestamp: SystemTime,
}

#[derive(Debug, Default)]
struct RegistryInner {
    next_id: AtomicU64,
    pairs: Mutex<HashMap<u64, ConnectionInfo>>,
}

/// Synchronized map of live connection pairs
#[derive(Debug, Clone, Default)]
pub struct PairRegistry {
    inner: Arc<RegistryInner>,
}

impl PairRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next pair id
    pub fn next_id(&self) -> u64 {
        self.inner.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Record a live pair until the returned guard is dropped
    pub fn register(&self, info: ConnectionInfo) -> Registration {
        let id = info.id;
        self.lock().insert(id, info);
        Registration {
            registry: self.clone(),
            id,
        }
    }

    /// Number of live pairs
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no pair is live
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Live pairs ordered by id
    pub fn snapshot(&self) -> Vec<ConnectionInfo> {
        let mut pairs: Vec<_> = self.lock().values().cloned().collect();
        pairs.sort_by_key(|info| info.id);
        pairs
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<u64, ConnectionInfo>> {
        // The map stays consistent even if a holder panicked.
        self.inner.pairs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Removes its pair from the registry when dropped
#[derive(Debug)]
pub struct Registration {
    registry: PairRegistry,
    id: u64,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry.lock().remove(&self.id);
    }
}
