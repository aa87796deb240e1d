//! Proxy counters
//!
//! Every event is counted twice: in process-local atomics readable through
//! the `ProxyHandle`, and through the `metrics` facade for whatever recorder
//! the embedding application installs.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use metrics::{counter, gauge};

/// Direction of travel through a connection pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// WebSocket client to TCP backend (JSON to protobuf)
    ClientToBackend,
    /// TCP backend to WebSocket client (protobuf to JSON)
    BackendToClient,
}

impl Direction {
    fn label(self) -> &'static str {
        match self {
            Direction::ClientToBackend => "client_to_backend",
            Direction::BackendToClient => "backend_to_client",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::ClientToBackend => write!(f, "client->backend"),
            Direction::BackendToClient => write!(f, "backend->client"),
        }
    }
}

/// Point-in-time copy of the proxy counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Raw connections accepted
    pub connections_accepted: u64,
    /// Connections dropped during detection or upgrade
    pub handshake_failures: u64,
    /// Upgraded clients whose backend connection failed
    pub backend_failures: u64,
    /// Connection pairs created
    pub pairs_opened: u64,
    /// Connection pairs torn down
    pub pairs_closed: u64,
    /// Messages delivered to the backend
    pub messages_to_backend: u64,
    /// Messages delivered to clients
    pub messages_to_client: u64,
    /// Messages dropped because they failed to convert
    pub conversion_errors: u64,
}

/// Shared proxy counters
#[derive(Debug, Default)]
pub struct ProxyStats {
    connections_accepted: AtomicU64,
    handshake_failures: AtomicU64,
    backend_failures: AtomicU64,
    pairs_opened: AtomicU64,
    pairs_closed: AtomicU64,
    messages_to_backend: AtomicU64,
    messages_to_client: AtomicU64,
    conversion_errors: AtomicU64,
}

impl ProxyStats {
    /// A raw connection was accepted
    pub fn record_accepted(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        counter!("proxy.connections.accepted").increment(1);
    }

    /// A connection failed detection or upgrade
    pub fn record_handshake_failure(&self) {
        self.handshake_failures.fetch_add(1, Ordering::Relaxed);
        counter!("proxy.handshake.failures").increment(1);
    }

    /// A backend connection could not be established
    pub fn record_backend_failure(&self) {
        self.backend_failures.fetch_add(1, Ordering::Relaxed);
        counter!("proxy.backend.failures").increment(1);
    }

    /// A connection pair started forwarding
    pub fn record_pair_opened(&self) {
        self.pairs_opened.fetch_add(1, Ordering::Relaxed);
        gauge!("proxy.connections.active").increment(1.0);
    }

    /// A connection pair was torn down
    pub fn record_pair_closed(&self) {
        self.pairs_closed.fetch_add(1, Ordering::Relaxed);
        gauge!("proxy.connections.active").decrement(1.0);
    }

    /// A message was converted and delivered
    pub fn record_forwarded(&self, direction: Direction) {
        let slot = match direction {
            Direction::ClientToBackend => &self.messages_to_backend,
            Direction::BackendToClient => &self.messages_to_client,
        };
        slot.fetch_add(1, Ordering::Relaxed);
        counter!("proxy.messages.forwarded", "direction" => direction.label()).increment(1);
    }

    /// A message was dropped because it failed to convert
    pub fn record_conversion_error(&self, direction: Direction) {
        self.conversion_errors.fetch_add(1, Ordering::Relaxed);
        counter!("proxy.conversion.errors", "direction" => direction.label()).increment(1);
    }

    /// Copy the current counter values
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            connections_accepted: self.connections_accepted.load(Ordering::Relaxed),
            handshake_failures: self.handshake_failures.load(Ordering::Relaxed),
            backend_failures: self.backend_failures.load(Ordering::Relaxed),
            pairs_opened: self.pairs_opened.load(Ordering::Relaxed),
            pairs_closed: self.pairs_closed.load(Ordering::Relaxed),
            messages_to_backend: self.messages_to_backend.load(Ordering::Relaxed),
            messages_to_client: self.messages_to_client.load(Ordering::Relaxed),
            conversion_errors: self.conversion_errors.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let stats = ProxyStats::default();
        stats.record_accepted();
        stats.record_accepted();
        stats.record_pair_opened();
        stats.record_forwarded(Direction::ClientToBackend);
        stats.record_forwarded(Direction::BackendToClient);
        stats.record_forwarded(Direction::BackendToClient);
        stats.record_conversion_error(Direction::ClientToBackend);
        stats.record_pair_closed();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.connections_accepted, 2);
        assert_eq!(snapshot.pairs_opened, 1);
        assert_eq!(snapshot.pairs_closed, 1);
        assert_eq!(snapshot.messages_to_backend, 1);
        assert_eq!(snapshot.messages_to_client, 2);
        assert_eq!(snapshot.conversion_errors, 1);
        assert_eq!(snapshot.handshake_failures, 0);
    }

    #[test]
    fn test_direction_display() {
        assert_eq!(Direction::ClientToBackend.to_string(), "client->backend");
        assert_eq!(Direction::BackendToClient.to_string(), "backend->client");
    }
}
