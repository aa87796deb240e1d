//! Network utility functions
//!
//! This module provides utility functions for network operations.

use std::net::{SocketAddr, ToSocketAddrs};
use std::str::FromStr;
use std::time::Duration;

use log::debug;
use socket2::SockRef;
use tokio::net::TcpStream;

use super::error::{ProxyError, Result};

/// Parse a socket address
///
/// Accepts literal `ip:port` pairs as well as resolvable `host:port` names.
pub fn parse_socket_addr(addr: &str) -> Result<SocketAddr> {
    if let Ok(socket_addr) = SocketAddr::from_str(addr) {
        return Ok(socket_addr);
    }

    match addr.to_socket_addrs() {
        Ok(mut addrs) => addrs
            .next()
            .ok_or_else(|| ProxyError::Config(format!("Failed to parse address: {}", addr))),
        Err(e) => Err(ProxyError::Config(format!("Failed to parse address {}: {}", addr, e))),
    }
}

/// Tune a freshly accepted or connected stream for message traffic
///
/// Disables Nagle so small messages are not held back and enables TCP
/// keepalive so half-dead peers are eventually noticed. Failures are
/// non-fatal and only logged.
pub fn tune_stream(stream: &TcpStream, keepalive: Duration) {
    if let Err(e) = stream.set_nodelay(true) {
        debug!("Failed to set TCP_NODELAY: {}", e);
    }

    let keepalive = socket2::TcpKeepalive::new().with_time(keepalive);
    if let Err(e) = SockRef::from(stream).set_tcp_keepalive(&keepalive) {
        debug!("Failed to enable TCP keepalive: {}", e);
    }
}

/// Exponential backoff delay with jitter
///
/// `attempt` starts at 1; attempt 0 yields no delay. Up to 10% jitter is
/// added on top of the capped delay.
pub fn backoff_delay(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let exponential = 2u64.saturating_pow(attempt - 1);
    let capped = base_ms.saturating_mul(exponential).min(max_ms);

    let jitter_range = capped / 10;
    let jitter = if jitter_range > 0 { fastrand::u64(0..jitter_range) } else { 0 };

    Duration::from_millis(capped + jitter)
}
