//! Default configuration values
//!
//! Single source of truth for defaults, shared by `ProxyConfig::default()`,
//! serde and the merge logic.

use std::net::SocketAddr;

/// Environment variable prefix for all configuration options
pub const ENV_PREFIX: &str = "WS_PROTO_PROXY_";

/// Default listen address as string
pub const LISTEN_STR: &str = "0.0.0.0:8080";

/// Default backend address as string
pub const BACKEND_STR: &str = "127.0.0.1:9000";

/// Default log level as string
pub const LOG_LEVEL_STR: &str = "info";

/// Default listen address
pub fn listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

/// Default backend address
pub fn backend() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 9000))
}

/// Default log level
pub fn log_level() -> String {
    LOG_LEVEL_STR.to_string()
}

/// Default backend read buffer size (8KB), the largest backend message
pub fn buffer_size() -> usize {
    8192
}

/// Default backend connect timeout in seconds
pub fn connection_timeout() -> u64 {
    30
}

/// Default upgrade handshake timeout in milliseconds
pub fn handshake_timeout() -> u64 {
    5000
}

/// Default time a direction gets to stop after its pair is torn down, in milliseconds
pub fn teardown_grace() -> u64 {
    1000
}

/// Default time to wait for live pairs on shutdown, in seconds
pub fn shutdown_timeout() -> u64 {
    30
}

/// Default TCP keepalive idle time in seconds
pub fn tcp_keepalive() -> u64 {
    60
}
