//! Configuration module
//!
//! This module handles application configuration, including loading from
//! different sources (files, environment variables, command line arguments)
//! and validating the configuration.
//!
//! Priority, lowest first: defaults, configuration file, environment,
//! command line.

mod defaults;
mod loader;
mod merger;
mod validator;

pub use self::defaults::ENV_PREFIX;
pub use self::loader::ConfigLoader;
pub use self::merger::ConfigMerger;
pub use self::validator::ConfigValidator;

use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};

use crate::common::parse_socket_addr;

/// Custom deserializer for socket addresses that also accepts host names
fn deserialize_socket_addr<'de, D>(deserializer: D) -> std::result::Result<SocketAddr, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_socket_addr(&s).map_err(serde::de::Error::custom)
}

/// Proxy configuration
///
/// Set once at startup and shared read-only (behind an `Arc`) by every
/// connection task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProxyConfig {
    /// Address accepting client connections
    #[serde(deserialize_with = "deserialize_socket_addr")]
    pub listen: SocketAddr,

    /// Backend address, one connection opened per upgraded client
    #[serde(deserialize_with = "deserialize_socket_addr")]
    pub backend: SocketAddr,

    /// Log level
    pub log_level: String,

    /// Backend read buffer size in bytes; one read is one message
    pub buffer_size: usize,

    /// Backend connect timeout in seconds
    pub connection_timeout: u64,

    /// Upgrade handshake timeout in milliseconds
    pub handshake_timeout: u64,

    /// Time a direction gets to stop after its pair is torn down, in milliseconds
    pub teardown_grace: u64,

    /// Time to wait for live pairs on shutdown, in seconds
    pub shutdown_timeout: u64,

    /// TCP keepalive idle time in seconds
    pub tcp_keepalive: u64,

    /// Allowed `Origin` header values; empty admits every origin
    pub allowed_origins: Vec<String>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            listen: defaults::listen(),
            backend: defaults::backend(),
            log_level: defaults::log_level(),
            buffer_size: defaults::buffer_size(),
            connection_timeout: defaults::connection_timeout(),
            handshake_timeout: defaults::handshake_timeout(),
            teardown_grace: defaults::teardown_grace(),
            shutdown_timeout: defaults::shutdown_timeout(),
            tcp_keepalive: defaults::tcp_keepalive(),
            allowed_origins: Vec::new(),
        }
    }
}

impl AsRef<ProxyConfig> for ProxyConfig {
    fn as_ref(&self) -> &ProxyConfig {
        self
    }
}

impl ProxyConfig {
    /// Backend connect timeout
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout)
    }

    /// Upgrade handshake timeout
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout)
    }

    /// Grace period for a direction to stop during teardown
    pub fn teardown_grace(&self) -> Duration {
        Duration::from_millis(self.teardown_grace)
    }

    /// Maximum wait for live pairs on shutdown
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout)
    }

    /// TCP keepalive idle time
    pub fn tcp_keepalive(&self) -> Duration {
        Duration::from_secs(self.tcp_keepalive)
    }
}
