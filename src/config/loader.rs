//! Configuration loading functionality
//!
//! This module provides functionality for loading configuration from files
//! and environment variables.

use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use log::debug;

use crate::common::{parse_socket_addr, ProxyError, Result};
use crate::config::defaults::ENV_PREFIX;
use crate::config::ProxyConfig;

/// Trait for loading configuration from different sources
pub trait ConfigLoader {
    /// Load configuration from a JSON file
    fn from_file<P: AsRef<Path>>(path: P) -> Result<Self>
    where
        Self: Sized;

    /// Load configuration from `WS_PROTO_PROXY_*` environment variables
    ///
    /// Unset variables keep their default values.
    fn from_env() -> Result<Self>
    where
        Self: Sized;
}

impl ConfigLoader for ProxyConfig {
    fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let path_display = path.display();

        let content = fs::read_to_string(path)
            .map_err(|e| ProxyError::Config(format!("Failed to read config file {}: {}", path_display, e)))?;

        serde_json::from_str(&content)
            .map_err(|e| ProxyError::Config(format!("Failed to parse JSON config file {}: {}", path_display, e)))
    }

    fn from_env() -> Result<Self> {
        let get_env = |name: &str| -> Option<String> { env::var(format!("{}{}", ENV_PREFIX, name)).ok() };

        fn parse_number<T: FromStr>(name: &str, value: &str) -> Result<T> {
            value
                .trim()
                .parse()
                .map_err(|_| ProxyError::Config(format!("Invalid value for {}{}: {}", ENV_PREFIX, name, value)))
        }

        let mut config = Self::default();

        if let Some(value) = get_env("LISTEN") {
            config.listen = parse_socket_addr(&value)?;
        }
        if let Some(value) = get_env("BACKEND") {
            config.backend = parse_socket_addr(&value)?;
        }
        if let Some(value) = get_env("LOG_LEVEL") {
            config.log_level = value;
        }
        if let Some(value) = get_env("BUFFER_SIZE") {
            config.buffer_size = parse_number("BUFFER_SIZE", &value)?;
        }
        if let Some(value) = get_env("CONNECTION_TIMEOUT") {
            config.connection_timeout = parse_number("CONNECTION_TIMEOUT", &value)?;
        }
        if let Some(value) = get_env("HANDSHAKE_TIMEOUT") {
            config.handshake_timeout = parse_number("HANDSHAKE_TIMEOUT", &value)?;
        }
        if let Some(value) = get_env("TEARDOWN_GRACE") {
            config.teardown_grace = parse_number("TEARDOWN_GRACE", &value)?;
        }
        if let Some(value) = get_env("SHUTDOWN_TIMEOUT") {
            config.shutdown_timeout = parse_number("SHUTDOWN_TIMEOUT", &value)?;
        }
        if let Some(value) = get_env("TCP_KEEPALIVE") {
            config.tcp_keepalive = parse_number("TCP_KEEPALIVE", &value)?;
        }
        if let Some(value) = get_env("ALLOWED_ORIGINS") {
            config.allowed_origins = value
                .split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty())
                .map(String::from)
                .collect();
        }

        debug!("Configuration from environment: {:?}", config);
        Ok(config)
    }
}
