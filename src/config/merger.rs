//! Configuration merging functionality
//!
//! This module provides functionality for merging configurations from different sources.

use crate::config::ProxyConfig;

/// Trait for merging configurations
pub trait ConfigMerger {
    /// Merge another configuration into this one
    ///
    /// Values from `other` override values in `self` if they are not the default values.
    /// This is used to implement the configuration priority system.
    fn merge(&self, other: impl AsRef<Self>) -> Self
    where
        Self: Sized;
}

impl ConfigMerger for ProxyConfig {
    fn merge(&self, other: impl AsRef<Self>) -> Self {
        let other = other.as_ref();
        let default = Self::default();

        fn merge_field<T: Clone + PartialEq>(self_val: &T, other_val: &T, default_val: &T) -> T {
            if other_val != default_val {
                other_val.clone()
            } else {
                self_val.clone()
            }
        }

        Self {
            listen: merge_field(&self.listen, &other.listen, &default.listen),
            backend: merge_field(&self.backend, &other.backend, &default.backend),
            log_level: merge_field(&self.log_level, &other.log_level, &default.log_level),
            buffer_size: merge_field(&self.buffer_size, &other.buffer_size, &default.buffer_size),
            connection_timeout: merge_field(
                &self.connection_timeout,
                &other.connection_timeout,
                &default.connection_timeout,
            ),
            handshake_timeout: merge_field(
                &self.handshake_timeout,
                &other.handshake_timeout,
                &default.handshake_timeout,
            ),
            teardown_grace: merge_field(&self.teardown_grace, &other.teardown_grace, &default.teardown_grace),
            shutdown_timeout: merge_field(&self.shutdown_timeout, &other.shutdown_timeout, &default.shutdown_timeout),
            tcp_keepalive: merge_field(&self.tcp_keepalive, &other.tcp_keepalive, &default.tcp_keepalive),
            allowed_origins: merge_field(&self.allowed_origins, &other.allowed_origins, &default.allowed_origins),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_priority() {
        let file = ProxyConfig {
            backend: "127.0.0.1:7000".parse().unwrap(),
            buffer_size: 4096,
            ..ProxyConfig::default()
        };
        let cli = ProxyConfig {
            buffer_size: 1024,
            log_level: "debug".to_string(),
            ..ProxyConfig::default()
        };

        let merged = ProxyConfig::default().merge(&file).merge(&cli);
        assert_eq!(merged.backend.port(), 7000);
        assert_eq!(merged.buffer_size, 1024);
        assert_eq!(merged.log_level, "debug");
        assert_eq!(merged.listen, ProxyConfig::default().listen);
    }

    #[test]
    fn test_default_does_not_override() {
        let file = ProxyConfig {
            allowed_origins: vec!["https://a.example".to_string()],
            ..ProxyConfig::default()
        };
        let merged = file.merge(ProxyConfig::default());
        assert_eq!(merged, file);
    }
}
