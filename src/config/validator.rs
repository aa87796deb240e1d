//! Configuration validator
//!
//! This module provides functionality for validating configuration.

use log::warn;

use crate::common::{ProxyError, Result};
use crate::config::ProxyConfig;

const LOG_LEVELS: [&str; 6] = ["off", "error", "warn", "info", "debug", "trace"];

/// Configuration validator trait
pub trait ConfigValidator {
    /// Reject configurations the proxy cannot run with
    fn validate(&self) -> Result<()>;

    /// Collect non-fatal problems worth logging at startup
    fn check_warnings(&self) -> Vec<String>;
}

impl ConfigValidator for ProxyConfig {
    fn validate(&self) -> Result<()> {
        if self.listen == self.backend {
            return Err(ProxyError::Config(
                "Listen and backend addresses must be different".to_string(),
            ));
        }

        let non_zero = [
            ("buffer_size", self.buffer_size as u64),
            ("connection_timeout", self.connection_timeout),
            ("handshake_timeout", self.handshake_timeout),
            ("teardown_grace", self.teardown_grace),
        ];
        for (name, value) in non_zero {
            if value == 0 {
                return Err(ProxyError::Config(format!("{} must be greater than 0", name)));
            }
        }

        for warning in self.check_warnings() {
            warn!("{}", warning);
        }

        Ok(())
    }

    fn check_warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        // env_logger directives like "ws_protobuf_proxy=debug" are fine too
        let level = self.log_level.to_lowercase();
        if !level.contains('=') && !LOG_LEVELS.contains(&level.as_str()) {
            warnings.push(format!("Unknown log level '{}', env_logger will fall back to error", self.log_level));
        }

        if self.buffer_size < 512 {
            warnings.push(format!(
                "buffer_size {} is small; backend messages larger than that are split, \
                 and messages the backend writes back to back may still arrive merged in one read",
                self.buffer_size
            ));
        }

        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(ProxyConfig::default().validate().is_ok());
        assert!(ProxyConfig::default().check_warnings().is_empty());
    }

    #[test]
    fn test_same_listen_and_backend() {
        let config = ProxyConfig {
            backend: ProxyConfig::default().listen,
            ..ProxyConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_values() {
        let config = ProxyConfig { buffer_size: 0, ..ProxyConfig::default() };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("buffer_size"));

        let config = ProxyConfig { handshake_timeout: 0, ..ProxyConfig::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_warnings() {
        let config = ProxyConfig {
            log_level: "loud".to_string(),
            buffer_size: 64,
            ..ProxyConfig::default()
        };
        let warnings = config.check_warnings();
        assert_eq!(warnings.len(), 2);
        assert!(warnings[1].contains("split"));
        assert!(warnings[1].contains("merged"));

        let config = ProxyConfig { log_level: "ws_protobuf_proxy=trace".to_string(), ..ProxyConfig::default() };
        assert!(config.check_warnings().is_empty());
    }
}
