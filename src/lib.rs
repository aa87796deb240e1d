//! WebSocket Protobuf Proxy: JSON over WebSocket in front of a protobuf TCP backend
//!
//! Browser-style clients speak JSON text over WebSocket; the backend speaks
//! protobuf over raw TCP. The proxy accepts plain TCP connections, upgrades
//! the ones that carry a WebSocket handshake, opens one backend connection
//! per upgraded client and translates every message in both directions.
//!
//! # Main Features
//!
//! - Upgrade detection by peeking, so non-WebSocket traffic is dropped early
//! - Pluggable message conversion through [`convert::MessageConverter`]
//! - Independent, full-duplex connection pairs with coordinated teardown
//! - Malformed messages are skipped without closing the connection
//!
//! # Example
//!
//! ```no_run
//! use ws_protobuf_proxy::{Proxy, Result, parse_socket_addr};
//! use ws_protobuf_proxy::config::ProxyConfig;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = ProxyConfig {
//!         listen: parse_socket_addr("0.0.0.0:8080")?,
//!         backend: parse_socket_addr("127.0.0.1:9000")?,
//!         ..ProxyConfig::default()
//!     };
//!
//!     // Run until Ctrl+C
//!     Proxy::new(config).run().await
//! }
//! ```

// Public modules
pub mod common;
pub mod config;
pub mod convert;
pub mod protocol;
pub mod proxy;

// Re-export commonly used structures and functions for convenience
pub use common::{parse_socket_addr, ProxyError, Result};
pub use convert::{EnvelopeConverter, MessageConverter};
pub use proxy::{Proxy, ProxyHandle};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
