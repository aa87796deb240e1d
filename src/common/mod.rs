//! Common module
//!
//! This module contains shared errors and utility functions used throughout the application.

pub mod error;
pub mod log;
pub mod net;

// Re-export commonly used types and functions
pub use error::{ConnectionError, ConversionError, HandshakeError, ProxyError, Result};
pub use log::init_logger;
pub use net::{backoff_delay, parse_socket_addr, tune_stream};
