//! Error handling module
//!
//! This module defines the error types and result type aliases used in the application.
//! Errors are split by blast radius: a `HandshakeError` is local to one raw
//! connection, a `ConversionError` to one message, and a `ConnectionError` to
//! one connection pair.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Failure to turn a raw connection into a WebSocket connection
#[derive(Error, Debug)]
pub enum HandshakeError {
    /// The connection prefix does not look like an upgrade request
    #[error("not an upgrade request: {0}")]
    NotUpgrade(String),

    /// The peer closed the connection before sending a full prefix
    #[error("connection closed after {0} bytes, before the upgrade request")]
    Incomplete(usize),

    /// The peer did not complete the handshake in time
    #[error("handshake timed out after {0:?}")]
    Timeout(Duration),

    /// The validation hook refused the request
    #[error("upgrade rejected ({status}): {reason}")]
    Rejected {
        /// HTTP status sent back to the client
        status: u16,
        /// Human-readable reason
        reason: String,
    },

    /// The WebSocket negotiation itself failed
    #[error("websocket negotiation failed: {0}")]
    Protocol(#[from] tungstenite::Error),

    /// IO error while reading the prefix
    #[error("IO error during handshake: {0}")]
    Io(#[from] io::Error),
}

/// Failure to translate one message between encodings
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConversionError {
    /// Text payload is not valid JSON for the schema
    #[error("invalid JSON payload: {0}")]
    InvalidJson(String),

    /// A string field carries invalid UTF-8
    #[error("invalid UTF-8 in field {0}")]
    InvalidUtf8(u32),

    /// Binary payload ended in the middle of a field
    #[error("truncated binary payload")]
    Truncated,

    /// A varint is longer than 10 bytes
    #[error("varint overflows 64 bits")]
    VarintOverflow,

    /// A known field was encoded with the wrong wire type, or the wire type is unknown
    #[error("invalid wire type {wire_type} for field {field}")]
    InvalidWireType {
        /// Field number
        field: u32,
        /// Wire type found in the tag
        wire_type: u8,
    },

    /// Field number zero or out of range
    #[error("invalid field number {0}")]
    InvalidFieldNumber(u64),

    /// The embedded payload field does not hold valid JSON
    #[error("invalid embedded payload: {0}")]
    InvalidPayload(String),
}

/// Fatal I/O failure on one side of a connection pair
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// Error on the WebSocket (client) side
    #[error("client connection error: {0}")]
    Client(#[from] tungstenite::Error),

    /// Error on the TCP (backend) side
    #[error("backend connection error: {0}")]
    Backend(#[from] io::Error),

    /// A forwarding task panicked or was cancelled
    #[error("forwarding task failed: {0}")]
    Task(String),
}

/// WebSocket Protobuf Proxy error type
#[derive(Error, Debug)]
pub enum ProxyError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Handshake error
    #[error("Handshake error: {0}")]
    Handshake(#[from] HandshakeError),

    /// Conversion error
    #[error("Conversion error: {0}")]
    Conversion(#[from] ConversionError),

    /// Connection error
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// The backend could not be reached for a freshly upgraded client
    #[error("Backend {addr} unavailable: {source}")]
    BackendUnavailable {
        /// Backend address
        addr: SocketAddr,
        /// Underlying connect error
        #[source]
        source: io::Error,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Other error
    #[error("Other error: {0}")]
    Other(String),
}

/// Result type alias
///
/// This is a `Result` type alias that uses our custom `ProxyError`.
pub type Result<T> = std::result::Result<T, ProxyError>;
