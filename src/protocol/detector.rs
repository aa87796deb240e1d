//! Upgrade request detector
//!
//! This module decides, from the first few bytes of a raw connection, whether
//! the peer is starting an HTTP upgrade. A WebSocket opening handshake is
//! always a `GET` request, so four bytes are enough to classify the
//! connection. The bytes are peeked, never consumed.

use std::time::Duration;

use log::{debug, trace};
use tokio::io::AsyncRead;
use tokio::time::timeout;

use super::peekable::PeekableStream;
use crate::common::HandshakeError;

/// Request line prefix of every WebSocket opening handshake
const UPGRADE_PREFIX: &[u8] = b"GET ";

/// Protocol detection result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetectionResult {
    /// Looks like an HTTP upgrade request
    Upgrade,
    /// Something else; the reason is meant for logs
    NotUpgrade(String),
    /// The prefix did not arrive within the timeout
    NeedMoreData,
}

/// Protocol detector trait
///
/// This trait defines the interface for protocol detection.
pub trait ProtocolDetector: Send + Sync {
    /// Classify a connection from its first bytes
    ///
    /// Waits at most `wait` for the prefix. Returns
    /// `HandshakeError::Incomplete` if the peer closes before sending it.
    #[allow(async_fn_in_trait)]
    async fn detect<S>(&self, stream: &mut PeekableStream<S>, wait: Duration) -> Result<DetectionResult, HandshakeError>
    where
        S: AsyncRead + Unpin + Send;
}

/// Detector for HTTP upgrade requests
#[derive(Debug, Clone)]
pub struct UpgradeDetector {
    /// Bytes required for a decision
    prefix_len: usize,
}

impl Default for UpgradeDetector {
    fn default() -> Self {
        Self {
            prefix_len: UPGRADE_PREFIX.len(),
        }
    }
}

impl UpgradeDetector {
    /// Check whether a prefix starts an upgrade request
    pub fn check_protocol(&self, data: &[u8]) -> DetectionResult {
        if data.len() < self.prefix_len {
            trace!("Not enough data to determine protocol: got {} bytes, need {}", data.len(), self.prefix_len);
            return DetectionResult::NeedMoreData;
        }

        let prefix = &data[..self.prefix_len];
        if prefix == UPGRADE_PREFIX {
            debug!("Upgrade request detected");
            return DetectionResult::Upgrade;
        }

        let looks_like_http = prefix.iter().all(|b| b.is_ascii_uppercase() || *b == b' ');
        let reason = if looks_like_http {
            format!("HTTP request starting with {:?} cannot upgrade", String::from_utf8_lossy(prefix))
        } else {
            format!("unexpected prefix {:02X?}", prefix)
        };
        debug!("Non-upgrade connection: {}", reason);
        DetectionResult::NotUpgrade(reason)
    }
}

impl ProtocolDetector for UpgradeDetector {
    async fn detect<S>(&self, stream: &mut PeekableStream<S>, wait: Duration) -> Result<DetectionResult, HandshakeError>
    where
        S: AsyncRead + Unpin + Send,
    {
        match timeout(wait, stream.peek(self.prefix_len)).await {
            Ok(Ok(data)) if data.len() >= self.prefix_len => {
                trace!("Peeked {} bytes: {:02X?}", data.len(), data);
                Ok(self.check_protocol(data))
            }
            Ok(Ok(data)) => Err(HandshakeError::Incomplete(data.len())),
            Ok(Err(e)) => {
                debug!("Error peeking data: {}", e);
                Err(HandshakeError::Io(e))
            }
            Err(_) => {
                debug!("Timeout waiting for upgrade request");
                Ok(DetectionResult::NeedMoreData)
            }
        }
    }
}
