//! Proxy message types
//!
//! This module defines the messages that can be sent to a running proxy and
//! the handle used to send them. The accept loop owns all mutable state; the
//! handle only talks to it through a channel.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};

use super::registry::{ConnectionInfo, PairRegistry};
use super::stats::{ProxyStats, StatsSnapshot};
use crate::common::{ProxyError, Result};

/// Messages that can be sent to the proxy service
#[derive(Debug)]
pub enum ProxyMessage {
    /// Stop accepting, tear down live pairs and exit
    Shutdown,
}

/// Proxy control handle
///
/// Returned by `Proxy::start`. Cloning is cheap; every clone controls the
/// same proxy.
#[derive(Debug, Clone)]
pub struct ProxyHandle {
    /// Message sender
    sender: mpsc::Sender<ProxyMessage>,
    /// Bound listener address
    local_addr: SocketAddr,
    /// Live pairs
    registry: PairRegistry,
    /// Proxy counters
    stats: Arc<ProxyStats>,
    /// Flips to `true` once the accept loop has exited
    stopped: watch::Receiver<bool>,
}

impl ProxyHandle {
    pub(crate) fn new(
        sender: mpsc::Sender<ProxyMessage>,
        local_addr: SocketAddr,
        registry: PairRegistry,
        stats: Arc<ProxyStats>,
        stopped: watch::Receiver<bool>,
    ) -> Self {
        Self {
            sender,
            local_addr,
            registry,
            stats,
            stopped,
        }
    }

    /// Send a message to the proxy service
    ///
    /// # Parameters
    ///
    /// * `message` - Message to send
    ///
    /// # Returns
    ///
    /// Returns an error if the proxy has already stopped
    pub async fn send(&self, message: ProxyMessage) -> Result<()> {
        self.sender
            .send(message)
            .await
            .map_err(|_| ProxyError::Other("Failed to send message to proxy service".to_string()))
    }

    /// Shutdown the proxy service
    ///
    /// Stops accepting, tears down every live pair and returns once the
    /// proxy has fully stopped. Calling it on a stopped proxy is a no-op.
    pub async fn shutdown(&self) -> Result<()> {
        if !*self.stopped.borrow() {
            // The loop may exit between the check and the send; waiting below covers it.
            let _ = self.send(ProxyMessage::Shutdown).await;
        }
        self.wait().await;
        Ok(())
    }

    /// Wait until the proxy has stopped
    pub async fn wait(&self) {
        let mut stopped = self.stopped.clone();
        // An error means the loop is gone, which is also stopped.
        let _ = stopped.wait_for(|stopped| *stopped).await;
    }

    /// Address the proxy is listening on
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Live connection pairs ordered by id
    pub fn active_connections(&self) -> Vec<ConnectionInfo> {
        self.registry.snapshot()
    }

    /// Current counter values
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

/// Create a new proxy message channel
pub(crate) fn create_channel() -> (mpsc::Sender<ProxyMessage>, mpsc::Receiver<ProxyMessage>) {
    mpsc::channel(16)
}
