//! Proxy server implementation
//!
//! This module implements the listener and dispatcher. The accept loop owns
//! the listener and the set of connection tasks; everything else reaches it
//! through a `ProxyHandle`.

use std::sync::Arc;

use log::{debug, error, info, warn};
use tokio::net::TcpListener;
use tokio::select;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio::time::{sleep, timeout};

use super::forwarder::Forwarder;
use super::handler::{handle_connection, report_outcome, ConnectionContext};
use super::message::{create_channel, ProxyHandle, ProxyMessage};
use super::registry::PairRegistry;
use super::stats::ProxyStats;
use crate::common::{backoff_delay, ProxyError, Result};
use crate::config::ProxyConfig;
use crate::convert::{EnvelopeConverter, MessageConverter};
use crate::protocol::{HandshakeValidator, OriginAllowList, UpgradeDetector};

/// Accept error backoff base, in milliseconds
const ACCEPT_BACKOFF_BASE_MS: u64 = 5;
/// Accept error backoff cap, in milliseconds
const ACCEPT_BACKOFF_MAX_MS: u64 = 1000;

/// WebSocket to protobuf proxy server
///
/// # Example
///
/// ```no_run
/// use ws_protobuf_proxy::{Proxy, Result};
/// use ws_protobuf_proxy::config::ProxyConfig;
///
/// #[tokio::main]
/// async fn main() -> Result<()> {
///     let handle = Proxy::new(ProxyConfig::default()).start().await?;
///     println!("listening on {}", handle.local_addr());
///     handle.shutdown().await
/// }
/// ```
pub struct Proxy {
    /// Proxy configuration (wrapped in Arc for efficient sharing)
    config: Arc<ProxyConfig>,
    /// Converter shared by every pair
    converter: Arc<dyn MessageConverter>,
    /// Upgrade request validation hook
    validator: Arc<dyn HandshakeValidator>,
}

impl Proxy {
    /// Create a new proxy
    ///
    /// Uses [`EnvelopeConverter`] and validates `Origin` against
    /// `config.allowed_origins`.
    pub fn new(config: ProxyConfig) -> Self {
        let validator = OriginAllowList::new(config.allowed_origins.iter().cloned());
        Self {
            config: Arc::new(config),
            converter: Arc::new(EnvelopeConverter),
            validator: Arc::new(validator),
        }
    }

    /// Replace the message converter
    pub fn with_converter(mut self, converter: impl MessageConverter + 'static) -> Self {
        self.converter = Arc::new(converter);
        self
    }

    /// Replace the handshake validator
    pub fn with_validator(mut self, validator: impl HandshakeValidator + 'static) -> Self {
        self.validator = Arc::new(validator);
        self
    }

    /// Get the proxy configuration
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Bind the listener and start accepting in the background
    ///
    /// # Returns
    ///
    /// Returns a handle once the listener is bound, so the returned
    /// `local_addr` is immediately connectable.
    pub async fn start(self) -> Result<ProxyHandle> {
        let listener = TcpListener::bind(self.config.listen).await.map_err(ProxyError::Io)?;
        let local_addr = listener.local_addr()?;

        info!("Proxy listening on {}", local_addr);
        info!("Forwarding to {} using {} conversion", self.config.backend, self.converter.name());

        let stats = Arc::new(ProxyStats::default());
        let registry = PairRegistry::new();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (stopped_tx, stopped_rx) = watch::channel(false);
        let (sender, receiver) = create_channel();

        let forwarder = Forwarder::new(
            self.converter,
            Arc::clone(&stats),
            self.config.buffer_size,
            self.config.teardown_grace(),
        );
        let ctx = Arc::new(ConnectionContext {
            config: self.config,
            detector: UpgradeDetector::default(),
            validator: self.validator,
            forwarder,
            registry: registry.clone(),
            stats: Arc::clone(&stats),
            shutdown: shutdown_rx,
        });

        tokio::spawn(async move {
            serve(listener, ctx, receiver, shutdown_tx).await;
            let _ = stopped_tx.send(true);
        });

        Ok(ProxyHandle::new(sender, local_addr, registry, stats, stopped_rx))
    }

    /// Run the proxy until Ctrl+C
    ///
    /// # Returns
    ///
    /// Returns once every pair has been torn down.
    pub async fn run(self) -> Result<()> {
        let handle = self.start().await?;

        select! {
            signal = tokio::signal::ctrl_c() => match signal {
                Ok(()) => info!("Received Ctrl+C, shutting down"),
                Err(e) => {
                    error!("Failed to listen for Ctrl+C: {}", e);
                    handle.wait().await;
                }
            },
            _ = handle.wait() => {}
        }

        handle.shutdown().await
    }
}

/// Accept loop
async fn serve(
    listener: TcpListener,
    ctx: Arc<ConnectionContext>,
    mut rx: mpsc::Receiver<ProxyMessage>,
    shutdown: watch::Sender<bool>,
) {
    let mut tasks = JoinSet::new();
    let mut accept_failures = 0u32;

    loop {
        select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, client_addr)) => {
                    accept_failures = 0;
                    ctx.stats.record_accepted();
                    debug!("Accepted connection from {}", client_addr);

                    let ctx = Arc::clone(&ctx);
                    tasks.spawn(async move {
                        let result = handle_connection(stream, client_addr, Arc::clone(&ctx)).await;
                        report_outcome(&ctx.stats, client_addr, &result);
                    });
                }
                Err(e) => {
                    // Typically fd exhaustion; back off instead of spinning.
                    accept_failures = accept_failures.saturating_add(1);
                    let delay = backoff_delay(accept_failures, ACCEPT_BACKOFF_BASE_MS, ACCEPT_BACKOFF_MAX_MS);
                    error!("Error accepting connection: {}; retrying in {:?}", e, delay);
                    sleep(delay).await;
                }
            },

            Some(message) = rx.recv() => match message {
                ProxyMessage::Shutdown => {
                    info!("Received shutdown message");
                    break;
                }
            },

            Some(result) = tasks.join_next() => {
                if let Err(e) = result {
                    error!("Connection task error: {}", e);
                }
            }
        }
    }

    drop(listener);
    let _ = shutdown.send(true);

    let live = tasks.len();
    if live > 0 {
        info!("Waiting for {} connections to close...", live);
    }

    let drained = timeout(ctx.config.shutdown_timeout(), async {
        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                error!("Connection task error during shutdown: {}", e);
            }
        }
    })
    .await;

    if drained.is_err() {
        warn!("Shutdown timeout reached, aborting {} connections", tasks.len());
        tasks.abort_all();
        while tasks.join_next().await.is_some() {}
    }

    info!("Proxy shutdown complete");
}
