//! Connection handler module
//!
//! This module handles individual client connections, from the first peeked
//! bytes to the end of the connection pair.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use log::{debug, error, info, warn};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time::{timeout, Instant};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;

use super::forwarder::{Forwarder, PairEnd, PairReport};
use super::pair::ConnectionPair;
use super::registry::PairRegistry;
use super::stats::ProxyStats;
use crate::common::{tune_stream, HandshakeError, ProxyError, Result};
use crate::config::ProxyConfig;
use crate::protocol::{accept_upgrade, DetectionResult, HandshakeValidator, PeekableStream, ProtocolDetector, UpgradeDetector};

/// Everything a connection task needs, shared by all of them
pub struct ConnectionContext {
    /// Proxy configuration
    pub config: Arc<ProxyConfig>,
    /// Upgrade request detector
    pub detector: UpgradeDetector,
    /// Handshake validation hook
    pub validator: Arc<dyn HandshakeValidator>,
    /// Pair forwarder
    pub forwarder: Forwarder,
    /// Live pair registry
    pub registry: PairRegistry,
    /// Proxy counters
    pub stats: Arc<ProxyStats>,
    /// Global shutdown signal
    pub shutdown: watch::Receiver<bool>,
}

/// Handle a single client connection
///
/// # Parameters
///
/// * `client_stream` - Accepted TCP stream
/// * `client_addr` - Client address
/// * `ctx` - Shared connection context
///
/// # Returns
///
/// Returns the pair report once forwarding ends, or the error that kept the
/// connection from becoming a pair. No backend connection is opened unless
/// the upgrade succeeded. Detection and the upgrade share one
/// `handshake_timeout`.
pub async fn handle_connection(
    client_stream: TcpStream,
    client_addr: SocketAddr,
    ctx: Arc<ConnectionContext>,
) -> Result<PairReport> {
    let config = &ctx.config;
    tune_stream(&client_stream, config.tcp_keepalive());

    let started = Instant::now();
    let mut stream = PeekableStream::new(client_stream);
    match ctx.detector.detect(&mut stream, config.handshake_timeout()).await? {
        DetectionResult::Upgrade => {
            debug!("Upgrade request from {}", client_addr);
        }
        DetectionResult::NotUpgrade(reason) => {
            return Err(HandshakeError::NotUpgrade(reason).into());
        }
        DetectionResult::NeedMoreData => {
            return Err(HandshakeError::Timeout(config.handshake_timeout()).into());
        }
    }

    let remaining = config.handshake_timeout().saturating_sub(started.elapsed());
    let mut client = accept_upgrade(stream, ctx.validator.as_ref(), remaining).await?;

    let backend = match connect_backend(config).await {
        Ok(backend) => backend,
        Err(e) => {
            let frame = CloseFrame {
                code: CloseCode::Error,
                reason: "backend unavailable".into(),
            };
            if let Err(close_err) = client.close(Some(frame)).await {
                debug!("Failed to send close to {}: {}", client_addr, close_err);
            }
            return Err(e);
        }
    };
    tune_stream(&backend, config.tcp_keepalive());

    let pair = ConnectionPair::new(ctx.registry.next_id(), client, backend, client_addr, config.backend);
    let _registration = ctx.registry.register(pair.info());
    info!("Pair {} opened: {} <-> {}", pair.id(), client_addr, config.backend);

    ctx.stats.record_pair_opened();
    let report = ctx.forwarder.run(pair, ctx.shutdown.clone()).await;
    ctx.stats.record_pair_closed();

    Ok(report)
}

/// Open the backend connection for a freshly upgraded client
async fn connect_backend(config: &ProxyConfig) -> Result<TcpStream> {
    let addr = config.backend;
    match timeout(config.connect_timeout(), TcpStream::connect(addr)).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(source)) => Err(ProxyError::BackendUnavailable { addr, source }),
        Err(_) => Err(ProxyError::BackendUnavailable {
            addr,
            source: io::Error::new(io::ErrorKind::TimedOut, "Connection timed out"),
        }),
    }
}

/// Log the outcome of a connection task and count its failures
pub(crate) fn report_outcome(stats: &ProxyStats, client_addr: SocketAddr, result: &Result<PairReport>) {
    match result {
        Ok(report) => {
            let summary = format!(
                "client {} sent {} ({} skipped), received {} ({} skipped)",
                client_addr,
                report.client_to_backend.forwarded,
                report.client_to_backend.skipped,
                report.backend_to_client.forwarded,
                report.backend_to_client.skipped,
            );
            match &report.end {
                PairEnd::Failed(e) => error!("Pair {} failed: {}; {}", report.id, e, summary),
                end => info!("Pair {} closed ({:?}): {}", report.id, end, summary),
            }
        }
        Err(ProxyError::Handshake(e)) => {
            stats.record_handshake_failure();
            match e {
                HandshakeError::NotUpgrade(_) | HandshakeError::Incomplete(_) => {
                    debug!("Dropped connection from {}: {}", client_addr, e)
                }
                _ => warn!("Handshake with {} failed: {}", client_addr, e),
            }
        }
        Err(e @ ProxyError::BackendUnavailable { .. }) => {
            stats.record_backend_failure();
            warn!("Closing client {}: {}", client_addr, e);
        }
        Err(e) => warn!("Connection from {} failed: {}", client_addr, e),
    }
}
