//! Message forwarding module
//!
//! This module runs the two directions of a connection pair:
//!
//! * client → backend: one WebSocket data message is converted to protobuf
//!   and written in full to the backend;
//! * backend → client: one read of up to `buffer_size` bytes is one message,
//!   converted to JSON and sent as a WebSocket text message.
//!
//! Each direction runs on its own task so a stall on one side never blocks
//! the other. A message that fails to convert is logged and skipped; an I/O
//! error or a close from either peer tears the whole pair down. On teardown
//! each direction closes the write half it owns, exactly once.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use log::{debug, trace, warn};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;
use tokio::task::{AbortHandle, JoinError, JoinHandle};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use super::pair::ConnectionPair;
use super::stats::{Direction, ProxyStats};
use crate::common::ConnectionError;
use crate::convert::MessageConverter;

/// Traffic counters for one direction of a pair
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirectionReport {
    /// Messages converted and delivered
    pub forwarded: u64,
    /// Messages dropped because they failed to convert
    pub skipped: u64,
    /// Payload bytes delivered after conversion
    pub bytes: u64,
}

/// Why a direction stopped
#[derive(Debug)]
enum DirectionEnd {
    /// The peer this direction reads from closed cleanly
    PeerClosed,
    /// The pair was torn down from elsewhere
    Stopped,
    /// Fatal I/O error
    Failed(ConnectionError),
}

/// Live counters of one direction
///
/// Shared with the task so the counts survive an abort.
#[derive(Debug, Default)]
struct DirectionCounters {
    forwarded: AtomicU64,
    skipped: AtomicU64,
    bytes: AtomicU64,
}

impl DirectionCounters {
    fn record_forwarded(&self, bytes: usize) {
        self.forwarded.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    fn record_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    fn report(&self) -> DirectionReport {
        DirectionReport {
            forwarded: self.forwarded.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
        }
    }
}

/// Aborts the direction tasks if `run` is dropped before they end
struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Why a pair was torn down
#[derive(Debug)]
pub enum PairEnd {
    /// The client closed the WebSocket
    ClientClosed,
    /// The backend closed the TCP connection
    BackendClosed,
    /// The proxy is shutting down
    Shutdown,
    /// An I/O error on either side
    Failed(ConnectionError),
}

/// Summary of a finished connection pair
#[derive(Debug)]
pub struct PairReport {
    /// Pair id
    pub id: u64,
    /// Client to backend traffic
    pub client_to_backend: DirectionReport,
    /// Backend to client traffic
    pub backend_to_client: DirectionReport,
    /// First cause of the teardown
    pub end: PairEnd,
}

/// Drives connection pairs
///
/// Cheap to clone; one instance serves every pair of a proxy.
#[derive(Clone)]
pub struct Forwarder {
    converter: Arc<dyn MessageConverter>,
    stats: Arc<ProxyStats>,
    buffer_size: usize,
    teardown_grace: Duration,
}

impl Forwarder {
    /// Create a forwarder
    ///
    /// # Parameters
    ///
    /// * `converter` - Shared payload converter
    /// * `stats` - Counters to update
    /// * `buffer_size` - Backend read size, i.e. the largest backend message
    /// * `teardown_grace` - Time a direction gets to stop before it is aborted
    pub fn new(
        converter: Arc<dyn MessageConverter>,
        stats: Arc<ProxyStats>,
        buffer_size: usize,
        teardown_grace: Duration,
    ) -> Self {
        Self {
            converter,
            stats,
            buffer_size: buffer_size.max(1),
            teardown_grace,
        }
    }

    /// Forward messages until the pair ends
    ///
    /// Returns once both sockets are closed. `shutdown` flipping to `true`
    /// tears the pair down early. Dropping the returned future aborts both
    /// directions, which closes both sockets.
    pub async fn run<C, B>(&self, pair: ConnectionPair<C, B>, mut shutdown: watch::Receiver<bool>) -> PairReport
    where
        C: AsyncRead + AsyncWrite + Unpin + Send + 'static,
        B: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let id = pair.id();
        let (client, backend) = pair.into_parts();
        let (client_tx, client_rx) = client.split();
        let (backend_rx, backend_tx) = tokio::io::split(backend);
        let (stop_tx, stop_rx) = watch::channel(false);

        debug!("Pair {}: forwarding with converter {}", id, self.converter.name());

        let up_counters = Arc::new(DirectionCounters::default());
        let down_counters = Arc::new(DirectionCounters::default());

        let mut upstream = tokio::spawn(client_to_backend(
            id,
            client_rx,
            backend_tx,
            Arc::clone(&self.converter),
            Arc::clone(&self.stats),
            Arc::clone(&up_counters),
            stop_rx.clone(),
        ));
        let mut downstream = tokio::spawn(backend_to_client(
            id,
            backend_rx,
            client_tx,
            Arc::clone(&self.converter),
            Arc::clone(&self.stats),
            Arc::clone(&down_counters),
            stop_rx,
            self.buffer_size,
        ));
        let _guards = [AbortOnDrop(upstream.abort_handle()), AbortOnDrop(downstream.abort_handle())];

        let first = tokio::select! {
            res = &mut upstream => Some((Direction::ClientToBackend, res)),
            res = &mut downstream => Some((Direction::BackendToClient, res)),
            _ = wait_for_shutdown(&mut shutdown) => None,
        };

        // Closing is the cancellation signal for whichever side is still running.
        let _ = stop_tx.send(true);

        let end = match first {
            Some((direction, res)) => {
                let rest = match direction {
                    Direction::ClientToBackend => downstream,
                    Direction::BackendToClient => upstream,
                };
                self.finish(rest).await;
                pair_end(direction, outcome(res))
            }
            None => {
                debug!("Pair {}: shutting down", id);
                tokio::join!(self.finish(upstream), self.finish(downstream));
                PairEnd::Shutdown
            }
        };

        PairReport {
            id,
            client_to_backend: up_counters.report(),
            backend_to_client: down_counters.report(),
            end,
        }
    }

    /// Wait for a direction that has been told to stop
    async fn finish(&self, mut handle: JoinHandle<DirectionEnd>) {
        let res = match timeout(self.teardown_grace, &mut handle).await {
            Ok(res) => res,
            Err(_) => {
                warn!("Forwarding task did not stop within {:?}, aborting it", self.teardown_grace);
                handle.abort();
                handle.await
            }
        };

        if let DirectionEnd::Failed(e) = outcome(res) {
            debug!("Second direction ended with: {}", e);
        }
    }
}

fn outcome(res: Result<DirectionEnd, JoinError>) -> DirectionEnd {
    res.unwrap_or_else(|e| DirectionEnd::Failed(ConnectionError::Task(e.to_string())))
}

fn pair_end(direction: Direction, end: DirectionEnd) -> PairEnd {
    match (direction, end) {
        (_, DirectionEnd::Failed(e)) => PairEnd::Failed(e),
        (_, DirectionEnd::Stopped) => PairEnd::Shutdown,
        (Direction::ClientToBackend, DirectionEnd::PeerClosed) => PairEnd::ClientClosed,
        (Direction::BackendToClient, DirectionEnd::PeerClosed) => PairEnd::BackendClosed,
    }
}

async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|stopping| *stopping).await.is_err() {
        // Sender gone: nobody can ask for a shutdown any more.
        std::future::pending::<()>().await;
    }
}

async fn client_to_backend<C, W>(
    id: u64,
    mut client_rx: SplitStream<WebSocketStream<C>>,
    mut backend_tx: W,
    converter: Arc<dyn MessageConverter>,
    stats: Arc<ProxyStats>,
    counters: Arc<DirectionCounters>,
    mut stop: watch::Receiver<bool>,
) -> DirectionEnd
where
    C: AsyncRead + AsyncWrite + Unpin,
    W: AsyncWrite + Unpin,
{
    let direction = Direction::ClientToBackend;

    let end = loop {
        let received = tokio::select! {
            biased;
            _ = stop.changed() => break DirectionEnd::Stopped,
            received = client_rx.next() => received,
        };

        let converted = match received {
            None => break DirectionEnd::PeerClosed,
            Some(Err(e)) => break DirectionEnd::Failed(ConnectionError::Client(e)),
            Some(Ok(Message::Text(text))) => converter.encode_to_binary(text.as_bytes()),
            Some(Ok(Message::Binary(data))) => converter.encode_to_binary(&data),
            Some(Ok(Message::Close(frame))) => {
                debug!("Pair {}: client sent close {:?}", id, frame);
                break DirectionEnd::PeerClosed;
            }
            // Pings are answered by tungstenite itself.
            Some(Ok(_)) => continue,
        };

        let binary = match converted {
            Ok(binary) => binary,
            Err(e) => {
                warn!("Pair {}: dropping client message: {}", id, e);
                counters.record_skipped();
                stats.record_conversion_error(direction);
                continue;
            }
        };

        if let Err(e) = write_message(&mut backend_tx, &binary).await {
            break DirectionEnd::Failed(ConnectionError::Backend(e));
        }

        trace!("Pair {}: {} bytes {}", id, binary.len(), direction);
        counters.record_forwarded(binary.len());
        stats.record_forwarded(direction);
    };

    if let Err(e) = backend_tx.shutdown().await {
        trace!("Pair {}: backend shutdown: {}", id, e);
    }

    end
}

async fn backend_to_client<C, R>(
    id: u64,
    mut backend_rx: R,
    mut client_tx: SplitSink<WebSocketStream<C>, Message>,
    converter: Arc<dyn MessageConverter>,
    stats: Arc<ProxyStats>,
    counters: Arc<DirectionCounters>,
    mut stop: watch::Receiver<bool>,
    buffer_size: usize,
) -> DirectionEnd
where
    C: AsyncRead + AsyncWrite + Unpin,
    R: AsyncRead + Unpin,
{
    let direction = Direction::BackendToClient;
    let mut buffer = vec![0u8; buffer_size];

    let end = loop {
        let read = tokio::select! {
            biased;
            _ = stop.changed() => break DirectionEnd::Stopped,
            read = backend_rx.read(&mut buffer) => read,
        };

        let n = match read {
            Ok(0) => break DirectionEnd::PeerClosed,
            Ok(n) => n,
            Err(e) => break DirectionEnd::Failed(ConnectionError::Backend(e)),
        };

        // One read is one message. The backend must write each message at
        // once and wait for the reply; back to back writes can merge.
        let text = match converter.decode_to_text(&buffer[..n]) {
            Ok(text) => text,
            Err(e) => {
                warn!("Pair {}: dropping backend message of {} bytes: {}", id, n, e);
                counters.record_skipped();
                stats.record_conversion_error(direction);
                continue;
            }
        };

        let len = text.len();
        if let Err(e) = client_tx.send(Message::text(text)).await {
            break DirectionEnd::Failed(ConnectionError::Client(e));
        }

        trace!("Pair {}: {} bytes {}", id, len, direction);
        counters.record_forwarded(len);
        stats.record_forwarded(direction);
    };

    if let Err(e) = client_tx.close().await {
        trace!("Pair {}: client close: {}", id, e);
    }

    end
}

/// Write one converted message in full
async fn write_message<W: AsyncWrite + Unpin>(writer: &mut W, payload: &[u8]) -> std::io::Result<()> {
    writer.write_all(payload).await?;
    writer.flush().await
}
