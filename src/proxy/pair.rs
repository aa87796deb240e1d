//! Connection pair
//!
//! One upgraded client connection bound to one backend connection. The pair
//! is the only owner of both; the forwarder consumes it and closes both
//! sides together.

use std::fmt;
use std::net::SocketAddr;
use std::time::SystemTime;

use tokio_tungstenite::WebSocketStream;

use super::registry::ConnectionInfo;

/// A framed client side bound to a raw backend side
///
/// Only built from a completed handshake and an established backend
/// connection, so both sides are open when the pair exists.
pub struct ConnectionPair<C, B> {
    id: u64,
    client: WebSocketStream<C>,
    backend: B,
    client_addr: SocketAddr,
    backend_addr: SocketAddr,
    created: SystemTime,
}

impl<C, B> ConnectionPair<C, B> {
    /// Bind a client connection to a backend connection
    pub fn new(
        id: u64,
        client: WebSocketStream<C>,
        backend: B,
        client_addr: SocketAddr,
        backend_addr: SocketAddr,
    ) -> Self {
        Self {
            id,
            client,
            backend,
            client_addr,
            backend_addr,
            created: SystemTime::now(),
        }
    }

    /// Pair id
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Client peer address
    pub fn client_addr(&self) -> SocketAddr {
        self.client_addr
    }

    /// Registry entry describing this pair
    pub fn info(&self) -> ConnectionInfo {
        ConnectionInfo {
            id: self.id,
            client: self.client_addr,
            backend: self.backend_addr,
            timestamp: self.created,
        }
    }

    pub(crate) fn into_parts(self) -> (WebSocketStream<C>, B) {
        (self.client, self.backend)
    }
}

impl<C, B> fmt::Debug for ConnectionPair<C, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPair")
            .field("id", &self.id)
            .field("client_addr", &self.client_addr)
            .field("backend_addr", &self.backend_addr)
            .field("client", &"<WebSocketStream>")
            .field("backend", &"<backend stream>")
            .finish()
    }
}
