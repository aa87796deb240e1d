//! Protocol detection and upgrade module
//!
//! Every accepted connection arrives as plain TCP. This module peeks at its
//! first bytes to decide whether it is a WebSocket upgrade request and, if
//! so, completes the opening handshake on the same stream.

mod detector;
mod handshake;
mod peekable;

pub use detector::{DetectionResult, ProtocolDetector, UpgradeDetector};
pub use handshake::{accept_upgrade, AcceptAll, ClientStream, HandshakeValidator, OriginAllowList, Rejection};
pub use peekable::PeekableStream;

pub use tokio_tungstenite::tungstenite::handshake::server::Request as UpgradeRequest;
