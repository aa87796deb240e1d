//! Proxy service module
//!
//! This module implements the core of the proxy: accepting connections,
//! binding each upgraded client to its own backend connection, and
//! forwarding converted messages both ways.
//!
//! Connection pairs share nothing but the converter and the counters; a
//! failure in one pair never reaches another.

pub mod server;
mod forwarder;
mod handler;
mod message;
mod pair;
mod registry;
mod stats;

pub use server::Proxy;

pub use forwarder::{DirectionReport, Forwarder, PairEnd, PairReport};
pub use handler::{handle_connection, ConnectionContext};
pub use message::{ProxyHandle, ProxyMessage};
pub use pair::ConnectionPair;
pub use registry::{ConnectionInfo, PairRegistry, Registration};
pub use stats::{Direction, ProxyStats, StatsSnapshot};
