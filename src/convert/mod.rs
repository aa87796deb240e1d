//! Message conversion module
//!
//! Clients speak JSON text, the backend speaks protobuf. A `MessageConverter`
//! translates one complete message at a time; it is shared by every
//! connection pair, so implementations must be stateless.
//!
//! The transport code only ever sees the trait. [`EnvelopeConverter`] is the
//! schema used when nothing else is injected.

mod envelope;
pub mod wire;

pub use envelope::{Envelope, EnvelopeConverter};

use crate::common::ConversionError;

/// Pluggable JSON ↔ protobuf translation
///
/// Both operations must be pure: the output depends only on the input, and
/// concurrent calls from unrelated connection pairs must not interfere.
pub trait MessageConverter: Send + Sync {
    /// Parse a JSON text payload and re-encode it in protobuf wire format
    fn encode_to_binary(&self, text: &[u8]) -> Result<Vec<u8>, ConversionError>;

    /// Parse a protobuf payload and render it as JSON text
    fn decode_to_text(&self, binary: &[u8]) -> Result<String, ConversionError>;

    /// Short name used in log lines
    fn name(&self) -> &'static str {
        "custom"
    }
}
