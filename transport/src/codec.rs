//! Message codec contract.
//!
//! The server core is codec-agnostic: it moves [`bytes::Bytes`] and leans
//! on this trait pair to cross between wire payloads and typed messages.
//! Schema crates implement [`Message`] for their request/reply types and
//! [`MethodSchema`] for each method, standing in for generated stubs.

use std::fmt;

use bytes::Bytes;

/// A wire-encodable message.
pub trait Message: Sized + Send + 'static {
    /// Serialize into a wire payload.
    fn encode(&self) -> Bytes;

    /// Deserialize from a wire payload.
    fn decode(buf: Bytes) -> Result<Self, DecodeError>;
}

/// A single RPC method as seen by the typed registration surface:
/// request/response message types plus the full method path.
pub trait MethodSchema {
    type Request: Message;
    type Response: Message;

    /// Full method path, e.g. `/package.Service/Method`.
    fn path() -> &'static str;
}

/// Failure to decode a wire payload into a typed message.
///
/// The server core converts these into terminal `INTERNAL` statuses; they
/// never abort the dispatcher.
#[derive(Debug)]
pub struct DecodeError {
    message: String,
}

impl DecodeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for DecodeError {}
