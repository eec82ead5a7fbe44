//! client - blocking client library for the loopback RPC transport.
//!
//! A [`Channel`] wraps a server [`Connector`] and offers unary calls
//! (raw-bytes or typed through a [`MethodSchema`]) plus byte-stream
//! subscriptions against the generic endpoint. All accessors block with
//! the channel's timeout; the async plumbing underneath is the server's
//! business, not the caller's.

mod error;

use std::time::Duration;

use bytes::Bytes;

use transport::{ClientCall, Connector, Message, Metadata, MethodSchema, Status};

pub use error::ClientError;
pub use transport::Code;

/// Default wait applied to blocking accessors.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Everything a finished unary call produced.
#[derive(Debug)]
pub struct UnaryResponse {
    pub status: Status,
    pub message: Option<Bytes>,
    pub initial_metadata: Metadata,
    pub trailing_metadata: Metadata,
}

/// A connection to one server.
#[derive(Clone)]
pub struct Channel {
    connector: Connector,
    timeout: Duration,
}

impl Channel {
    pub fn new(connector: Connector) -> Self {
        Self {
            connector,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Override the blocking-accessor timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// One request in, one response out, raw bytes on the wire.
    pub fn unary(&self, path: &str, request: Bytes) -> Result<UnaryResponse, ClientError> {
        let call = self.connector.call(path)?;
        call.send(request);
        call.close_send();

        let (status, trailing_metadata) = call.wait_status(self.timeout)?;
        let initial_metadata = call.initial_metadata(self.timeout)?;
        // The call has finished, so this cannot block: it pops a pending
        // frame or observes the terminal status.
        let message = call.next_message(self.timeout)?;
        Ok(UnaryResponse {
            status,
            message,
            initial_metadata,
            trailing_metadata,
        })
    }

    /// Typed unary call through a method schema.
    pub fn call<M: MethodSchema>(&self, request: &M::Request) -> Result<M::Response, ClientError> {
        let response = self.unary(M::path(), request.encode())?;
        if !response.status.is_ok() {
            return Err(ClientError::Rpc(response.status));
        }
        let message = response.message.ok_or(ClientError::MissingResponse)?;
        Ok(M::Response::decode(message)?)
    }

    /// Open a streaming subscription against `path` (typically
    /// `/stream` on the generic endpoint).
    pub fn subscribe(&self, path: &str) -> Result<Subscription, ClientError> {
        let call = self.connector.call(path)?;
        call.close_send();
        Ok(Subscription {
            call,
            timeout: self.timeout,
        })
    }
}

/// An open byte-stream subscription.
///
/// Dropping the subscription cancels the call server-side.
pub struct Subscription {
    call: ClientCall,
    timeout: Duration,
}

impl Subscription {
    /// The server's initial metadata (content type and friends).
    pub fn initial_metadata(&self) -> Result<Metadata, ClientError> {
        Ok(self.call.initial_metadata(self.timeout)?)
    }

    /// Next frame, `Ok(None)` once the stream finished cleanly.
    pub fn next_frame(&self) -> Result<Option<Bytes>, ClientError> {
        Ok(self.call.next_message(self.timeout)?)
    }

    /// Terminal status; blocks until the stream ends.
    pub fn wait_status(&self) -> Result<Status, ClientError> {
        Ok(self.call.wait_status(self.timeout)?.0)
    }

    /// Abandon the stream without waiting for the server.
    pub fn cancel(self) {
        self.call.cancel();
    }
}
