//! Per-call context handed to service handlers.

use std::sync::Arc;

use parking_lot::Mutex;

use transport::{CompressionLevel, Metadata, ServerCall};

/// State of the outgoing initial-metadata batch.
///
/// Shared between the context and any stream wrapper on the same call, so
/// a handler can keep adding metadata right up until the first write
/// flushes it.
pub(crate) struct SendState {
    inner: Mutex<SendStateInner>,
}

struct SendStateInner {
    initial_metadata: Metadata,
    compression: Option<CompressionLevel>,
    sent: bool,
}

impl SendState {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(SendStateInner {
                initial_metadata: Metadata::new(),
                compression: None,
                sent: false,
            }),
        })
    }

    /// Send the initial-metadata batch if it has not gone out yet.
    pub(crate) fn flush(&self, call: &ServerCall) {
        let mut inner = self.inner.lock();
        if inner.sent {
            return;
        }
        inner.sent = true;
        let metadata = std::mem::take(&mut inner.initial_metadata);
        call.send_initial_metadata(metadata, inner.compression);
    }

    /// Take the unsent batch for inclusion in a terminal op set.
    pub(crate) fn take_unsent(&self) -> Option<(Metadata, Option<CompressionLevel>)> {
        let mut inner = self.inner.lock();
        if inner.sent {
            return None;
        }
        inner.sent = true;
        Some((std::mem::take(&mut inner.initial_metadata), inner.compression))
    }

    pub(crate) fn sent(&self) -> bool {
        self.inner.lock().sent
    }
}

/// Context for one RPC, allowing a handler to inspect the client's
/// headers and to shape the response metadata and compression.
pub struct ServerContext {
    method: String,
    client_metadata: Metadata,
    trailing_metadata: Metadata,
    send_state: Arc<SendState>,
}

impl ServerContext {
    pub(crate) fn new(method: String, client_metadata: Metadata) -> Self {
        Self {
            method,
            client_metadata,
            trailing_metadata: Metadata::new(),
            send_state: SendState::new(),
        }
    }

    /// Full path of the method being served.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Headers the client sent with the call.
    pub fn client_metadata(&self) -> &Metadata {
        &self.client_metadata
    }

    /// Add a key-value pair to the initial metadata.
    ///
    /// Aborts if the initial metadata already went out; sending it twice
    /// is a programming error, not a recoverable condition.
    pub fn add_initial_metadata(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let mut inner = self.send_state.inner.lock();
        assert!(!inner.sent, "initial metadata was already sent");
        inner.initial_metadata.insert(key, value);
    }

    /// Set the compression level for the response.
    pub fn set_compression_level(&mut self, level: CompressionLevel) {
        let mut inner = self.send_state.inner.lock();
        assert!(!inner.sent, "initial metadata was already sent");
        inner.compression = Some(level);
    }

    /// Add a key-value pair to the trailing metadata.
    pub fn add_trailing_metadata(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.trailing_metadata.insert(key, value);
    }

    /// Whether the initial metadata has already been flushed by a stream
    /// write.
    pub fn initial_metadata_sent(&self) -> bool {
        self.send_state.sent()
    }

    pub(crate) fn send_state(&self) -> Arc<SendState> {
        self.send_state.clone()
    }

    pub(crate) fn take_trailing_metadata(&mut self) -> Metadata {
        std::mem::take(&mut self.trailing_metadata)
    }
}

/// Context for one generic call: the observable request path and the
/// response headers, content type included.
///
/// The generic path sends its headers eagerly at accept time, so this
/// carries plain metadata instead of a [`SendState`].
pub(crate) struct GenericContext {
    method: String,
    initial_metadata: Metadata,
}

impl GenericContext {
    pub(crate) fn new(method: String) -> Self {
        Self {
            method,
            initial_metadata: Metadata::new(),
        }
    }

    /// The request path the client asked for.
    pub(crate) fn method(&self) -> &str {
        &self.method
    }

    /// Set the response content type.
    pub(crate) fn set_content_type(&mut self, value: &str) {
        self.initial_metadata.insert("content-type", value);
    }

    pub(crate) fn take_initial_metadata(&mut self) -> Metadata {
        std::mem::take(&mut self.initial_metadata)
    }
}
