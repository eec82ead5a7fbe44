//! Call routing between client entry points and armed method slots.
//!
//! The router is the server half of the loopback link. It owns one slot
//! per registered method path, plus a generic catch-all slot (when a
//! generic service is registered) and an always-present unknown-method
//! slot. Arms (`request_call`) and incoming calls pair up FIFO per slot;
//! whichever side arrives first waits for the other, which is all the
//! admission control this transport provides.

use std::collections::HashMap;
use std::fmt;

use parking_lot::Mutex;

use crate::call::{self, AcceptedCall, CallCell, ClientCall};
use crate::metadata::Metadata;
use crate::queue::QueueHandle;
use crate::status::Status;
use crate::tag::Tag;
use std::sync::Arc;

/// Index of a method slot within a router.
///
/// Typed methods occupy the leading slots in registration order, followed
/// by the generic slot (if any) and the unknown-method slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotId(usize);

impl SlotId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Listening credentials collected by the builder.
///
/// The loopback link records credentials without enforcing them; a real
/// transport would terminate TLS with the configured pair.
#[derive(Debug, Clone)]
pub enum Credentials {
    Insecure,
    Tls { cert_pem: String, key_pem: String },
}

/// Errors surfaced to callers of the loopback link.
#[derive(Debug)]
pub enum TransportError {
    /// The server has shut down and refuses new calls.
    Shutdown,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Shutdown => write!(f, "server transport is shut down"),
        }
    }
}

impl std::error::Error for TransportError {}

struct ArmedEntry {
    cell: Arc<CallCell>,
    tag: Tag,
    queue: QueueHandle,
}

#[derive(Default)]
struct SlotState {
    armed: Vec<ArmedEntry>,
    pending: Vec<AcceptedCall>,
}

struct RouterInner {
    slots: Vec<SlotState>,
    paths: HashMap<String, SlotId>,
    shutdown: bool,
}

/// The server half of the loopback transport.
pub struct Router {
    inner: Mutex<RouterInner>,
    generic: Option<SlotId>,
    unknown: SlotId,
}

impl Router {
    /// Build a router for the given method paths. Slot `i` serves
    /// `methods[i]`; the catch-all slots follow.
    pub fn new(methods: &[String], generic: bool) -> Arc<Self> {
        let mut paths = HashMap::new();
        for (idx, path) in methods.iter().enumerate() {
            paths.insert(path.clone(), SlotId(idx));
        }
        let generic_slot = generic.then_some(SlotId(methods.len()));
        let unknown = SlotId(methods.len() + usize::from(generic));
        let slots = (0..=unknown.0).map(|_| SlotState::default()).collect();
        Arc::new(Self {
            inner: Mutex::new(RouterInner {
                slots,
                paths,
                shutdown: false,
            }),
            generic: generic_slot,
            unknown,
        })
    }

    /// Slot serving typed method `idx` (registration order).
    pub fn method_slot(&self, idx: usize) -> SlotId {
        SlotId(idx)
    }

    /// The generic catch-all slot, when a generic service is registered.
    pub fn generic_slot(&self) -> Option<SlotId> {
        self.generic
    }

    /// The unknown-method slot.
    pub fn unknown_slot(&self) -> SlotId {
        self.unknown
    }

    /// Arm a slot: the next call routed to `slot` fills `cell` and posts
    /// `(tag, true)`. If the router is already shut down the arm fails
    /// immediately with `(tag, false)`.
    pub fn request_call(&self, slot: SlotId, cell: Arc<CallCell>, tag: Tag, queue: &QueueHandle) {
        let mut inner = self.inner.lock();
        if inner.shutdown {
            drop(inner);
            queue.post(tag, false);
            return;
        }
        let state = &mut inner.slots[slot.0];
        if state.pending.is_empty() {
            state.armed.push(ArmedEntry {
                cell,
                tag,
                queue: queue.clone(),
            });
        } else {
            let accepted = state.pending.remove(0);
            drop(inner);
            cell.put(accepted);
            queue.post(tag, true);
        }
    }

    /// Route a new call: exact path match, else the generic catch-all,
    /// else the unknown-method slot.
    fn start_call(&self, path: &str, metadata: Metadata) -> Result<ClientCall, TransportError> {
        let (server_call, client_call) = call::pair();
        let accepted = AcceptedCall {
            path: path.to_string(),
            metadata,
            call: server_call,
        };

        let mut inner = self.inner.lock();
        if inner.shutdown {
            return Err(TransportError::Shutdown);
        }
        let slot = inner
            .paths
            .get(path)
            .copied()
            .or(self.generic)
            .unwrap_or(self.unknown);
        let state = &mut inner.slots[slot.0];
        if state.armed.is_empty() {
            state.pending.push(accepted);
            drop(inner);
        } else {
            let entry = state.armed.remove(0);
            drop(inner);
            entry.cell.put(accepted);
            entry.queue.post(entry.tag, true);
        }
        Ok(client_call)
    }

    /// Stop accepting calls, cancel every outstanding arm with
    /// `(tag, false)`, and fail still-unmatched pending calls.
    pub fn shutdown(&self) {
        let (armed, pending) = {
            let mut inner = self.inner.lock();
            inner.shutdown = true;
            let mut armed = Vec::new();
            let mut pending = Vec::new();
            for state in &mut inner.slots {
                armed.append(&mut state.armed);
                pending.append(&mut state.pending);
            }
            (armed, pending)
        };
        for entry in armed {
            entry.queue.post(entry.tag, false);
        }
        for accepted in pending {
            // Never matched a state object; fail it directly on the wire.
            fail_unmatched(accepted);
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.inner.lock().shutdown
    }
}

fn fail_unmatched(accepted: AcceptedCall) {
    use crate::call::FinishBatch;
    use crate::queue::CompletionQueue;
    // The completion event is nobody's business anymore; sink it locally.
    let sink = CompletionQueue::new();
    accepted.call.finish(
        FinishBatch {
            initial_metadata: None,
            message: None,
            status: Status::unavailable("server shutting down"),
            trailing_metadata: Metadata::new(),
        },
        Tag::new(0, 0),
        &sink.handle(),
    );
}

/// Client entry point to a running server.
#[derive(Clone)]
pub struct Connector {
    router: Arc<Router>,
}

impl Connector {
    /// Wrap a router as a client entry point.
    pub fn new(router: Arc<Router>) -> Self {
        Self { router }
    }

    /// Start a call to `path` with empty headers.
    pub fn call(&self, path: &str) -> Result<ClientCall, TransportError> {
        self.call_with_metadata(path, Metadata::new())
    }

    /// Start a call to `path` with the given headers.
    pub fn call_with_metadata(
        &self,
        path: &str,
        metadata: Metadata,
    ) -> Result<ClientCall, TransportError> {
        self.router.start_call(path, metadata)
    }
}
