//! transport - completion-queue transport seam for the RPC server core.
//!
//! This crate is the narrow interface between the server core and the
//! machinery that actually moves bytes: opaque event tags, a blocking
//! completion queue, per-call handles with batched server ops, status and
//! metadata vocabulary, and the message codec contract.
//!
//! It also ships an in-process loopback link (the [`Router`] and
//! [`Connector`] pair) so servers built on the core can be driven
//! end-to-end by demos and tests without a socket layer. The loopback
//! honors the same contract a real transport would:
//!
//! - every op batch submitted with a [`Tag`] produces exactly one
//!   `(tag, ok)` event on the completion queue;
//! - `ok = false` means the transport abandoned the call (peer gone or
//!   server shutting down) and no further I/O will succeed;
//! - per-call events are totally ordered.

mod call;
mod codec;
mod metadata;
mod queue;
mod router;
mod status;
mod tag;

pub use call::{AcceptedCall, CallCell, ClientCall, FinishBatch, ServerCall, WaitTimedOut};
pub use codec::{DecodeError, Message, MethodSchema};
pub use metadata::{CompressionLevel, Metadata};
pub use queue::{CompletionQueue, QueueHandle};
pub use router::{Connector, Credentials, Router, SlotId, TransportError};
pub use status::{Code, Status};
pub use tag::Tag;
