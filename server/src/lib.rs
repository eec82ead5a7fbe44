//! server - completion-queue RPC server core.
//!
//! Adapts a purely asynchronous, completion-queue-driven runtime into a
//! sync-looking service author experience. One dispatcher thread drains
//! the completion queue and advances per-call state machines addressed by
//! opaque tags; service handlers run synchronously on that thread
//! (sync-over-async). A generic byte-stream endpoint multicasts published
//! payloads to every subscribed call through the [`Fan`] mailbox.
//!
//! # Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use server::{Fan, Server};
//! use transport::Credentials;
//!
//! let fan = Arc::new(Fan::new());
//! let server = Server::builder()
//!     .add_listening_port("0.0.0.0:50051", Credentials::Insecure)
//!     .register_generic(fan.clone())
//!     .build_and_start()
//!     .unwrap();
//!
//! fan.publish("data: hello ");
//! let connector = server.connector();
//! # let _ = connector;
//! ```

mod builder;
mod calldata;
mod context;
mod dispatch;
mod fan;
mod generic;
mod handler;
mod html;
mod service;
mod streams;
mod unknown;

pub mod logging;
pub mod metrics;

pub use builder::{BuildError, Builder};
pub use context::ServerContext;
pub use dispatch::{BoundPort, Server};
pub use fan::Fan;
pub use service::ServiceDef;
pub use streams::{ServerReader, ServerReaderWriter, ServerWriter, SplitStreamer, UnaryStreamer};

// The seam vocabulary the handler surface speaks.
pub use transport::{Code, CompressionLevel, Message, Metadata, MethodSchema, Status};
