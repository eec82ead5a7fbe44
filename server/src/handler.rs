//! Method handlers: the bridge between accepted calls and service code.
//!
//! One [`MethodHandler`] exists per registered method, wrapping the
//! application closure for its kind. The typed call-data invokes
//! [`ErasedHandler::run`] on the dispatcher thread at the PROCESS
//! transition; the handler deserializes, runs service logic, and submits
//! the terminal batch with the call-data's tag.

use bytes::Bytes;

use transport::{
    AcceptedCall, FinishBatch, Message, QueueHandle, ServerCall, Status, Tag,
};

use crate::context::ServerContext;
use crate::streams::{
    ServerReader, ServerReaderWriter, ServerWriter, SplitStreamer, UnaryStreamer,
};

/// The six method kinds, each carrying its application closure.
pub(crate) enum HandlerFn<Req, Rsp> {
    Unary(Box<dyn Fn(&mut ServerContext, Req) -> Result<Rsp, Status> + Send + Sync>),
    ClientStreaming(
        Box<
            dyn Fn(&mut ServerContext, &mut ServerReader<'_, Req>) -> Result<Rsp, Status>
                + Send
                + Sync,
        >,
    ),
    ServerStreaming(
        Box<
            dyn Fn(&mut ServerContext, Req, &mut ServerWriter<'_, Rsp>) -> Result<(), Status>
                + Send
                + Sync,
        >,
    ),
    Bidi(
        Box<
            dyn Fn(&mut ServerContext, &mut ServerReaderWriter<'_, Req, Rsp>) -> Result<(), Status>
                + Send
                + Sync,
        >,
    ),
    StreamedUnary(
        Box<
            dyn Fn(&mut ServerContext, &mut UnaryStreamer<'_, Req, Rsp>) -> Result<(), Status>
                + Send
                + Sync,
        >,
    ),
    SplitStreaming(
        Box<
            dyn Fn(&mut ServerContext, Req, &mut SplitStreamer<'_, Rsp>) -> Result<(), Status>
                + Send
                + Sync,
        >,
    ),
}

/// A typed method handler.
pub(crate) struct MethodHandler<Req, Rsp> {
    kind: HandlerFn<Req, Rsp>,
}

impl<Req: Message, Rsp: Message> MethodHandler<Req, Rsp> {
    pub(crate) fn new(kind: HandlerFn<Req, Rsp>) -> Self {
        Self { kind }
    }
}

/// Object-safe face of [`MethodHandler`] as the dispatcher sees it.
pub(crate) trait ErasedHandler: Send + Sync {
    /// Serve one accepted call to completion: deserialize, invoke service
    /// logic, submit the terminal batch tagged with `tag`.
    fn run(&self, accepted: AcceptedCall, tag: Tag, queue: &QueueHandle);
}

impl<Req: Message, Rsp: Message> ErasedHandler for MethodHandler<Req, Rsp> {
    fn run(&self, accepted: AcceptedCall, tag: Tag, queue: &QueueHandle) {
        let AcceptedCall {
            path,
            metadata,
            call,
        } = accepted;
        let mut ctx = ServerContext::new(path, metadata);

        match &self.kind {
            HandlerFn::Unary(f) => {
                let outcome = read_request::<Req>(&call).and_then(|req| f(&mut ctx, req));
                assert!(
                    !ctx.initial_metadata_sent(),
                    "initial metadata was already sent for a unary call"
                );
                finish_unary(&call, &mut ctx, outcome.map(|rsp| rsp.encode()), tag, queue);
            }
            HandlerFn::ClientStreaming(f) => {
                let outcome = {
                    let mut reader = ServerReader::new(&call);
                    f(&mut ctx, &mut reader)
                };
                assert!(
                    !ctx.initial_metadata_sent(),
                    "initial metadata was already sent for a client-streaming call"
                );
                finish_unary(&call, &mut ctx, outcome.map(|rsp| rsp.encode()), tag, queue);
            }
            HandlerFn::ServerStreaming(f) => {
                let status = match read_request::<Req>(&call) {
                    Ok(req) => {
                        let mut writer = ServerWriter::new(&call, &ctx);
                        f(&mut ctx, req, &mut writer).err()
                    }
                    Err(status) => Some(status),
                }
                .unwrap_or_else(Status::ok);
                finish_streaming(&call, &mut ctx, status, tag, queue);
            }
            HandlerFn::Bidi(f) => {
                let status = {
                    let mut stream = ServerReaderWriter::new(&call, &ctx);
                    f(&mut ctx, &mut stream).err().unwrap_or_else(Status::ok)
                };
                finish_streaming(&call, &mut ctx, status, tag, queue);
            }
            HandlerFn::StreamedUnary(f) => {
                let (status, wrote) = {
                    let mut streamer = UnaryStreamer::new(&call, &ctx);
                    let status = f(&mut ctx, &mut streamer).err().unwrap_or_else(Status::ok);
                    (status, streamer.wrote())
                };
                // The service contract requires a response message: an OK
                // exit that never wrote is rewritten to an INTERNAL error.
                let status = if !ctx.initial_metadata_sent() && status.is_ok() && !wrote {
                    Status::internal("Service did not provide response message")
                } else {
                    status
                };
                finish_streaming(&call, &mut ctx, status, tag, queue);
            }
            HandlerFn::SplitStreaming(f) => {
                let status = match read_request::<Req>(&call) {
                    Ok(req) => {
                        let mut streamer = SplitStreamer::new(&call, &ctx);
                        f(&mut ctx, req, &mut streamer).err()
                    }
                    Err(status) => Some(status),
                }
                .unwrap_or_else(Status::ok);
                finish_streaming(&call, &mut ctx, status, tag, queue);
            }
        }
    }
}

/// Read and decode the single request message of a unary-style call.
///
/// A decode failure becomes the terminal status; no message body is sent.
fn read_request<Req: Message>(call: &ServerCall) -> Result<Req, Status> {
    match call.read() {
        Some(buf) => Req::decode(buf)
            .map_err(|e| Status::internal(format!("failed to deserialize request: {e}"))),
        None => Err(Status::cancelled("call abandoned before the request arrived")),
    }
}

/// Terminal batch for unary-shaped exits: initial metadata, compression,
/// the message when the status is OK, then status with trailers.
fn finish_unary(
    call: &ServerCall,
    ctx: &mut ServerContext,
    outcome: Result<Bytes, Status>,
    tag: Tag,
    queue: &QueueHandle,
) {
    let (message, status) = match outcome {
        Ok(message) => (Some(message), Status::ok()),
        Err(status) => (None, status),
    };
    submit_finish(call, ctx, message, status, tag, queue);
}

/// Terminal batch for streaming exits: initial metadata if the handler
/// never wrote, then status with trailers. No message.
fn finish_streaming(
    call: &ServerCall,
    ctx: &mut ServerContext,
    status: Status,
    tag: Tag,
    queue: &QueueHandle,
) {
    submit_finish(call, ctx, None, status, tag, queue);
}

pub(crate) fn submit_finish(
    call: &ServerCall,
    ctx: &mut ServerContext,
    message: Option<Bytes>,
    status: Status,
    tag: Tag,
    queue: &QueueHandle,
) {
    let batch = FinishBatch {
        initial_metadata: ctx.send_state().take_unsent(),
        message: if status.is_ok() { message } else { None },
        status,
        trailing_metadata: ctx.take_trailing_metadata(),
    };
    call.finish(batch, tag, queue);
}
