//! Blocking stream wrappers handed to streaming handlers.
//!
//! These run on the dispatcher thread for the duration of the service
//! call; a slow handler head-of-line blocks every other call, which is
//! the accepted sync-over-async trade-off.

use std::marker::PhantomData;
use std::sync::Arc;

use transport::{Message, ServerCall, Status};

use crate::context::{SendState, ServerContext};

fn decode_status<M: Message>(buf: bytes::Bytes) -> Result<M, Status> {
    M::decode(buf).map_err(|e| Status::internal(format!("failed to deserialize request: {e}")))
}

/// Reads a stream of client messages.
pub struct ServerReader<'a, Req> {
    call: &'a ServerCall,
    _req: PhantomData<Req>,
}

impl<'a, Req: Message> ServerReader<'a, Req> {
    pub(crate) fn new(call: &'a ServerCall) -> Self {
        Self {
            call,
            _req: PhantomData,
        }
    }

    /// Next client message; `Ok(None)` once the client half-closed or
    /// abandoned the call.
    pub fn read(&mut self) -> Result<Option<Req>, Status> {
        match self.call.read() {
            Some(buf) => decode_status(buf).map(Some),
            None => Ok(None),
        }
    }
}

/// Writes a stream of server messages.
pub struct ServerWriter<'a, Rsp> {
    call: &'a ServerCall,
    send_state: Arc<SendState>,
    _rsp: PhantomData<Rsp>,
}

impl<'a, Rsp: Message> ServerWriter<'a, Rsp> {
    pub(crate) fn new(call: &'a ServerCall, ctx: &ServerContext) -> Self {
        Self {
            call,
            send_state: ctx.send_state(),
            _rsp: PhantomData,
        }
    }

    /// Write one message. The first write flushes the initial metadata.
    pub fn write(&mut self, response: &Rsp) -> Result<(), Status> {
        self.send_state.flush(self.call);
        if self.call.write(&[response.encode()]) {
            Ok(())
        } else {
            Err(Status::cancelled("stream closed by peer"))
        }
    }
}

/// Combined reader/writer for bidi handlers.
pub struct ServerReaderWriter<'a, Req, Rsp> {
    reader: ServerReader<'a, Req>,
    writer: ServerWriter<'a, Rsp>,
}

impl<'a, Req: Message, Rsp: Message> ServerReaderWriter<'a, Req, Rsp> {
    pub(crate) fn new(call: &'a ServerCall, ctx: &ServerContext) -> Self {
        Self {
            reader: ServerReader::new(call),
            writer: ServerWriter::new(call, ctx),
        }
    }

    pub fn read(&mut self) -> Result<Option<Req>, Status> {
        self.reader.read()
    }

    pub fn write(&mut self, response: &Rsp) -> Result<(), Status> {
        self.writer.write(response)
    }
}

/// Streamer for unary methods served through the streaming machinery:
/// exactly one request in, at most one response out.
///
/// A handler that returns OK without writing is surfaced on the wire as
/// an INTERNAL error by the handler layer.
pub struct UnaryStreamer<'a, Req, Rsp> {
    call: &'a ServerCall,
    send_state: Arc<SendState>,
    read_done: bool,
    wrote: bool,
    _req: PhantomData<Req>,
    _rsp: PhantomData<Rsp>,
}

impl<'a, Req: Message, Rsp: Message> UnaryStreamer<'a, Req, Rsp> {
    pub(crate) fn new(call: &'a ServerCall, ctx: &ServerContext) -> Self {
        Self {
            call,
            send_state: ctx.send_state(),
            read_done: false,
            wrote: false,
            _req: PhantomData,
            _rsp: PhantomData,
        }
    }

    /// The single request message. Subsequent reads yield `Ok(None)`.
    pub fn read(&mut self) -> Result<Option<Req>, Status> {
        if self.read_done {
            return Ok(None);
        }
        self.read_done = true;
        match self.call.read() {
            Some(buf) => decode_status(buf).map(Some),
            None => Ok(None),
        }
    }

    /// The single response message.
    pub fn write(&mut self, response: &Rsp) -> Result<(), Status> {
        if self.wrote {
            return Err(Status::internal("unary response was already sent"));
        }
        self.wrote = true;
        self.send_state.flush(self.call);
        if self.call.write(&[response.encode()]) {
            Ok(())
        } else {
            Err(Status::cancelled("stream closed by peer"))
        }
    }

    pub(crate) fn wrote(&self) -> bool {
        self.wrote
    }
}

/// Streamer for server-streaming methods whose single request is read by
/// the core: the handler only writes.
pub struct SplitStreamer<'a, Rsp> {
    writer: ServerWriter<'a, Rsp>,
}

impl<'a, Rsp: Message> SplitStreamer<'a, Rsp> {
    pub(crate) fn new(call: &'a ServerCall, ctx: &ServerContext) -> Self {
        Self {
            writer: ServerWriter::new(call, ctx),
        }
    }

    pub fn write(&mut self, response: &Rsp) -> Result<(), Status> {
        self.writer.write(response)
    }
}
