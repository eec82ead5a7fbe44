//! Typed service registration.
//!
//! A [`ServiceDef`] is the hand-written stand-in for a generated service
//! descriptor: one method slot per RPC, each bound to a handler of one of
//! the six kinds (or declared without one, in which case the
//! unknown-method responder serves it). The builder harvests
//! `(handler, slot)` descriptor pairs from registered services.

use std::sync::Arc;

use transport::{Message, Status};

use crate::context::ServerContext;
use crate::handler::{ErasedHandler, HandlerFn, MethodHandler};
use crate::streams::{
    ServerReader, ServerReaderWriter, ServerWriter, SplitStreamer, UnaryStreamer,
};

pub(crate) struct MethodDef {
    pub(crate) path: String,
    pub(crate) handler: Option<Arc<dyn ErasedHandler>>,
}

/// A typed service: a name plus its method slots in declaration order.
pub struct ServiceDef {
    name: String,
    methods: Vec<MethodDef>,
}

impl ServiceDef {
    /// Start a service descriptor, e.g. `ServiceDef::new("pkg.Service")`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            methods: Vec::new(),
        }
    }

    fn push(mut self, method: &str, handler: Option<Arc<dyn ErasedHandler>>) -> Self {
        self.methods.push(MethodDef {
            path: format!("/{}/{}", self.name, method),
            handler,
        });
        self
    }

    /// Bind a unary method: one request in, one response out.
    pub fn unary<Req, Rsp, F>(self, method: &str, f: F) -> Self
    where
        Req: Message,
        Rsp: Message,
        F: Fn(&mut ServerContext, Req) -> Result<Rsp, Status> + Send + Sync + 'static,
    {
        self.push(
            method,
            Some(Arc::new(MethodHandler::new(HandlerFn::Unary(Box::new(f))))),
        )
    }

    /// Bind a client-streaming method: many requests in, one response out.
    pub fn client_streaming<Req, Rsp, F>(self, method: &str, f: F) -> Self
    where
        Req: Message,
        Rsp: Message,
        F: Fn(&mut ServerContext, &mut ServerReader<'_, Req>) -> Result<Rsp, Status>
            + Send
            + Sync
            + 'static,
    {
        self.push(
            method,
            Some(Arc::new(MethodHandler::new(HandlerFn::ClientStreaming(
                Box::new(f),
            )))),
        )
    }

    /// Bind a server-streaming method: one request in, many responses out.
    pub fn server_streaming<Req, Rsp, F>(self, method: &str, f: F) -> Self
    where
        Req: Message,
        Rsp: Message,
        F: Fn(&mut ServerContext, Req, &mut ServerWriter<'_, Rsp>) -> Result<(), Status>
            + Send
            + Sync
            + 'static,
    {
        self.push(
            method,
            Some(Arc::new(MethodHandler::new(HandlerFn::ServerStreaming(
                Box::new(f),
            )))),
        )
    }

    /// Bind a bidi-streaming method.
    pub fn bidi_streaming<Req, Rsp, F>(self, method: &str, f: F) -> Self
    where
        Req: Message,
        Rsp: Message,
        F: Fn(&mut ServerContext, &mut ServerReaderWriter<'_, Req, Rsp>) -> Result<(), Status>
            + Send
            + Sync
            + 'static,
    {
        self.push(
            method,
            Some(Arc::new(MethodHandler::new(HandlerFn::Bidi(Box::new(f))))),
        )
    }

    /// Bind a unary method served through the streaming machinery. The
    /// handler must write exactly one response; returning OK without a
    /// write is surfaced as an INTERNAL error on the wire.
    pub fn streamed_unary<Req, Rsp, F>(self, method: &str, f: F) -> Self
    where
        Req: Message,
        Rsp: Message,
        F: Fn(&mut ServerContext, &mut UnaryStreamer<'_, Req, Rsp>) -> Result<(), Status>
            + Send
            + Sync
            + 'static,
    {
        self.push(
            method,
            Some(Arc::new(MethodHandler::new(HandlerFn::StreamedUnary(
                Box::new(f),
            )))),
        )
    }

    /// Bind a server-streaming method whose single request is read by the
    /// core before the handler runs.
    pub fn split_streaming<Req, Rsp, F>(self, method: &str, f: F) -> Self
    where
        Req: Message,
        Rsp: Message,
        F: Fn(&mut ServerContext, Req, &mut SplitStreamer<'_, Rsp>) -> Result<(), Status>
            + Send
            + Sync
            + 'static,
    {
        self.push(
            method,
            Some(Arc::new(MethodHandler::new(HandlerFn::SplitStreaming(
                Box::new(f),
            )))),
        )
    }

    /// Declare a method slot without binding a handler. Calls to it are
    /// answered by the unknown-method responder.
    pub fn declare(self, method: &str) -> Self {
        self.push(method, None)
    }

    /// Yield the harvested `(path, handler)` descriptor pairs, slot by
    /// slot, releasing ownership to the server.
    pub(crate) fn release(self) -> Vec<MethodDef> {
        self.methods
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use transport::DecodeError;

    struct Raw(Vec<u8>);
    impl Message for Raw {
        fn encode(&self) -> Bytes {
            Bytes::from(self.0.clone())
        }
        fn decode(buf: Bytes) -> Result<Self, DecodeError> {
            Ok(Raw(buf.to_vec()))
        }
    }

    #[test]
    fn test_paths_are_built_from_service_and_method_names() {
        let svc = ServiceDef::new("unstructured.Test")
            .unary("Process", |_ctx, req: Raw| Ok(Raw(req.0)))
            .declare("Reserved");
        let methods = svc.release();
        assert_eq!(methods.len(), 2);
        assert_eq!(methods[0].path, "/unstructured.Test/Process");
        assert!(methods[0].handler.is_some());
        assert_eq!(methods[1].path, "/unstructured.Test/Reserved");
        assert!(methods[1].handler.is_none());
    }
}
