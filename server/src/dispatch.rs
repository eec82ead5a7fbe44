//! The server core: dispatcher thread and lifecycle.
//!
//! One worker thread drains the completion queue and advances whichever
//! state object each event's tag addresses. Startup primes every method
//! slot with a state object in CREATE; shutdown order is load-bearing:
//! the router stops accepting and cancels outstanding arms first, then
//! the queue flips to drain-only, then the dispatcher is joined. State
//! objects still in flight free themselves on their `ok = false` paths
//! during the drain.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::JoinHandle;

use transport::{CompletionQueue, Connector, QueueHandle, Router, SlotId};

use crate::builder::Builder;
use crate::calldata::{Arena, CoreShared, DispatchCtx, TypedCallData};
use crate::fan::Fan;
use crate::generic::GenericCallData;
use crate::handler::ErasedHandler;
use crate::metrics::{EVENTS_DISPATCHED, STALE_TAGS};
use crate::unknown::UnknownCallData;

/// Address bound by the builder, with the port the transport selected.
#[derive(Debug, Clone)]
pub struct BoundPort {
    pub addr: String,
    pub port: u16,
}

/// A running server.
///
/// Dropping the server (or calling [`shutdown`](Server::shutdown))
/// performs the full teardown sequence and joins the dispatcher.
pub struct Server {
    router: Arc<Router>,
    queue: QueueHandle,
    dispatcher: Option<JoinHandle<()>>,
    live: Arc<AtomicUsize>,
    ports: Vec<BoundPort>,
}

impl Server {
    /// Start collecting services, ports, and the generic endpoint.
    pub fn builder() -> Builder {
        Builder::new()
    }

    pub(crate) fn start(
        router: Arc<Router>,
        bindings: Vec<(SlotId, Option<Arc<dyn ErasedHandler>>)>,
        fan: Option<Arc<Fan>>,
        ports: Vec<BoundPort>,
    ) -> Server {
        let queue = CompletionQueue::new();
        let queue_handle = queue.handle();
        let live = Arc::new(AtomicUsize::new(0));
        let shared = Arc::new(CoreShared {
            router: router.clone(),
            queue: queue_handle.clone(),
            fan,
        });

        let thread_live = live.clone();
        let dispatcher = std::thread::Builder::new()
            .name("rpc-dispatch".to_string())
            .spawn(move || run_dispatcher(queue, shared, bindings, thread_live))
            .expect("failed to spawn dispatcher thread");

        Server {
            router,
            queue: queue_handle,
            dispatcher: Some(dispatcher),
            live,
            ports,
        }
    }

    /// Client entry point into this server.
    pub fn connector(&self) -> Connector {
        Connector::new(self.router.clone())
    }

    /// Addresses bound at startup with their selected ports.
    pub fn bound_ports(&self) -> &[BoundPort] {
        &self.ports
    }

    /// Live per-call state objects, armed slots included. Drops back to
    /// zero after shutdown; tests use it as a leak counter.
    pub fn active_calls(&self) -> usize {
        self.live.load(Ordering::Relaxed)
    }

    /// Stop accepting calls, drain the completion queue, and join the
    /// dispatcher. Idempotent; also run on drop.
    pub fn shutdown(&mut self) {
        let Some(dispatcher) = self.dispatcher.take() else {
            return;
        };
        tracing::info!("server shutting down");
        self.router.shutdown();
        self.queue.shutdown();
        let _ = dispatcher.join();
        tracing::info!("dispatcher drained and joined");
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_dispatcher(
    queue: CompletionQueue,
    shared: Arc<CoreShared>,
    bindings: Vec<(SlotId, Option<Arc<dyn ErasedHandler>>)>,
    live: Arc<AtomicUsize>,
) {
    let mut arena = Arena::new(live);

    // Prime the state machines: every slot gets exactly one object in
    // CREATE waiting to accept the next call.
    {
        let mut ctx = DispatchCtx {
            arena: &mut arena,
            shared: &shared,
        };
        for (slot, binding) in &bindings {
            match binding {
                Some(handler) => TypedCallData::spawn(&mut ctx, handler.clone(), *slot),
                None => UnknownCallData::spawn(&mut ctx, *slot),
            }
        }
        UnknownCallData::spawn(&mut ctx, shared.router.unknown_slot());
        if let (Some(slot), Some(fan)) = (shared.router.generic_slot(), shared.fan.clone()) {
            GenericCallData::spawn(&mut ctx, fan, slot);
        }
    }
    tracing::debug!(slots = bindings.len(), "dispatcher primed, serving");

    while let Some((tag, ok)) = queue.next() {
        EVENTS_DISPATCHED.increment();
        let Some(call_data) = arena.take(tag) else {
            // An event for a freed object would be a transport bug; the
            // generation guard turns it into a counter instead of a
            // use-after-free.
            STALE_TAGS.increment();
            continue;
        };
        let mut ctx = DispatchCtx {
            arena: &mut arena,
            shared: &shared,
        };
        match call_data.proceed(ok, &mut ctx) {
            Some(call_data) => arena.restore(tag, call_data),
            None => arena.release(tag),
        }
    }
    tracing::debug!(remaining = arena.live(), "completion queue drained");

    // Whatever is still parked (fan subscribers with no outstanding op)
    // is freed with the arena here.
    arena.drain_remaining();
}
