//! Per-call state machines and the arena that addresses them.
//!
//! Every in-flight RPC is one state object whose arena tag travels with
//! each submitted op batch and comes back on the matching completion
//! event. The dispatcher takes the object out of its slot, advances it,
//! and either reinstalls it or releases the slot. Self-deletion in the
//! original completion-queue idiom becomes returning `None` from
//! [`CallData::proceed`].

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use transport::{CallCell, QueueHandle, Router, SlotId, Tag};

use crate::fan::Fan;
use crate::handler::ErasedHandler;
use crate::metrics::{CALLDATA_ACTIVE, CALLS_ACCEPTED};

/// A per-call state object driven by completion events.
pub(crate) trait CallData: Send {
    /// Advance on one `(tag, ok)` event addressed to this object.
    ///
    /// `ok = false` means the transport abandoned the call; the object
    /// must release its resources without further I/O. Returning `None`
    /// releases the arena slot (the terminal "delete self").
    fn proceed(self: Box<Self>, ok: bool, ctx: &mut DispatchCtx<'_>) -> Option<Box<dyn CallData>>;
}

/// Pieces of the server core shared by every state object.
pub(crate) struct CoreShared {
    pub router: Arc<Router>,
    pub queue: QueueHandle,
    pub fan: Option<Arc<Fan>>,
}

/// Short-lived borrow of the dispatcher's state handed to each
/// `proceed` call, so state objects can spawn their successors.
pub(crate) struct DispatchCtx<'a> {
    pub arena: &'a mut Arena,
    pub shared: &'a Arc<CoreShared>,
}

enum Entry {
    Vacant,
    /// Slot is owned by an object currently outside the arena (being
    /// advanced, or under construction). The tag stays valid.
    Reserved,
    Occupied(Box<dyn CallData>),
}

struct ArenaSlot {
    generation: u32,
    entry: Entry,
}

/// Arena of live state objects, indexed by tag slot with a generation
/// guard against events addressed to a recycled slot.
pub(crate) struct Arena {
    slots: Vec<ArenaSlot>,
    free: Vec<u32>,
    live: Arc<AtomicUsize>,
}

impl Arena {
    pub(crate) fn new(live: Arc<AtomicUsize>) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            live,
        }
    }

    /// Reserve a slot, build the state object with its tag, install it.
    ///
    /// The builder may already submit ops carrying the tag; any resulting
    /// event sits in the completion queue until after installation
    /// because the single dispatcher thread is the one running this.
    pub(crate) fn insert_with(
        &mut self,
        build: impl FnOnce(Tag) -> Box<dyn CallData>,
    ) -> Tag {
        let slot = match self.free.pop() {
            Some(slot) => slot,
            None => {
                self.slots.push(ArenaSlot {
                    generation: 0,
                    entry: Entry::Vacant,
                });
                (self.slots.len() - 1) as u32
            }
        };
        let generation = self.slots[slot as usize].generation;
        let tag = Tag::new(slot, generation);
        self.slots[slot as usize].entry = Entry::Reserved;
        let call_data = build(tag);
        self.slots[slot as usize].entry = Entry::Occupied(call_data);
        self.live.fetch_add(1, Ordering::Relaxed);
        CALLDATA_ACTIVE.increment();
        tag
    }

    /// Take the object addressed by `tag` out of its slot, leaving the
    /// slot reserved. `None` if the tag is stale.
    pub(crate) fn take(&mut self, tag: Tag) -> Option<Box<dyn CallData>> {
        let slot = self.slots.get_mut(tag.slot())?;
        if slot.generation != tag.generation() {
            return None;
        }
        match std::mem::replace(&mut slot.entry, Entry::Reserved) {
            Entry::Occupied(call_data) => Some(call_data),
            other => {
                slot.entry = other;
                None
            }
        }
    }

    /// Reinstall an object taken with [`take`](Self::take).
    pub(crate) fn restore(&mut self, tag: Tag, call_data: Box<dyn CallData>) {
        let slot = &mut self.slots[tag.slot()];
        debug_assert_eq!(slot.generation, tag.generation());
        slot.entry = Entry::Occupied(call_data);
    }

    /// Release a slot after its object's terminal event. The generation
    /// bump invalidates the old tag before the slot is reused.
    pub(crate) fn release(&mut self, tag: Tag) {
        let slot = &mut self.slots[tag.slot()];
        debug_assert_eq!(slot.generation, tag.generation());
        slot.generation = slot.generation.wrapping_add(1);
        slot.entry = Entry::Vacant;
        self.free.push(tag.slot() as u32);
        self.live.fetch_sub(1, Ordering::Relaxed);
        CALLDATA_ACTIVE.decrement();
    }

    pub(crate) fn live(&self) -> usize {
        self.live.load(Ordering::Relaxed)
    }

    /// Free every remaining object after the drain, keeping the live
    /// counter honest. Only parked fan subscribers can still be here:
    /// they have no outstanding transport op to fail with `ok = false`.
    pub(crate) fn drain_remaining(&mut self) {
        for slot in &mut self.slots {
            if matches!(slot.entry, Entry::Occupied(_)) {
                slot.entry = Entry::Vacant;
                self.live.fetch_sub(1, Ordering::Relaxed);
                CALLDATA_ACTIVE.decrement();
            }
        }
    }
}

/// Install a fresh state object and run its construction step, exactly
/// like the original's "allocate in CREATE, then proceed once" pattern.
pub(crate) fn spawn(ctx: &mut DispatchCtx<'_>, build: impl FnOnce(Tag) -> Box<dyn CallData>) {
    let tag = ctx.arena.insert_with(build);
    let call_data = ctx
        .arena
        .take(tag)
        .expect("freshly inserted state object is present");
    match call_data.proceed(true, ctx) {
        Some(call_data) => ctx.arena.restore(tag, call_data),
        None => ctx.arena.release(tag),
    }
}

/// Three-state lifecycle of a typed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CallState {
    /// About to arm (construction step) or armed and waiting for a call.
    Create,
    /// Accepted; the next event runs the handler and submits the
    /// terminal batch.
    Process,
    /// Terminal batch submitted; the next event deallocates.
    Finish,
}

/// State machine for one typed RPC.
pub(crate) struct TypedCallData {
    handler: Arc<dyn ErasedHandler>,
    slot: SlotId,
    tag: Tag,
    cell: Arc<CallCell>,
    state: CallState,
}

impl TypedCallData {
    /// Allocate a call-data in CREATE on `slot`, arming it immediately.
    pub(crate) fn spawn(ctx: &mut DispatchCtx<'_>, handler: Arc<dyn ErasedHandler>, slot: SlotId) {
        spawn(ctx, |tag| {
            Box::new(TypedCallData {
                handler,
                slot,
                tag,
                cell: Arc::new(CallCell::default()),
                state: CallState::Create,
            })
        });
    }
}

impl CallData for TypedCallData {
    fn proceed(
        mut self: Box<Self>,
        ok: bool,
        ctx: &mut DispatchCtx<'_>,
    ) -> Option<Box<dyn CallData>> {
        if !ok {
            self.state = CallState::Finish;
        }

        match self.state {
            CallState::Create => {
                // Request that the transport hand us the next call on our
                // method slot, with our own address as the event tag.
                self.state = CallState::Process;
                ctx.shared.router.request_call(
                    self.slot,
                    self.cell.clone(),
                    self.tag,
                    &ctx.shared.queue,
                );
                Some(self)
            }
            CallState::Process => {
                // Re-arm the slot for the next caller before doing any
                // work on this one.
                TypedCallData::spawn(ctx, self.handler.clone(), self.slot);

                let accepted = self.cell.take()?;
                CALLS_ACCEPTED.increment();

                // Sync-over-async: the handler runs right here on the
                // dispatcher thread and the terminal batch goes out with
                // our tag.
                self.handler.run(accepted, self.tag, &ctx.shared.queue);
                self.state = CallState::Finish;
                Some(self)
            }
            CallState::Finish => None,
        }
    }
}
