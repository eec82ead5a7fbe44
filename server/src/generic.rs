//! Generic call-data: the fan-out subscriber behind the byte-stream
//! endpoint.
//!
//! One instance serves one generic HTTP-bodied call routed by the
//! server's catch-all. Requests whose path begins with `/stream` become
//! server-sent-event subscriptions that park in the [`Fan`] between
//! publishes; every other path receives a one-shot HTML index page.
//!
//! Frames are assembled from three parts: the payload (or index page),
//! a formatted timing line, and a closing fragment. The payload part is
//! the publisher's reference-counted slice, shared across subscribers.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;

use transport::{CallCell, ServerCall, SlotId, Status, Tag};

use crate::calldata::{CallData, DispatchCtx, spawn};
use crate::context::GenericContext;
use crate::fan::{Fan, PublishCell, Subscriber};
use crate::html;
use crate::metrics::CALLS_ACCEPTED;

/// Payload delivered to still-parked subscribers once the fan is shut
/// down, closing each stream with a well-formed final event.
pub(crate) const SENTINEL: &[u8] = b"data: ! ";

/// SSE frame terminator.
const FRAME_END: &[u8] = b"\n\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Construction step pending: arm the generic slot.
    Create,
    /// Armed; the next event is call arrival.
    Arming,
    /// Parked in the fan awaiting a publish (streaming mode only).
    Parked,
    /// A streaming write is in flight.
    Writing,
    /// Terminal write submitted; the next event deallocates.
    Finishing,
}

/// State machine for one generic call.
pub(crate) struct GenericCallData {
    fan: Arc<Fan>,
    slot: SlotId,
    tag: Tag,
    cell: Arc<CallCell>,
    publish: Arc<PublishCell>,
    call: Option<ServerCall>,
    ctx: GenericContext,
    streaming: bool,
    created_at: Instant,
    published_at: Instant,
    dead_delta: Duration,
    phase: Phase,
}

impl GenericCallData {
    /// Allocate a fresh subscriber on the generic slot, arming it
    /// immediately.
    pub(crate) fn spawn(ctx: &mut DispatchCtx<'_>, fan: Arc<Fan>, slot: SlotId) {
        spawn(ctx, |tag| {
            let now = Instant::now();
            Box::new(GenericCallData {
                fan,
                slot,
                tag,
                cell: Arc::new(CallCell::default()),
                publish: Arc::new(PublishCell::default()),
                call: None,
                ctx: GenericContext::new(String::new()),
                streaming: false,
                created_at: now,
                published_at: now,
                dead_delta: Duration::ZERO,
                phase: Phase::Create,
            })
        });
    }

    /// `elapsed  pub-to-write  dead-after-pub`, rendered per write.
    fn timing_line(&self, now: Instant) -> Bytes {
        let elapsed = self
            .published_at
            .saturating_duration_since(self.created_at)
            .as_secs_f64();
        let pub_to_write = now
            .saturating_duration_since(self.published_at)
            .as_secs_f64()
            * 1e6;
        let dead = self.dead_delta.as_secs_f64() * 1e6;
        Bytes::from(format!(
            "{elapsed:8.3} s {pub_to_write:9.1} \u{b5}s {dead:11.1} \u{b5}s"
        ))
    }

    /// Park in the fan until the next publish, recording how long the
    /// stream has been idle since the previous publish.
    fn park(&mut self, ctx: &DispatchCtx<'_>) {
        self.dead_delta = Instant::now().saturating_duration_since(self.published_at);
        self.fan.add(Subscriber {
            tag: self.tag,
            cell: self.publish.clone(),
            queue: ctx.shared.queue.clone(),
        });
        self.phase = Phase::Parked;
    }

    /// Deliver-or-park step shared by the arrival and wake-up events.
    fn step(mut self: Box<Self>, ctx: &mut DispatchCtx<'_>) -> Option<Box<dyn CallData>> {
        let call = self.call.take().expect("call present past arming");

        if !self.streaming {
            // One-shot index page, then finish with OK.
            let body = html::render_index(self.ctx.method());
            self.published_at = Instant::now();
            let timing = self.timing_line(self.published_at);
            call.write_and_finish(
                &[body, timing, Bytes::from_static(html::INDEX_TAIL)],
                Status::ok(),
                self.tag,
                &ctx.shared.queue,
            );
            self.call = Some(call);
            self.phase = Phase::Finishing;
            return Some(self);
        }

        let pending = self.publish.take();

        if self.fan.is_shutdown() {
            // Terminal write with the sentinel payload, regardless of
            // what the final publish carried.
            self.published_at = pending.map(|(_, at)| at).unwrap_or_else(Instant::now);
            let timing = self.timing_line(Instant::now());
            call.write_and_finish(
                &[
                    Bytes::from_static(SENTINEL),
                    timing,
                    Bytes::from_static(FRAME_END),
                ],
                Status::ok(),
                self.tag,
                &ctx.shared.queue,
            );
            self.call = Some(call);
            self.phase = Phase::Finishing;
            return Some(self);
        }

        match pending {
            Some((payload, at)) => {
                self.published_at = at;
                let timing = self.timing_line(Instant::now());
                call.write_tagged(
                    &[payload, timing, Bytes::from_static(FRAME_END)],
                    self.tag,
                    &ctx.shared.queue,
                );
                self.call = Some(call);
                self.phase = Phase::Writing;
                Some(self)
            }
            None => {
                self.call = Some(call);
                self.park(ctx);
                Some(self)
            }
        }
    }
}

impl CallData for GenericCallData {
    fn proceed(
        mut self: Box<Self>,
        ok: bool,
        ctx: &mut DispatchCtx<'_>,
    ) -> Option<Box<dyn CallData>> {
        if !ok {
            // Transport abandoned the call; no further I/O.
            return None;
        }

        match self.phase {
            Phase::Create => {
                ctx.shared.router.request_call(
                    self.slot,
                    self.cell.clone(),
                    self.tag,
                    &ctx.shared.queue,
                );
                self.phase = Phase::Arming;
                Some(self)
            }
            Phase::Arming => {
                // Keep the catch-all armed before serving this call.
                GenericCallData::spawn(ctx, self.fan.clone(), self.slot);

                let accepted = self.cell.take()?;
                CALLS_ACCEPTED.increment();
                self.ctx = GenericContext::new(accepted.path);
                self.streaming = self.ctx.method().starts_with("/stream");
                self.ctx.set_content_type(if self.streaming {
                    "text/event-stream; charset=UTF-8"
                } else {
                    "text/html; charset=UTF-8"
                });
                accepted
                    .call
                    .send_initial_metadata(self.ctx.take_initial_metadata(), None);
                self.call = Some(accepted.call);

                let now = Instant::now();
                self.created_at = now;
                self.published_at = now;

                self.step(ctx)
            }
            Phase::Parked => self.step(ctx),
            Phase::Writing => {
                // Write landed; go back to waiting for the next publish.
                // If the fan shut down meanwhile, add() sentinel-closes us
                // through the same wake-up path.
                self.park(ctx);
                Some(self)
            }
            Phase::Finishing => None,
        }
    }
}
