//! Unknown-method responder.
//!
//! Terminal handler for any slot with no registered service code: the
//! catch-all unknown slot (when no generic service is registered) and
//! declared-but-unbound typed slots. Fills one terminal batch carrying
//! an UNIMPLEMENTED status with an empty message and a small diagnostic
//! HTML body identifying the rejected method.

use std::sync::Arc;

use transport::{CallCell, FinishBatch, Metadata, SlotId, Status, Tag};

use crate::calldata::{CallData, CallState, DispatchCtx, spawn};
use crate::html;
use crate::metrics::UNKNOWN_METHODS;

pub(crate) struct UnknownCallData {
    slot: SlotId,
    tag: Tag,
    cell: Arc<CallCell>,
    state: CallState,
}

impl UnknownCallData {
    /// Allocate a responder in CREATE on `slot`, arming it immediately.
    pub(crate) fn spawn(ctx: &mut DispatchCtx<'_>, slot: SlotId) {
        spawn(ctx, |tag| {
            Box::new(UnknownCallData {
                slot,
                tag,
                cell: Arc::new(CallCell::default()),
                state: CallState::Create,
            })
        });
    }
}

impl CallData for UnknownCallData {
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
                UnknownCallData::spawn(ctx, self.slot);

                let accepted = self.cell.take()?;
                UNKNOWN_METHODS.increment();
                tracing::debug!(method = %accepted.path, "rejecting unknown method");

                accepted.call.finish(
                    FinishBatch {
                        initial_metadata: Some((Metadata::new(), None)),
                        message: Some(html::render_unknown(&accepted.path)),
                        status: Status::unimplemented(),
                        trailing_metadata: Metadata::new(),
                    },
                    self.tag,
                    &ctx.shared.queue,
                );
                self.state = CallState::Finish;
                Some(self)
            }
            CallState::Finish => None,
        }
    }
}
