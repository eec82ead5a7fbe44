//! The fan: a mailbox coordinating publishers with suspended subscribers.
//!
//! Generic streaming calls park themselves here between publishes. A
//! publish snapshots the current subscriber set and wakes each member
//! exactly once; a subscriber that keeps streaming re-adds itself after
//! its write completes. One mutex, no condition variables: progress is
//! driven entirely by the completion queue.

use std::collections::VecDeque;
use std::time::Instant;

use bytes::Bytes;
use parking_lot::Mutex;

use transport::{QueueHandle, Tag};

use crate::generic::SENTINEL;
use crate::metrics::{FAN_PUBLISHES, FAN_SUBSCRIBERS};

/// Publish slot shared between the fan and one parked subscriber.
///
/// A publisher stores the payload and its timestamp here, then posts the
/// subscriber's tag with `ok = true`, the simulated event that wakes the
/// state machine on the dispatcher thread.
#[derive(Default)]
pub(crate) struct PublishCell {
    slot: Mutex<Option<(Bytes, Instant)>>,
}

impl PublishCell {
    pub(crate) fn put(&self, payload: Bytes, at: Instant) {
        *self.slot.lock() = Some((payload, at));
    }

    pub(crate) fn take(&self) -> Option<(Bytes, Instant)> {
        self.slot.lock().take()
    }
}

/// Handle to one parked generic call.
pub(crate) struct Subscriber {
    pub(crate) tag: Tag,
    pub(crate) cell: std::sync::Arc<PublishCell>,
    pub(crate) queue: QueueHandle,
}

impl Subscriber {
    /// Hand a payload to the call and simulate its completion event.
    fn deliver(&self, payload: Bytes, at: Instant) {
        self.cell.put(payload, at);
        self.queue.post(self.tag, true);
    }
}

struct FanInner {
    calls: VecDeque<Subscriber>,
    shutdown: bool,
}

/// Mailbox of currently-suspended generic streaming calls.
///
/// A subscriber handed out by [`publish`](Fan::publish) is no longer
/// owned by the fan: it either re-adds itself (streaming) or reaches its
/// terminal write. The single-consumer completion queue guarantees the
/// fan never sees two adds for the same call concurrently.
pub struct Fan {
    inner: Mutex<FanInner>,
}

impl Fan {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(FanInner {
                calls: VecDeque::new(),
                shutdown: false,
            }),
        }
    }

    /// Park a subscriber until the next publish. After shutdown the
    /// sentinel payload is delivered immediately (outside the lock) so
    /// the call can terminate cleanly.
    pub(crate) fn add(&self, subscriber: Subscriber) {
        {
            let mut inner = self.inner.lock();
            if !inner.shutdown {
                inner.calls.push_back(subscriber);
                FAN_SUBSCRIBERS.increment();
                return;
            }
        }
        // Shut down: sentinel-close the call, outside the lock.
        subscriber.deliver(Bytes::from_static(SENTINEL), Instant::now());
    }

    /// Broadcast a payload to every currently-parked subscriber.
    ///
    /// The subscriber set is snapshotted and cleared under the lock with
    /// a single timestamp; delivery happens outside the lock. The payload
    /// is a reference-counted slice, shared across all subscribers.
    pub fn publish(&self, payload: impl Into<Bytes>) {
        let payload = payload.into();
        let now = Instant::now();
        let calls = {
            let mut inner = self.inner.lock();
            std::mem::take(&mut inner.calls)
        };
        FAN_PUBLISHES.increment();
        FAN_SUBSCRIBERS.sub(calls.len() as i64);
        for call in calls {
            call.deliver(payload.clone(), now);
        }
    }

    /// Stop accepting subscribers; future adds sentinel-close instead.
    pub fn shutdown(&self) {
        self.inner.lock().shutdown = true;
    }

    pub fn is_shutdown(&self) -> bool {
        self.inner.lock().shutdown
    }

    /// Number of currently-parked subscribers.
    pub fn num_calls(&self) -> usize {
        self.inner.lock().calls.len()
    }
}

impl Default for Fan {
    fn default() -> Self {
        Self::new()
    }
}
