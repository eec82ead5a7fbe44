//! Per-call state shared between the server and client halves of the
//! loopback link.
//!
//! One RPC is one [`ServerCall`]/[`ClientCall`] pair over a mutex-guarded
//! cell. Server ops mirror the batched op sets a completion-queue
//! transport exposes: send-initial-metadata, message writes (synchronous
//! for the blocking stream wrappers, tagged for the state machines), and
//! the terminal finish batch. Client accessors block with explicit
//! timeouts; dropping the client half cancels the call.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use parking_lot::{Condvar, Mutex};

use crate::metadata::{CompressionLevel, Metadata};
use crate::queue::QueueHandle;
use crate::status::Status;
use crate::tag::Tag;

/// A call accepted off a method slot: the request path, the client's
/// headers, and the server half of the call.
pub struct AcceptedCall {
    pub path: String,
    pub metadata: Metadata,
    pub call: ServerCall,
}

/// One-shot mailbox the transport fills when an armed slot matches a call.
///
/// The state object passes a cell along with its `request_call` arm and
/// takes the accepted call out when the `(tag, true)` event fires. This is
/// the ownership-safe rendition of the transport filling caller-provided
/// context structures.
#[derive(Default)]
pub struct CallCell {
    slot: Mutex<Option<AcceptedCall>>,
}

impl CallCell {
    pub(crate) fn put(&self, call: AcceptedCall) {
        *self.slot.lock() = Some(call);
    }

    /// Take the accepted call, if the arm has completed successfully.
    pub fn take(&self) -> Option<AcceptedCall> {
        self.slot.lock().take()
    }
}

/// Terminal op batch for a call.
///
/// Delivered as one unit, in order: initial metadata (if not already
/// sent), the compression hint, at most one message, then the status with
/// trailing metadata.
pub struct FinishBatch {
    pub initial_metadata: Option<(Metadata, Option<CompressionLevel>)>,
    pub message: Option<Bytes>,
    pub status: Status,
    pub trailing_metadata: Metadata,
}

struct CallState {
    // client -> server
    to_server: VecDeque<Bytes>,
    client_half_closed: bool,
    // server -> client
    initial_metadata: Option<Metadata>,
    compression: Option<CompressionLevel>,
    to_client: VecDeque<Bytes>,
    finish: Option<(Status, Metadata)>,
    cancelled: bool,
}

struct Shared {
    state: Mutex<CallState>,
    cv: Condvar,
}

impl Shared {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(CallState {
                to_server: VecDeque::new(),
                client_half_closed: false,
                initial_metadata: None,
                compression: None,
                to_client: VecDeque::new(),
                finish: None,
                cancelled: false,
            }),
            cv: Condvar::new(),
        })
    }
}

/// Create a connected server/client call pair.
pub(crate) fn pair() -> (ServerCall, ClientCall) {
    let shared = Shared::new();
    (
        ServerCall {
            shared: shared.clone(),
        },
        ClientCall { shared },
    )
}

/// Server half of one RPC.
pub struct ServerCall {
    shared: Arc<Shared>,
}

impl ServerCall {
    /// Send initial metadata to the client. Delivered at most once; the
    /// core guards against double submission before calling in.
    pub fn send_initial_metadata(
        &self,
        metadata: Metadata,
        compression: Option<CompressionLevel>,
    ) -> bool {
        let mut st = self.shared.state.lock();
        if st.cancelled {
            return false;
        }
        if st.initial_metadata.is_none() {
            st.initial_metadata = Some(metadata);
            st.compression = compression;
            self.shared.cv.notify_all();
        }
        true
    }

    /// Block until the next client message. `None` on half-close or
    /// cancellation; no more messages will ever arrive after that.
    pub fn read(&self) -> Option<Bytes> {
        let mut st = self.shared.state.lock();
        loop {
            if let Some(buf) = st.to_server.pop_front() {
                return Some(buf);
            }
            if st.client_half_closed || st.cancelled {
                return None;
            }
            self.shared.cv.wait(&mut st);
        }
    }

    /// Synchronous multi-part write. Returns `false` if the peer is gone.
    pub fn write(&self, parts: &[Bytes]) -> bool {
        let mut st = self.shared.state.lock();
        if st.cancelled {
            return false;
        }
        st.to_client.push_back(concat(parts));
        self.shared.cv.notify_all();
        true
    }

    /// Tagged write: like [`write`](Self::write) but posts `(tag, ok)` on
    /// the completion queue instead of reporting inline.
    pub fn write_tagged(&self, parts: &[Bytes], tag: Tag, queue: &QueueHandle) {
        let ok = self.write(parts);
        queue.post(tag, ok);
    }

    /// Tagged write followed by an OK-or-given terminal status, as one
    /// batch. Used by the generic byte-stream path.
    pub fn write_and_finish(&self, parts: &[Bytes], status: Status, tag: Tag, queue: &QueueHandle) {
        let ok = {
            let mut st = self.shared.state.lock();
            if st.cancelled {
                false
            } else {
                st.to_client.push_back(concat(parts));
                st.finish = Some((status, Metadata::new()));
                self.shared.cv.notify_all();
                true
            }
        };
        queue.post(tag, ok);
    }

    /// Submit the terminal batch for a typed call and post its completion.
    pub fn finish(&self, batch: FinishBatch, tag: Tag, queue: &QueueHandle) {
        let ok = {
            let mut st = self.shared.state.lock();
            if st.cancelled {
                false
            } else {
                if let Some((md, compression)) = batch.initial_metadata
                    && st.initial_metadata.is_none()
                {
                    st.initial_metadata = Some(md);
                    st.compression = compression;
                }
                if let Some(message) = batch.message {
                    st.to_client.push_back(message);
                }
                st.finish = Some((batch.status, batch.trailing_metadata));
                self.shared.cv.notify_all();
                true
            }
        };
        queue.post(tag, ok);
    }

    /// Whether the client has abandoned the call.
    pub fn is_cancelled(&self) -> bool {
        self.shared.state.lock().cancelled
    }
}

impl Drop for ServerCall {
    fn drop(&mut self) {
        // Dropping the server half without a terminal batch is how the
        // core tears down in-flight calls at shutdown; the client just
        // sees its stream close.
        let mut st = self.shared.state.lock();
        if st.finish.is_none() {
            st.finish = Some((
                Status::unavailable("server closed the call"),
                Metadata::new(),
            ));
            self.shared.cv.notify_all();
        }
    }
}

impl fmt::Debug for ServerCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let st = self.shared.state.lock();
        f.debug_struct("ServerCall")
            .field("cancelled", &st.cancelled)
            .field("finished", &st.finish.is_some())
            .finish()
    }
}

fn concat(parts: &[Bytes]) -> Bytes {
    match parts {
        [] => Bytes::new(),
        [one] => one.clone(),
        many => {
            let len: usize = many.iter().map(|p| p.len()).sum();
            let mut buf = BytesMut::with_capacity(len);
            for part in many {
                buf.extend_from_slice(part);
            }
            buf.freeze()
        }
    }
}

/// A blocking wait ran out of time.
#[derive(Debug, PartialEq, Eq)]
pub struct WaitTimedOut;

impl fmt::Display for WaitTimedOut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timed out waiting for the server")
    }
}

impl std::error::Error for WaitTimedOut {}

/// Client half of one RPC.
///
/// Dropping the handle cancels the call: outstanding and future server
/// ops on it complete with `ok = false`.
pub struct ClientCall {
    shared: Arc<Shared>,
}

impl ClientCall {
    /// Send one message to the server.
    pub fn send(&self, message: Bytes) -> bool {
        let mut st = self.shared.state.lock();
        if st.cancelled || st.client_half_closed || st.finish.is_some() {
            return false;
        }
        st.to_server.push_back(message);
        self.shared.cv.notify_all();
        true
    }

    /// Half-close: no more client messages will follow.
    pub fn close_send(&self) {
        let mut st = self.shared.state.lock();
        st.client_half_closed = true;
        self.shared.cv.notify_all();
    }

    /// Wait for the server's initial metadata.
    pub fn initial_metadata(&self, timeout: Duration) -> Result<Metadata, WaitTimedOut> {
        let mut st = self.shared.state.lock();
        loop {
            if let Some(md) = &st.initial_metadata {
                return Ok(md.clone());
            }
            if st.finish.is_some() {
                // Status-only response: surface empty initial metadata.
                return Ok(Metadata::new());
            }
            if self.shared.cv.wait_for(&mut st, timeout).timed_out() {
                return Err(WaitTimedOut);
            }
        }
    }

    /// Wait for the next server frame. `Ok(None)` once the call has
    /// finished and all frames were consumed.
    pub fn next_message(&self, timeout: Duration) -> Result<Option<Bytes>, WaitTimedOut> {
        let mut st = self.shared.state.lock();
        loop {
            if let Some(buf) = st.to_client.pop_front() {
                return Ok(Some(buf));
            }
            if st.finish.is_some() {
                return Ok(None);
            }
            if self.shared.cv.wait_for(&mut st, timeout).timed_out() {
                return Err(WaitTimedOut);
            }
        }
    }

    /// Wait for the terminal status and trailing metadata.
    pub fn wait_status(&self, timeout: Duration) -> Result<(Status, Metadata), WaitTimedOut> {
        let mut st = self.shared.state.lock();
        loop {
            if let Some((status, trailing)) = &st.finish {
                return Ok((status.clone(), trailing.clone()));
            }
            if self.shared.cv.wait_for(&mut st, timeout).timed_out() {
                return Err(WaitTimedOut);
            }
        }
    }

    /// Abandon the call. Safe to invoke repeatedly; implied by drop.
    pub fn cancel(&self) {
        let mut st = self.shared.state.lock();
        if st.finish.is_none() {
            st.cancelled = true;
        }
        self.shared.cv.notify_all();
    }
}

impl Drop for ClientCall {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CompletionQueue;
    use std::thread;

    const T: Duration = Duration::from_secs(2);

    #[test]
    fn test_client_message_reaches_server_read() {
        let (server, client) = pair();
        assert!(client.send(Bytes::from_static(b"ping")));
        assert_eq!(server.read(), Some(Bytes::from_static(b"ping")));
    }

    #[test]
    fn test_read_returns_none_after_half_close() {
        let (server, client) = pair();
        client.close_send();
        assert_eq!(server.read(), None);
    }

    #[test]
    fn test_read_blocks_until_message() {
        let (server, client) = pair();
        let sender = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            client.send(Bytes::from_static(b"late"));
            client.close_send();
        });
        assert_eq!(server.read(), Some(Bytes::from_static(b"late")));
        drop(server);
        sender.join().unwrap();
    }

    #[test]
    fn test_finish_batch_delivers_message_and_status() {
        let (server, client) = pair();
        let queue = CompletionQueue::new();
        let tag = Tag::new(1, 0);
        server.finish(
            FinishBatch {
                initial_metadata: Some((Metadata::new(), None)),
                message: Some(Bytes::from_static(b"reply")),
                status: Status::ok(),
                trailing_metadata: Metadata::new(),
            },
            tag,
            &queue.handle(),
        );
        assert_eq!(queue.next(), Some((tag, true)));
        assert_eq!(
            client.next_message(T).unwrap(),
            Some(Bytes::from_static(b"reply"))
        );
        assert_eq!(client.next_message(T).unwrap(), None);
        let (status, _) = client.wait_status(T).unwrap();
        assert!(status.is_ok());
    }

    #[test]
    fn test_ops_complete_false_after_cancel() {
        let (server, client) = pair();
        let queue = CompletionQueue::new();
        client.cancel();
        server.write_tagged(&[Bytes::from_static(b"x")], Tag::new(2, 0), &queue.handle());
        assert_eq!(queue.next(), Some((Tag::new(2, 0), false)));
        assert!(!server.write(&[Bytes::from_static(b"y")]));
        assert!(server.is_cancelled());
    }

    #[test]
    fn test_drop_cancels() {
        let (server, client) = pair();
        drop(client);
        assert!(server.is_cancelled());
        assert_eq!(server.read(), None);
    }

    #[test]
    fn test_multi_part_write_arrives_as_one_frame() {
        let (server, client) = pair();
        let parts = [
            Bytes::from_static(b"data: A"),
            Bytes::from_static(b" 0.1 s"),
            Bytes::from_static(b"\n\n"),
        ];
        assert!(server.write(&parts));
        assert_eq!(
            client.next_message(T).unwrap(),
            Some(Bytes::from_static(b"data: A 0.1 s\n\n"))
        );
    }

    #[test]
    fn test_initial_metadata_sent_once() {
        let (server, client) = pair();
        let mut md = Metadata::new();
        md.insert("content-type", "text/event-stream; charset=UTF-8");
        assert!(server.send_initial_metadata(md, None));
        let mut other = Metadata::new();
        other.insert("content-type", "text/html; charset=UTF-8");
        // Second submission is ignored, not an error, at this layer.
        assert!(server.send_initial_metadata(other, None));
        let got = client.initial_metadata(T).unwrap();
        assert_eq!(got.get("content-type"), Some("text/event-stream; charset=UTF-8"));
    }

    #[test]
    fn test_next_message_times_out() {
        let (_server, client) = pair();
        assert_eq!(
            client.next_message(Duration::from_millis(10)),
            Err(WaitTimedOut)
        );
    }
}
