//! Blocking completion queue.
//!
//! Multi-producer, single-consumer queue of `(tag, ok)` events. The
//! transport posts request-arrival and write completions, the fan-out
//! mailbox posts simulated publish events, and exactly one dispatcher
//! thread drains everything with [`CompletionQueue::next`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam_channel::{Receiver, Sender, unbounded};

use crate::tag::Tag;

enum Event {
    Completion(Tag, bool),
    /// Unblocks a `next()` call so it can observe the shutdown flag.
    Wake,
}

/// The consumer half of the completion queue.
///
/// `next()` blocks until an event is available. After [`shutdown`] has been
/// called, already-posted events are still drained in order; `next()`
/// returns `None` once the queue is empty, which is the dispatcher's signal
/// to exit.
///
/// [`shutdown`]: CompletionQueue::shutdown
pub struct CompletionQueue {
    rx: Receiver<Event>,
    handle: QueueHandle,
}

/// Clonable producer half of a [`CompletionQueue`].
#[derive(Clone)]
pub struct QueueHandle {
    tx: Sender<Event>,
    shutdown: Arc<AtomicBool>,
}

impl CompletionQueue {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self {
            rx,
            handle: QueueHandle {
                tx,
                shutdown: Arc::new(AtomicBool::new(false)),
            },
        }
    }

    /// Get a producer handle for posting events.
    pub fn handle(&self) -> QueueHandle {
        self.handle.clone()
    }

    /// Block until the next event, or `None` once shut down and drained.
    pub fn next(&self) -> Option<(Tag, bool)> {
        loop {
            if self.handle.shutdown.load(Ordering::Acquire) {
                // Drain-only mode: never block again.
                return match self.rx.try_recv() {
                    Ok(Event::Completion(tag, ok)) => Some((tag, ok)),
                    Ok(Event::Wake) => continue,
                    Err(_) => None,
                };
            }
            match self.rx.recv() {
                Ok(Event::Completion(tag, ok)) => return Some((tag, ok)),
                Ok(Event::Wake) => continue,
                // All producer handles dropped; nothing can arrive anymore.
                Err(_) => return None,
            }
        }
    }

    /// Begin shutdown. Pending events remain retrievable via `next()`.
    pub fn shutdown(&self) {
        self.handle.shutdown();
    }
}

impl Default for CompletionQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl QueueHandle {
    /// Post a completion event. Silently dropped if the consumer is gone.
    pub fn post(&self, tag: Tag, ok: bool) {
        let _ = self.tx.send(Event::Completion(tag, ok));
    }

    /// Flip the queue into drain-only mode and wake a blocked `next()`.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
        let _ = self.tx.send(Event::Wake);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_post_then_next() {
        let queue = CompletionQueue::new();
        let handle = queue.handle();
        handle.post(Tag::new(1, 0), true);
        handle.post(Tag::new(2, 0), false);
        assert_eq!(queue.next(), Some((Tag::new(1, 0), true)));
        assert_eq!(queue.next(), Some((Tag::new(2, 0), false)));
    }

    #[test]
    fn test_next_blocks_until_posted() {
        let queue = CompletionQueue::new();
        let handle = queue.handle();
        let poster = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            handle.post(Tag::new(9, 0), true);
        });
        assert_eq!(queue.next(), Some((Tag::new(9, 0), true)));
        poster.join().unwrap();
    }

    #[test]
    fn test_shutdown_drains_then_ends() {
        let queue = CompletionQueue::new();
        let handle = queue.handle();
        handle.post(Tag::new(1, 0), true);
        queue.shutdown();
        handle.post(Tag::new(2, 0), false);
        assert_eq!(queue.next(), Some((Tag::new(1, 0), true)));
        assert_eq!(queue.next(), Some((Tag::new(2, 0), false)));
        assert_eq!(queue.next(), None);
    }

    #[test]
    fn test_shutdown_wakes_blocked_consumer() {
        let queue = CompletionQueue::new();
        let handle = queue.handle();
        let waker = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            handle.shutdown();
        });
        assert_eq!(queue.next(), None);
        waker.join().unwrap();
    }

    #[test]
    fn test_many_producers_one_consumer() {
        let queue = CompletionQueue::new();
        let mut posters = Vec::new();
        for i in 0..8u32 {
            let handle = queue.handle();
            posters.push(thread::spawn(move || {
                for j in 0..100u32 {
                    handle.post(Tag::new(i * 100 + j, 0), true);
                }
            }));
        }
        for p in posters {
            p.join().unwrap();
        }
        queue.shutdown();
        let mut seen = 0;
        while queue.next().is_some() {
            seen += 1;
        }
        assert_eq!(seen, 800);
    }
}
