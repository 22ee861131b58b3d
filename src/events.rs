//! The context event queue
//!
//! The render thread enqueues user callbacks (`onended`, `onstart`,
//! `oncomplete`); a user-visible thread drains them through
//! `dispatch_events` on the context. Per-node ordering is preserved by the
//! FIFO channel.

use crossbeam_channel::{self, Receiver, Sender};

pub(crate) type EventCallback = Box<dyn FnOnce() + Send + 'static>;

pub(crate) struct EventQueue {
    receiver: Receiver<EventCallback>,
}

impl EventQueue {
    pub fn new() -> (Sender<EventCallback>, Self) {
        let (sender, receiver) = crossbeam_channel::unbounded();
        (sender, Self { receiver })
    }

    /// Run all queued callbacks, returns the number dispatched
    pub fn dispatch(&self) -> usize {
        let mut count = 0;
        while let Ok(callback) = self.receiver.try_recv() {
            callback();
            count += 1;
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_dispatch_in_order() {
        let (sender, queue) = EventQueue::new();

        let log = Arc::new(AtomicUsize::new(0));
        for i in 1..=3 {
            let log = Arc::clone(&log);
            sender
                .send(Box::new(move || {
                    // each callback observes the previous one has run
                    assert_eq!(log.swap(i, Ordering::SeqCst), i - 1);
                }))
                .unwrap();
        }

        assert_eq!(queue.dispatch(), 3);
        assert_eq!(log.load(Ordering::SeqCst), 3);
        assert_eq!(queue.dispatch(), 0);
    }
}
