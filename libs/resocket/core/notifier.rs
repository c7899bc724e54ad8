//! Typed publish/subscribe
//!
//! Every subscriber gets its own unbounded crossbeam channel, so a slow
//! consumer never blocks the engine task. Receivers that have been dropped
//! are pruned on the next publish.

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;

pub struct EventNotifier<E: Clone> {
    subscribers: Mutex<Vec<Sender<E>>>,
}

impl<E: Clone> EventNotifier<E> {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Register a new subscriber
    ///
    /// Only events published after this call are delivered.
    pub fn subscribe(&self) -> Receiver<E> {
        let (tx, rx) = unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Deliver an event to every live subscriber, in subscription order
    pub fn publish(&self, event: E) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

impl<E: Clone> Default for EventNotifier<E> {
    fn default() -> Self {
        Self::new()
    }
}
