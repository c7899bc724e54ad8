//! Platform Signals
//!
//! Environment hints that the connection may have silently died: the
//! application regained focus, or the network came back (or went away).
//! Each signal triggers an opportunistic heartbeat ping when the session
//! can enter `ping`.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlatformSignal {
    Focus,
    Online,
    Offline,
}

impl PlatformSignal {
    pub fn is_network(&self) -> bool {
        matches!(self, PlatformSignal::Online | PlatformSignal::Offline)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

pub type PlatformCallback = Arc<dyn Fn(PlatformSignal) + Send + Sync>;

/// Capability for observing platform signals
///
/// The session subscribes while it is active and unsubscribes on entering
/// `failed`, `closed` or `stopped`.
pub trait PlatformNotifier: Send + Sync {
    fn subscribe(&self, callback: PlatformCallback) -> SubscriptionId;

    fn unsubscribe(&self, id: SubscriptionId);
}

/// Notifier driven by the application itself
///
/// Call [`notify`](Self::notify) from wherever focus or connectivity changes
/// are observed.
#[derive(Default)]
pub struct ManualPlatformNotifier {
    next_id: AtomicU64,
    callbacks: Mutex<HashMap<u64, PlatformCallback>>,
}

impl ManualPlatformNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver a signal to every current subscriber
    pub fn notify(&self, signal: PlatformSignal) {
        // Clone out so a callback may (un)subscribe without deadlocking
        let callbacks: Vec<PlatformCallback> = self.callbacks.lock().values().cloned().collect();
        for callback in callbacks {
            callback(signal);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.callbacks.lock().len()
    }
}

impl PlatformNotifier for ManualPlatformNotifier {
    fn subscribe(&self, callback: PlatformCallback) -> SubscriptionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.callbacks.lock().insert(id, callback);
        SubscriptionId(id)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.callbacks.lock().remove(&id.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_manual_notifier_subscribe_unsubscribe() {
        let notifier = ManualPlatformNotifier::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = hits.clone();
        let id = notifier.subscribe(Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(notifier.subscriber_count(), 1);

        notifier.notify(PlatformSignal::Focus);
        notifier.notify(PlatformSignal::Online);
        assert_eq!(hits.load(Ordering::SeqCst), 2);

        notifier.unsubscribe(id);
        notifier.notify(PlatformSignal::Offline);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(notifier.subscriber_count(), 0);
    }

    #[test]
    fn test_is_network() {
        assert!(!PlatformSignal::Focus.is_network());
        assert!(PlatformSignal::Online.is_network());
        assert!(PlatformSignal::Offline.is_network());
    }
}
