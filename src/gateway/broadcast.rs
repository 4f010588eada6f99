use std::{fmt, sync::Arc};

use parking_lot::Mutex;
use tracing::warn;

use crate::{
    errors::{Error, Result},
    gateway::CancellationToken,
};

/// Handle returned by [`Broadcaster::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Registry<S: ?Sized> {
    next_id: u64,
    closed: bool,
    dispatching: bool,
    // ids taken out of the registry by the running dispatch
    in_flight: Vec<u64>,
    // ids unsubscribed while in flight
    removed: Vec<u64>,
    subscribers: Vec<(u64, Box<S>)>,
}

/// Synchronous fan-out to subscribers, delivered in subscription order.
///
/// Subscribers may unsubscribe, subscribe others or close the broadcaster from inside a
/// delivery. Publishing from inside a delivery is ignored.
pub struct Broadcaster<S: ?Sized> {
    registry: Arc<Mutex<Registry<S>>>,
}

impl<S: ?Sized> Clone for Broadcaster<S> {
    fn clone(&self) -> Self {
        Self {
            registry: self.registry.clone(),
        }
    }
}

impl<S: ?Sized> Default for Broadcaster<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: ?Sized> fmt::Debug for Broadcaster<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.registry.lock();
        f.debug_struct("Broadcaster")
            .field("subscribers", &(registry.subscribers.len() + registry.in_flight.len()))
            .field("closed", &registry.closed)
            .finish()
    }
}

impl<S: ?Sized> Broadcaster<S> {
    /// Creates an open broadcaster with no subscribers.
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry {
                next_id: 0,
                closed: false,
                dispatching: false,
                in_flight: Vec::new(),
                removed: Vec::new(),
                subscribers: Vec::new(),
            })),
        }
    }

    /// Adds a subscriber at the end of the delivery order.
    pub fn subscribe(&self, subscriber: Box<S>) -> Result<SubscriptionId> {
        let mut registry = self.registry.lock();
        if registry.closed {
            return Err(Error::Cancelled);
        }
        registry.next_id += 1;
        let id = registry.next_id;
        registry.subscribers.push((id, subscriber));
        Ok(SubscriptionId(id))
    }

    /// Removes a subscriber. Returns `false` if it was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut registry = self.registry.lock();
        if let Some(index) = registry.subscribers.iter().position(|(sid, _)| *sid == id.0) {
            let removed = registry.subscribers.remove(index);
            drop(registry);
            drop(removed);
            return true;
        }
        if registry.in_flight.contains(&id.0) && !registry.removed.contains(&id.0) {
            registry.removed.push(id.0);
            return true;
        }
        false
    }

    /// Drops every subscriber and refuses new ones. Idempotent.
    pub fn close(&self) {
        let dropped = {
            let mut registry = self.registry.lock();
            registry.closed = true;
            std::mem::take(&mut registry.subscribers)
        };
        drop(dropped);
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.registry.lock().closed
    }

    /// Number of live subscribers.
    pub fn len(&self) -> usize {
        let registry = self.registry.lock();
        registry.subscribers.len() + registry.in_flight.len() - registry.removed.len()
    }

    /// Whether nobody is subscribed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Delivers to every subscriber in order and returns how many were reached.
    ///
    /// Delivery stops as soon as the broadcaster is closed, even halfway through. A subscriber
    /// that panics does not stop later publishes.
    pub fn publish<F>(&self, mut deliver: F) -> usize
    where
        F: FnMut(&mut S),
    {
        let mut dispatch = {
            let mut registry = self.registry.lock();
            if registry.closed {
                return 0;
            }
            if registry.dispatching {
                warn!("re-entrant publish ignored");
                return 0;
            }
            registry.dispatching = true;
            let taken = std::mem::take(&mut registry.subscribers);
            registry.in_flight = taken.iter().map(|(id, _)| *id).collect();
            Dispatch {
                registry: &self.registry,
                taken,
            }
        };

        let mut delivered = 0;
        for (id, subscriber) in dispatch.taken.iter_mut() {
            {
                let registry = self.registry.lock();
                if registry.closed {
                    break;
                }
                if registry.removed.contains(id) {
                    continue;
                }
            }
            deliver(subscriber.as_mut());
            delivered += 1;
        }
        delivered
    }
}

// Puts the subscribers taken by a dispatch back, also when a subscriber unwinds.
struct Dispatch<'a, S: ?Sized> {
    registry: &'a Mutex<Registry<S>>,
    taken: Vec<(u64, Box<S>)>,
}

impl<S: ?Sized> Drop for Dispatch<'_, S> {
    fn drop(&mut self) {
        let taken = std::mem::take(&mut self.taken);
        let mut registry = self.registry.lock();
        registry.dispatching = false;
        registry.in_flight.clear();
        let removed = std::mem::take(&mut registry.removed);
        if registry.closed {
            drop(registry);
            drop(taken);
            return;
        }
        let (mut kept, dropped): (Vec<_>, Vec<_>) = taken.into_iter().partition(|(id, _)| !removed.contains(id));
        kept.append(&mut registry.subscribers);
        registry.subscribers = kept;
        drop(registry);
        drop(dropped);
    }
}

impl<S: ?Sized + Send + 'static> Broadcaster<S> {
    /// Closes the broadcaster when `token` fires.
    pub fn take_until(&self, token: &CancellationToken) {
        let broadcaster = self.clone();
        token.on_cancel(move || broadcaster.close());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    type Listener = dyn FnMut(u32) + Send;

    fn counting(log: &Arc<Mutex<Vec<(usize, u32)>>>, tag: usize) -> Box<Listener> {
        let log = log.clone();
        Box::new(move |value| log.lock().push((tag, value)))
    }

    #[test]
    fn delivers_in_subscription_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let broadcaster: Broadcaster<Listener> = Broadcaster::new();
        for tag in 0..3 {
            broadcaster.subscribe(counting(&log, tag)).unwrap();
        }

        assert_eq!(broadcaster.publish(|listener| listener(7)), 3);
        assert_eq!(*log.lock(), vec![(0, 7), (1, 7), (2, 7)]);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let broadcaster: Broadcaster<Listener> = Broadcaster::new();
        let first = broadcaster.subscribe(counting(&log, 0)).unwrap();
        broadcaster.subscribe(counting(&log, 1)).unwrap();

        assert!(broadcaster.unsubscribe(first));
        assert!(!broadcaster.unsubscribe(first));
        broadcaster.publish(|listener| listener(1));
        assert_eq!(*log.lock(), vec![(1, 1)]);
        assert_eq!(broadcaster.len(), 1);
    }

    #[test]
    fn unsubscribe_during_dispatch() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let broadcaster: Broadcaster<Listener> = Broadcaster::new();
        let second = Arc::new(Mutex::new(None));

        let handle = broadcaster.clone();
        let target = second.clone();
        broadcaster
            .subscribe(Box::new(move |_| {
                if let Some(id) = *target.lock() {
                    handle.unsubscribe(id);
                }
            }))
            .unwrap();
        *second.lock() = Some(broadcaster.subscribe(counting(&log, 1)).unwrap());

        assert_eq!(broadcaster.publish(|listener| listener(1)), 1);
        assert!(log.lock().is_empty());
        assert_eq!(broadcaster.len(), 1);
    }

    #[test]
    fn cancellation_closes_mid_dispatch() {
        let token = CancellationToken::new();
        let broadcaster: Broadcaster<Listener> = Broadcaster::new();
        broadcaster.take_until(&token);

        let calls = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let calls = calls.clone();
            let token = token.clone();
            broadcaster
                .subscribe(Box::new(move |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    token.cancel();
                }))
                .unwrap();
        }

        assert_eq!(broadcaster.publish(|listener| listener(0)), 1);
        assert_eq!(broadcaster.publish(|listener| listener(0)), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(broadcaster.is_closed());
        assert!(broadcaster.is_empty());
        assert!(broadcaster.subscribe(Box::new(|_| {})).is_err());
    }

    #[test]
    fn reentrant_publish_ignored() {
        let broadcaster: Broadcaster<Listener> = Broadcaster::new();
        let inner = broadcaster.clone();
        let nested = Arc::new(AtomicUsize::new(usize::MAX));
        let seen = nested.clone();
        broadcaster
            .subscribe(Box::new(move |_| {
                seen.store(inner.publish(|listener| listener(1)), Ordering::SeqCst);
            }))
            .unwrap();

        assert_eq!(broadcaster.publish(|listener| listener(0)), 1);
        assert_eq!(nested.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn panicking_subscriber_keeps_broadcaster_usable() {
        let broadcaster: Broadcaster<Listener> = Broadcaster::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        broadcaster
            .subscribe(Box::new(|value: u32| {
                if value == 1 {
                    panic!("bad value");
                }
            }))
            .unwrap();
        broadcaster.subscribe(counting(&log, 2)).unwrap();

        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            broadcaster.publish(|listener| listener(1))
        }));
        assert!(outcome.is_err());
        assert_eq!(broadcaster.len(), 2);

        assert_eq!(broadcaster.publish(|listener| listener(2)), 2);
        assert_eq!(*log.lock(), vec![(2, 2)]);
    }
}
