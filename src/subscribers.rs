//! Change-listener registry with per-listener panic isolation.

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Unique identifier for a registered listener.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriberId(pub u64);

impl fmt::Debug for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SubscriberId({})", self.0)
    }
}

/// Listener callback invoked with each post-mutation snapshot.
pub type Listener<S> = dyn Fn(&S) + Send + Sync;

/// Deduplicated set of change listeners, generic over the published state.
///
/// Registering the same `Arc` twice is a no-op returning the original id.
/// Listeners are invoked in registration order; one that panics is logged
/// and skipped without affecting the others.
pub struct SubscriberRegistry<S> {
    /// Registered listeners by id. BTreeMap keeps notify order stable.
    listeners: RwLock<BTreeMap<SubscriberId, Arc<Listener<S>>>>,
    /// Counter for generating subscriber ids.
    next_id: AtomicU64,
}

impl<S> SubscriberRegistry<S> {
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a listener, returning its id. An `Arc` that is already
    /// registered keeps its existing id and is not added again.
    pub fn subscribe(&self, listener: Arc<Listener<S>>) -> SubscriberId {
        let mut listeners = self.listeners.write();

        if let Some(id) = listeners
            .iter()
            .find(|(_, existing)| Arc::ptr_eq(existing, &listener))
            .map(|(id, _)| *id)
        {
            return id;
        }

        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::SeqCst));
        listeners.insert(id, listener);
        id
    }

    /// Remove a listener. Returns whether it was registered.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.listeners.write().remove(&id).is_some()
    }

    /// Number of registered listeners.
    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }

    /// Invoke every listener with `state`, in registration order.
    ///
    /// Listeners run outside the registry lock so they can subscribe or
    /// unsubscribe re-entrantly. Each call is isolated: a panic is logged
    /// and the remaining listeners still run.
    pub fn notify(&self, state: &S) {
        let listeners: Vec<(SubscriberId, Arc<Listener<S>>)> = self
            .listeners
            .read()
            .iter()
            .map(|(id, listener)| (*id, Arc::clone(listener)))
            .collect();

        for (id, listener) in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(state))).is_err() {
                warn!("listener {} panicked during notify", id.0);
            }
        }
    }
}

impl<S> Default for SubscriberRegistry<S> {
    fn default() -> Self {
        Self::new()
    }
}
