//! Observer fan-out for the connection-state record.
//!
//! The hub owns the current [`ConnectionState`] and a registry of observer
//! queues. Every change replaces the record and pushes a full snapshot to
//! each observer; new observers get the current snapshot on subscribe.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, trace};

use chatlink_protocol::ConnectionState;

use crate::types::OBSERVER_QUEUE_SIZE;

/// Identifier of a registered observer.
pub type ObserverId = u64;

/// A registered observer's end of the fan-out.
///
/// Dropping it closes the queue; the hub prunes it on the next publish.
pub struct Subscription {
    pub id: ObserverId,
    rx: mpsc::Receiver<ConnectionState>,
}

impl Subscription {
    /// Waits for the next snapshot. `None` once the hub is gone.
    pub async fn recv(&mut self) -> Option<ConnectionState> {
        self.rx.recv().await
    }

    /// Returns a queued snapshot without waiting.
    pub fn try_recv(&mut self) -> Option<ConnectionState> {
        self.rx.try_recv().ok()
    }
}

struct HubInner {
    current: ConnectionState,
    observers: HashMap<ObserverId, mpsc::Sender<ConnectionState>>,
    next_id: ObserverId,
}

impl HubInner {
    /// Sends the current record to every observer. Closed queues are
    /// dropped, full queues skip this snapshot.
    fn fan_out(&mut self) {
        let current = &self.current;
        self.observers
            .retain(|id, tx| match tx.try_send(current.clone()) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    trace!(observer = id, "observer queue full, skipping snapshot");
                    true
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(observer = id, "observer gone, pruning");
                    false
                }
            });
    }
}

/// Holds the connection-state record and publishes it to observers.
pub struct BroadcastHub {
    inner: Mutex<HubInner>,
    queue_size: usize,
}

impl BroadcastHub {
    pub fn new(initial: ConnectionState) -> Self {
        Self::with_queue_size(initial, OBSERVER_QUEUE_SIZE)
    }

    pub fn with_queue_size(initial: ConnectionState, queue_size: usize) -> Self {
        Self {
            inner: Mutex::new(HubInner {
                current: initial,
                observers: HashMap::new(),
                next_id: 1,
            }),
            queue_size: queue_size.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HubInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers an observer and queues the current snapshot for it.
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::channel(self.queue_size);
        let mut inner = self.lock();
        // A fresh queue always has room for the first snapshot.
        let _ = tx.try_send(inner.current.clone());
        let id = inner.next_id;
        inner.next_id += 1;
        inner.observers.insert(id, tx);
        debug!(observer = id, observers = inner.observers.len(), "observer subscribed");
        Subscription { id, rx }
    }

    /// Removes an observer. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        let removed = self.lock().observers.remove(&id).is_some();
        if removed {
            debug!(observer = id, "observer unsubscribed");
        }
        removed
    }

    /// Replaces the record and publishes it.
    pub fn publish(&self, state: ConnectionState) {
        let mut inner = self.lock();
        inner.current = state;
        inner.fan_out();
    }

    /// Merges a change into the record, publishes it and returns the result.
    pub fn update<F>(&self, change: F) -> ConnectionState
    where
        F: FnOnce(&mut ConnectionState),
    {
        let mut inner = self.lock();
        change(&mut inner.current);
        inner.fan_out();
        inner.current.clone()
    }

    pub fn snapshot(&self) -> ConnectionState {
        self.lock().current.clone()
    }

    pub fn observer_count(&self) -> usize {
        self.lock().observers.len()
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new(ConnectionState::default())
    }
}
