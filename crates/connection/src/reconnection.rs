//! Fixed-delay reconnect scheduling.
//!
//! At most one retry timer exists at a time. Scheduling while a timer is
//! pending is a no-op, so concurrent close events cannot stack retries.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::hub::BroadcastHub;

/// Handle of the single pending retry.
struct PendingRetry {
    id: u64,
    at: DateTime<Utc>,
    cancel: CancellationToken,
}

/// Owns the pending retry timer and mirrors it into `reconnectAt`.
pub struct ReconnectScheduler {
    hub: Arc<BroadcastHub>,
    delay: Duration,
    pending: Arc<Mutex<Option<PendingRetry>>>,
    next_id: AtomicU64,
}

fn lock(pending: &Mutex<Option<PendingRetry>>) -> MutexGuard<'_, Option<PendingRetry>> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ReconnectScheduler {
    pub fn new(hub: Arc<BroadcastHub>, delay: Duration) -> Self {
        Self {
            hub,
            delay,
            pending: Arc::new(Mutex::new(None)),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn is_pending(&self) -> bool {
        lock(&self.pending).is_some()
    }

    /// When the pending retry fires, if any.
    pub fn reconnect_at(&self) -> Option<DateTime<Utc>> {
        lock(&self.pending).as_ref().map(|p| p.at)
    }

    /// Arms the retry timer unless one is already pending.
    ///
    /// Publishes `reconnectAt` before returning. When the timer fires the
    /// handle and `reconnectAt` are cleared, then `fire` runs. Returns
    /// `true` if a new timer was armed.
    pub fn schedule<F, Fut>(&self, fire: F) -> bool
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut guard = lock(&self.pending);
        if let Some(existing) = guard.as_ref() {
            debug!(reconnect_at = %existing.at, "reconnect already scheduled");
            return false;
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let now = Utc::now();
        let at = TimeDelta::from_std(self.delay)
            .ok()
            .and_then(|d| now.checked_add_signed(d))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let cancel = CancellationToken::new();
        *guard = Some(PendingRetry {
            id,
            at,
            cancel: cancel.clone(),
        });
        self.hub.update(|s| s.reconnect_at = Some(at));

        warn!(
            reconnect_at = %at,
            delay_ms = self.delay.as_millis() as u64,
            "scheduling reconnect"
        );

        let pending = Arc::clone(&self.pending);
        let hub = Arc::clone(&self.hub);
        let delay = self.delay;
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(timer = id, "reconnect timer cancelled");
                    return;
                }
                _ = tokio::time::sleep(delay) => {}
            }

            {
                let mut guard = lock(&pending);
                let ours = guard.as_ref().is_some_and(|p| p.id == id);
                if !ours {
                    debug!(timer = id, "stale reconnect timer, ignoring");
                    return;
                }
                *guard = None;
                hub.update(|s| s.reconnect_at = None);
            }

            info!(timer = id, "reconnect timer fired");
            fire().await;
        });

        true
    }

    /// Cancels the pending timer and clears `reconnectAt`.
    ///
    /// Returns `false` (and publishes nothing) when no timer is pending.
    pub fn cancel(&self) -> bool {
        let mut guard = lock(&self.pending);
        let Some(retry) = guard.take() else {
            return false;
        };
        retry.cancel.cancel();
        self.hub.update(|s| s.reconnect_at = None);
        debug!(timer = retry.id, "pending reconnect cancelled");
        true
    }
}
