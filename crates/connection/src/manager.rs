//! Connection manager driving the link lifecycle.
//!
//! Opens links through a [`Connector`], consumes their lifecycle events,
//! classifies closures, drives the [`ReconnectScheduler`] and publishes every
//! transition through the [`BroadcastHub`].

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use chatlink_protocol::{ConnectionState, DisconnectReason, Phase};

use crate::auth::{AuthError, AuthStore};
use crate::hub::BroadcastHub;
use crate::link::{Connector, Disconnect, Link, LinkError, LinkEvent};
use crate::qr;
use crate::reconnection::ReconnectScheduler;
use crate::types::{ReconnectPolicy, origin};

/// Errors from starting a connection attempt.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("failed to load credentials: {0}")]
    Credentials(#[from] AuthError),

    #[error("failed to open link: {0}")]
    Link(#[from] LinkError),
}

/// The link currently owned by the manager.
struct ActiveLink {
    generation: u64,
    link: Box<dyn Link>,
    pump: JoinHandle<()>,
}

/// Owns the link and the connection-state transitions.
pub struct ConnectionManager {
    connector: Arc<dyn Connector>,
    auth: AuthStore,
    hub: Arc<BroadcastHub>,
    scheduler: ReconnectScheduler,
    policy: ReconnectPolicy,
    /// Serializes `start`, detaching and event handling.
    link: Mutex<Option<ActiveLink>>,
    /// Bumped whenever the active link is replaced or detached, always
    /// while holding `link`. Events tagged with an older value are dropped.
    generation: AtomicU64,
}

impl ConnectionManager {
    /// Creates a manager in the `starting` state. Nothing is opened until
    /// [`start`](Self::start) is called.
    pub fn new(
        connector: Arc<dyn Connector>,
        auth: AuthStore,
        policy: ReconnectPolicy,
    ) -> Arc<Self> {
        let hub = Arc::new(BroadcastHub::new(ConnectionState::default()));
        let scheduler = ReconnectScheduler::new(Arc::clone(&hub), policy.delay);
        Arc::new(Self {
            connector,
            auth,
            hub,
            scheduler,
            policy,
            link: Mutex::new(None),
            generation: AtomicU64::new(0),
        })
    }

    pub fn hub(&self) -> &Arc<BroadcastHub> {
        &self.hub
    }

    pub fn auth(&self) -> &AuthStore {
        &self.auth
    }

    /// Current connection state.
    pub fn snapshot(&self) -> ConnectionState {
        self.hub.snapshot()
    }

    pub fn is_open(&self) -> bool {
        self.hub.snapshot().state == Phase::Open
    }

    pub fn is_reconnect_pending(&self) -> bool {
        self.scheduler.is_pending()
    }

    /// Cancels a pending retry. Returns `true` if one was pending.
    pub fn cancel_reconnect(&self) -> bool {
        self.scheduler.cancel()
    }

    /// Opens a new link.
    ///
    /// Supersedes any pending retry and any previous link. Publishes
    /// `connecting` before opening; credential or open failures are
    /// returned to the caller with the state left at `connecting`.
    pub async fn start(self: &Arc<Self>, origin: &str) -> Result<(), ConnectionError> {
        let mut slot = self.link.lock().await;
        // Under the link lock: the event pump only schedules while holding it.
        self.scheduler.cancel();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(previous) = slot.take() {
            debug!(generation = previous.generation, "replacing previous link");
            previous.pump.abort();
            previous.link.end("superseded by a new connection attempt");
        }

        self.hub.update(ConnectionState::set_connecting);
        info!(origin, session_dir = %self.auth.dir().display(), "starting connection");

        let creds = self.auth.load().await?;
        let opened = self.connector.open(creds).await?;

        let pump = tokio::spawn(Arc::clone(self).event_pump(generation, opened.events));
        *slot = Some(ActiveLink {
            generation,
            link: opened.link,
            pump,
        });
        Ok(())
    }

    /// Runs [`start`](Self::start) from an event-driven context.
    ///
    /// A failure becomes a `close` transition carrying the error and a retry
    /// is scheduled. Returns whether the link was opened.
    pub async fn start_or_retry(self: &Arc<Self>, origin: &str) -> bool {
        match self.start(origin).await {
            Ok(()) => true,
            Err(e) => {
                error!(origin, error = %e, "connection attempt failed");
                self.close_with(None, e.to_string(), true);
                false
            }
        }
    }

    /// Takes the active link away from the manager without changing state.
    ///
    /// Events it emits afterwards are ignored.
    pub async fn detach(&self) -> Option<Box<dyn Link>> {
        let mut slot = self.link.lock().await;
        self.generation.fetch_add(1, Ordering::SeqCst);
        slot.take().map(|active| {
            active.pump.abort();
            debug!(generation = active.generation, "link detached");
            active.link
        })
    }

    /// Publishes the `session-reset` phase.
    pub fn mark_session_reset(&self) {
        self.hub.update(ConnectionState::set_session_reset);
    }

    /// Cancels retries and ends the active link.
    pub async fn shutdown(&self) {
        self.scheduler.cancel();
        if let Some(link) = self.detach().await {
            link.end("shutting down");
        }
        info!("connection manager shut down");
    }

    /// Consumes one link's events in order.
    async fn event_pump(self: Arc<Self>, generation: u64, mut events: mpsc::Receiver<LinkEvent>) {
        while let Some(event) = events.recv().await {
            let _slot = self.link.lock().await;
            if self.generation.load(Ordering::SeqCst) != generation {
                debug!(generation, "dropping event from superseded link");
                return;
            }
            self.handle_event(event).await;
        }

        // The link went away without reporting a closure.
        let _slot = self.link.lock().await;
        if self.generation.load(Ordering::SeqCst) == generation
            && self.hub.snapshot().state != Phase::Close
        {
            warn!(generation, "link event stream ended unexpectedly");
            self.handle_event(LinkEvent::Closed(Some(Disconnect::from(
                DisconnectReason::ConnectionLost,
            ))))
            .await;
        }
    }

    async fn handle_event(self: &Arc<Self>, event: LinkEvent) {
        match event {
            LinkEvent::Qr(raw) => match qr::encode_data_url_blocking(raw).await {
                Ok(url) => {
                    self.hub.update(|s| s.set_qr(url));
                    info!(event = "qr", "pairing QR issued");
                }
                Err(e) => {
                    warn!(error = %e, "failed to render pairing QR");
                    self.close_with(None, e.to_string(), true);
                }
            },
            LinkEvent::Opened => {
                self.scheduler.cancel();
                self.hub.update(ConnectionState::set_open);
                info!(event = "open", "connection open");
            }
            LinkEvent::Closed(disconnect) => {
                let status_code = disconnect.as_ref().and_then(|d| d.status_code);
                let reason = disconnect
                    .map(|d| d.to_string())
                    .unwrap_or_else(|| "unknown".into());
                let retry = self.policy.should_retry(status_code);
                self.close_with(status_code, reason, retry);
            }
            LinkEvent::CredentialsUpdated(creds) => {
                if let Err(e) = self.auth.save(&creds).await {
                    warn!(error = %e, "failed to persist credentials");
                }
            }
        }
    }

    /// Publishes a `close` transition and schedules a retry if asked.
    fn close_with(self: &Arc<Self>, status_code: Option<u16>, reason: String, retry: bool) {
        self.hub.update(|s| s.set_closed(status_code, reason));
        warn!(
            event = "close",
            status_code = ?status_code,
            should_reconnect = retry,
            "connection closed"
        );

        if retry {
            let manager = Arc::clone(self);
            self.scheduler.schedule(move || async move {
                manager.start_or_retry(origin::BACKOFF_RETRY).await;
            });
        }
    }
}
