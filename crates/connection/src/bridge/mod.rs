//! WebSocket link to the messaging sidecar.
//!
//! The sidecar runs the messaging protocol and reports lifecycle frames
//! ([`SidecarFrame`](chatlink_protocol::bridge::SidecarFrame)). This module
//! turns them into [`LinkEvent`]s and implements logout as a correlated
//! request.

mod pumps;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio_tungstenite::tungstenite;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use chatlink_protocol::bridge::BridgeCommand;

use crate::link::{Connector, Link, LinkError, LinkEvent, LinkFuture, OpenedLink};

/// Largest frame accepted from the sidecar.
pub const MAX_MESSAGE_SIZE: usize = 1 << 20;

/// Interval between keepalive pings.
pub const PING_PERIOD: Duration = Duration::from_secs(30);

/// The link is considered dead when nothing arrives for this long.
pub const PONG_WAIT: Duration = Duration::from_secs(60);

/// How long `logout` waits for the sidecar to confirm.
pub const LOGOUT_TIMEOUT: Duration = Duration::from_secs(10);

const EVENT_BUFFER: usize = 32;
const WRITE_BUFFER: usize = 64;

/// Logout requests awaiting a `logoutResult`, keyed by request id.
pub(crate) type PendingLogouts = Arc<Mutex<HashMap<String, oneshot::Sender<Result<(), String>>>>>;

/// Opens [`BridgeLink`]s to a sidecar URL.
#[derive(Debug, Clone)]
pub struct BridgeConnector {
    url: String,
}

impl BridgeConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Connector for BridgeConnector {
    fn open(&self, creds: Option<Value>) -> LinkFuture<'_, Result<OpenedLink, LinkError>> {
        Box::pin(BridgeLink::connect(&self.url, creds))
    }
}

/// A live WebSocket connection to the sidecar.
pub struct BridgeLink {
    write_tx: mpsc::Sender<tungstenite::Message>,
    pending: PendingLogouts,
    cancel: CancellationToken,
    read_handle: tokio::task::JoinHandle<()>,
    write_handle: tokio::task::JoinHandle<()>,
}

impl BridgeLink {
    /// Connects, starts the pumps and sends `hello` with the stored
    /// credentials.
    pub async fn connect(url: &str, creds: Option<Value>) -> Result<OpenedLink, LinkError> {
        let mut ws_config = WebSocketConfig::default();
        ws_config.max_message_size = Some(MAX_MESSAGE_SIZE);
        ws_config.max_frame_size = Some(MAX_MESSAGE_SIZE);
        let (ws_stream, _) =
            tokio_tungstenite::connect_async_with_config(url, Some(ws_config), false).await?;

        let (write, read) = futures_util::StreamExt::split(ws_stream);
        let (write_tx, write_rx) = mpsc::channel(WRITE_BUFFER);
        let (events_tx, events_rx) = mpsc::channel::<LinkEvent>(EVENT_BUFFER);
        let pending = PendingLogouts::default();
        let cancel = CancellationToken::new();

        let write_handle = tokio::spawn(pumps::write_pump(write, write_rx, cancel.clone()));
        let read_handle = tokio::spawn(pumps::read_pump(
            read,
            events_tx,
            pending.clone(),
            write_tx.clone(),
            cancel.clone(),
        ));

        let link = BridgeLink {
            write_tx,
            pending,
            cancel,
            read_handle,
            write_handle,
        };

        let resuming = creds.is_some();
        link.send(&BridgeCommand::Hello { creds }).await?;
        info!(url, resuming, "bridge link established");

        Ok(OpenedLink {
            link: Box::new(link),
            events: events_rx,
        })
    }

    async fn send(&self, command: &BridgeCommand) -> Result<(), LinkError> {
        let json = serde_json::to_string(command)?;
        self.write_tx
            .send(tungstenite::Message::Text(json.into()))
            .await
            .map_err(|_| LinkError::Closed)
    }
}

impl Link for BridgeLink {
    fn logout(&self) -> LinkFuture<'_, Result<(), LinkError>> {
        Box::pin(async move {
            let id = uuid::Uuid::new_v4().to_string();
            let (tx, rx) = oneshot::channel();
            self.pending.lock().await.insert(id.clone(), tx);

            if let Err(e) = self.send(&BridgeCommand::Logout { id: id.clone() }).await {
                self.pending.lock().await.remove(&id);
                return Err(e);
            }

            let result = tokio::time::timeout(LOGOUT_TIMEOUT, rx).await;
            self.pending.lock().await.remove(&id);

            match result {
                Ok(Ok(Ok(()))) => Ok(()),
                Ok(Ok(Err(message))) => Err(LinkError::LogoutRejected(message)),
                Ok(Err(_)) => Err(LinkError::Closed),
                Err(_) => Err(LinkError::Timeout),
            }
        })
    }

    fn end(&self, reason: &str) {
        debug!(reason, "ending bridge link");
        self.cancel.cancel();
    }
}

impl Drop for BridgeLink {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.read_handle.abort();
        self.write_handle.abort();
    }
}
