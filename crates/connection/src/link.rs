//! Boundary to the messaging-protocol implementation.
//!
//! A [`Connector`] opens a [`Link`] from stored credentials and hands back
//! the link's lifecycle events as a channel. The manager consumes that
//! channel; nothing else reads it.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;

use chatlink_protocol::DisconnectReason;

/// A boxed future returned by link methods.
pub type LinkFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Errors from opening or driving a link.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("WebSocket error: {0}")]
    Ws(#[from] tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("request timed out")]
    Timeout,

    #[error("link closed")]
    Closed,

    #[error("logout rejected: {0}")]
    LogoutRejected(String),

    #[error("connection refused: {0}")]
    Refused(String),
}

/// Why a link closed.
#[derive(Debug, Clone, PartialEq)]
pub struct Disconnect {
    pub status_code: Option<u16>,
    pub message: String,
}

impl Disconnect {
    pub fn new(status_code: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            status_code,
            message: message.into(),
        }
    }

    pub fn reason(&self) -> Option<DisconnectReason> {
        self.status_code.and_then(DisconnectReason::from_status_code)
    }
}

impl From<DisconnectReason> for Disconnect {
    fn from(reason: DisconnectReason) -> Self {
        Self::new(Some(reason.status_code()), reason.to_string())
    }
}

impl fmt::Display for Disconnect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Lifecycle events emitted by a link.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    /// Raw pairing challenge, to be rendered as a QR code.
    Qr(String),
    Opened,
    Closed(Option<Disconnect>),
    /// Opaque credential material that must be persisted.
    CredentialsUpdated(Value),
}

/// A freshly opened link and its event stream.
pub struct OpenedLink {
    pub link: Box<dyn Link>,
    pub events: mpsc::Receiver<LinkEvent>,
}

/// A live connection object.
pub trait Link: Send + Sync + 'static {
    /// Asks the remote service to forget this device. May fail.
    fn logout(&self) -> LinkFuture<'_, Result<(), LinkError>>;

    /// Tears the link down without waiting for the remote side.
    fn end(&self, reason: &str);
}

/// Opens links.
pub trait Connector: Send + Sync + 'static {
    /// Opens a link, resuming `creds` when present.
    fn open(&self, creds: Option<Value>) -> LinkFuture<'_, Result<OpenedLink, LinkError>>;
}
