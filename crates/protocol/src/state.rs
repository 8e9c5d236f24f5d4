//! Connection-state record and the push envelope that carries it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle phase of the messaging connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    /// Process started, no connection attempt yet.
    Starting,
    /// A link is being opened.
    Connecting,
    /// The remote service issued a pairing challenge.
    Qr,
    /// Paired and connected.
    Open,
    /// Connection closed (recoverable or terminal).
    Close,
    /// Credentials were wiped, a fresh pairing is about to start.
    SessionReset,
}

/// Snapshot of the connection lifecycle.
///
/// A single record exists per process. Every change is merged into the
/// previous value and published as a whole; readers only ever hold clones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionState {
    pub state: Phase,
    /// Displayable pairing image (data URL). Only set in [`Phase::Qr`].
    #[serde(default)]
    pub qr: Option<String>,
    /// Status code of the last closure. Only set in [`Phase::Close`].
    #[serde(default)]
    pub status_code: Option<u16>,
    /// Human-readable cause of the last closure. Only set in [`Phase::Close`].
    #[serde(default)]
    pub last_disconnect: Option<String>,
    /// When the pending reconnect fires, in epoch milliseconds on the wire.
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub reconnect_at: Option<DateTime<Utc>>,
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self {
            state: Phase::Starting,
            qr: None,
            status_code: None,
            last_disconnect: None,
            reconnect_at: None,
        }
    }
}

impl ConnectionState {
    /// A new connection attempt: every phase-specific field is cleared.
    pub fn set_connecting(&mut self) {
        self.state = Phase::Connecting;
        self.qr = None;
        self.status_code = None;
        self.last_disconnect = None;
        self.reconnect_at = None;
    }

    /// A pairing challenge is waiting to be scanned.
    pub fn set_qr(&mut self, payload: String) {
        self.state = Phase::Qr;
        self.qr = Some(payload);
        self.status_code = None;
        self.last_disconnect = None;
    }

    pub fn set_open(&mut self) {
        self.state = Phase::Open;
        self.qr = None;
        self.status_code = None;
        self.last_disconnect = None;
        self.reconnect_at = None;
    }

    /// The link closed. `reconnect_at` is left to the scheduler.
    pub fn set_closed(&mut self, status_code: Option<u16>, reason: String) {
        self.state = Phase::Close;
        self.qr = None;
        self.status_code = status_code;
        self.last_disconnect = Some(reason);
    }

    pub fn set_session_reset(&mut self) {
        self.state = Phase::SessionReset;
        self.qr = None;
        self.status_code = None;
        self.last_disconnect = None;
        self.reconnect_at = None;
    }
}

/// Messages pushed from the server to real-time observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum ServerMessage {
    Connection(ConnectionState),
}
