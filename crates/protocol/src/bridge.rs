//! Lifecycle frames exchanged with the messaging sidecar.
//!
//! The sidecar owns the messaging protocol (pairing, encryption, framing).
//! chatlink only sees the lifecycle: pairing challenges, open/close and
//! opaque credential material to persist. Frames are JSON text messages
//! tagged by `type`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Frames sent by the sidecar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SidecarFrame {
    /// A pairing challenge; `ref` is the raw string to render as a QR code.
    Qr {
        #[serde(rename = "ref")]
        reference: String,
    },
    Open,
    Close {
        #[serde(default, rename = "statusCode", skip_serializing_if = "Option::is_none")]
        status_code: Option<u16>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    /// Credential material changed and must be persisted as-is.
    Creds { data: Value },
    /// Answer to [`BridgeCommand::Logout`].
    LogoutResult {
        id: String,
        ok: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

/// Commands sent to the sidecar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum BridgeCommand {
    /// First frame after connecting; resumes the stored session if any.
    Hello {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        creds: Option<Value>,
    },
    Logout { id: String },
}
