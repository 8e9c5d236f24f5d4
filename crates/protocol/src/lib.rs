//! Wire types shared across chatlink.
//!
//! - [`state`]: the connection-state record pushed to observers.
//! - [`reason`]: status codes the messaging library attaches to closures.
//! - [`bridge`]: lifecycle frames exchanged with the messaging sidecar.

pub mod bridge;
pub mod reason;
pub mod state;

pub use reason::DisconnectReason;
pub use state::{ConnectionState, Phase, ServerMessage};
