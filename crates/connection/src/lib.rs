//! Connection-state orchestrator for the messaging link.
//!
//! Keeps one long-lived link to the messaging service, publishes every
//! lifecycle change to observers, and retries recoverable disconnects after
//! a fixed delay.

pub mod auth;
pub mod bridge;
pub mod hub;
pub mod link;
pub mod manager;
pub mod qr;
pub mod reconnection;
pub mod regenerate;
pub mod testing;
pub mod types;

pub use auth::{AuthError, AuthStore};
pub use bridge::BridgeConnector;
pub use hub::{BroadcastHub, ObserverId, Subscription};
pub use link::{Connector, Disconnect, Link, LinkError, LinkEvent, LinkFuture, OpenedLink};
pub use manager::{ConnectionError, ConnectionManager};
pub use qr::QrError;
pub use reconnection::ReconnectScheduler;
pub use regenerate::{RegenerateError, SessionRegenerator};
pub use types::{RECONNECT_DELAY, ReconnectPolicy, origin};
