//! Shared constants and policy types.

use std::time::Duration;

/// Fixed delay between a recoverable disconnect and the retry.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(60);

/// Per-observer queue depth. A slower observer misses publishes.
pub const OBSERVER_QUEUE_SIZE: usize = 32;

/// Labels for what triggered a connection attempt, used in logs.
pub mod origin {
    pub const INITIAL: &str = "initial";
    pub const BACKOFF_RETRY: &str = "backoff-retry";
    pub const SESSION_REGENERATION: &str = "session-regeneration";
}

/// How closures are turned into retries.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Delay before the single retry.
    pub delay: Duration,
    /// Whether a closure that carries no status code is retried.
    pub retry_unclassified: bool,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            delay: RECONNECT_DELAY,
            retry_unclassified: true,
        }
    }
}

impl ReconnectPolicy {
    /// `loggedOut` is terminal, anything else with a code is retried.
    pub fn should_retry(&self, status_code: Option<u16>) -> bool {
        use chatlink_protocol::DisconnectReason;

        match status_code {
            Some(code) => DisconnectReason::from_status_code(code) != Some(DisconnectReason::LoggedOut),
            None => self.retry_unclassified,
        }
    }
}
