//! Full session reset: logout, wipe credentials, pair again.

use std::sync::Arc;

use tracing::{info, warn};

use crate::auth::AuthError;
use crate::manager::{ConnectionError, ConnectionManager};
use crate::types::origin;

/// Errors that abort a regeneration.
///
/// A failed logout is not among them: it is logged and skipped.
#[derive(Debug, thiserror::Error)]
pub enum RegenerateError {
    #[error("failed to erase session: {0}")]
    Erase(#[source] AuthError),

    #[error("failed to restart connection: {0}")]
    Restart(#[source] ConnectionError),
}

/// Drives a session regeneration through the [`ConnectionManager`].
pub struct SessionRegenerator {
    manager: Arc<ConnectionManager>,
}

impl SessionRegenerator {
    pub fn new(manager: Arc<ConnectionManager>) -> Self {
        Self { manager }
    }

    /// Logs out, erases the stored session and starts a fresh pairing.
    ///
    /// Steps run in order and are not rolled back: a failed logout still
    /// erases and restarts, a failed erase stops before restarting.
    pub async fn regenerate(&self) -> Result<(), RegenerateError> {
        self.manager.cancel_reconnect();

        let was_open = self.manager.is_open();
        if let Some(link) = self.manager.detach().await {
            if was_open && let Err(e) = link.logout().await {
                warn!(error = %e, "logout failed, continuing with session erase");
            }
            link.end("session regeneration requested");
        }

        let auth = self.manager.auth();
        auth.erase().await.map_err(RegenerateError::Erase)?;
        self.manager.mark_session_reset();
        info!(session_dir = %auth.dir().display(), "session erased");

        self.manager
            .start(origin::SESSION_REGENERATION)
            .await
            .map_err(RegenerateError::Restart)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::LinkError;

    #[test]
    fn error_display() {
        let err = RegenerateError::Restart(ConnectionError::Link(LinkError::Refused(
            "sidecar down".into(),
        )));
        assert_eq!(
            err.to_string(),
            "failed to restart connection: failed to open link: connection refused: sidecar down"
        );
    }
}
