//! Credential store for the messaging session.
//!
//! Credential material is opaque JSON owned by the messaging layer. It is
//! persisted under a session directory that stays fixed for the process
//! lifetime; erasing the directory forces a fresh pairing.

use std::io;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

/// File holding the credential material inside the session directory.
pub const CREDS_FILE: &str = "creds.json";

/// Errors from credential store operations.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Directory-backed credential store.
#[derive(Debug, Clone)]
pub struct AuthStore {
    dir: PathBuf,
}

impl AuthStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The session directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn creds_path(&self) -> PathBuf {
        self.dir.join(CREDS_FILE)
    }

    /// Loads stored credentials. `None` when nothing is stored yet.
    pub async fn load(&self) -> Result<Option<Value>, AuthError> {
        let path = self.creds_path();
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let creds = serde_json::from_slice(&bytes)?;
                debug!(path = %path.display(), "loaded stored credentials");
                Ok(Some(creds))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Persists credentials, replacing the previous file atomically.
    pub async fn save(&self, creds: &Value) -> Result<(), AuthError> {
        let json = serde_json::to_vec_pretty(creds)?;
        tokio::fs::create_dir_all(&self.dir).await?;

        let path = self.creds_path();
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &json).await?;
        set_permissions_0600(&tmp).await;
        tokio::fs::rename(&tmp, &path).await?;
        debug!(path = %path.display(), bytes = json.len(), "persisted credentials");
        Ok(())
    }

    /// Removes the whole session directory. A missing directory is fine.
    pub async fn erase(&self) -> Result<(), AuthError> {
        match tokio::fs::remove_dir_all(&self.dir).await {
            Ok(()) => {
                debug!(dir = %self.dir.display(), "erased session directory");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

async fn set_permissions_0600(path: &Path) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
}
