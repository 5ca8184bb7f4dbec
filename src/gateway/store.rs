//! Session persistence between runs.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::auth::models::Session;
use crate::error::AppResult;

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self) -> AppResult<Option<Session>>;
    async fn save(&self, session: &Session) -> AppResult<()>;
    async fn clear(&self) -> AppResult<()>;
}

/// Stores the session as a JSON file
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn load(&self) -> AppResult<Option<Session>> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_slice::<Session>(&raw) {
            Ok(session) => Ok(Some(session)),
            Err(e) => {
                // A corrupt file is treated as signed out rather than fatal
                warn!("Discarding unreadable session file {}: {}", self.path.display(), e);
                Ok(None)
            }
        }
    }

    async fn save(&self, session: &Session) -> AppResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let raw = serde_json::to_vec_pretty(session)?;
        tokio::fs::write(&self.path, raw).await?;
        debug!("Session persisted to {}", self.path.display());
        Ok(())
    }

    async fn clear(&self) -> AppResult<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Keeps the session in memory only
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    session: Mutex<Option<Session>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(session: Session) -> Self {
        Self {
            session: Mutex::new(Some(session)),
        }
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self) -> AppResult<Option<Session>> {
        Ok(self.session.lock().clone())
    }

    async fn save(&self, session: &Session) -> AppResult<()> {
        *self.session.lock() = Some(session.clone());
        Ok(())
    }

    async fn clear(&self) -> AppResult<()> {
        *self.session.lock() = None;
        Ok(())
    }
}
