use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use async_trait::async_trait;
use log::debug;

use crate::session::store::{Session, SessionStore, SessionStoreError};

/// In-memory implementation of SessionStore.
///
/// Nothing is evicted: the map grows by one entry per login that is never
/// followed by a logout.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    /// Thread-safe storage of sessions, keyed by token
    sessions: Arc<RwLock<HashMap<String, Session>>>,
}

impl InMemorySessionStore {
    /// Create a new InMemorySessionStore
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create(&self, identity: &str) -> Result<Session, SessionStoreError> {
        let session = Session::new(identity);

        let mut sessions = self.sessions.write().map_err(|e| {
            SessionStoreError::StorageError(format!("Failed to acquire write lock: {}", e))
        })?;

        sessions.insert(session.token.clone(), session.clone());
        debug!("Created session for {}", session.identity);

        Ok(session)
    }

    async fn resolve(&self, token: &str) -> Result<Session, SessionStoreError> {
        let sessions = self.sessions.read().map_err(|e| {
            SessionStoreError::StorageError(format!("Failed to acquire read lock: {}", e))
        })?;

        sessions
            .get(token)
            .cloned()
            .ok_or_else(|| SessionStoreError::NotFound(token.to_string()))
    }

    async fn destroy(&self, token: &str) -> Result<(), SessionStoreError> {
        let mut sessions = self.sessions.write().map_err(|e| {
            SessionStoreError::StorageError(format!("Failed to acquire write lock: {}", e))
        })?;

        if let Some(session) = sessions.remove(token) {
            debug!("Destroyed session for {}", session.identity);
        }
        Ok(())
    }

    async fn count(&self) -> Result<usize, SessionStoreError> {
        let sessions = self.sessions.read().map_err(|e| {
            SessionStoreError::StorageError(format!("Failed to acquire read lock: {}", e))
        })?;

        Ok(sessions.len())
    }
}
