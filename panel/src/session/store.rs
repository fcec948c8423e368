use std::error::Error;
use std::fmt::{Debug, Display};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use firefly_core::PanelError;
use uuid::Uuid;

/// Error type for session store operations
#[derive(Debug)]
pub enum SessionStoreError {
    /// No session for this token
    NotFound(String),
    /// Error occurred during a store operation
    StorageError(String),
}

impl Display for SessionStoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionStoreError::NotFound(token) => write!(f, "Session not found: {}", token),
            SessionStoreError::StorageError(msg) => write!(f, "Storage error: {}", msg),
        }
    }
}

impl Error for SessionStoreError {}

impl From<SessionStoreError> for PanelError {
    fn from(e: SessionStoreError) -> Self {
        match e {
            SessionStoreError::NotFound(_) => PanelError::Unauthenticated,
            SessionStoreError::StorageError(msg) => PanelError::SessionStorage(msg),
        }
    }
}

/// One authenticated browser session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Opaque token carried in the `session_id` cookie
    pub token: String,
    /// The authenticated username
    pub identity: String,
    /// When the session was created
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Create a session for `identity` with a fresh random token
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            token: generate_token(),
            identity: identity.into(),
            created_at: Utc::now(),
        }
    }
}

/// Generates an opaque session token
pub fn generate_token() -> String {
    Uuid::new_v4().to_string()
}

/// Trait defining the interface for session stores.
///
/// Sessions never expire on their own; they live until [`SessionStore::destroy`]
/// or until the process exits.
#[async_trait]
pub trait SessionStore: Send + Sync + Debug {
    /// Create a session for `identity` and return it, token included
    async fn create(&self, identity: &str) -> Result<Session, SessionStoreError>;

    /// Look up the session for `token`
    async fn resolve(&self, token: &str) -> Result<Session, SessionStoreError>;

    /// Remove the session for `token`. Removing an unknown token is not an error.
    async fn destroy(&self, token: &str) -> Result<(), SessionStoreError>;

    /// Number of live sessions
    async fn count(&self) -> Result<usize, SessionStoreError>;
}

/// Type alias for Arc-wrapped SessionStore trait objects
pub type SessionStoreRef = Arc<dyn SessionStore>;
