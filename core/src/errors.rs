use thiserror::Error;

/// Panel errors
#[derive(Error, Debug)]
pub enum PanelError {
    #[error("Unauthenticated")]
    Unauthenticated,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Config Read Error: {0}")]
    ConfigRead(String),

    #[error("Config Write Error: {0}")]
    ConfigWrite(String),

    #[error("Invalid config path: {0:?}")]
    InvalidPath(String),

    #[error("Credentials Write Error: {0}")]
    CredentialsWrite(String),

    #[error("Validation Error: {0}")]
    Validation(String),

    #[error("Session Storage Error: {0}")]
    SessionStorage(String),

    #[error("System Error: {0}")]
    System(String),
}

/// Result type for panel operations
pub type PanelResult<T> = Result<T, PanelError>;
