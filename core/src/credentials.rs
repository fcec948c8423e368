//! Reference credentials for the panel login.
//!
//! The authentication flow only talks to [`CredentialsProvider`]; where the
//! reference pair actually lives is up to the implementation:
//! - [`EnvFileCredentials`] keeps it in a dotenv file (`USERNAME=` / `PASSWORD=`)
//! - [`DocumentCredentials`] keeps it under `server.username` / `server.password`
//!   in the configuration document

use crate::config::{get_path, set_path, ConfigStore, DEFAULT_PASSWORD, DEFAULT_USERNAME};
use crate::errors::{PanelError, PanelResult};
use async_trait::async_trait;
use serde_json::Value;
use std::fmt::Debug;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

/// Default location of the dotenv credentials file
pub const DEFAULT_ENV_FILE: &str = ".env";

const USERNAME_KEY: &str = "USERNAME";
const PASSWORD_KEY: &str = "PASSWORD";

/// A username/password pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Whether this pair is the factory default
    pub fn is_default(&self) -> bool {
        self.username == DEFAULT_USERNAME && self.password == DEFAULT_PASSWORD
    }
}

impl Default for Credentials {
    fn default() -> Self {
        Self::new(DEFAULT_USERNAME, DEFAULT_PASSWORD)
    }
}

/// Source of the reference credentials
#[async_trait]
pub trait CredentialsProvider: Send + Sync + Debug {
    /// Current reference pair
    async fn current(&self) -> PanelResult<Credentials>;

    /// Exact comparison of both fields against the reference pair
    async fn verify(&self, username: &str, password: &str) -> PanelResult<bool> {
        let reference = self.current().await?;
        Ok(reference.username == username && reference.password == password)
    }

    /// Replaces the reference password after checking `current_password`.
    ///
    /// Fails with [`PanelError::InvalidCredentials`] without writing anything
    /// when `current_password` does not match.
    async fn change_password(&self, current_password: &str, new_password: &str)
        -> PanelResult<()>;
}

/// Type alias for Arc-wrapped CredentialsProvider trait objects
pub type CredentialsProviderRef = Arc<dyn CredentialsProvider>;

/// Credentials kept in a dotenv file.
///
/// Each key is looked up in the file first, then in the process environment,
/// then falls back to the factory default. The process environment is never
/// modified.
#[derive(Debug)]
pub struct EnvFileCredentials {
    path: PathBuf,
    cached: RwLock<Credentials>,
}

impl EnvFileCredentials {
    /// Loads the reference pair from `path`
    pub fn load(path: impl Into<PathBuf>) -> PanelResult<Self> {
        let path = path.into();
        let credentials = read_env_credentials(&path)?;
        debug!(path = %path.display(), username = %credentials.username, "Loaded credentials");
        Ok(Self {
            path,
            cached: RwLock::new(credentials),
        })
    }

    /// Path of the backing dotenv file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-reads the file and replaces the cached pair
    pub fn reload(&self) -> PanelResult<()> {
        let credentials = read_env_credentials(&self.path)?;
        let mut cached = self.cached.write().map_err(|e| {
            PanelError::CredentialsWrite(format!("Failed to acquire write lock: {}", e))
        })?;
        *cached = credentials;
        Ok(())
    }

    fn cached(&self) -> PanelResult<Credentials> {
        self.cached
            .read()
            .map(|credentials| credentials.clone())
            .map_err(|e| PanelError::ConfigRead(format!("Failed to acquire read lock: {}", e)))
    }
}

#[async_trait]
impl CredentialsProvider for EnvFileCredentials {
    async fn current(&self) -> PanelResult<Credentials> {
        self.cached()
    }

    async fn change_password(
        &self,
        current_password: &str,
        new_password: &str,
    ) -> PanelResult<()> {
        let reference = self.cached()?;
        if reference.password != current_password {
            return Err(PanelError::InvalidCredentials);
        }
        let encoded = encode_env_value(new_password)?;

        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(existing) => replace_password_line(&existing, &encoded),
            Err(e) if e.kind() == ErrorKind::NotFound => format!(
                "{}={}\n{}={}\n",
                USERNAME_KEY,
                encode_env_value(&reference.username)?,
                PASSWORD_KEY,
                encoded
            ),
            Err(e) => {
                return Err(PanelError::CredentialsWrite(format!(
                    "Failed to read {}: {}",
                    self.path.display(),
                    e
                )))
            }
        };

        // The file is only touched once the new content reads back as intended
        let updated =
            parse_env_credentials(dotenvy::from_read_iter(content.as_bytes()), &self.path)?;
        if updated.password != new_password {
            return Err(PanelError::Validation(
                "Password cannot be stored in the env file".to_string(),
            ));
        }

        tokio::fs::write(&self.path, content).await.map_err(|e| {
            PanelError::CredentialsWrite(format!("Failed to write {}: {}", self.path.display(), e))
        })?;

        let mut cached = self.cached.write().map_err(|e| {
            PanelError::CredentialsWrite(format!("Failed to acquire write lock: {}", e))
        })?;
        *cached = updated;
        info!(path = %self.path.display(), "Password updated");
        Ok(())
    }
}

/// Renders `value` as a dotenv value that parses back unchanged.
///
/// Plain tokens are written bare. Anything else is double quoted with `\`,
/// `"` and `$` escaped. Control characters cannot be represented and are
/// rejected.
fn encode_env_value(value: &str) -> PanelResult<String> {
    if value.chars().any(char::is_control) {
        return Err(PanelError::Validation(
            "Value must not contain control characters".to_string(),
        ));
    }

    let is_plain = value.chars().all(|c| {
        c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '@' | '+' | ':' | '/' | ',' | '%')
    });
    if is_plain {
        return Ok(value.to_string());
    }

    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        if matches!(c, '\\' | '"' | '$') {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    Ok(quoted)
}

/// Rewrites every `PASSWORD=` line, appending one if the file has none.
/// `encoded` must already be a valid dotenv value.
fn replace_password_line(existing: &str, encoded: &str) -> String {
    let prefix = format!("{}=", PASSWORD_KEY);
    let mut replaced = false;
    let mut lines: Vec<String> = existing
        .lines()
        .map(|line| {
            if line.starts_with(&prefix) {
                replaced = true;
                format!("{}{}", prefix, encoded)
            } else {
                line.to_string()
            }
        })
        .collect();
    if !replaced {
        lines.push(format!("{}{}", prefix, encoded));
    }

    let mut content = lines.join("\n");
    content.push('\n');
    content
}

fn read_env_credentials(path: &Path) -> PanelResult<Credentials> {
    match dotenvy::from_path_iter(path) {
        Ok(entries) => parse_env_credentials(entries, path),
        Err(dotenvy::Error::Io(e)) if e.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "No env file, using environment");
            parse_env_credentials(std::iter::empty(), path)
        }
        Err(e) => Err(PanelError::ConfigRead(format!(
            "Failed to open {}: {}",
            path.display(),
            e
        ))),
    }
}

/// Picks `USERNAME` and `PASSWORD` out of parsed dotenv entries, falling back
/// to the process environment and then to the factory defaults.
fn parse_env_credentials<I>(entries: I, origin: &Path) -> PanelResult<Credentials>
where
    I: Iterator<Item = Result<(String, String), dotenvy::Error>>,
{
    let mut username = None;
    let mut password = None;

    for entry in entries {
        let (key, value) = entry.map_err(|e| {
            PanelError::ConfigRead(format!("Failed to parse {}: {}", origin.display(), e))
        })?;
        match key.as_str() {
            USERNAME_KEY => username = Some(value),
            PASSWORD_KEY => password = Some(value),
            _ => {}
        }
    }

    let username = username
        .or_else(|| std::env::var(USERNAME_KEY).ok())
        .unwrap_or_else(|| DEFAULT_USERNAME.to_string());
    let password = password
        .or_else(|| std::env::var(PASSWORD_KEY).ok())
        .unwrap_or_else(|| DEFAULT_PASSWORD.to_string());

    Ok(Credentials { username, password })
}

/// Credentials kept in the configuration document under `server`
#[derive(Debug, Clone)]
pub struct DocumentCredentials {
    store: Arc<ConfigStore>,
}

impl DocumentCredentials {
    pub fn new(store: Arc<ConfigStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl CredentialsProvider for DocumentCredentials {
    async fn current(&self) -> PanelResult<Credentials> {
        let document = self.store.load().await?;
        let field = |path: &str, fallback: &str| {
            get_path(&document, path)
                .and_then(Value::as_str)
                .unwrap_or(fallback)
                .to_string()
        };
        Ok(Credentials {
            username: field("server.username", DEFAULT_USERNAME),
            password: field("server.password", DEFAULT_PASSWORD),
        })
    }

    async fn change_password(
        &self,
        current_password: &str,
        new_password: &str,
    ) -> PanelResult<()> {
        self.store
            .update(|document| {
                let stored = get_path(document, "server.password").and_then(Value::as_str);
                if stored != Some(current_password) {
                    warn!("Rejected password change: current password mismatch");
                    return Err(PanelError::InvalidCredentials);
                }
                set_path(document, "server.password", Value::from(new_password))
            })
            .await
    }
}
