use firefly_core::{server_address, Document, DEFAULT_CONFIG_FILE, DEFAULT_ENV_FILE};
use std::path::PathBuf;
use std::time::Duration;

use crate::activity_log::{ActivityLog, DEFAULT_CAPACITY};

/// Process-level settings of the panel daemon
#[derive(Debug, Clone)]
pub struct PanelConfig {
    /// Configuration document (`config.yaml`)
    pub config_path: PathBuf,
    /// Dotenv file holding the login credentials
    pub env_file: PathBuf,
    /// Overrides `server.host` from the document
    pub host: Option<String>,
    /// Overrides `server.port` from the document
    pub port: Option<u16>,
    /// How long CPU usage is sampled for the system endpoints
    pub cpu_sample_interval: Duration,
    /// Number of log events kept for the log endpoints
    pub log_capacity: usize,
}

impl Default for PanelConfig {
    fn default() -> Self {
        PanelConfig {
            config_path: PathBuf::from(DEFAULT_CONFIG_FILE),
            env_file: PathBuf::from(DEFAULT_ENV_FILE),
            host: None,
            port: None,
            cpu_sample_interval: Duration::from_secs(1),
            log_capacity: DEFAULT_CAPACITY,
        }
    }
}

impl PanelConfig {
    /// `host:port` to listen on; command line overrides win over the document
    pub fn bind_address(&self, document: &Document) -> String {
        let (host, port) = server_address(document);
        format!(
            "{}:{}",
            self.host.clone().unwrap_or(host),
            self.port.unwrap_or(port)
        )
    }

    /// Empty activity log sized by `log_capacity`
    pub fn activity_log(&self) -> ActivityLog {
        ActivityLog::new(self.log_capacity)
    }
}
