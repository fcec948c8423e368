use anyhow::Context;
use clap::Parser;
use firefly_core::{DEFAULT_CONFIG_FILE, DEFAULT_ENV_FILE};
use firefly_panel::activity_log::DEFAULT_CAPACITY;
use firefly_panel::config::PanelConfig;
use firefly_panel::http_server::{self, AppState};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "firefly-panel", about = "Administrative dashboard for the firefly bot helper")]
struct Args {
    /// Path to the configuration document
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Path to the dotenv file holding USERNAME and PASSWORD
    #[arg(short, long, default_value = DEFAULT_ENV_FILE)]
    env_file: PathBuf,

    /// Listen host, overrides server.host
    #[arg(long)]
    host: Option<String>,

    /// Listen port, overrides server.port
    #[arg(short, long)]
    port: Option<u16>,

    /// CPU sampling window of the system endpoints, in milliseconds
    #[arg(long, default_value_t = 1000)]
    cpu_sample_ms: u64,

    /// Number of log events kept for the log endpoints
    #[arg(long, default_value_t = DEFAULT_CAPACITY)]
    log_capacity: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line args
    let args = Args::parse();

    let config = PanelConfig {
        config_path: args.config,
        env_file: args.env_file,
        host: args.host,
        port: args.port,
        cpu_sample_interval: Duration::from_millis(args.cpu_sample_ms),
        log_capacity: args.log_capacity,
    };

    // Initialize logging, mirrored into the activity log
    let activity = config.activity_log();
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .with(activity.layer())
        .try_init()
        .context("Failed to set tracing subscriber")?;

    info!("Starting firefly panel");

    let state = match AppState::new(&config, activity) {
        Ok(state) => state,
        Err(e) => {
            error!(error = %e, "Failed to initialize panel state");
            return Err(anyhow::anyhow!("Initialization error: {}", e));
        }
    };

    // Read the document once so a fresh install gets its defaults written
    let document = state.config.load_or_empty().await;
    info!("Loaded configuration from {}", state.config.path().display());

    let bind = config.bind_address(&document);

    if let Err(e) = http_server::run_server(state, &bind).await {
        error!(error = %e, "HTTP server failed");
        return Err(e);
    }

    info!("Firefly panel shutting down");
    Ok(())
}
