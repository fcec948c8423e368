use crate::activity_log::ActivityLog;
use crate::bot::BotControl;
use crate::config::PanelConfig;
use crate::session::{InMemorySessionStore, SessionStoreRef};
use crate::system::SystemMonitor;
use crate::{api, auth};
use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Redirect, Response},
    routing::get,
    Json, Router,
};
use firefly_core::{
    ConfigStore, CredentialsProviderRef, DocumentCredentials, EnvFileCredentials, PanelError,
    PanelResult,
};
use serde::Serialize;
use std::fmt::Display;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

/// Application state shared with all routes
#[derive(Clone)]
pub struct AppState {
    pub sessions: SessionStoreRef,
    /// Login credentials (dotenv file)
    pub credentials: CredentialsProviderRef,
    /// Credentials stored in the configuration document
    pub document_credentials: CredentialsProviderRef,
    pub config: Arc<ConfigStore>,
    pub monitor: SystemMonitor,
    pub activity: ActivityLog,
    pub bot: Arc<BotControl>,
}

impl AppState {
    /// Wires the default backends for `config`, logging into `activity`
    pub fn new(config: &PanelConfig, activity: ActivityLog) -> PanelResult<Self> {
        let store = Arc::new(ConfigStore::new(&config.config_path));
        let credentials = EnvFileCredentials::load(&config.env_file)?;

        Ok(Self {
            sessions: Arc::new(InMemorySessionStore::new()),
            credentials: Arc::new(credentials),
            document_credentials: Arc::new(DocumentCredentials::new(Arc::clone(&store))),
            config: store,
            monitor: SystemMonitor::new(config.cpu_sample_interval),
            activity,
            bot: Arc::new(BotControl::new()),
        })
    }
}

/// Body of every failed response
#[derive(Serialize)]
pub struct ErrorResponse {
    success: bool,
    message: String,
}

/// Error type for HTTP handlers
#[derive(Debug)]
pub enum ApiError {
    /// No valid session cookie (401)
    Unauthenticated,
    /// Login rejected (401)
    InvalidLogin,
    /// Request rejected by a handler (400)
    BadRequest(String),
    /// Handler failure reported with an error status (500)
    InternalError(String),
    /// Handler failure reported as `success: false` with status 200
    Failed(String),
}

impl ApiError {
    /// Logs `e` and wraps it as a 200 `success: false` response
    pub fn failed(context: &str, e: impl Display) -> Self {
        error!(error = %e, "{}", context);
        Self::Failed(format!("{}: {}", context, e))
    }

    /// Logs `e` and wraps it as a 500 response
    pub fn internal(context: &str, e: impl Display) -> Self {
        error!(error = %e, "{}", context);
        Self::InternalError(format!("{}: {}", context, e))
    }
}

impl From<PanelError> for ApiError {
    fn from(e: PanelError) -> Self {
        match e {
            PanelError::Unauthenticated => Self::Unauthenticated,
            PanelError::InvalidCredentials => Self::InvalidLogin,
            PanelError::Validation(msg) => Self::BadRequest(msg),
            other => Self::internal("Request failed", other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::Unauthenticated => {
                let body = Json(ErrorResponse {
                    success: false,
                    message: "未认证".to_string(),
                });
                return (
                    StatusCode::UNAUTHORIZED,
                    [(header::WWW_AUTHENTICATE, "Bearer")],
                    body,
                )
                    .into_response();
            }
            Self::InvalidLogin => (StatusCode::UNAUTHORIZED, "用户名或密码错误".to_string()),
            Self::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            Self::InternalError(message) => (StatusCode::INTERNAL_SERVER_ERROR, message),
            Self::Failed(message) => (StatusCode::OK, message),
        };

        let body = Json(ErrorResponse {
            success: false,
            message,
        });
        (status, body).into_response()
    }
}

/// Builds the router with every route and the CORS layer
pub fn router(state: AppState) -> Router {
    // Set up CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(root))
        .nest("/auth", auth::routes())
        .nest("/api", api::routes())
        .layer(ServiceBuilder::new().layer(cors))
        .with_state(state)
}

/// Start the HTTP server
/// Binds `addr` (`host:port`). Hostnames such as `localhost` are resolved.
pub async fn bind_listener(addr: &str) -> anyhow::Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind {}: {}", addr, e))
}

pub async fn run_server(state: AppState, addr: &str) -> anyhow::Result<()> {
    let app = router(state);
    let listener = bind_listener(addr).await?;

    let local = listener.local_addr()?;
    info!("Starting HTTP server on {}", local);
    info!("Local access: http://localhost:{}", local.port());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| anyhow::anyhow!("Failed to start HTTP server: {}", e))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

async fn root() -> Redirect {
    Redirect::to("/login")
}
