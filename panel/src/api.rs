//! `/api` routes. Every business failure here is reported as status 200 with
//! `success: false`; only the session guard answers with 401.

use crate::activity_log::{LogEntry, LogQuery, Pagination};
use crate::auth::{CurrentUser, MessageResponse};
use crate::bot::BotAction;
use crate::http_server::{ApiError, AppState};
use crate::system::{ProcessInfo, ResourceSummary};
use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use firefly_core::{mask_secrets, set_path, CredentialsProvider, Document, PanelError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

/// Number of entries returned by `/api/recent-logs`
const RECENT_LOG_COUNT: usize = 6;

/// Default `limit` of `/api/processes`
const DEFAULT_PROCESS_LIMIT: usize = 5;

#[derive(Debug, Deserialize)]
pub struct ConfigUpdateRequest {
    pub path: String,
    pub value: Value,
}

#[derive(Debug, Deserialize)]
pub struct PasswordUpdateRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct BackgroundSettings {
    #[serde(rename = "type")]
    pub kind: String,
    pub color: String,
    pub background_color: String,
    pub speed: f64,
}

#[derive(Debug, Deserialize)]
pub struct BotActionRequest {
    pub action: String,
}

#[derive(Debug, Deserialize)]
pub struct ProcessQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct ConfigResponse {
    pub success: bool,
    pub config: Document,
}

#[derive(Debug, Serialize)]
pub struct ResourcesResponse {
    pub success: bool,
    pub data: ResourceSummary,
}

#[derive(Debug, Serialize)]
pub struct ProcessesResponse {
    pub success: bool,
    pub processes: Vec<ProcessInfo>,
}

#[derive(Debug, Serialize)]
pub struct RecentLogsResponse {
    pub success: bool,
    pub logs: Vec<LogEntry>,
}

#[derive(Debug, Serialize)]
pub struct LogsResponse {
    pub success: bool,
    pub logs: Vec<LogEntry>,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize)]
pub struct BotResponse {
    pub success: bool,
    pub status: BotAction,
    pub message: String,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/config", get(get_config))
        .route("/config/update", post(update_config_item))
        .route("/config/complete-setup", post(complete_setup))
        .route("/update-password", post(update_password))
        .route("/update-background", post(update_background))
        .route("/system-resources", get(system_resources))
        .route("/processes", get(processes))
        .route("/recent-logs", get(recent_logs))
        .route("/logs", get(logs))
        .route("/toggle-bot", post(toggle_bot))
        .route("/reconnect-protocol", post(reconnect_protocol))
}

async fn get_config(
    State(state): State<AppState>,
    _user: CurrentUser,
) -> Result<Json<ConfigResponse>, ApiError> {
    let mut config = state.config.load_or_empty().await;
    mask_secrets(&mut config);
    Ok(Json(ConfigResponse {
        success: true,
        config,
    }))
}

async fn update_config_item(
    State(state): State<AppState>,
    _user: CurrentUser,
    Json(item): Json<ConfigUpdateRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    state
        .config
        .set(&item.path, item.value)
        .await
        .map_err(|e| ApiError::failed("更新配置失败", e))?;

    info!(path = %item.path, "Config updated");
    Ok(MessageResponse::ok("配置已更新"))
}

async fn complete_setup(
    State(state): State<AppState>,
    _user: CurrentUser,
) -> Result<Json<MessageResponse>, ApiError> {
    state
        .config
        .set("server.is_new", Value::Bool(false))
        .await
        .map_err(|e| ApiError::failed("完成设置失败", e))?;

    info!("Initial setup completed");
    Ok(MessageResponse::ok("设置已完成"))
}

async fn update_password(
    State(state): State<AppState>,
    _user: CurrentUser,
    Json(request): Json<PasswordUpdateRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    match state
        .document_credentials
        .change_password(&request.current_password, &request.new_password)
        .await
    {
        Ok(()) => {
            info!("Document password updated");
            Ok(MessageResponse::ok("密码已更新"))
        }
        Err(PanelError::InvalidCredentials) => {
            warn!("Document password update rejected");
            Err(ApiError::Failed("当前密码不正确".to_string()))
        }
        Err(e) => Err(ApiError::failed("更新密码失败", e)),
    }
}

async fn update_background(
    State(state): State<AppState>,
    _user: CurrentUser,
    Json(settings): Json<BackgroundSettings>,
) -> Result<Json<MessageResponse>, ApiError> {
    state
        .config
        .update(|document| {
            set_path(document, "ui.background.type", Value::from(settings.kind))?;
            set_path(document, "ui.background.color", Value::from(settings.color))?;
            set_path(
                document,
                "ui.background.background_color",
                Value::from(settings.background_color),
            )?;
            set_path(document, "ui.background.speed", Value::from(settings.speed))
        })
        .await
        .map_err(|e| ApiError::failed("更新背景设置失败", e))?;

    Ok(MessageResponse::ok("背景设置已更新"))
}

async fn system_resources(
    State(state): State<AppState>,
    _user: CurrentUser,
) -> Result<Json<ResourcesResponse>, ApiError> {
    let data = state
        .monitor
        .resources()
        .await
        .map_err(|e| ApiError::failed("获取系统资源失败", e))?;

    Ok(Json(ResourcesResponse {
        success: true,
        data,
    }))
}

async fn processes(
    State(state): State<AppState>,
    _user: CurrentUser,
    Query(query): Query<ProcessQuery>,
) -> Result<Json<ProcessesResponse>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_PROCESS_LIMIT);
    let processes = state
        .monitor
        .top_processes(limit)
        .await
        .map_err(|e| ApiError::failed("获取进程信息失败", e))?;

    Ok(Json(ProcessesResponse {
        success: true,
        processes,
    }))
}

async fn recent_logs(
    State(state): State<AppState>,
    _user: CurrentUser,
) -> Json<RecentLogsResponse> {
    Json(RecentLogsResponse {
        success: true,
        logs: state.activity.recent(RECENT_LOG_COUNT),
    })
}

async fn logs(
    State(state): State<AppState>,
    _user: CurrentUser,
    Query(query): Query<LogQuery>,
) -> Result<Json<LogsResponse>, ApiError> {
    let page = state
        .activity
        .query(&query, Utc::now())
        .map_err(|e| ApiError::failed("获取日志失败", e))?;

    Ok(Json(LogsResponse {
        success: true,
        logs: page.logs,
        pagination: page.pagination,
    }))
}

async fn toggle_bot(
    State(state): State<AppState>,
    _user: CurrentUser,
    Json(request): Json<BotActionRequest>,
) -> Result<Json<BotResponse>, ApiError> {
    let action = request
        .action
        .parse::<BotAction>()
        .map_err(|e| ApiError::failed("切换机器人状态失败", e))?;
    let status = state.bot.toggle(action);

    Ok(Json(BotResponse {
        success: true,
        status,
        message: format!("机器人已{}", status),
    }))
}

async fn reconnect_protocol(
    State(state): State<AppState>,
    _user: CurrentUser,
) -> Json<MessageResponse> {
    state.bot.reconnect();
    MessageResponse::ok("协议已重新连接")
}
