//! Login, logout, password change and the session guard

use crate::http_server::{ApiError, AppState};
use crate::session::{Session, SessionStore, SessionStoreError};
use axum::{
    async_trait,
    extract::{FromRequest, FromRequestParts, Request, State},
    http::{header, request::Parts},
    routing::post,
    Form, Json, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use firefly_core::{is_new_install, Credentials, CredentialsProvider, PanelError};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Cookie carrying the session token
pub const SESSION_COOKIE: &str = "session_id";

/// The authenticated caller. Extracting it rejects the request with 401
/// before the handler runs when the session cookie is missing or unknown.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub Session);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        let token = jar
            .get(SESSION_COOKIE)
            .map(|cookie| cookie.value().to_string())
            .ok_or(ApiError::Unauthenticated)?;

        match state.sessions.resolve(&token).await {
            Ok(session) => Ok(CurrentUser(session)),
            Err(SessionStoreError::NotFound(_)) => Err(ApiError::Unauthenticated),
            Err(e) => Err(ApiError::internal("Failed to resolve session", e)),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Accepts the login pair as JSON or as an urlencoded form
struct LoginBody(LoginRequest);

#[async_trait]
impl FromRequest<AppState> for LoginBody {
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &AppState) -> Result<Self, Self::Rejection> {
        let is_form = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.starts_with("application/x-www-form-urlencoded"));

        let request = if is_form {
            Form::<LoginRequest>::from_request(req, state)
                .await
                .map(|Form(request)| request)
                .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?
        } else {
            Json::<LoginRequest>::from_request(req, state)
                .await
                .map(|Json(request)| request)
                .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?
        };
        Ok(LoginBody(request))
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub success: bool,
    pub is_new: bool,
    pub default_credentials: bool,
    pub redirect: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LogoutResponse {
    pub success: bool,
    pub redirect: String,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordForm {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

impl MessageResponse {
    pub fn ok(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            success: true,
            message: message.into(),
        })
    }
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/change-password", post(change_password))
}

async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    LoginBody(request): LoginBody,
) -> Result<(CookieJar, Json<LoginResponse>), ApiError> {
    let accepted = state
        .credentials
        .verify(&request.username, &request.password)
        .await
        .map_err(|e| ApiError::internal("登录失败", e))?;

    if !accepted {
        warn!(username = %request.username, "Rejected login");
        return Err(ApiError::InvalidLogin);
    }

    let session = state
        .sessions
        .create(&request.username)
        .await
        .map_err(|e| ApiError::internal("登录失败", e))?;
    info!(username = %session.identity, "User logged in");

    let document = state.config.load_or_empty().await;
    let is_new = is_new_install(&document);
    let default_credentials = Credentials::new(request.username, request.password).is_default();

    let cookie = Cookie::build((SESSION_COOKIE, session.token))
        .http_only(true)
        .path("/");

    Ok((
        jar.add(cookie),
        Json(LoginResponse {
            success: true,
            is_new,
            default_credentials,
            redirect: if is_new { "/start" } else { "/dashboard" }.to_string(),
        }),
    ))
}

async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<(CookieJar, Json<LogoutResponse>), ApiError> {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        state
            .sessions
            .destroy(cookie.value())
            .await
            .map_err(|e| ApiError::internal("登出失败", e))?;
        info!("User logged out");
    }

    Ok((
        jar.remove(Cookie::build(SESSION_COOKIE).path("/")),
        Json(LogoutResponse {
            success: true,
            redirect: "/login".to_string(),
        }),
    ))
}

async fn change_password(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Form(form): Form<ChangePasswordForm>,
) -> Result<Json<MessageResponse>, ApiError> {
    match state
        .credentials
        .change_password(&form.current_password, &form.new_password)
        .await
    {
        Ok(()) => {
            info!(username = %user.identity, "Login password changed");
            Ok(MessageResponse::ok("密码已更新"))
        }
        Err(PanelError::InvalidCredentials) => {
            warn!(username = %user.identity, "Password change rejected");
            Err(ApiError::BadRequest("当前密码不正确".to_string()))
        }
        Err(PanelError::Validation(message)) => {
            warn!(username = %user.identity, reason = %message, "Password change rejected");
            Err(ApiError::BadRequest(message))
        }
        Err(e) => Err(ApiError::internal("更新密码失败", e)),
    }
}
