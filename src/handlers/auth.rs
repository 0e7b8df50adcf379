use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
    Extension, Json,
};
use garde::Validate;
use serde::Serialize;
use serde_json::{json, Value};
use tower_cookies::Cookies;
use zeroize::Zeroizing;

use crate::{
    crypto::session::now_ms,
    error::{AppError, Result},
    middleware_layer::{
        auth::{clear_session_cookie, session_cookie, CurrentSession},
        rate_limit::ClientIp,
    },
    models::session::Role,
    services::audit,
    state::AppState,
    validation::auth::LoginRequest,
};

/// The response payload for a successful login.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub success: bool,
    pub username: String,
    pub role: Role,
    pub can_write: bool,
    pub is_authenticated: bool,
}

/// The response payload for `GET /api/auth/session`.
#[derive(Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub is_authenticated: bool,
    pub is_admin: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    pub can_write: bool,
}

/// Handles admin login.
pub async fn login(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    cookies: Cookies,
    body: Bytes,
) -> Result<Response> {
    let limited = state.login_limiter.is_limited(&ip).await.unwrap_or_else(|e| {
        tracing::error!("❌ Login limiter unavailable: {}", e);
        false
    });
    if limited {
        tracing::warn!("🚫 Login blocked for {}", ip);
        return Err(AppError::RateLimited {
            message: "Too many failed login attempts. Try again later.".to_string(),
            retry_after: (crate::middleware_layer::rate_limit::LOGIN_WINDOW_MS / 1000) as u64,
        });
    }

    let mut request = serde_json::from_slice::<Value>(&body)
        .ok()
        .as_ref()
        .and_then(LoginRequest::from_value)
        .ok_or_else(|| AppError::Validation("Invalid request body.".to_string()))?;

    let role = match request.validate() {
        Ok(()) => {
            let password = Zeroizing::new(std::mem::take(&mut request.password));
            state.credentials.authenticate(&request.username, password).await?
        }
        Err(report) => {
            tracing::debug!("Login payload rejected: {}", report);
            None
        }
    };

    let Some(role) = role else {
        if let Err(e) = state.login_limiter.register_failure(&ip).await {
            tracing::error!("❌ Could not record failed login: {}", e);
        }
        audit::log_failure(
            "login",
            "invalid credentials",
            None,
            &ip,
            json!({ "username": request.username }),
        );
        return Err(AppError::InvalidCredentials);
    };

    if let Err(e) = state.login_limiter.clear(&ip).await {
        tracing::error!("❌ Could not clear login attempts: {}", e);
    }

    let token = state.sessions.sign(&request.username, role);
    cookies.add(session_cookie(
        token,
        state.sessions.ttl_seconds(),
        state.config.production,
    ));

    tracing::info!("✅ {} logged in as {}", request.username, role);
    audit::log_event(
        "login",
        None,
        &ip,
        json!({ "username": request.username, "role": role.as_str() }),
    );

    Ok(Json(LoginResponse {
        success: true,
        username: request.username.clone(),
        role,
        can_write: role.can_write(),
        is_authenticated: true,
    })
    .into_response())
}

/// Handles logout. Always succeeds.
pub async fn logout(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    Extension(current): Extension<CurrentSession>,
    cookies: Cookies,
) -> Result<Response> {
    clear_session_cookie(&cookies, state.config.production);
    if let Some(session) = current.0.as_ref() {
        tracing::info!("👋 Logout for {}", session.username);
        audit::log_event("logout", Some(session), &ip, json!({}));
    }
    Ok(Json(json!({ "success": true })).into_response())
}

/// Reports the caller's session and slides it forward when it is past half
/// its lifetime or still uses the legacy payload.
pub async fn session_info(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentSession>,
    cookies: Cookies,
) -> Result<Response> {
    let info = match current.0 {
        Some(session) => {
            if state.sessions.needs_rotation(&session, now_ms()) {
                let token = state.sessions.sign(&session.username, session.role);
                cookies.add(session_cookie(
                    token,
                    state.sessions.ttl_seconds(),
                    state.config.production,
                ));
                tracing::debug!(
                    "🔑 Rotated session for {} (legacy: {})",
                    session.username,
                    session.legacy
                );
            }
            SessionInfo {
                is_authenticated: true,
                is_admin: session.role == Role::Admin,
                can_write: session.can_write(),
                role: Some(session.role),
                username: Some(session.username),
            }
        }
        None => SessionInfo::default(),
    };

    let mut response = Json(info).into_response();
    let headers = response.headers_mut();
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    headers.insert(header::VARY, HeaderValue::from_static("Cookie"));
    Ok(response)
}
