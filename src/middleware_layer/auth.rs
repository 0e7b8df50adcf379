use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};
use tower_cookies::cookie::{time::Duration, SameSite};
use tower_cookies::{Cookie, Cookies};

use crate::{
    error::{AppError, Result},
    models::session::Session,
    state::AppState,
};

/// Name of the signed session cookie.
pub const SESSION_COOKIE: &str = "ig_session";

/// The session decoded from the request cookie, if any.
///
/// Inserted into request extensions by [`load_session`] so handlers can run
/// their rate limit before deciding whether the caller is signed in.
#[derive(Debug, Clone, Default)]
pub struct CurrentSession(pub Option<Session>);

impl CurrentSession {
    /// Fails with `401` when no valid session is present.
    pub fn require(self) -> Result<Session> {
        self.0.ok_or(AppError::Unauthenticated)
    }

    /// A session whose role may change notebook content.
    pub fn require_writer(self) -> Result<Session> {
        let session = self.require()?;
        session.ensure_can_write()?;
        Ok(session)
    }

    /// A session with the admin role.
    pub fn require_admin(self) -> Result<Session> {
        let session = self.require()?;
        session.ensure_admin()?;
        Ok(session)
    }
}

/// Builds the session cookie with the attributes every login shares.
pub fn session_cookie(value: String, max_age_seconds: i64, secure: bool) -> Cookie<'static> {
    let mut cookie = Cookie::new(SESSION_COOKIE, value);
    cookie.set_http_only(true);
    if secure {
        cookie.set_secure(true);
    }
    cookie.set_same_site(SameSite::Lax);
    cookie.set_max_age(Duration::seconds(max_age_seconds));
    cookie.set_path("/");
    cookie
}

/// Expires the session cookie on the client.
pub fn clear_session_cookie(cookies: &Cookies, secure: bool) {
    cookies.add(session_cookie(String::new(), 0, secure));
}

/// Decodes the session cookie, if present and valid.
///
/// A cookie that fails verification or has expired is expired on the client.
pub fn session_from_cookies(state: &AppState, cookies: &Cookies) -> Option<Session> {
    let cookie = cookies.get(SESSION_COOKIE)?;
    let session = state.sessions.parse(cookie.value());
    if session.is_none() {
        tracing::debug!("🔐 Clearing invalid or expired session cookie");
        clear_session_cookie(cookies, state.config.production);
    }
    session
}

/// Attaches a [`CurrentSession`] to every request. Never rejects.
pub async fn load_session(
    State(state): State<AppState>,
    cookies: Cookies,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let session = session_from_cookies(&state, &cookies);
    if let Some(session) = &session {
        tracing::debug!("✅ Request from {} ({})", session.username, session.role);
    }
    request.extensions_mut().insert(CurrentSession(session));
    next.run(request).await
}
