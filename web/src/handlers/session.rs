//! Session endpoints.

use crate::cookies::clear_session_cookie;
use crate::error::AppError;
use crate::extractors::{ClientIp, SessionCookie};
use crate::state::{AppState, Backend};
use axum::{
    extract::State,
    http::{header::SET_COOKIE, HeaderMap},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// `GET /session` response.
#[derive(Debug, Clone, Serialize)]
pub struct SessionResponse {
    /// Whether the cookie names a live session.
    pub authenticated: bool,
    /// Signed-in user.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Their email.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// When the session ends.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

/// `POST /logout` response.
#[derive(Debug, Clone, Serialize)]
pub struct LogoutResponse {
    /// Always `true`.
    pub success: bool,
}

/// `GET /session`
///
/// Missing, unknown and expired cookies all answer `{authenticated: false}`.
///
/// # Errors
///
/// `internal_error` on storage failure.
pub async fn current_session<B: Backend>(
    State(state): State<AppState<B>>,
    SessionCookie(session_id): SessionCookie,
) -> Result<Json<SessionResponse>, AppError> {
    let session = match session_id {
        Some(id) => state.idp.current_session(&id).await?,
        None => None,
    };

    Ok(Json(match session {
        Some(session) => SessionResponse {
            authenticated: true,
            user_id: Some(session.user_id.to_string()),
            email: Some(session.email),
            expires_at: Some(session.expires_at),
        },
        None => SessionResponse {
            authenticated: false,
            user_id: None,
            email: None,
            expires_at: None,
        },
    }))
}

/// `POST /logout`
///
/// Always expires the cookie, even when the session was already gone.
///
/// # Errors
///
/// `internal_error` on storage failure.
pub async fn logout<B: Backend>(
    State(state): State<AppState<B>>,
    SessionCookie(session_id): SessionCookie,
    ClientIp(ip): ClientIp,
) -> Result<(HeaderMap, Json<LogoutResponse>), AppError> {
    if let Some(id) = session_id {
        state.idp.logout(&id, Some(ip)).await?;
    }

    let mut headers = HeaderMap::new();
    headers.insert(SET_COOKIE, clear_session_cookie());
    Ok((headers, Json(LogoutResponse { success: true })))
}
