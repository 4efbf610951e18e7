//! OAuth 2.1 and OpenID Connect endpoints.
//!
//! ```text
//! GET  /oauth/authorize  (session cookie)   → 302 redirect_uri?code=..&state=..
//! POST /oauth/token      (form)             → {token_type, expires_in, access_token, id_token, refresh_token}
//! POST /oauth/revoke     (form or JSON)     → {revoked: true}
//! GET  /jwks                                → {keys: [...]}
//! GET  /oidc/userinfo    (Bearer)           → {sub, email}
//! ```

use crate::error::AppError;
use crate::extractors::{BearerToken, ClientIp, SessionCookie};
use crate::state::{AppState, Backend};
use axum::{
    extract::{
        rejection::{FormRejection, QueryRejection},
        FromRequest, Query, Request, State,
    },
    http::{
        header::{CACHE_CONTROL, CONTENT_TYPE, LOCATION, PRAGMA, WWW_AUTHENTICATE},
        HeaderValue, StatusCode,
    },
    response::{IntoResponse, Response},
    Form, Json,
};
use passkey_idp_auth::oauth::{AuthorizeRequest, Jwks, TokenRequest, TokenResponse, UserInfo};
use passkey_idp_auth::AuthError;
use serde::{Deserialize, Serialize};

/// Body of `POST /oauth/revoke`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RevokeRequest {
    /// Refresh token to revoke.
    #[serde(default)]
    pub token: String,
}

/// Body of a successful revoke.
#[derive(Debug, Clone, Serialize)]
pub struct RevokeResponse {
    /// Always `true`.
    pub revoked: bool,
}

/// `GET /oauth/authorize`
///
/// Redirects with `302 Found` and never shows a consent screen: the only
/// client is first-party.
///
/// # Errors
///
/// `invalid_client_or_redirect`, `invalid_pkce` or `login_required`.
pub async fn authorize<B: Backend>(
    State(state): State<AppState<B>>,
    SessionCookie(session_id): SessionCookie,
    ClientIp(ip): ClientIp,
    query: Result<Query<AuthorizeRequest>, QueryRejection>,
) -> Result<Response, AppError> {
    let Query(request) = query.map_err(|e| AppError::invalid_request(e.body_text()))?;

    let location = state
        .idp
        .oauth
        .authorize(session_id.as_deref(), &request, Some(ip))
        .await?;
    let location =
        HeaderValue::from_str(&location).map_err(|e| AppError::internal(format!("Redirect location: {e}")))?;

    Ok((StatusCode::FOUND, [(LOCATION, location)]).into_response())
}

/// `POST /oauth/token`
///
/// # Errors
///
/// Any code-exchange or refresh error, or `unsupported_grant_type`.
pub async fn token<B: Backend>(
    State(state): State<AppState<B>>,
    ClientIp(ip): ClientIp,
    form: Result<Form<TokenRequest>, FormRejection>,
) -> Result<Response, AppError> {
    let Form(request) = form.map_err(|e| AppError::invalid_request(e.body_text()))?;

    let tokens: TokenResponse = state.idp.oauth.token(&request, Some(ip)).await?;

    Ok((
        [
            (CACHE_CONTROL, HeaderValue::from_static("no-store")),
            (PRAGMA, HeaderValue::from_static("no-cache")),
        ],
        Json(tokens),
    )
        .into_response())
}

/// `POST /oauth/revoke`
///
/// Accepts `application/json` or form bodies. Unknown tokens still answer
/// `{revoked: true}`.
///
/// # Errors
///
/// `invalid_request` if the body has no token.
pub async fn revoke<B: Backend>(
    State(state): State<AppState<B>>,
    ClientIp(ip): ClientIp,
    request: Request,
) -> Result<Json<RevokeResponse>, AppError> {
    let is_json = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/json"));

    let body = if is_json {
        Json::<RevokeRequest>::from_request(request, &())
            .await
            .map(|Json(body)| body)
            .map_err(|e| AppError::invalid_request(e.body_text()))?
    } else {
        Form::<RevokeRequest>::from_request(request, &())
            .await
            .map(|Form(body)| body)
            .map_err(|e| AppError::invalid_request(e.body_text()))?
    };

    if body.token.is_empty() {
        return Err(AppError::invalid_request("token is required"));
    }

    state.idp.oauth.revoke(&body.token, Some(ip)).await?;
    Ok(Json(RevokeResponse { revoked: true }))
}

/// `GET /jwks`
///
/// # Errors
///
/// `internal_error` if the key ring cannot be read.
#[allow(clippy::unused_async)]
pub async fn jwks<B: Backend>(State(state): State<AppState<B>>) -> Result<Response, AppError> {
    let keys: Jwks = state.idp.oauth.jwks()?;
    Ok((
        [(CACHE_CONTROL, HeaderValue::from_static("public, max-age=300"))],
        Json(keys),
    )
        .into_response())
}

/// `GET /oidc/userinfo`
///
/// # Errors
///
/// `invalid_token` (401, with `WWW-Authenticate`) for a missing or bad token.
pub async fn userinfo<B: Backend>(
    State(state): State<AppState<B>>,
    ClientIp(ip): ClientIp,
    BearerToken(token): BearerToken,
) -> Result<Json<UserInfo>, Response> {
    let result = match token {
        Some(token) => state.idp.oauth.userinfo(&token, Some(ip)).await,
        None => Err(AuthError::InvalidToken),
    };

    result.map(Json).map_err(|err| {
        let challenge = HeaderValue::from_static("Bearer error=\"invalid_token\"");
        let mut response = AppError::from(err).into_response();
        if response.status() == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(WWW_AUTHENTICATE, challenge);
        }
        response
    })
}
