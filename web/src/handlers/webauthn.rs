//! Passkey ceremony endpoints.
//!
//! ```text
//! POST /webauthn/begin            {email, forceMode?}  → {mode, options}
//! POST /webauthn/register/verify  {email, response}    → cookie, {success: true}
//! POST /webauthn/auth/verify      {email, response}    → cookie, {success: true}
//! ```
//!
//! Adding a passkey to an account that already has one needs that account's
//! session cookie on both `begin` and `register/verify`.

use super::json_body;
use crate::cookies::session_cookie;
use crate::error::AppError;
use crate::extractors::{ClientIp, RequestOrigin, SessionCookie};
use crate::state::{AppState, Backend};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header::SET_COOKIE, HeaderMap},
    Json,
};
use passkey_idp_auth::state::CeremonyMode;
use passkey_idp_auth::webauthn::{BeginCeremony, CeremonyContext, CeremonyOutcome, RelyingParty};
use serde::{Deserialize, Serialize};

/// Body of `POST /webauthn/begin`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BeginRequest {
    /// Account email.
    #[serde(default)]
    pub email: String,
    /// Run this ceremony regardless of stored credentials.
    #[serde(default)]
    pub force_mode: Option<CeremonyMode>,
}

/// Body of the verify endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VerifyRequest {
    /// Account email.
    #[serde(default)]
    pub email: String,
    /// `PublicKeyCredential` JSON from the browser.
    #[serde(default)]
    pub response: serde_json::Value,
}

/// Body of a successful verify.
#[derive(Debug, Clone, Serialize)]
pub struct VerifyResponse {
    /// Always `true`.
    pub success: bool,
}

fn context<B: Backend>(
    state: &AppState<B>,
    origin: &RequestOrigin,
    ip: ClientIp,
    session: SessionCookie,
) -> CeremonyContext {
    let rp = RelyingParty::from_request(&origin.host, &origin.scheme, &state.idp.config.passkey);
    CeremonyContext::new(rp, Some(ip.0)).with_session(session.0)
}

fn signed_in<B: Backend>(
    state: &AppState<B>,
    outcome: &CeremonyOutcome,
) -> Result<(HeaderMap, Json<VerifyResponse>), AppError> {
    let cookie = session_cookie(outcome.session.session_id.as_str(), state.session_max_age())
        .map_err(|e| AppError::internal(format!("Session cookie: {e}")))?;

    let mut headers = HeaderMap::new();
    headers.insert(SET_COOKIE, cookie);
    Ok((headers, Json(VerifyResponse { success: true })))
}

/// `POST /webauthn/begin`
///
/// # Errors
///
/// `invalid_email` for a malformed address, `login_required` when another
/// passkey is requested without the account's session, `internal_error` on
/// storage failure.
pub async fn begin<B: Backend>(
    State(state): State<AppState<B>>,
    origin: RequestOrigin,
    ip: ClientIp,
    session: SessionCookie,
    body: Result<Json<BeginRequest>, JsonRejection>,
) -> Result<Json<BeginCeremony>, AppError> {
    let request = json_body(body)?;
    let ctx = context(&state, &origin, ip, session);

    let begin = state
        .idp
        .ceremonies
        .begin(&request.email, request.force_mode, &ctx)
        .await?;
    Ok(Json(begin))
}

/// `POST /webauthn/register/verify`
///
/// # Errors
///
/// `challenge_expired`, `verification_failed`, `login_required` or
/// `invalid_request`.
pub async fn register_verify<B: Backend>(
    State(state): State<AppState<B>>,
    origin: RequestOrigin,
    ip: ClientIp,
    session: SessionCookie,
    body: Result<Json<VerifyRequest>, JsonRejection>,
) -> Result<(HeaderMap, Json<VerifyResponse>), AppError> {
    let request = json_body(body)?;
    let ctx = context(&state, &origin, ip, session);

    let outcome = state
        .idp
        .ceremonies
        .verify_registration(&request.email, &request.response, &ctx)
        .await?;
    signed_in(&state, &outcome)
}

/// `POST /webauthn/auth/verify`
///
/// # Errors
///
/// `challenge_expired`, `verification_failed` or `invalid_request`.
pub async fn auth_verify<B: Backend>(
    State(state): State<AppState<B>>,
    origin: RequestOrigin,
    ip: ClientIp,
    body: Result<Json<VerifyRequest>, JsonRejection>,
) -> Result<(HeaderMap, Json<VerifyResponse>), AppError> {
    let request = json_body(body)?;
    let ctx = context(&state, &origin, ip, SessionCookie::default());

    let outcome = state
        .idp
        .ceremonies
        .verify_authentication(&request.email, &request.response, &ctx)
        .await?;
    signed_in(&state, &outcome)
}
