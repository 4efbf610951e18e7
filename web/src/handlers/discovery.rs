//! OpenID Connect discovery.

use crate::state::{AppState, Backend};
use axum::{extract::State, Json};
use passkey_idp_auth::oauth::DiscoveryDocument;

/// `GET /.well-known/openid-configuration`
#[allow(clippy::unused_async)]
pub async fn openid_configuration<B: Backend>(State(state): State<AppState<B>>) -> Json<DiscoveryDocument> {
    Json(state.idp.oauth.discovery())
}
