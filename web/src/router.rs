//! Route table and layer stack.

use crate::handlers::{discovery, health, oauth, session, webauthn};
use crate::middleware::{correlation_id_layer, expose_error_detail, rate_limit};
use crate::state::{AppState, Backend};
use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

/// Build the application router.
///
/// With `production = false`, error bodies carry a `detail` field with the
/// internal message.
pub fn build_router<B: Backend>(state: AppState<B>, production: bool) -> Router {
    let mut app = Router::new()
        .route("/health", get(health::health_check))
        // Passkey ceremonies
        .route("/webauthn/begin", post(webauthn::begin::<B>))
        .route("/webauthn/register/verify", post(webauthn::register_verify::<B>))
        .route("/webauthn/auth/verify", post(webauthn::auth_verify::<B>))
        // OAuth 2.1 / OIDC
        .route("/oauth/authorize", get(oauth::authorize::<B>))
        .route("/oauth/token", post(oauth::token::<B>))
        .route("/oauth/revoke", post(oauth::revoke::<B>))
        .route("/jwks", get(oauth::jwks::<B>))
        .route("/oidc/userinfo", get(oauth::userinfo::<B>))
        .route(
            "/.well-known/openid-configuration",
            get(discovery::openid_configuration::<B>),
        )
        // Browser session
        .route("/session", get(session::current_session::<B>))
        .route("/logout", post(session::logout::<B>))
        .layer(from_fn_with_state(state.clone(), rate_limit::<B>))
        .with_state(state);

    if !production {
        app = app.layer(from_fn(expose_error_detail));
    }

    app.layer(correlation_id_layer())
        .layer(TraceLayer::new_for_http())
}
