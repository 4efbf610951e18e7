//! # Passkey Identity Provider: HTTP
//!
//! Axum surface for [`passkey_idp_auth`]: passkey ceremonies, the OAuth 2.1
//! authorization server and the browser session, plus the server binary.
//!
//! # Request Flow
//!
//! 1. **Trace + correlation ID**: every request gets a span and an ID
//! 2. **Rate limit**: `webauthn` and `oauth` route families, keyed by client IP
//! 3. **Extract** JSON, form, query, cookie and bearer inputs
//! 4. **Call** the `IdentityProvider`
//! 5. **Map** `AuthError` to a status and a client-safe code
//!
//! # Example
//!
//! ```ignore
//! use passkey_idp_web::{build_router, AppState, RedisBackend};
//!
//! let app = build_router::<RedisBackend>(AppState::new(idp), config.is_production());
//! axum::serve(listener, app).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod cookies;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod state;

// Re-export key types for convenience
pub use config::ServerConfig;
pub use error::AppError;
pub use extractors::{BearerToken, ClientIp, CorrelationId, RequestOrigin, SessionCookie, TrustedProxies};
pub use middleware::{correlation_id_layer, CORRELATION_ID_HEADER};
pub use router::build_router;
pub use state::{AppState, Backend, RedisBackend};

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;
