//! # Passkey Identity Provider: Core
//!
//! Passwordless sign-in with WebAuthn passkeys, exposed to relying
//! applications as an OAuth 2.1 authorization server with OpenID Connect ID
//! tokens.
//!
//! ## Features
//!
//! - **Passkey ceremonies**: one `begin` for both sign-up and sign-in, single-use
//!   challenges, signature counter tracking
//! - **OAuth 2.1**: authorization code + S256 PKCE only, exact redirect URIs
//! - **Tokens**: RS256 JWTs with a rotating key ring and published JWKS
//! - **Refresh rotation**: every refresh retires its token; replay revokes the chain
//! - **Rate limiting**: sliding windows in Redis, in-process fallback
//! - **Testable**: every backend is a trait with an in-memory mock
//!
//! ## Architecture
//!
//! ```text
//! HTTP handler → IdentityProvider → { CeremonyOrchestrator, OAuthService }
//!                                          │
//!                                    typed stores → KeyValueStore (Redis)
//! ```
//!
//! ## Example: Sign-in
//!
//! ```rust,ignore
//! use passkey_idp_auth::*;
//!
//! // 1. Start a ceremony; the browser receives `options`
//! let begin = idp.ceremonies.begin("alice@example.com", None, &ctx).await?;
//!
//! // 2. Browser runs navigator.credentials.get(options) and posts the result
//! let outcome = idp
//!     .ceremonies
//!     .verify_authentication("alice@example.com", &response, &ctx)
//!     .await?;
//!
//! // 3. Session created
//! assert_eq!(outcome.session.user_id, outcome.user_id);
//! ```

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]

// Public modules
pub mod audit;
pub mod config;
pub mod constants;
pub mod environment;
pub mod error;
pub mod oauth;
pub mod providers;
pub mod rate_limit;
pub mod state;
pub mod stores;
pub mod utils;
pub mod webauthn;

/// Mock implementations for testing.
#[cfg(feature = "test-utils")]
pub mod mocks;

// Re-export main types for convenience
pub use config::IdpConfig;
pub use environment::IdentityProvider;
pub use error::{AuthError, Result};
pub use state::{Session, SessionId, User, UserId};
