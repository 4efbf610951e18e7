//! Storage for identity provider state.
//!
//! Two layers live here:
//!
//! - **Backends** (Redis) implementing the provider traits:
//!   [`RedisKeyValueStore`] and [`RedisRateLimiter`].
//! - **Typed stores** over any [`KeyValueStore`](crate::providers::KeyValueStore): challenges, users and
//!   credentials, sessions, authorization codes and refresh tokens. Each owns
//!   its key layout and JSON encoding; none of them holds state of its own.

pub mod auth_code;
pub mod challenge;
pub mod credential;
pub mod kv_redis;
pub mod rate_limiter_redis;
pub mod refresh;
pub mod session;

// Re-exports
pub use auth_code::AuthCodeStore;
pub use challenge::ChallengeStore;
pub use credential::CredentialRepository;
pub use kv_redis::RedisKeyValueStore;
pub use rate_limiter_redis::RedisRateLimiter;
pub use refresh::RefreshTokenStore;
pub use session::SessionStore;

use crate::error::{AuthError, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Serialize a record for storage.
pub(crate) fn encode<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| AuthError::SerializationError(e.to_string()))
}

/// Deserialize a stored record.
pub(crate) fn decode<T: DeserializeOwned>(raw: &str) -> Result<T> {
    serde_json::from_str(raw).map_err(|e| AuthError::SerializationError(e.to_string()))
}

/// Seconds until `expires_at`, at least 1.
#[allow(clippy::cast_sign_loss)] // clamped to >= 1 first
pub(crate) fn ttl_until(expires_at: DateTime<Utc>) -> u64 {
    (expires_at - Utc::now()).num_seconds().max(1) as u64
}
