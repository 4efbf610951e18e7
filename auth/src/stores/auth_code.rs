//! Authorization code storage.
//!
//! Codes live under `auth_code:{code}` with a TTL equal to their lifetime and
//! are consumed with `get_del`, so each code is redeemable exactly once.

use crate::constants::keys;
use crate::error::Result;
use crate::providers::KeyValueStore;
use crate::state::AuthorizationCode;
use chrono::Utc;

use super::{decode, encode, ttl_until};

/// Typed authorization code store over a key-value backend.
#[derive(Clone)]
pub struct AuthCodeStore<K> {
    kv: K,
}

impl<K: KeyValueStore> AuthCodeStore<K> {
    /// Create a code store.
    pub const fn new(kv: K) -> Self {
        Self { kv }
    }

    /// Persist a freshly issued code.
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails.
    pub async fn put(&self, record: &AuthorizationCode) -> Result<()> {
        self.kv
            .set_ex(&keys::auth_code(&record.code), encode(record)?, ttl_until(record.expires_at))
            .await
    }

    /// Atomically take a code. Expired codes are treated as absent.
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails or the record is corrupt.
    pub async fn pop(&self, code: &str) -> Result<Option<AuthorizationCode>> {
        let Some(raw) = self.kv.get_del(&keys::auth_code(code)).await? else {
            return Ok(None);
        };

        let record: AuthorizationCode = decode(&raw)?;
        if record.expires_at <= Utc::now() {
            return Ok(None);
        }

        Ok(Some(record))
    }
}
