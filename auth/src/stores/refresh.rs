//! Refresh token storage.
//!
//! Three key families:
//! - `refresh:{token_id}` → live token record, TTL = remaining lifetime
//! - `refresh:rotated:{token_id}` → tombstone left when a token is rotated away
//! - `refresh:chain:{rotation_id}` → id of the chain's live token
//! - `refresh:revoked:{rotation_id}` → marker left when reuse revokes a chain

use crate::constants::keys;
use crate::error::Result;
use crate::providers::KeyValueStore;
use crate::state::RefreshTokenRecord;
use chrono::Utc;

use super::{decode, encode, ttl_until};

/// Typed refresh token store over a key-value backend.
#[derive(Clone)]
pub struct RefreshTokenStore<K> {
    kv: K,
}

impl<K: KeyValueStore> RefreshTokenStore<K> {
    /// Create a refresh token store.
    pub const fn new(kv: K) -> Self {
        Self { kv }
    }

    /// Persist a token record.
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails.
    pub async fn put(&self, record: &RefreshTokenRecord) -> Result<()> {
        self.kv
            .set_ex(&keys::refresh(&record.token_id), encode(record)?, ttl_until(record.expires_at))
            .await
    }

    /// Load a live token. Expired tokens are treated as absent.
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails or the record is corrupt.
    pub async fn get(&self, token_id: &str) -> Result<Option<RefreshTokenRecord>> {
        let Some(raw) = self.kv.get(&keys::refresh(token_id)).await? else {
            return Ok(None);
        };

        let record: RefreshTokenRecord = decode(&raw)?;
        if record.expires_at <= Utc::now() {
            return Ok(None);
        }

        Ok(Some(record))
    }

    /// Delete a token. Deleting a missing token is not an error.
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails.
    pub async fn delete(&self, token_id: &str) -> Result<()> {
        self.kv.del(&keys::refresh(token_id)).await
    }

    /// Claim a token for rotation by writing its tombstone.
    ///
    /// Returns `false` if the token was already rotated (or is being rotated
    /// concurrently); the caller must then treat the request as reuse.
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails.
    pub async fn claim_rotation(&self, record: &RefreshTokenRecord) -> Result<bool> {
        self.kv
            .set_nx(
                &keys::refresh_rotated(&record.token_id),
                record.rotation_id.clone(),
                Some(ttl_until(record.expires_at)),
            )
            .await
    }

    /// Undo [`claim_rotation`](Self::claim_rotation) after a failed rotation.
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails.
    pub async fn release_rotation(&self, record: &RefreshTokenRecord) -> Result<()> {
        self.kv.del(&keys::refresh_rotated(&record.token_id)).await
    }

    /// Rotation id of a rotated-away token, if its tombstone is still present.
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails.
    pub async fn tombstone(&self, token_id: &str) -> Result<Option<String>> {
        self.kv.get(&keys::refresh_rotated(token_id)).await
    }

    /// Point a chain at its live token.
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails.
    pub async fn set_chain_head(&self, record: &RefreshTokenRecord) -> Result<()> {
        self.kv
            .set_ex(
                &keys::refresh_chain(&record.rotation_id),
                record.token_id.clone(),
                ttl_until(record.expires_at),
            )
            .await
    }

    /// Live token id of a chain.
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails.
    pub async fn chain_head(&self, rotation_id: &str) -> Result<Option<String>> {
        self.kv.get(&keys::refresh_chain(rotation_id)).await
    }

    /// Mark a chain revoked for `ttl_secs`.
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails.
    pub async fn mark_chain_revoked(&self, rotation_id: &str, ttl_secs: u64) -> Result<()> {
        self.kv
            .set_ex(&keys::refresh_revoked(rotation_id), "1".to_string(), ttl_secs)
            .await
    }

    /// Whether reuse revoked this chain.
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails.
    pub async fn is_chain_revoked(&self, rotation_id: &str) -> Result<bool> {
        Ok(self.kv.get(&keys::refresh_revoked(rotation_id)).await?.is_some())
    }

    /// Forget a chain pointer.
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails.
    pub async fn clear_chain(&self, rotation_id: &str) -> Result<()> {
        self.kv.del(&keys::refresh_chain(rotation_id)).await
    }
}
