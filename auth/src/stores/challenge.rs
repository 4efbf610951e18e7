//! Single-use WebAuthn challenge storage.
//!
//! Challenges are stored with:
//! - **Key**: `challenge:{mode}:{email}` → JSON `ChallengeRecord` (the nonce
//!   plus any verifier state bound to it)
//! - **TTL**: configurable (default 5 minutes)
//! - **Atomic consumption**: `get_del`, so exactly one verify attempt sees it
//!
//! A new `begin` for the same mode and email overwrites the pending challenge.

use crate::constants::keys;
use crate::error::Result;
use crate::providers::KeyValueStore;
use crate::state::{CeremonyMode, ChallengeRecord};
use chrono::{Duration, Utc};

use super::{decode, encode};

/// Typed challenge store over a key-value backend.
#[derive(Clone)]
pub struct ChallengeStore<K> {
    kv: K,
    ttl: Duration,
}

impl<K: KeyValueStore> ChallengeStore<K> {
    /// Create a challenge store with the given challenge lifetime.
    pub const fn new(kv: K, ttl: Duration) -> Self {
        Self { kv, ttl }
    }

    /// Store (or replace) the pending challenge for this mode and email.
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails.
    pub async fn set_challenge(
        &self,
        mode: CeremonyMode,
        email: &str,
        challenge: &str,
        state: Option<String>,
    ) -> Result<()> {
        let record = ChallengeRecord {
            challenge: challenge.to_string(),
            state,
            expires_at: Utc::now() + self.ttl,
        };

        #[allow(clippy::cast_sign_loss)]
        let ttl_seconds = self.ttl.num_seconds().max(1) as u64;
        self.kv
            .set_ex(&keys::challenge(mode, email), encode(&record)?, ttl_seconds)
            .await?;

        tracing::debug!(
            mode = %mode,
            email = %email,
            ttl_seconds = ttl_seconds,
            "Stored WebAuthn challenge"
        );

        Ok(())
    }

    /// Atomically take the pending challenge.
    ///
    /// Returns `None` if there is none or it has expired.
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails or the record is corrupt.
    pub async fn pop_challenge(&self, mode: CeremonyMode, email: &str) -> Result<Option<ChallengeRecord>> {
        let Some(raw) = self.kv.get_del(&keys::challenge(mode, email)).await? else {
            tracing::debug!(mode = %mode, email = %email, "No pending challenge");
            return Ok(None);
        };

        let record: ChallengeRecord = decode(&raw)?;

        // Verify not expired (double-check, TTL should handle this)
        if record.expires_at <= Utc::now() {
            tracing::warn!(mode = %mode, email = %email, "Challenge expired before TTL eviction");
            return Ok(None);
        }

        Ok(Some(record))
    }
}

#[cfg(all(test, feature = "test-utils"))]
mod tests {
    use super::*;
    use crate::mocks::MockKeyValueStore;

    #[tokio::test]
    async fn test_pop_is_single_use() {
        let store = ChallengeStore::new(MockKeyValueStore::new(), Duration::minutes(5));
        store
            .set_challenge(CeremonyMode::Register, "a@b.co", "nonce", Some("{\"rs\":1}".into()))
            .await
            .ok();

        let first = store.pop_challenge(CeremonyMode::Register, "a@b.co").await.ok().flatten();
        let second = store.pop_challenge(CeremonyMode::Register, "a@b.co").await.ok().flatten();

        let first = first.map(|r| (r.challenge, r.state));
        assert_eq!(first, Some(("nonce".to_string(), Some("{\"rs\":1}".to_string()))));
        assert_eq!(second, None);
    }

    #[tokio::test]
    async fn test_modes_are_separate() {
        let store = ChallengeStore::new(MockKeyValueStore::new(), Duration::minutes(5));
        store.set_challenge(CeremonyMode::Register, "a@b.co", "r", None).await.ok();

        let auth = store.pop_challenge(CeremonyMode::Authenticate, "a@b.co").await.ok().flatten();
        assert_eq!(auth, None);

        let reg = store.pop_challenge(CeremonyMode::Register, "a@b.co").await.ok().flatten();
        assert_eq!(reg.map(|r| r.challenge).as_deref(), Some("r"));
    }

    #[tokio::test]
    async fn test_new_begin_replaces_pending_challenge() {
        let store = ChallengeStore::new(MockKeyValueStore::new(), Duration::minutes(5));
        store.set_challenge(CeremonyMode::Authenticate, "a@b.co", "old", None).await.ok();
        store.set_challenge(CeremonyMode::Authenticate, "a@b.co", "new", None).await.ok();

        let popped = store.pop_challenge(CeremonyMode::Authenticate, "a@b.co").await.ok().flatten();
        assert_eq!(popped.map(|r| r.challenge).as_deref(), Some("new"));
    }

    #[tokio::test]
    async fn test_expired_challenge_is_absent() {
        let store = ChallengeStore::new(MockKeyValueStore::new(), Duration::seconds(-1));
        store.set_challenge(CeremonyMode::Register, "a@b.co", "nonce", None).await.ok();

        let popped = store.pop_challenge(CeremonyMode::Register, "a@b.co").await.ok().flatten();
        assert_eq!(popped, None);
    }
}
