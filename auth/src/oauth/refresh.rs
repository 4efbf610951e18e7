//! Refresh token rotation with reuse detection.
//!
//! Every refresh returns a new token and retires the presented one. Tokens
//! descending from one code exchange share a `rotation_id` (the chain).
//!
//! Retiring a token leaves a tombstone. Presenting a tombstoned token again
//! means it leaked: the chain's live token is revoked, so both the thief and
//! the legitimate client must re-authenticate.
//!
//! Revocation also marks the chain. A successor written while a replay was
//! being handled finds the mark and is discarded, so no token outlives the
//! revocation of its chain.

use crate::error::{AuthError, Result};
use crate::providers::{AuditEvent, AuditEventKind, AuditSink, KeyValueStore};
use crate::state::{RefreshTokenRecord, UserId};
use crate::stores::RefreshTokenStore;
use chrono::{Duration, Utc};
use std::net::IpAddr;
use uuid::Uuid;

/// Issues, rotates, validates and revokes refresh tokens.
#[derive(Clone)]
pub struct RefreshRotator<K, A> {
    store: RefreshTokenStore<K>,
    audit: A,
    ttl: Duration,
}

impl<K: KeyValueStore, A: AuditSink> RefreshRotator<K, A> {
    /// Create a rotator issuing tokens of the given lifetime.
    #[must_use]
    pub const fn new(kv: K, audit: A, ttl: Duration) -> Self {
        Self {
            store: RefreshTokenStore::new(kv),
            audit,
            ttl,
        }
    }

    /// Issue a new token, retiring `prev` if given.
    ///
    /// The new token is stored before the previous one is deleted. If storing
    /// fails, the claim on `prev` is released so the client can retry.
    ///
    /// # Errors
    ///
    /// - `AuthError::InvalidRefresh` if `prev` is unknown or expired
    /// - `AuthError::RefreshReused` if `prev` was already rotated, including
    ///   by a concurrent request, or its chain was revoked meanwhile
    pub async fn rotate(
        &self,
        prev: Option<&str>,
        user_id: UserId,
        client_id: &str,
        email: &str,
        ip: Option<IpAddr>,
    ) -> Result<String> {
        let previous = match prev {
            Some(prev_id) => {
                let Some(record) = self.store.get(prev_id).await? else {
                    return Err(self.reject(prev_id, ip).await?);
                };
                if !self.store.claim_rotation(&record).await? {
                    self.revoke_chain(prev_id, &record.rotation_id, ip).await?;
                    return Err(AuthError::RefreshReused);
                }
                Some(record)
            }
            None => None,
        };

        let record = match self.mint(previous.as_ref(), user_id, client_id, email).await {
            Ok(record) => record,
            Err(e) => {
                if let Some(previous) = previous.as_ref().filter(|_| e != AuthError::RefreshReused) {
                    if let Err(release) = self.store.release_rotation(previous).await {
                        tracing::error!(error = %release, "Failed to release refresh token claim");
                    }
                }
                return Err(e);
            }
        };

        if let Some(previous) = previous {
            self.store.delete(&previous.token_id).await?;
            tracing::info!(user_id = %user_id, client_id = %client_id, "Refresh token rotated");
            self.audit
                .record(
                    AuditEvent::new(AuditEventKind::RefreshRotated)
                        .with_user(user_id)
                        .with_ip(ip)
                        .with("client_id", client_id),
                )
                .await;
        }

        Ok(record.token_id)
    }

    /// Store a successor to `previous` (or a new chain) and make it the head.
    async fn mint(
        &self,
        previous: Option<&RefreshTokenRecord>,
        user_id: UserId,
        client_id: &str,
        email: &str,
    ) -> Result<RefreshTokenRecord> {
        let now = Utc::now();
        let record = RefreshTokenRecord {
            token_id: Uuid::new_v4().to_string(),
            user_id,
            client_id: client_id.to_string(),
            email: email.to_string(),
            rotation_id: previous.map_or_else(|| Uuid::new_v4().to_string(), |p| p.rotation_id.clone()),
            prev_id: previous.map(|p| p.token_id.clone()),
            created_at: now,
            expires_at: now + self.ttl,
        };

        let stored = match self.store.put(&record).await {
            Ok(()) => self.store.set_chain_head(&record).await,
            Err(e) => Err(e),
        };
        if let Err(e) = stored {
            self.discard(&record).await;
            return Err(e);
        }

        if previous.is_some() && self.store.is_chain_revoked(&record.rotation_id).await? {
            tracing::warn!(rotation_id = %record.rotation_id, "Chain revoked during rotation, successor discarded");
            self.discard(&record).await;
            if let Err(e) = self.store.clear_chain(&record.rotation_id).await {
                tracing::error!(error = %e, "Failed to clear revoked refresh chain");
            }
            return Err(AuthError::RefreshReused);
        }

        Ok(record)
    }

    async fn discard(&self, record: &RefreshTokenRecord) {
        if let Err(e) = self.store.delete(&record.token_id).await {
            tracing::error!(error = %e, "Failed to discard unissued refresh token");
        }
    }

    /// Load a live token.
    ///
    /// # Errors
    ///
    /// - `AuthError::InvalidRefresh` if unknown or expired
    /// - `AuthError::RefreshReused` if the token was rotated away (the chain
    ///   is revoked as a side effect)
    pub async fn validate(&self, token_id: &str, ip: Option<IpAddr>) -> Result<RefreshTokenRecord> {
        match self.store.get(token_id).await? {
            Some(record) => Ok(record),
            None => Err(self.reject(token_id, ip).await?),
        }
    }

    /// Revoke a token. Unknown tokens are ignored.
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails.
    pub async fn revoke(&self, token_id: &str, ip: Option<IpAddr>) -> Result<()> {
        let Some(record) = self.store.get(token_id).await? else {
            return Ok(());
        };

        self.store.delete(token_id).await?;
        if self.store.chain_head(&record.rotation_id).await?.as_deref() == Some(token_id) {
            self.store.clear_chain(&record.rotation_id).await?;
        }

        tracing::info!(user_id = %record.user_id, "Refresh token revoked");
        self.audit
            .record(
                AuditEvent::new(AuditEventKind::RefreshRevoked)
                    .with_user(record.user_id)
                    .with_ip(ip)
                    .with("client_id", record.client_id.as_str()),
            )
            .await;
        Ok(())
    }

    /// Error for a token that is not live: reuse if tombstoned, else invalid.
    async fn reject(&self, token_id: &str, ip: Option<IpAddr>) -> Result<AuthError> {
        match self.store.tombstone(token_id).await? {
            Some(rotation_id) => {
                self.revoke_chain(token_id, &rotation_id, ip).await?;
                Ok(AuthError::RefreshReused)
            }
            None => Ok(AuthError::InvalidRefresh),
        }
    }

    async fn revoke_chain(&self, replayed: &str, rotation_id: &str, ip: Option<IpAddr>) -> Result<()> {
        let ttl_secs = u64::try_from(self.ttl.num_seconds()).unwrap_or(1).max(1);
        self.store.mark_chain_revoked(rotation_id, ttl_secs).await?;

        let head = self.store.chain_head(rotation_id).await?;
        if let Some(head) = &head {
            self.store.delete(head).await?;
        }
        self.store.clear_chain(rotation_id).await?;

        tracing::warn!(
            rotation_id = %rotation_id,
            revoked_head = head.is_some(),
            "Refresh token reuse detected, chain revoked"
        );
        self.audit
            .record(
                AuditEvent::new(AuditEventKind::RefreshReuseDetected)
                    .with_ip(ip)
                    .with("rotation_id", rotation_id)
                    .with("replayed_id", replayed),
            )
            .await;
        Ok(())
    }
}

#[cfg(all(test, feature = "test-utils"))]
#[allow(clippy::unwrap_used)] // Test code
mod tests {
    use super::*;
    use crate::mocks::{MockAuditSink, MockKeyValueStore};

    fn rotator() -> (RefreshRotator<MockKeyValueStore, MockAuditSink>, MockKeyValueStore, MockAuditSink) {
        let kv = MockKeyValueStore::new();
        let audit = MockAuditSink::new();
        (RefreshRotator::new(kv.clone(), audit.clone(), Duration::days(14)), kv, audit)
    }

    #[tokio::test]
    async fn test_first_issue_starts_a_chain() {
        let (rotator, kv, _) = rotator();
        let user_id = UserId::new();

        let token = rotator.rotate(None, user_id, "demo-client", "alice@example.com", None).await.unwrap();
        let record = rotator.validate(&token, None).await.unwrap();

        assert_eq!(record.user_id, user_id);
        assert_eq!(record.client_id, "demo-client");
        assert_eq!(record.prev_id, None);
        assert!(kv.contains(&format!("refresh:chain:{}", record.rotation_id)));
    }

    #[tokio::test]
    async fn test_rotation_retires_previous() {
        let (rotator, _, audit) = rotator();
        let user_id = UserId::new();

        let a = rotator.rotate(None, user_id, "demo-client", "a@example.com", None).await.unwrap();
        let b = rotator.rotate(Some(&a), user_id, "demo-client", "a@example.com", None).await.unwrap();

        assert_ne!(a, b);
        let record_b = rotator.validate(&b, None).await.unwrap();
        assert_eq!(record_b.prev_id.as_deref(), Some(a.as_str()));
        assert!(rotator.validate(&a, None).await.is_err());
        assert!(audit.contains(AuditEventKind::RefreshRotated));
    }

    #[tokio::test]
    async fn test_chain_keeps_rotation_id() {
        let (rotator, _, _) = rotator();
        let user_id = UserId::new();

        let a = rotator.rotate(None, user_id, "demo-client", "a@example.com", None).await.unwrap();
        let b = rotator.rotate(Some(&a), user_id, "demo-client", "a@example.com", None).await.unwrap();
        let c = rotator.rotate(Some(&b), user_id, "demo-client", "a@example.com", None).await.unwrap();

        let record_c = rotator.validate(&c, None).await.unwrap();
        let rotation_id = record_c.rotation_id;
        assert_eq!(record_c.prev_id.as_deref(), Some(b.as_str()));

        let d = rotator.rotate(None, user_id, "demo-client", "a@example.com", None).await.unwrap();
        assert_ne!(rotator.validate(&d, None).await.unwrap().rotation_id, rotation_id);
    }

    #[tokio::test]
    async fn test_replay_revokes_chain() {
        let (rotator, _, audit) = rotator();
        let user_id = UserId::new();

        let a = rotator.rotate(None, user_id, "demo-client", "a@example.com", None).await.unwrap();
        let b = rotator.rotate(Some(&a), user_id, "demo-client", "a@example.com", None).await.unwrap();

        let replay = rotator.validate(&a, None).await;
        assert_eq!(replay.unwrap_err(), AuthError::RefreshReused);
        assert_eq!(AuthError::RefreshReused.client_code(), "invalid_refresh");

        // The legitimate successor is gone too
        assert_eq!(rotator.validate(&b, None).await.unwrap_err(), AuthError::InvalidRefresh);
        assert!(audit.contains(AuditEventKind::RefreshReuseDetected));
    }

    #[tokio::test]
    async fn test_rotating_a_rotated_token_is_reuse() {
        let (rotator, _, _) = rotator();
        let user_id = UserId::new();

        let a = rotator.rotate(None, user_id, "demo-client", "a@example.com", None).await.unwrap();
        let b = rotator.rotate(Some(&a), user_id, "demo-client", "a@example.com", None).await.unwrap();

        let again = rotator.rotate(Some(&a), user_id, "demo-client", "a@example.com", None).await;
        assert_eq!(again.unwrap_err(), AuthError::RefreshReused);
        assert!(rotator.validate(&b, None).await.is_err());
    }

    #[tokio::test]
    async fn test_failed_write_releases_the_claim() {
        for failing in ["refresh:chain:", "refresh:"] {
            let (rotator, kv, _) = rotator();
            let user_id = UserId::new();
            let a = rotator.rotate(None, user_id, "demo-client", "a@example.com", None).await.unwrap();

            kv.fail_writes_under(Some(failing));
            let failed = rotator.rotate(Some(&a), user_id, "demo-client", "a@example.com", None).await;
            assert!(matches!(failed, Err(AuthError::StorageError(_))), "writes under {failing}");
            kv.fail_writes_under(None);

            assert!(!kv.contains(&format!("refresh:rotated:{a}")));
            assert!(rotator.validate(&a, None).await.is_ok());

            // The retry is a normal rotation, not reuse
            let b = rotator.rotate(Some(&a), user_id, "demo-client", "a@example.com", None).await.unwrap();
            assert!(rotator.validate(&b, None).await.is_ok());
            // Live token, tombstone and chain pointer; nothing orphaned
            assert_eq!(kv.keys_with_prefix("refresh:").len(), 3);
        }
    }

    #[tokio::test]
    async fn test_replay_during_rotation_discards_successor() {
        let (rotator, kv, _) = rotator();
        let user_id = UserId::new();
        let a = rotator.rotate(None, user_id, "demo-client", "a@example.com", None).await.unwrap();
        let record_a = rotator.validate(&a, None).await.unwrap();

        // A legitimate request claims `a`
        assert!(rotator.store.claim_rotation(&record_a).await.unwrap());

        // A replay of `a` lands before the successor is written
        let replay = rotator.rotate(Some(&a), user_id, "demo-client", "a@example.com", None).await;
        assert_eq!(replay.unwrap_err(), AuthError::RefreshReused);

        let successor = rotator.mint(Some(&record_a), user_id, "demo-client", "a@example.com").await;
        assert_eq!(successor.unwrap_err(), AuthError::RefreshReused);

        let live: Vec<_> = kv
            .keys_with_prefix("refresh:")
            .into_iter()
            .filter(|k| !k.starts_with("refresh:rotated:") && !k.starts_with("refresh:revoked:"))
            .collect();
        assert!(live.is_empty(), "live keys left: {live:?}");
    }

    #[tokio::test]
    async fn test_unknown_token_is_invalid() {
        let (rotator, _, audit) = rotator();

        assert_eq!(rotator.validate("nope", None).await.unwrap_err(), AuthError::InvalidRefresh);
        let rotated = rotator.rotate(Some("nope"), UserId::new(), "demo-client", "a@example.com", None).await;
        assert_eq!(rotated.unwrap_err(), AuthError::InvalidRefresh);
        assert!(!audit.contains(AuditEventKind::RefreshReuseDetected));
    }

    #[tokio::test]
    async fn test_revoke_is_idempotent() {
        let (rotator, _, audit) = rotator();
        let token = rotator.rotate(None, UserId::new(), "demo-client", "a@example.com", None).await.unwrap();

        rotator.revoke(&token, None).await.unwrap();
        rotator.revoke(&token, None).await.unwrap();

        assert_eq!(rotator.validate(&token, None).await.unwrap_err(), AuthError::InvalidRefresh);
        assert_eq!(audit.events_of(AuditEventKind::RefreshRevoked).len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_rotation_single_winner() {
        let (rotator, _, _) = rotator();
        let user_id = UserId::new();
        let a = rotator.rotate(None, user_id, "demo-client", "a@example.com", None).await.unwrap();

        let mut handles = vec![];
        for _ in 0..10 {
            let rotator = rotator.clone();
            let a = a.clone();
            handles.push(tokio::spawn(async move {
                rotator.rotate(Some(&a), user_id, "demo-client", "a@example.com", None).await
            }));
        }

        let mut successes = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                successes += 1;
            }
        }
        assert_eq!(successes, 1, "Exactly one rotation should succeed");
    }
}
