//! Session storage.
//!
//! Sessions live under `session:{id}` with a TTL equal to their remaining
//! lifetime. Reads double-check `expires_at`, so a session is absent the
//! moment it expires even if the backend has not evicted it yet.

use crate::constants::keys;
use crate::error::Result;
use crate::providers::KeyValueStore;
use crate::state::{Session, SessionId, UserId};
use chrono::{Duration, Utc};

use super::{decode, encode, ttl_until};

/// Typed session store over a key-value backend.
#[derive(Clone)]
pub struct SessionStore<K> {
    kv: K,
    lifetime: Duration,
}

impl<K: KeyValueStore> SessionStore<K> {
    /// Create a session store issuing sessions of the given lifetime.
    pub const fn new(kv: K, lifetime: Duration) -> Self {
        Self { kv, lifetime }
    }

    /// Session lifetime (also the cookie `Max-Age`).
    pub const fn lifetime(&self) -> Duration {
        self.lifetime
    }

    /// Create a session for a user.
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails.
    pub async fn create_session(&self, user_id: UserId, email: &str) -> Result<Session> {
        let now = Utc::now();
        let session = Session {
            session_id: SessionId::new(),
            user_id,
            email: email.to_string(),
            created_at: now,
            expires_at: now + self.lifetime,
        };

        self.kv
            .set_ex(
                &keys::session(session.session_id.as_str()),
                encode(&session)?,
                ttl_until(session.expires_at),
            )
            .await?;

        tracing::info!(user_id = %user_id, expires_at = %session.expires_at, "Session created");

        Ok(session)
    }

    /// Load a live session.
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails or the record is corrupt.
    pub async fn get_session(&self, session_id: &str) -> Result<Option<Session>> {
        let Some(raw) = self.kv.get(&keys::session(session_id)).await? else {
            return Ok(None);
        };

        let session: Session = decode(&raw)?;
        if session.is_expired() {
            tracing::debug!(user_id = %session.user_id, "Session expired");
            return Ok(None);
        }

        Ok(Some(session))
    }

    /// Delete a session. Deleting a missing session is not an error.
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails.
    pub async fn delete_session(&self, session_id: &str) -> Result<()> {
        self.kv.del(&keys::session(session_id)).await?;
        tracing::info!("Session deleted");
        Ok(())
    }
}
