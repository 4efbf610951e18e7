//! User and credential repository.
//!
//! Users are stored as whole aggregates under `user:{email}`, with a
//! `user:id:{user_id}` → email index. Callers read, modify and replace the
//! aggregate; there is no per-credential key.

use crate::constants::keys;
use crate::error::Result;
use crate::providers::KeyValueStore;
use crate::state::{User, UserId};

use super::{decode, encode};

/// Typed user repository over a key-value backend.
#[derive(Clone)]
pub struct CredentialRepository<K> {
    kv: K,
}

impl<K: KeyValueStore> CredentialRepository<K> {
    /// Create a repository.
    pub const fn new(kv: K) -> Self {
        Self { kv }
    }

    /// Load a user by normalized email.
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails or the record is corrupt.
    pub async fn get_user(&self, email: &str) -> Result<Option<User>> {
        match self.kv.get(&keys::user(email)).await? {
            Some(raw) => Ok(Some(decode(&raw)?)),
            None => Ok(None),
        }
    }

    /// Load a user by id.
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails or a record is corrupt.
    pub async fn get_user_by_id(&self, user_id: &UserId) -> Result<Option<User>> {
        match self.kv.get(&keys::user_by_id(user_id)).await? {
            Some(email) => self.get_user(&email).await,
            None => Ok(None),
        }
    }

    /// Create a user with no credentials, or return the existing one.
    ///
    /// Concurrent callers for the same email all get the same user.
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails.
    pub async fn create_user(&self, email: &str) -> Result<User> {
        let user = User::new(email);

        if self.kv.set_nx(&keys::user(email), encode(&user)?, None).await? {
            self.kv
                .set(&keys::user_by_id(&user.user_id), email.to_string())
                .await?;
            tracing::info!(user_id = %user.user_id, "User created");
            return Ok(user);
        }

        // Lost the race (or the user already existed)
        match self.get_user(email).await? {
            Some(existing) => Ok(existing),
            None => Err(crate::AuthError::StorageError(format!(
                "user record for {email} vanished during creation"
            ))),
        }
    }

    /// Load the user or create them.
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails.
    pub async fn get_or_create_user(&self, email: &str) -> Result<User> {
        match self.get_user(email).await? {
            Some(user) => Ok(user),
            None => self.create_user(email).await,
        }
    }

    /// Replace the stored aggregate.
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails.
    pub async fn update_user(&self, user: &User) -> Result<()> {
        self.kv.set(&keys::user(&user.email), encode(user)?).await?;
        tracing::debug!(
            user_id = %user.user_id,
            credentials = user.credentials.len(),
            "User updated"
        );
        Ok(())
    }
}
