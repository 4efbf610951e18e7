//! Redis-backed key-value store.
//!
//! # Atomicity
//!
//! - `get_del` maps to `GETDEL` (Redis >= 6.2), so single-use records are
//!   consumed by exactly one caller.
//! - `set_nx` maps to `SET key value NX [EX ttl]`.
//!
//! # Example
//!
//! ```no_run
//! use passkey_idp_auth::stores::RedisKeyValueStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = RedisKeyValueStore::new("redis://127.0.0.1:6379").await?;
//! # Ok(())
//! # }
//! ```

use crate::error::{AuthError, Result};
use crate::providers::KeyValueStore;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};

/// `Redis` key-value store with connection pooling via `ConnectionManager`.
#[derive(Clone)]
pub struct RedisKeyValueStore {
    /// Connection manager for connection pooling.
    conn_manager: ConnectionManager,
}

impl RedisKeyValueStore {
    /// Create a new `Redis` key-value store.
    ///
    /// # Arguments
    ///
    /// * `redis_url` - `Redis` connection URL (e.g., "<redis://127.0.0.1:6379>")
    ///
    /// # Errors
    ///
    /// Returns error if connection to `Redis` fails.
    pub async fn new(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url).map_err(|e| {
            AuthError::StorageError(format!("Failed to create Redis client: {e}"))
        })?;

        let conn_manager = ConnectionManager::new(client).await.map_err(|e| {
            AuthError::StorageError(format!("Failed to create Redis connection manager: {e}"))
        })?;

        Ok(Self { conn_manager })
    }

    /// Build from an existing connection manager (shared with the rate limiter).
    #[must_use]
    pub const fn from_connection_manager(conn_manager: ConnectionManager) -> Self {
        Self { conn_manager }
    }

    /// The underlying connection manager.
    #[must_use]
    pub fn connection_manager(&self) -> ConnectionManager {
        self.conn_manager.clone()
    }
}

fn storage_error(op: &'static str, key: &str, e: &redis::RedisError) -> AuthError {
    tracing::error!(error = %e, op = op, key = %key, "Redis operation failed");
    AuthError::StorageError(format!("Redis {op} failed: {e}"))
}

impl KeyValueStore for RedisKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn_manager.clone();
        conn.get(key).await.map_err(|e| storage_error("GET", key, &e))
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        let mut conn = self.conn_manager.clone();
        conn.set(key, value).await.map_err(|e| storage_error("SET", key, &e))
    }

    async fn set_ex(&self, key: &str, value: String, ttl_secs: u64) -> Result<()> {
        let mut conn = self.conn_manager.clone();
        conn.set_ex(key, value, ttl_secs.max(1))
            .await
            .map_err(|e| storage_error("SETEX", key, &e))
    }

    async fn set_nx(&self, key: &str, value: String, ttl_secs: Option<u64>) -> Result<bool> {
        let mut conn = self.conn_manager.clone();
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value).arg("NX");
        if let Some(ttl) = ttl_secs {
            cmd.arg("EX").arg(ttl.max(1));
        }

        // Reply is "OK" when written, nil when the key already existed
        let reply: Option<String> = cmd
            .query_async(&mut conn)
            .await
            .map_err(|e| storage_error("SET NX", key, &e))?;

        Ok(reply.is_some())
    }

    async fn get_del(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn_manager.clone();
        conn.get_del(key).await.map_err(|e| storage_error("GETDEL", key, &e))
    }

    async fn del(&self, key: &str) -> Result<()> {
        let mut conn = self.conn_manager.clone();
        conn.del(key).await.map_err(|e| storage_error("DEL", key, &e))
    }
}
