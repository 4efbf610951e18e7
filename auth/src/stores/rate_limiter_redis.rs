//! Redis-based rate limiter implementation.
//!
//! Uses sliding window algorithm for accurate rate limiting.
//!
//! # Algorithm
//!
//! Sliding window with sorted sets, one set per `<bucket>:<identifier>`:
//! 1. Remove entries outside the window (ZREMRANGEBYSCORE)
//! 2. Count remaining entries (ZCARD)
//! 3. Store this request (ZADD, score = timestamp, member = timestamp + nonce)
//! 4. Refresh the key TTL (EXPIRE)
//!
//! A rejected request removes its own entry again, so only admitted requests
//! count against the window.

use crate::error::{AuthError, Result};
use crate::providers::RateLimiter;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// `Redis`-based rate limiter using sliding window algorithm.
///
/// # Example
///
/// ```no_run
/// use passkey_idp_auth::stores::RedisRateLimiter;
/// use passkey_idp_auth::providers::RateLimiter;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let limiter = RedisRateLimiter::new("redis://127.0.0.1:6379").await?;
///
/// // 10 requests per minute for this client on the webauthn bucket
/// limiter.check_and_record("webauthn:203.0.113.7", 10, std::time::Duration::from_secs(60)).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RedisRateLimiter {
    /// Connection manager for connection pooling.
    conn_manager: ConnectionManager,
}

impl RedisRateLimiter {
    /// Create a new `Redis` rate limiter.
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

    /// Build from an existing connection manager.
    #[must_use]
    pub const fn from_connection_manager(conn_manager: ConnectionManager) -> Self {
        Self { conn_manager }
    }

    /// Get the `Redis` key for rate limiting.
    fn rate_limit_key(key: &str) -> String {
        format!("rate_limit:{key}")
    }

    /// Get current timestamp in milliseconds.
    #[allow(clippy::cast_possible_truncation)] // Safe: timestamps fit in u64 until year 2554
    fn current_timestamp_ms() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_millis() as u64
    }
}

impl RateLimiter for RedisRateLimiter {
    async fn check_and_record(&self, key: &str, max_attempts: u32, window: Duration) -> Result<()> {
        let mut conn = self.conn_manager.clone();
        let rate_key = Self::rate_limit_key(key);
        let now_ms = Self::current_timestamp_ms();
        #[allow(clippy::cast_possible_truncation)] // Safe: rate limit windows are small durations
        let window_ms = window.as_millis() as u64;
        let window_start = now_ms.saturating_sub(window_ms);
        // Unique member so requests in the same millisecond are all counted
        let member = format!("{now_ms}-{}", uuid::Uuid::new_v4().simple());
        let ttl_secs = window.as_secs().saturating_add(1);

        // Pipeline is MULTI/EXEC: trim, count, add and expire run as one unit.
        // .ignore() drops the reply, not the error.
        let (count,): (u64,) = redis::pipe()
            .atomic()
            .zrembyscore(&rate_key, 0, window_start)
            .ignore()
            .zcard(&rate_key) // count BEFORE this request
            .zadd(&rate_key, &member, now_ms)
            .ignore()
            .expire(&rate_key, i64::try_from(ttl_secs).unwrap_or(i64::MAX))
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(|e| {
                tracing::error!(
                    error = %e,
                    key = %key,
                    "Redis pipeline failed during rate limit check"
                );
                AuthError::StorageError(format!("Failed to check and record rate limit: {e}"))
            })?;

        if count >= u64::from(max_attempts) {
            // Rejected requests do not consume quota
            let _: () = conn.zrem(&rate_key, &member).await.map_err(|e| {
                AuthError::StorageError(format!("Failed to drop rejected rate limit entry: {e}"))
            })?;

            tracing::warn!(
                rate_limit_exceeded = true,
                key = %key,
                attempts = count + 1,
                max_attempts = max_attempts,
                window_ms = window_ms,
                "Rate limit exceeded"
            );

            return Err(AuthError::TooManyAttempts { retry_after: window });
        }

        tracing::debug!(
            key = %key,
            attempts = count + 1,
            max_attempts = max_attempts,
            window_ms = window_ms,
            "Rate limit check passed"
        );

        Ok(())
    }

    async fn reset(&self, key: &str) -> Result<()> {
        let mut conn = self.conn_manager.clone();
        let rate_key = Self::rate_limit_key(key);

        let _: () = conn.del(&rate_key).await.map_err(|e| {
            AuthError::StorageError(format!("Failed to reset rate limit: {e}"))
        })?;

        tracing::info!(key = %key, "Reset rate limit");

        Ok(())
    }

    async fn get_attempts(&self, key: &str, window: Duration) -> Result<u32> {
        let mut conn = self.conn_manager.clone();
        let rate_key = Self::rate_limit_key(key);
        let now_ms = Self::current_timestamp_ms();
        #[allow(clippy::cast_possible_truncation)]
        let window_start = now_ms.saturating_sub(window.as_millis() as u64);

        let count: u64 = conn
            .zcount(&rate_key, window_start, "+inf")
            .await
            .map_err(|e| AuthError::StorageError(format!("Failed to get rate limit attempts: {e}")))?;

        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }
}
