//! Rate limiter trait for admission control.
//!
//! # Implementation
//!
//! Use Redis with sliding window algorithm for distributed rate limiting.
//! [`InMemoryRateLimiter`](crate::rate_limit::InMemoryRateLimiter) implements
//! the same contract for a single process.

use crate::error::Result;
use std::time::Duration;

/// Sliding-window rate limiter.
///
/// # Security
///
/// **CRITICAL**: Check and record must happen in one atomic step. Otherwise two
/// concurrent requests can both pass the check before either records,
/// bypassing the limit.
pub trait RateLimiter: Send + Sync {
    /// Check and record in one atomic operation.
    ///
    /// Rejected requests are not recorded.
    ///
    /// # Arguments
    ///
    /// * `key` - Rate limit key (`<bucket>:<identifier>`)
    /// * `max_attempts` - Maximum admitted requests in the window
    /// * `window` - Time window duration
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - Rate limit exceeded → `AuthError::TooManyAttempts`
    /// - `Redis` error → `AuthError::StorageError`
    fn check_and_record(
        &self,
        key: &str,
        max_attempts: u32,
        window: Duration,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Reset rate limit for a key.
    ///
    /// # Errors
    ///
    /// Returns error if the backing store fails.
    fn reset(&self, key: &str) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Number of admitted requests for a key within the trailing window.
    ///
    /// # Errors
    ///
    /// Returns error if the backing store fails.
    fn get_attempts(
        &self,
        key: &str,
        window: Duration,
    ) -> impl std::future::Future<Output = Result<u32>> + Send;
}
