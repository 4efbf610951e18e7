//! Mock shared rate limiter for testing.

use crate::error::{AuthError, Result};
use crate::providers::RateLimiter;
use crate::rate_limit::InMemoryRateLimiter;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

/// Stand-in for the Redis limiter.
///
/// Behaves like a sliding window until switched to unavailable, after which
/// every call fails with `StorageError`, the way a dropped Redis connection
/// does.
#[derive(Debug, Clone, Default)]
pub struct MockRateLimiter {
    inner: InMemoryRateLimiter,
    unavailable: Arc<AtomicBool>,
    calls: Arc<AtomicU32>,
}

impl MockRateLimiter {
    /// Create a new mock rate limiter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage (or recovery).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of `check_and_record` calls seen, including failed ones.
    #[must_use]
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn ensure_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AuthError::StorageError("mock rate limiter unavailable".into()));
        }
        Ok(())
    }
}

impl RateLimiter for MockRateLimiter {
    async fn check_and_record(&self, key: &str, max_attempts: u32, window: Duration) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.ensure_available()?;
        self.inner.check_and_record(key, max_attempts, window).await
    }

    async fn reset(&self, key: &str) -> Result<()> {
        self.ensure_available()?;
        self.inner.reset(key).await
    }

    async fn get_attempts(&self, key: &str, window: Duration) -> Result<u32> {
        self.ensure_available()?;
        self.inner.get_attempts(key, window).await
    }
}
