//! Bucketed sliding-window admission control.
//!
//! [`BucketRateLimiter`] maps a `(bucket, identifier)` pair to a quota and asks
//! the shared limiter (Redis) for admission. If the shared limiter is missing
//! or failing, it degrades to an [`InMemoryRateLimiter`] owned by this process
//! and logs a warning, so a Redis outage weakens limits instead of closing the
//! service.

use crate::config::{Quota, RateLimitConfig};
use crate::error::{AuthError, Result};
use crate::providers::RateLimiter;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// How often idle keys are swept out of the in-memory limiter.
const SWEEP_INTERVAL_MS: u64 = 1_000;

#[derive(Debug, Default)]
struct Window {
    window_ms: u64,
    /// Admitted timestamps (ms), oldest first
    timestamps: VecDeque<u64>,
}

impl Window {
    fn is_idle(&self, now_ms: u64) -> bool {
        self.timestamps
            .back()
            .is_none_or(|&newest| newest <= now_ms.saturating_sub(self.window_ms))
    }
}

#[derive(Debug, Default)]
struct Windows {
    entries: HashMap<String, Window>,
    last_sweep_ms: u64,
}

impl Windows {
    /// Drop keys whose newest admission fell out of their window.
    fn sweep(&mut self, now_ms: u64) {
        if now_ms.saturating_sub(self.last_sweep_ms) < SWEEP_INTERVAL_MS {
            return;
        }
        self.last_sweep_ms = now_ms;

        let before = self.entries.len();
        self.entries.retain(|_, window| !window.is_idle(now_ms));
        let swept = before - self.entries.len();
        if swept > 0 {
            tracing::debug!(swept, remaining = self.entries.len(), "In-memory rate limiter swept idle keys");
        }
    }
}

/// In-process sliding window limiter.
///
/// A key's old timestamps are dropped when it is touched. Keys idle for a
/// whole window are swept at most once per second, on the next admission.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRateLimiter {
    windows: Arc<Mutex<Windows>>,
}

impl InMemoryRateLimiter {
    /// Create an empty limiter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently held.
    #[must_use]
    pub fn tracked_keys(&self) -> usize {
        self.windows.lock().map(|w| w.entries.len()).unwrap_or(0)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Windows>> {
        self.windows
            .lock()
            .map_err(|_| AuthError::InternalError("Mutex lock failed".into()))
    }

    #[allow(clippy::cast_possible_truncation)]
    fn current_timestamp_ms() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_millis() as u64
    }

    #[allow(clippy::cast_possible_truncation)]
    const fn window_ms(window: Duration) -> u64 {
        window.as_millis() as u64
    }

    /// Remove old entries outside the window.
    fn cleanup_old_entries(timestamps: &mut VecDeque<u64>, window_start: u64) {
        while timestamps.front().is_some_and(|&ts| ts <= window_start) {
            timestamps.pop_front();
        }
    }
}

impl RateLimiter for InMemoryRateLimiter {
    async fn check_and_record(&self, key: &str, max_attempts: u32, window: Duration) -> Result<()> {
        let mut windows = self.lock()?;

        let now_ms = Self::current_timestamp_ms();
        windows.sweep(now_ms);

        let window_ms = Self::window_ms(window);
        let entry = windows.entries.entry(key.to_string()).or_default();
        entry.window_ms = window_ms;
        Self::cleanup_old_entries(&mut entry.timestamps, now_ms.saturating_sub(window_ms));

        if entry.timestamps.len() >= max_attempts as usize {
            tracing::debug!(key = %key, attempts = entry.timestamps.len(), "In-memory rate limit exceeded");
            return Err(AuthError::TooManyAttempts { retry_after: window });
        }

        entry.timestamps.push_back(now_ms);
        Ok(())
    }

    async fn reset(&self, key: &str) -> Result<()> {
        self.lock()?.entries.remove(key);
        Ok(())
    }

    async fn get_attempts(&self, key: &str, window: Duration) -> Result<u32> {
        let windows = self.lock()?;

        let window_start = Self::current_timestamp_ms().saturating_sub(Self::window_ms(window));
        let count = windows
            .entries
            .get(key)
            .map_or(0, |w| w.timestamps.iter().filter(|&&t| t > window_start).count());

        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }
}

/// Admission control keyed by `(bucket, identifier)`.
///
/// # Example
///
/// ```
/// use passkey_idp_auth::config::RateLimitConfig;
/// use passkey_idp_auth::rate_limit::{BucketRateLimiter, InMemoryRateLimiter};
///
/// # tokio_test::block_on(async {
/// let limiter: BucketRateLimiter<InMemoryRateLimiter> =
///     BucketRateLimiter::new(None, RateLimitConfig::default());
/// assert!(limiter.admit("webauthn", "203.0.113.7").await);
/// # });
/// ```
pub struct BucketRateLimiter<L> {
    shared: Option<L>,
    fallback: InMemoryRateLimiter,
    config: RateLimitConfig,
}

impl<L: RateLimiter> BucketRateLimiter<L> {
    /// Create a limiter. With `shared = None` only the in-process window is used.
    #[must_use]
    pub fn new(shared: Option<L>, config: RateLimitConfig) -> Self {
        Self {
            shared,
            fallback: InMemoryRateLimiter::new(),
            config,
        }
    }

    /// Quota for a bucket.
    #[must_use]
    pub fn quota(&self, bucket: &str) -> Quota {
        self.config.quota(bucket)
    }

    /// Admit or reject one request.
    ///
    /// Returns `true` and records the request if fewer than `tokens` requests
    /// were admitted for this pair within the trailing window.
    pub async fn admit(&self, bucket: &str, identifier: &str) -> bool {
        let quota = self.quota(bucket);
        let key = format!("{bucket}:{identifier}");

        if let Some(shared) = &self.shared {
            match shared.check_and_record(&key, quota.tokens, quota.window).await {
                Ok(()) => return true,
                Err(AuthError::TooManyAttempts { .. }) => return false,
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        bucket = %bucket,
                        "Shared rate limiter unavailable, falling back to in-memory window"
                    );
                }
            }
        }

        match self.fallback.check_and_record(&key, quota.tokens, quota.window).await {
            Ok(()) => true,
            Err(AuthError::TooManyAttempts { .. }) => false,
            Err(e) => {
                // Lock poisoning only; admit rather than lock everyone out
                tracing::error!(error = %e, bucket = %bucket, "In-memory rate limiter failed");
                true
            }
        }
    }
}
