//! Mock key-value store for testing.

use crate::error::{AuthError, Result};
use crate::providers::KeyValueStore;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

/// In-memory key-value store with TTLs.
///
/// Every operation takes one mutex, so `get_del` and `set_nx` are atomic the
/// same way they are in Redis. Expired entries are dropped lazily on access.
#[derive(Debug, Clone, Default)]
pub struct MockKeyValueStore {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
    unavailable: Arc<AtomicBool>,
    failing_prefix: Arc<Mutex<Option<String>>>,
}

impl MockKeyValueStore {
    /// Create a new mock store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every operation fail with `StorageError` (or recover).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make `set`/`set_ex` fail for keys under `prefix` (or stop failing).
    ///
    /// `set_nx`, reads and deletes are unaffected.
    pub fn fail_writes_under(&self, prefix: Option<&str>) {
        if let Ok(mut failing) = self.failing_prefix.lock() {
            *failing = prefix.map(str::to_string);
        }
    }

    fn check_write(&self, key: &str) -> Result<()> {
        let failing = self
            .failing_prefix
            .lock()
            .map_err(|_| AuthError::InternalError("Mutex lock failed".into()))?;
        match failing.as_deref() {
            Some(prefix) if key.starts_with(prefix) => {
                Err(AuthError::StorageError(format!("mock write to {key} failed")))
            }
            _ => Ok(()),
        }
    }

    /// Whether a live entry exists under `key`.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        let now = Instant::now();
        self.entries
            .lock()
            .map(|entries| entries.get(key).is_some_and(|e| e.is_live(now)))
            .unwrap_or(false)
    }

    /// Live keys starting with `prefix`.
    #[must_use]
    pub fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        let now = Instant::now();
        self.entries
            .lock()
            .map(|entries| {
                entries
                    .iter()
                    .filter(|(k, e)| k.starts_with(prefix) && e.is_live(now))
                    .map(|(k, _)| k.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn with_entries<T>(&self, f: impl FnOnce(&mut HashMap<String, Entry>, Instant) -> T) -> Result<T> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AuthError::StorageError("mock store unavailable".into()));
        }

        let mut entries = self
            .entries
            .lock()
            .map_err(|_| AuthError::InternalError("Mutex lock failed".into()))?;

        let now = Instant::now();
        entries.retain(|_, e| e.is_live(now));
        Ok(f(&mut entries, now))
    }
}

impl KeyValueStore for MockKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.with_entries(|entries, _| entries.get(key).map(|e| e.value.clone()))
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        self.check_write(key)?;
        self.with_entries(|entries, _| {
            entries.insert(key.to_string(), Entry { value, expires_at: None });
        })
    }

    async fn set_ex(&self, key: &str, value: String, ttl_secs: u64) -> Result<()> {
        self.check_write(key)?;
        self.with_entries(|entries, now| {
            let expires_at = Some(now + Duration::from_secs(ttl_secs.max(1)));
            entries.insert(key.to_string(), Entry { value, expires_at });
        })
    }

    async fn set_nx(&self, key: &str, value: String, ttl_secs: Option<u64>) -> Result<bool> {
        self.with_entries(|entries, now| {
            if entries.contains_key(key) {
                return false;
            }
            let expires_at = ttl_secs.map(|ttl| now + Duration::from_secs(ttl.max(1)));
            entries.insert(key.to_string(), Entry { value, expires_at });
            true
        })
    }

    async fn get_del(&self, key: &str) -> Result<Option<String>> {
        self.with_entries(|entries, _| entries.remove(key).map(|e| e.value))
    }

    async fn del(&self, key: &str) -> Result<()> {
        self.with_entries(|entries, _| {
            entries.remove(key);
        })
    }
}
