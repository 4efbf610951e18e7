//! Key-value store trait.
//!
//! The single source of truth for users, challenges, sessions, codes and
//! refresh tokens. Every operation is atomic per key; nothing here spans
//! multiple keys.

use crate::error::Result;

/// Atomic per-key string store with optional expiry.
///
/// # Security
///
/// **CRITICAL**: `get_del` must read and remove in one step. Challenge and
/// authorization-code single-use guarantees rest on it.
pub trait KeyValueStore: Send + Sync {
    /// Read a value.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::StorageError` if the store is unreachable.
    fn get(&self, key: &str) -> impl std::future::Future<Output = Result<Option<String>>> + Send;

    /// Write a value with no expiry.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::StorageError` if the store is unreachable.
    fn set(&self, key: &str, value: String) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Write a value that expires after `ttl_secs` seconds.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::StorageError` if the store is unreachable.
    fn set_ex(
        &self,
        key: &str,
        value: String,
        ttl_secs: u64,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Write only if the key is absent.
    ///
    /// Returns `true` if this call created the key.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::StorageError` if the store is unreachable.
    fn set_nx(
        &self,
        key: &str,
        value: String,
        ttl_secs: Option<u64>,
    ) -> impl std::future::Future<Output = Result<bool>> + Send;

    /// Read and delete in one atomic step.
    ///
    /// Of any number of concurrent callers, at most one observes `Some`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::StorageError` if the store is unreachable.
    fn get_del(&self, key: &str) -> impl std::future::Future<Output = Result<Option<String>>> + Send;

    /// Delete a key. Deleting a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::StorageError` if the store is unreachable.
    fn del(&self, key: &str) -> impl std::future::Future<Output = Result<()>> + Send;
}
