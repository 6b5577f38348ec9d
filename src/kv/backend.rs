//! Backend trait for the KV store.
//!
//! Defines the byte-level interface that all storage backends must
//! implement, enabling pluggable storage (redb, memory, Redis, etc.).
//! Encoding and time arithmetic live in [`KvStore`](super::KvStore); a
//! backend only stores bytes with an optional expiry instant and answers
//! questions relative to the `now` it is handed.

use crate::error::Result;
use async_trait::async_trait;
use std::time::SystemTime;

/// Backend trait for key-value storage.
///
/// All backends must be thread-safe (`Send + Sync`) for use with tokio.
/// Every method that depends on expiry receives `now` from the store's
/// clock. A record whose expiry is at or before `now` must be treated as
/// absent; backends may remove it lazily while answering.
///
/// # Example
///
/// ```ignore
/// use kvstore::kv::{KvBackend, MemoryBackend};
/// use std::time::SystemTime;
///
/// let backend = MemoryBackend::new();
/// backend.set("key", b"value".to_vec(), None).await?;
/// let value = backend.get("key", SystemTime::now()).await?;
/// ```
#[async_trait]
pub trait KvBackend: Send + Sync + 'static {
    /// Retrieves a value by key.
    ///
    /// Returns `Ok(None)` if the key doesn't exist or has expired.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage operation fails.
    async fn get(&self, key: &str, now: SystemTime) -> Result<Option<Vec<u8>>>;

    /// Stores a value only if no live record has this key.
    ///
    /// Returns `Ok(false)` on collision and leaves the store unchanged. An
    /// expired record does not collide and is replaced. Must be atomic with
    /// respect to concurrent `insert` calls on the same key.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage operation fails.
    async fn insert(&self, key: &str, value: Vec<u8>, now: SystemTime) -> Result<bool>;

    /// Stores a key-value pair, overwriting any existing record.
    ///
    /// If `expires_at` is `None`, the entry never expires.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage operation fails.
    async fn set(&self, key: &str, value: Vec<u8>, expires_at: Option<SystemTime>) -> Result<()>;

    /// Replaces the value of a live record, keeping its expiry.
    ///
    /// Returns `Ok(false)` and creates nothing if the key is absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage operation fails.
    async fn update(&self, key: &str, value: Vec<u8>, now: SystemTime) -> Result<bool>;

    /// Deletes a key-value pair.
    ///
    /// Returns `Ok(true)` if a live record was removed, `Ok(false)`
    /// otherwise. Idempotent - safe to call multiple times.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage operation fails.
    async fn delete(&self, key: &str, now: SystemTime) -> Result<bool>;

    /// Returns every live record, sorted by key.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage operation fails.
    async fn entries(&self, now: SystemTime) -> Result<Vec<(String, Vec<u8>)>>;

    /// Returns one page of live keys in ascending order.
    ///
    /// Only keys strictly greater than `after` and starting with `prefix`
    /// are returned, at most `limit` of them. A page shorter than `limit`
    /// is the last one.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage operation fails.
    async fn scan(
        &self,
        after: Option<&str>,
        prefix: Option<&str>,
        limit: usize,
        now: SystemTime,
    ) -> Result<Vec<String>>;

    /// Checks if a key exists and has not expired.
    ///
    /// Default implementation uses `get()`, but backends may override
    /// for efficiency.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage operation fails.
    async fn exists(&self, key: &str, now: SystemTime) -> Result<bool> {
        Ok(self.get(key, now).await?.is_some())
    }

    /// Physically removes expired records and returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage operation fails.
    async fn purge_expired(&self, now: SystemTime) -> Result<usize>;

    /// Checks that the backend is usable. Must not mutate state.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is closed or unreachable.
    async fn ping(&self) -> Result<()>;

    /// Releases the backend's resources.
    ///
    /// # Errors
    ///
    /// Returns an error if the resources cannot be released cleanly.
    async fn close(&self) -> Result<()>;
}
