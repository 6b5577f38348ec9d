//! High-level `KvStore` wrapper over backend implementations.
//!
//! Provides the typed API that wraps any `KvBackend` implementation: values
//! are JSON-encoded with serde, expiry instants are computed from the
//! store's clock, and every call checks the caller's context first.

use super::backend::KvBackend;
use super::collection::Collection;
use super::contract::{Closer, Lister, Pinger, Reader, TimedWriter, Writer};
use super::keys::{self, KeyStream};
use super::memory::MemoryBackend;
use super::redb::RedbBackend;
use super::sweeper;
use super::types::expiry_after;
use crate::clock::{Clock, SystemClock};
use crate::config::{BackendConfig, KeysConfig, StoreConfig};
use crate::context::Context;
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;
use tracing::debug;
use uuid::Uuid;

/// High-level key-value store.
///
/// Wraps a `KvBackend` implementation and provides a consistent API
/// regardless of the underlying storage mechanism. The operations live on
/// the capability traits ([`Reader`], [`Writer`], [`TimedWriter`],
/// [`Lister`], [`Pinger`], [`Closer`]); bring them into scope with
/// `use kvstore::prelude::*`.
///
/// # Thread Safety
///
/// `KvStore` is `Clone` and can be shared across threads. The underlying
/// backend handles concurrent access safely.
///
/// # Example
///
/// ```
/// use kvstore::prelude::*;
/// use std::time::Duration;
///
/// # #[tokio::main]
/// # async fn main() -> kvstore::Result<()> {
/// let store = KvStore::memory();
/// let cx = Context::background();
///
/// store
///     .set_with_timeout(&cx, "session:123", &"user_data", Duration::from_secs(3600))
///     .await?;
///
/// let data: Option<String> = store.get(&cx, "session:123").await?;
/// assert_eq!(data.as_deref(), Some("user_data"));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct KvStore {
    backend: Arc<dyn KvBackend>,
    clock: Arc<dyn Clock>,
    keys: KeysConfig,
}

impl KvStore {
    /// Creates a new `KvStore` backed by a file-based redb database.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::custom(RedbBackend::open(path)?))
    }

    /// Creates a new `KvStore` backed by an in-memory store.
    ///
    /// All data is lost when the process exits.
    #[must_use]
    pub fn memory() -> Self {
        Self::custom(MemoryBackend::new())
    }

    /// Creates a new `KvStore` with a custom backend.
    ///
    /// Use this to integrate custom storage backends like Redis, PostgreSQL, etc.
    ///
    /// ```ignore
    /// struct RedisBackend { /* ... */ }
    /// impl KvBackend for RedisBackend { /* ... */ }
    ///
    /// let store = KvStore::custom(RedisBackend::new());
    /// ```
    pub fn custom<B: KvBackend>(backend: B) -> Self {
        Self {
            backend: Arc::new(backend),
            clock: Arc::new(SystemClock),
            keys: KeysConfig::default(),
        }
    }

    /// Opens the backend described by `config`.
    ///
    /// The sweeper is not started; call [`spawn_sweeper`](Self::spawn_sweeper)
    /// with `config.sweeper.interval()` if wanted.
    ///
    /// # Errors
    ///
    /// Returns an error if the redb database cannot be opened.
    pub fn open(config: &StoreConfig) -> Result<Self> {
        let store = match &config.backend {
            BackendConfig::Memory => Self::memory(),
            BackendConfig::Redb { path } => Self::file(path)?,
        };
        Ok(store.with_keys_config(config.keys))
    }

    /// Replaces the clock used for every expiry decision.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replaces the paging used by key enumeration.
    #[must_use]
    pub fn with_keys_config(mut self, keys: KeysConfig) -> Self {
        self.keys = keys;
        self
    }

    /// Checks if a key exists and has not expired.
    ///
    /// # Errors
    ///
    /// Returns an error if the context has ended or the backend fails.
    pub async fn exists(&self, cx: &Context, key: &str) -> Result<bool> {
        cx.check()?;
        self.backend.exists(key, self.clock.now()).await
    }

    /// Streams live keys that start with `prefix`, in ascending order.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn keys_with_prefix(&self, cx: &Context, prefix: &str) -> KeyStream {
        self.spawn_keys(cx, Some(prefix.to_string()))
    }

    /// Physically removes expired records now. Returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the context has ended or the backend fails.
    pub async fn purge_expired(&self, cx: &Context) -> Result<usize> {
        cx.check()?;
        self.backend.purge_expired(self.clock.now()).await
    }

    /// Purges expired records every `interval` until `cx` ends.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn spawn_sweeper(&self, interval: Duration, cx: Context) -> JoinHandle<()> {
        sweeper::spawn(self.clone(), interval, cx)
    }

    fn spawn_keys(&self, cx: &Context, prefix: Option<String>) -> KeyStream {
        keys::spawn(
            Arc::clone(&self.backend),
            Arc::clone(&self.clock),
            cx.clone(),
            self.keys,
            prefix,
        )
    }

    async fn put(&self, key: &str, bytes: Vec<u8>, expires_at: Option<SystemTime>) -> Result<()> {
        debug!(key, expires_at = ?expires_at, "set");
        self.backend.set(key, bytes, expires_at).await
    }
}

fn encode<V: Serialize + ?Sized>(key: &str, value: &V) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|source| Error::Encode {
        key: key.to_string(),
        source,
    })
}

fn decode<T: DeserializeOwned>(key: &str, bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|source| Error::Decode {
        key: key.to_string(),
        source,
    })
}

#[async_trait]
impl Reader for KvStore {
    async fn get<T>(&self, cx: &Context, key: &str) -> Result<Option<T>>
    where
        T: DeserializeOwned + Send,
    {
        cx.check()?;
        match self.backend.get(key, self.clock.now()).await? {
            Some(bytes) => decode(key, &bytes).map(Some),
            None => Ok(None),
        }
    }

    async fn get_all<C>(&self, cx: &Context, collection: &mut C) -> Result<()>
    where
        C: Collection + Send,
    {
        cx.check()?;
        let entries = self.backend.entries(self.clock.now()).await?;
        cx.check()?;

        // Decode everything first so a bad record leaves the collection untouched.
        let decoded = entries
            .iter()
            .map(|(key, bytes)| decode::<C::Item>(key, bytes))
            .collect::<Result<Vec<_>>>()?;

        debug!(count = decoded.len(), "get_all");
        for ((key, _), item) in entries.into_iter().zip(decoded) {
            collection.insert(key, item);
        }
        Ok(())
    }
}

#[async_trait]
impl Writer for KvStore {
    async fn add<V>(&self, cx: &Context, key: &str, value: &V) -> Result<()>
    where
        V: Serialize + Sync + ?Sized,
    {
        cx.check()?;
        let bytes = encode(key, value)?;
        if self.backend.insert(key, bytes, self.clock.now()).await? {
            debug!(key, "add");
            Ok(())
        } else {
            Err(Error::already_exists(key))
        }
    }

    async fn add_auto<V>(&self, cx: &Context, value: &V) -> Result<String>
    where
        V: Serialize + Sync + ?Sized,
    {
        loop {
            let key = Uuid::new_v4().to_string();
            match self.add(cx, &key, value).await {
                Ok(()) => return Ok(key),
                // UUID collision: draw again.
                Err(Error::AlreadyExists { .. }) => continue,
                Err(err) => return Err(err),
            }
        }
    }

    async fn set<V>(&self, cx: &Context, key: &str, value: &V) -> Result<()>
    where
        V: Serialize + Sync + ?Sized,
    {
        cx.check()?;
        let bytes = encode(key, value)?;
        self.put(key, bytes, None).await
    }

    async fn update<V>(&self, cx: &Context, key: &str, value: &V) -> Result<bool>
    where
        V: Serialize + Sync + ?Sized,
    {
        cx.check()?;
        let bytes = encode(key, value)?;
        let updated = self.backend.update(key, bytes, self.clock.now()).await?;
        debug!(key, updated, "update");
        Ok(updated)
    }

    async fn delete(&self, cx: &Context, key: &str) -> Result<bool> {
        cx.check()?;
        let existed = self.backend.delete(key, self.clock.now()).await?;
        debug!(key, existed, "delete");
        Ok(existed)
    }
}

#[async_trait]
impl TimedWriter for KvStore {
    async fn set_with_timeout<V>(
        &self,
        cx: &Context,
        key: &str,
        value: &V,
        timeout: Duration,
    ) -> Result<()>
    where
        V: Serialize + Sync + ?Sized,
    {
        cx.check()?;
        // The lifespan starts at call time.
        let expires_at = expiry_after(self.clock.now(), timeout);
        let bytes = encode(key, value)?;
        self.put(key, bytes, expires_at).await
    }

    async fn set_with_deadline<V>(
        &self,
        cx: &Context,
        key: &str,
        value: &V,
        deadline: SystemTime,
    ) -> Result<()>
    where
        V: Serialize + Sync + ?Sized,
    {
        cx.check()?;
        let bytes = encode(key, value)?;
        self.put(key, bytes, Some(deadline)).await
    }
}

impl Lister for KvStore {
    fn keys(&self, cx: &Context) -> KeyStream {
        self.spawn_keys(cx, None)
    }
}

#[async_trait]
impl Pinger for KvStore {
    async fn ping(&self, cx: &Context) -> Result<()> {
        cx.check()?;
        self.backend.ping().await
    }
}

#[async_trait]
impl Closer for KvStore {
    async fn close(&self) -> Result<()> {
        debug!("close");
        self.backend.close().await
    }
}
