//! Capability traits for key-value stores.
//!
//! The store surface is split into small traits so that consumers declare
//! exactly the subset they need:
//!
//! ```ignore
//! use kvstore::kv::{Reader, TimedWriter};
//!
//! async fn remember_session<S: Reader + TimedWriter>(store: &S, cx: &Context) -> Result<()> {
//!     // Only reads and timed writes are possible here.
//! }
//! ```
//!
//! [`Store`] bundles every capability and is implemented automatically.
//!
//! Every operation receives a [`Context`] and fails with
//! [`Error::Cancelled`](crate::Error::Cancelled) or
//! [`Error::DeadlineExceeded`](crate::Error::DeadlineExceeded) if it has
//! already ended. Behaviour after [`Closer::close`] is unspecified by the
//! contract; the bundled backends return [`Error::Closed`](crate::Error::Closed).

use super::collection::Collection;
use super::keys::KeyStream;
use crate::context::Context;
use crate::error::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::{Duration, SystemTime};

/// Point and bulk lookups.
#[async_trait]
pub trait Reader: Send + Sync {
    /// Retrieves the value stored under `key`.
    ///
    /// Returns `Ok(None)` if the key is absent or expired; absence is not an
    /// error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`](crate::Error::Decode) if the stored bytes do
    /// not decode into `T`, or a storage error.
    async fn get<T>(&self, cx: &Context, key: &str) -> Result<Option<T>>
    where
        T: DeserializeOwned + Send;

    /// Decodes every live record into `collection`, in ascending key order.
    ///
    /// Either every record reaches the collection or, on the first decode
    /// error, none does.
    ///
    /// # Errors
    ///
    /// Returns the first decode or storage error encountered.
    async fn get_all<C>(&self, cx: &Context, collection: &mut C) -> Result<()>
    where
        C: Collection + Send;
}

/// Untimed writes.
#[async_trait]
pub trait Writer: Send + Sync {
    /// Stores `value` under `key` only if no live record has that key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyExists`](crate::Error::AlreadyExists) on
    /// collision, leaving the existing record untouched.
    async fn add<V>(&self, cx: &Context, key: &str, value: &V) -> Result<()>
    where
        V: Serialize + Sync + ?Sized;

    /// Stores `value` under a freshly generated key and returns the key.
    ///
    /// # Errors
    ///
    /// Returns an encode or storage error.
    async fn add_auto<V>(&self, cx: &Context, value: &V) -> Result<String>
    where
        V: Serialize + Sync + ?Sized;

    /// Stores `value` under `key`, overwriting and clearing any expiry.
    ///
    /// # Errors
    ///
    /// Returns an encode or storage error.
    async fn set<V>(&self, cx: &Context, key: &str, value: &V) -> Result<()>
    where
        V: Serialize + Sync + ?Sized;

    /// Replaces the value of an existing live record, keeping its expiry.
    ///
    /// Returns `Ok(false)` and creates nothing if the key is absent.
    ///
    /// # Errors
    ///
    /// Returns an encode or storage error.
    async fn update<V>(&self, cx: &Context, key: &str, value: &V) -> Result<bool>
    where
        V: Serialize + Sync + ?Sized;

    /// Removes `key`. Returns whether a live record existed.
    ///
    /// Deleting an absent key is not an error, so ignoring the flag gives
    /// idempotent delete.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    async fn delete(&self, cx: &Context, key: &str) -> Result<bool>;
}

/// Writes that expire.
#[async_trait]
pub trait TimedWriter: Send + Sync {
    /// Upserts `value`; the record expires `timeout` after this call.
    ///
    /// # Errors
    ///
    /// Returns an encode or storage error.
    async fn set_with_timeout<V>(
        &self,
        cx: &Context,
        key: &str,
        value: &V,
        timeout: Duration,
    ) -> Result<()>
    where
        V: Serialize + Sync + ?Sized;

    /// Upserts `value`; the record expires at `deadline`.
    ///
    /// A deadline that is not in the future still replaces any previous
    /// value, and the new record is immediately absent.
    ///
    /// # Errors
    ///
    /// Returns an encode or storage error.
    async fn set_with_deadline<V>(
        &self,
        cx: &Context,
        key: &str,
        value: &V,
        deadline: SystemTime,
    ) -> Result<()>
    where
        V: Serialize + Sync + ?Sized;
}

/// Key enumeration.
pub trait Lister: Send + Sync {
    /// Streams every live key in ascending order.
    ///
    /// Enumeration runs in a background task; see [`KeyStream`].
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    fn keys(&self, cx: &Context) -> KeyStream;
}

/// Liveness check.
#[async_trait]
pub trait Pinger: Send + Sync {
    /// Returns an error if the store is unhealthy or unreachable.
    ///
    /// # Errors
    ///
    /// Returns the backend's failure.
    async fn ping(&self, cx: &Context) -> Result<()>;
}

/// Resource release.
#[async_trait]
pub trait Closer: Send + Sync {
    /// Releases the store's resources.
    ///
    /// # Errors
    ///
    /// Returns an error if resources cannot be released cleanly.
    async fn close(&self) -> Result<()>;
}

/// Every capability at once.
///
/// Prefer naming the individual traits in signatures.
pub trait Store: Reader + Writer + TimedWriter + Lister + Pinger + Closer {}

impl<S> Store for S where S: Reader + Writer + TimedWriter + Lister + Pinger + Closer {}
