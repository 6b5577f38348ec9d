//! Type definitions for the KV store.
//!
//! Contains the envelope persisted by the redb backend and the expiry helpers
//! shared by every backend.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Returns true if a record with this expiry is absent at `now`.
///
/// A record expires exactly at its deadline, so `now == expires_at` counts.
pub(crate) fn is_expired_at(expires_at: Option<SystemTime>, now: SystemTime) -> bool {
    expires_at.is_some_and(|exp| now >= exp)
}

/// Computes the expiry instant for a TTL that starts at `now`.
///
/// A sum that does not fit in `SystemTime` means the record never expires.
pub(crate) fn expiry_after(now: SystemTime, timeout: Duration) -> Option<SystemTime> {
    now.checked_add(timeout)
}

/// Milliseconds since the Unix epoch, rounded up so a stored deadline is
/// never earlier than the requested one. Instants before the epoch clamp to 0.
fn to_unix_millis(t: SystemTime) -> u64 {
    t.duration_since(UNIX_EPOCH)
        .map(|d| {
            let partial = u128::from(d.subsec_nanos() % 1_000_000 != 0);
            u64::try_from(d.as_millis() + partial).unwrap_or(u64::MAX)
        })
        .unwrap_or(0)
}

fn from_unix_millis(ms: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_millis(ms)
}

/// Persisted form of a record with optional expiration.
///
/// Serialized to JSON for compatibility with debugging tools and future
/// schema evolution. The expiration timestamp is in Unix epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct KvEntry {
    /// Encoded value bytes.
    pub value: Vec<u8>,
    /// Expiration timestamp (Unix epoch millis). None = never expires.
    pub expires_at: Option<u64>,
}

impl KvEntry {
    pub fn new(value: Vec<u8>, expires_at: Option<SystemTime>) -> Self {
        Self {
            value,
            expires_at: expires_at.map(to_unix_millis),
        }
    }

    pub fn expires_at(&self) -> Option<SystemTime> {
        self.expires_at.map(from_unix_millis)
    }

    pub fn is_expired(&self, now: SystemTime) -> bool {
        is_expired_at(self.expires_at(), now)
    }

    pub fn encode(&self, key: &str) -> Result<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| Error::storage(format!("encoding entry for key '{key}'"), e))
    }

    pub fn decode(key: &str, bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| Error::storage(format!("decoding entry for key '{key}'"), e))
    }
}
