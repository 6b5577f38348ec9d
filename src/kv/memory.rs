//! In-memory KV storage backend.
//!
//! Provides a fast, non-persistent key-value store using DashMap for
//! concurrent access. Ideal for testing, development, and embedded use cases.

use super::backend::KvBackend;
use super::types::is_expired_at;
use crate::error::{Error, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::SystemTime;

/// Entry stored in the memory backend with optional expiration.
#[derive(Clone)]
struct MemoryEntry {
    value: Vec<u8>,
    expires_at: Option<SystemTime>,
}

impl MemoryEntry {
    fn is_expired(&self, now: SystemTime) -> bool {
        is_expired_at(self.expires_at, now)
    }
}

#[derive(Default)]
struct Inner {
    data: DashMap<String, MemoryEntry>,
    closed: AtomicBool,
}

/// In-memory key-value storage backend using DashMap.
///
/// Provides fast, concurrent access without persistence. All data is lost
/// when the process exits. Clones share the same map.
///
/// # Thread Safety
///
/// Each key is guarded by its DashMap shard lock, so `insert` on one key is
/// a single critical section and readers never see a half-written entry.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    inner: Arc<Inner>,
}

impl MemoryBackend {
    /// Creates a new empty in-memory backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of entries in the store (including expired).
    pub fn len(&self) -> usize {
        self.inner.data.len()
    }

    /// Returns true if the store holds no entries, expired or not.
    pub fn is_empty(&self) -> bool {
        self.inner.data.is_empty()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.inner.closed.load(Ordering::Acquire) {
            Err(Error::Closed)
        } else {
            Ok(())
        }
    }

    /// Removes `key` only if it is still expired, so a concurrent fresh write survives.
    fn evict_if_expired(&self, key: &str, now: SystemTime) {
        self.inner
            .data
            .remove_if(key, |_, entry| entry.is_expired(now));
    }
}

#[async_trait]
impl KvBackend for MemoryBackend {
    async fn get(&self, key: &str, now: SystemTime) -> Result<Option<Vec<u8>>> {
        self.ensure_open()?;
        if let Some(entry) = self.inner.data.get(key) {
            if entry.is_expired(now) {
                drop(entry);
                self.evict_if_expired(key, now);
                Ok(None)
            } else {
                Ok(Some(entry.value.clone()))
            }
        } else {
            Ok(None)
        }
    }

    async fn insert(&self, key: &str, value: Vec<u8>, now: SystemTime) -> Result<bool> {
        self.ensure_open()?;
        let entry = MemoryEntry {
            value,
            expires_at: None,
        };
        match self.inner.data.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired(now) {
                    occupied.insert(entry);
                    Ok(true)
                } else {
                    Ok(false)
                }
            },
            Entry::Vacant(vacant) => {
                vacant.insert(entry);
                Ok(true)
            },
        }
    }

    async fn set(&self, key: &str, value: Vec<u8>, expires_at: Option<SystemTime>) -> Result<()> {
        self.ensure_open()?;
        self.inner
            .data
            .insert(key.to_string(), MemoryEntry { value, expires_at });
        Ok(())
    }

    async fn update(&self, key: &str, value: Vec<u8>, now: SystemTime) -> Result<bool> {
        self.ensure_open()?;
        if let Some(mut entry) = self.inner.data.get_mut(key) {
            if entry.is_expired(now) {
                drop(entry);
                self.evict_if_expired(key, now);
                Ok(false)
            } else {
                entry.value = value;
                Ok(true)
            }
        } else {
            Ok(false)
        }
    }

    async fn delete(&self, key: &str, now: SystemTime) -> Result<bool> {
        self.ensure_open()?;
        Ok(self
            .inner
            .data
            .remove(key)
            .is_some_and(|(_, entry)| !entry.is_expired(now)))
    }

    async fn entries(&self, now: SystemTime) -> Result<Vec<(String, Vec<u8>)>> {
        self.ensure_open()?;
        let mut entries: Vec<(String, Vec<u8>)> = self
            .inner
            .data
            .iter()
            .filter(|entry| !entry.value().is_expired(now))
            .map(|entry| (entry.key().clone(), entry.value().value.clone()))
            .collect();
        entries.sort_unstable_by(|a, b| a.0.cmp(&b.0));
        Ok(entries)
    }

    async fn scan(
        &self,
        after: Option<&str>,
        prefix: Option<&str>,
        limit: usize,
        now: SystemTime,
    ) -> Result<Vec<String>> {
        self.ensure_open()?;
        let mut keys = Vec::new();

        for entry in self.inner.data.iter() {
            let key = entry.key();

            if let Some(after) = after
                && key.as_str() <= after
            {
                continue;
            }

            // Filter by prefix if provided
            if let Some(prefix) = prefix
                && !key.starts_with(prefix)
            {
                continue;
            }

            if !entry.value().is_expired(now) {
                keys.push(key.clone());
            }
        }

        // Only the smallest `limit` keys need ordering.
        if keys.len() > limit {
            if limit == 0 {
                return Ok(Vec::new());
            }
            keys.select_nth_unstable(limit - 1);
            keys.truncate(limit);
        }
        keys.sort_unstable();
        Ok(keys)
    }

    async fn exists(&self, key: &str, now: SystemTime) -> Result<bool> {
        self.ensure_open()?;
        Ok(self
            .inner
            .data
            .get(key)
            .is_some_and(|entry| !entry.is_expired(now)))
    }

    async fn purge_expired(&self, now: SystemTime) -> Result<usize> {
        self.ensure_open()?;
        let before = self.inner.data.len();
        self.inner.data.retain(|_, entry| !entry.is_expired(now));
        Ok(before.saturating_sub(self.inner.data.len()))
    }

    async fn ping(&self) -> Result<()> {
        self.ensure_open()
    }

    async fn close(&self) -> Result<()> {
        self.inner.closed.store(true, Ordering::Release);
        self.inner.data.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn t(secs: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
    }

    #[tokio::test]
    async fn test_get_set() {
        let backend = MemoryBackend::new();

        backend.set("key1", b"value1".to_vec(), None).await.unwrap();
        let value = backend.get("key1", t(0)).await.unwrap();
        assert_eq!(value, Some(b"value1".to_vec()));
    }

    #[tokio::test]
    async fn test_get_nonexistent() {
        let backend = MemoryBackend::new();
        let value = backend.get("nonexistent", t(0)).await.unwrap();
        assert_eq!(value, None);
    }

    #[tokio::test]
    async fn test_expired_get_evicts() {
        let backend = MemoryBackend::new();

        backend
            .set("expiring", b"value".to_vec(), Some(t(10)))
            .await
            .unwrap();

        assert!(backend.get("expiring", t(9)).await.unwrap().is_some());
        assert_eq!(backend.len(), 1);

        assert!(backend.get("expiring", t(10)).await.unwrap().is_none());
        assert!(backend.is_empty());
    }

    #[tokio::test]
    async fn test_insert_collides_only_with_live_entries() {
        let backend = MemoryBackend::new();

        assert!(backend.insert("k", b"1".to_vec(), t(0)).await.unwrap());
        assert!(!backend.insert("k", b"2".to_vec(), t(0)).await.unwrap());
        assert_eq!(backend.get("k", t(0)).await.unwrap(), Some(b"1".to_vec()));

        backend.set("old", b"x".to_vec(), Some(t(5))).await.unwrap();
        assert!(backend.insert("old", b"y".to_vec(), t(6)).await.unwrap());
        assert_eq!(
            backend.get("old", t(100)).await.unwrap(),
            Some(b"y".to_vec())
        );
    }

    #[tokio::test]
    async fn test_update_keeps_expiry() {
        let backend = MemoryBackend::new();

        assert!(!backend.update("missing", b"v".to_vec(), t(0)).await.unwrap());
        assert!(backend.is_empty());

        backend.set("k", b"1".to_vec(), Some(t(10))).await.unwrap();
        assert!(backend.update("k", b"2".to_vec(), t(5)).await.unwrap());
        assert_eq!(backend.get("k", t(9)).await.unwrap(), Some(b"2".to_vec()));
        assert_eq!(backend.get("k", t(10)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_delete() {
        let backend = MemoryBackend::new();

        backend.set("key1", b"value1".to_vec(), None).await.unwrap();
        assert!(backend.delete("key1", t(0)).await.unwrap());
        assert!(!backend.delete("key1", t(0)).await.unwrap());
        assert_eq!(backend.get("key1", t(0)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_delete_expired_reports_absent() {
        let backend = MemoryBackend::new();

        backend.set("k", b"v".to_vec(), Some(t(1))).await.unwrap();
        assert!(!backend.delete("k", t(2)).await.unwrap());
        assert!(backend.is_empty());
    }

    #[tokio::test]
    async fn test_scan_pages_in_order() {
        let backend = MemoryBackend::new();

        for key in ["c", "a/2", "b/1", "a/1", "d"] {
            backend.set(key, b"v".to_vec(), None).await.unwrap();
        }
        backend.set("a/3", b"v".to_vec(), Some(t(1))).await.unwrap();

        let page = backend.scan(None, None, 2, t(5)).await.unwrap();
        assert_eq!(page, vec!["a/1", "a/2"]);

        let page = backend.scan(Some("a/2"), None, 2, t(5)).await.unwrap();
        assert_eq!(page, vec!["b/1", "c"]);

        let prefixed = backend.scan(None, Some("a/"), 10, t(5)).await.unwrap();
        assert_eq!(prefixed, vec!["a/1", "a/2"]);
    }

    #[tokio::test]
    async fn test_scan_pages_cover_large_map_once() {
        let backend = MemoryBackend::new();
        for i in (0..500).rev() {
            backend
                .set(&format!("k{i:04}"), b"v".to_vec(), None)
                .await
                .unwrap();
        }

        let mut seen = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let page = backend.scan(cursor.as_deref(), None, 7, t(0)).await.unwrap();
            assert!(page.windows(2).all(|w| w[0] < w[1]));
            let last_page = page.len() < 7;
            cursor = page.last().cloned();
            seen.extend(page);
            if last_page {
                break;
            }
        }

        let expected: Vec<String> = (0..500).map(|i| format!("k{i:04}")).collect();
        assert_eq!(seen, expected);
        assert!(backend.scan(None, None, 0, t(0)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let backend = MemoryBackend::new();

        backend.set("keep", b"v".to_vec(), None).await.unwrap();
        backend.set("gone1", b"v".to_vec(), Some(t(1))).await.unwrap();
        backend.set("gone2", b"v".to_vec(), Some(t(2))).await.unwrap();

        assert_eq!(backend.purge_expired(t(5)).await.unwrap(), 2);
        assert_eq!(backend.len(), 1);
        assert_eq!(backend.purge_expired(t(5)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_clones_share_data() {
        let backend = MemoryBackend::new();
        let other = backend.clone();

        backend.set("shared", b"v".to_vec(), None).await.unwrap();
        assert!(other.exists("shared", t(0)).await.unwrap());
    }

    #[tokio::test]
    async fn test_closed_backend_rejects_operations() {
        let backend = MemoryBackend::new();
        backend.ping().await.unwrap();
        backend.close().await.unwrap();

        assert!(matches!(backend.ping().await, Err(Error::Closed)));
        assert!(matches!(
            backend.get("k", t(0)).await,
            Err(Error::Closed)
        ));
    }
}
