//! Redb-backed KV storage backend.
//!
//! Provides persistent key-value storage using redb with ACID guarantees.
//! Values are stored inside a JSON [`KvEntry`] envelope that carries the
//! expiry instant, so TTLs survive a restart.

use super::backend::KvBackend;
use super::types::KvEntry;
use crate::error::{Error, Result, storage_err};
use async_trait::async_trait;
use parking_lot::RwLock;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, info, warn};

/// Table name for key-value pairs with expiration metadata
pub(crate) const KV_TABLE: TableDefinition<'static, &'static str, &'static [u8]> =
    TableDefinition::new("kv");

/// Redb-backed key-value storage backend.
///
/// Provides persistent storage with ACID guarantees. Suitable for
/// production use where durability is required.
///
/// # Thread Safety
///
/// `RedbBackend` is `Clone` and can be shared across threads. redb
/// serializes write transactions, which makes `insert` atomic. All
/// database work runs on tokio's blocking pool.
#[derive(Clone)]
pub struct RedbBackend {
    db: Arc<RwLock<Option<Arc<Database>>>>,
}

impl RedbBackend {
    /// Opens or creates a redb database at the given path.
    ///
    /// Creates parent directories if needed. Uses redb's ACID guarantees
    /// to prevent corruption on crashes or unclean shutdowns.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Parent directory cannot be created
    /// - Database file cannot be opened or created (permissions, disk full, etc.)
    /// - Initialization transaction fails to begin or commit
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        // Ensure parent directory exists before opening database
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::io(format!("creating KV directory {}", parent.display()), e)
            })?;
        }

        let db = Database::create(path)
            .map_err(|e| Error::storage(format!("opening KV database {}", path.display()), e))?;

        // Initialize table on first open to ensure it exists for reads
        let write_txn = db
            .begin_write()
            .map_err(storage_err("beginning initialization transaction"))?;
        {
            let _table = write_txn
                .open_table(KV_TABLE)
                .map_err(storage_err("initializing KV table"))?;
        }
        write_txn
            .commit()
            .map_err(storage_err("committing initialization transaction"))?;

        info!(path = %path.display(), "Opened redb KV store");

        Ok(Self {
            db: Arc::new(RwLock::new(Some(Arc::new(db)))),
        })
    }

    fn handle(&self) -> Result<Arc<Database>> {
        self.db.read().clone().ok_or(Error::Closed)
    }

    /// Runs `f` against the database on the blocking pool.
    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> Result<T> + Send + 'static,
    {
        let db = self.handle()?;
        tokio::task::spawn_blocking(move || f(&db)).await?
    }
}

fn get_sync(db: &Database, key: &str, now: SystemTime) -> Result<Option<Vec<u8>>> {
    get_and_evict_sync(db, key, now, remove_if_expired_sync)
}

/// Reads `key`, handing an expired record to `evict`.
fn get_and_evict_sync<F>(
    db: &Database,
    key: &str,
    now: SystemTime,
    evict: F,
) -> Result<Option<Vec<u8>>>
where
    F: FnOnce(&Database, &str, SystemTime) -> Result<()>,
{
    let read_txn = db
        .begin_read()
        .map_err(storage_err("beginning read transaction"))?;

    let table = read_txn
        .open_table(KV_TABLE)
        .map_err(storage_err("opening KV table"))?;

    let entry = match table.get(key).map_err(storage_err("reading key"))? {
        Some(guard) => KvEntry::decode(key, guard.value())?,
        None => return Ok(None),
    };

    if entry.is_expired(now) {
        // Drop read transaction before starting write
        drop(table);
        drop(read_txn);

        // Eviction failure does not change the answer.
        if let Err(err) = evict(db, key, now) {
            warn!(key, error = %err, "Failed to evict expired KV entry");
        }
        Ok(None)
    } else {
        Ok(Some(entry.value))
    }
}

/// Removes `key` only if it is still expired inside the write transaction.
fn remove_if_expired_sync(db: &Database, key: &str, now: SystemTime) -> Result<()> {
    let write_txn = db
        .begin_write()
        .map_err(storage_err("beginning write transaction"))?;
    {
        let mut table = write_txn
            .open_table(KV_TABLE)
            .map_err(storage_err("opening KV table"))?;

        let expired = match table.get(key).map_err(storage_err("reading key"))? {
            Some(guard) => KvEntry::decode(key, guard.value())?.is_expired(now),
            None => false,
        };
        if expired {
            table.remove(key).map_err(storage_err("removing key"))?;
        }
    }
    write_txn
        .commit()
        .map_err(storage_err("committing eviction transaction"))
}

fn insert_sync(db: &Database, key: &str, value: Vec<u8>, now: SystemTime) -> Result<bool> {
    let write_txn = db
        .begin_write()
        .map_err(storage_err("beginning write transaction"))?;

    let inserted = {
        let mut table = write_txn
            .open_table(KV_TABLE)
            .map_err(storage_err("opening KV table"))?;

        let live = match table.get(key).map_err(storage_err("reading key"))? {
            Some(guard) => !KvEntry::decode(key, guard.value())?.is_expired(now),
            None => false,
        };

        if live {
            false
        } else {
            let bytes = KvEntry::new(value, None).encode(key)?;
            table
                .insert(key, bytes.as_slice())
                .map_err(storage_err("inserting key"))?;
            true
        }
    };

    if inserted {
        write_txn
            .commit()
            .map_err(storage_err("committing add transaction"))?;
    } else {
        write_txn
            .abort()
            .map_err(storage_err("aborting add transaction"))?;
    }

    Ok(inserted)
}

fn set_sync(db: &Database, key: &str, value: Vec<u8>, expires_at: Option<SystemTime>) -> Result<()> {
    let bytes = KvEntry::new(value, expires_at).encode(key)?;

    let write_txn = db
        .begin_write()
        .map_err(storage_err("beginning write transaction"))?;

    {
        let mut table = write_txn
            .open_table(KV_TABLE)
            .map_err(storage_err("opening KV table"))?;

        table
            .insert(key, bytes.as_slice())
            .map_err(storage_err("inserting key"))?;
    }

    write_txn
        .commit()
        .map_err(storage_err("committing set transaction"))
}

fn update_sync(db: &Database, key: &str, value: Vec<u8>, now: SystemTime) -> Result<bool> {
    let write_txn = db
        .begin_write()
        .map_err(storage_err("beginning write transaction"))?;

    let updated = {
        let mut table = write_txn
            .open_table(KV_TABLE)
            .map_err(storage_err("opening KV table"))?;

        let current = match table.get(key).map_err(storage_err("reading key"))? {
            Some(guard) => Some(KvEntry::decode(key, guard.value())?),
            None => None,
        };

        match current {
            Some(entry) if !entry.is_expired(now) => {
                let bytes = KvEntry::new(value, entry.expires_at()).encode(key)?;
                table
                    .insert(key, bytes.as_slice())
                    .map_err(storage_err("updating key"))?;
                true
            },
            _ => false,
        }
    };

    write_txn
        .commit()
        .map_err(storage_err("committing update transaction"))?;

    Ok(updated)
}

fn delete_sync(db: &Database, key: &str, now: SystemTime) -> Result<bool> {
    let write_txn = db
        .begin_write()
        .map_err(storage_err("beginning write transaction"))?;

    let removed = {
        let mut table = write_txn
            .open_table(KV_TABLE)
            .map_err(storage_err("opening KV table"))?;

        let removed = match table.remove(key).map_err(storage_err("removing key"))? {
            Some(guard) => !KvEntry::decode(key, guard.value())?.is_expired(now),
            None => false,
        };
        removed
    };

    write_txn
        .commit()
        .map_err(storage_err("committing delete transaction"))?;

    Ok(removed)
}

fn entries_sync(db: &Database, now: SystemTime) -> Result<Vec<(String, Vec<u8>)>> {
    let read_txn = db
        .begin_read()
        .map_err(storage_err("beginning read transaction"))?;

    let table = read_txn
        .open_table(KV_TABLE)
        .map_err(storage_err("opening KV table"))?;

    let mut entries = Vec::new();
    for item in table.iter().map_err(storage_err("iterating KV table"))? {
        let (key, value) = item.map_err(storage_err("reading KV entry"))?;
        let key = key.value();
        let entry = KvEntry::decode(key, value.value())?;
        if !entry.is_expired(now) {
            entries.push((key.to_string(), entry.value));
        }
    }

    Ok(entries)
}

fn scan_sync(
    db: &Database,
    after: Option<&str>,
    prefix: Option<&str>,
    limit: usize,
    now: SystemTime,
) -> Result<Vec<String>> {
    let read_txn = db
        .begin_read()
        .map_err(storage_err("beginning read transaction"))?;

    let table = read_txn
        .open_table(KV_TABLE)
        .map_err(storage_err("opening KV table"))?;

    // Start at whichever bound is further along; keys are stored sorted.
    let start = match (after, prefix) {
        (Some(after), Some(prefix)) => after.max(prefix),
        (Some(after), None) => after,
        (None, Some(prefix)) => prefix,
        (None, None) => "",
    };

    let mut keys = Vec::new();
    for item in table
        .range(start..)
        .map_err(storage_err("scanning KV table"))?
    {
        if keys.len() >= limit {
            break;
        }

        let (key, value) = item.map_err(storage_err("reading KV entry"))?;
        let key = key.value();

        if after.is_some_and(|after| key <= after) {
            continue;
        }

        if let Some(prefix) = prefix
            && !key.starts_with(prefix)
        {
            // Sorted order: once past the prefix range nothing else matches.
            break;
        }

        if !KvEntry::decode(key, value.value())?.is_expired(now) {
            keys.push(key.to_string());
        }
    }

    Ok(keys)
}

fn purge_expired_sync(db: &Database, now: SystemTime) -> Result<usize> {
    let write_txn = db
        .begin_write()
        .map_err(storage_err("beginning write transaction"))?;

    let purged = {
        let mut table = write_txn
            .open_table(KV_TABLE)
            .map_err(storage_err("opening KV table"))?;

        let mut expired_keys = Vec::new();
        for item in table.iter().map_err(storage_err("iterating KV table"))? {
            let (key, value) = item.map_err(storage_err("reading KV entry"))?;
            let key = key.value();
            if KvEntry::decode(key, value.value())?.is_expired(now) {
                expired_keys.push(key.to_string());
            }
        }

        for key in &expired_keys {
            table
                .remove(key.as_str())
                .map_err(storage_err("removing expired key"))?;
        }
        expired_keys.len()
    };

    write_txn
        .commit()
        .map_err(storage_err("committing purge transaction"))?;

    Ok(purged)
}

fn ping_sync(db: &Database) -> Result<()> {
    let read_txn = db
        .begin_read()
        .map_err(storage_err("beginning read transaction"))?;
    read_txn
        .open_table(KV_TABLE)
        .map_err(storage_err("opening KV table"))?;
    Ok(())
}

#[async_trait]
impl KvBackend for RedbBackend {
    async fn get(&self, key: &str, now: SystemTime) -> Result<Option<Vec<u8>>> {
        let key = key.to_string();
        self.blocking(move |db| get_sync(db, &key, now)).await
    }

    async fn insert(&self, key: &str, value: Vec<u8>, now: SystemTime) -> Result<bool> {
        let key = key.to_string();
        self.blocking(move |db| insert_sync(db, &key, value, now))
            .await
    }

    async fn set(&self, key: &str, value: Vec<u8>, expires_at: Option<SystemTime>) -> Result<()> {
        let key = key.to_string();
        self.blocking(move |db| set_sync(db, &key, value, expires_at))
            .await
    }

    async fn update(&self, key: &str, value: Vec<u8>, now: SystemTime) -> Result<bool> {
        let key = key.to_string();
        self.blocking(move |db| update_sync(db, &key, value, now))
            .await
    }

    async fn delete(&self, key: &str, now: SystemTime) -> Result<bool> {
        let key = key.to_string();
        self.blocking(move |db| delete_sync(db, &key, now)).await
    }

    async fn entries(&self, now: SystemTime) -> Result<Vec<(String, Vec<u8>)>> {
        self.blocking(move |db| entries_sync(db, now)).await
    }

    async fn scan(
        &self,
        after: Option<&str>,
        prefix: Option<&str>,
        limit: usize,
        now: SystemTime,
    ) -> Result<Vec<String>> {
        let after = after.map(str::to_string);
        let prefix = prefix.map(str::to_string);
        self.blocking(move |db| scan_sync(db, after.as_deref(), prefix.as_deref(), limit, now))
            .await
    }

    async fn purge_expired(&self, now: SystemTime) -> Result<usize> {
        self.blocking(move |db| purge_expired_sync(db, now)).await
    }

    async fn ping(&self) -> Result<()> {
        self.blocking(ping_sync).await
    }

    async fn close(&self) -> Result<()> {
        // In-flight blocking tasks hold their own handle; the file closes when the last one drops.
        if self.db.write().take().is_some() {
            debug!("Closed redb KV store");
        }
        Ok(())
    }
}
