//! Contract tests run against every bundled backend.
//!
//! Each check is written against the capability traits only, so the same
//! function validates the in-memory and the redb store.

use kvstore::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Item {
    id: u32,
    tags: Vec<String>,
}

fn item(id: u32) -> Item {
    Item {
        id,
        tags: vec![format!("tag-{id}")],
    }
}

// =============================================================================
// Contract checks (generic over the capabilities they need)
// =============================================================================

async fn check_point_reads<S: Reader + Writer>(store: &S) {
    let cx = Context::background();

    let missing: Option<Item> = store.get(&cx, "missing").await.unwrap();
    assert!(missing.is_none());

    store.set(&cx, "item:1", &item(1)).await.unwrap();
    let found: Option<Item> = store.get(&cx, "item:1").await.unwrap();
    assert_eq!(found, Some(item(1)));
}

async fn check_add_semantics<S: Reader + Writer>(store: &S) {
    let cx = Context::background();

    store.add(&cx, "add:1", &item(1)).await.unwrap();
    let err = store.add(&cx, "add:1", &item(2)).await.unwrap_err();
    assert!(matches!(err, Error::AlreadyExists { ref key } if key == "add:1"));

    let kept: Option<Item> = store.get(&cx, "add:1").await.unwrap();
    assert_eq!(kept, Some(item(1)));

    let generated = store.add_auto(&cx, &item(3)).await.unwrap();
    let stored: Option<Item> = store.get(&cx, &generated).await.unwrap();
    assert_eq!(stored, Some(item(3)));
}

async fn check_update_and_delete<S: Reader + Writer>(store: &S) {
    let cx = Context::background();

    assert!(!store.update(&cx, "upd:ghost", &item(0)).await.unwrap());
    let ghost: Option<Item> = store.get(&cx, "upd:ghost").await.unwrap();
    assert!(ghost.is_none());

    store.set(&cx, "upd:1", &item(1)).await.unwrap();
    assert!(store.update(&cx, "upd:1", &item(10)).await.unwrap());
    let updated: Option<Item> = store.get(&cx, "upd:1").await.unwrap();
    assert_eq!(updated, Some(item(10)));

    assert!(store.delete(&cx, "upd:1").await.unwrap());
    assert!(!store.delete(&cx, "upd:1").await.unwrap());
}

async fn check_timed_writes<S: Reader + TimedWriter>(store: &S) {
    let cx = Context::background();

    store
        .set_with_timeout(&cx, "ttl:long", &item(1), Duration::from_secs(3600))
        .await
        .unwrap();
    let long: Option<Item> = store.get(&cx, "ttl:long").await.unwrap();
    assert_eq!(long, Some(item(1)));

    store
        .set_with_deadline(&cx, "ttl:past", &item(2), SystemTime::UNIX_EPOCH)
        .await
        .unwrap();
    let past: Option<Item> = store.get(&cx, "ttl:past").await.unwrap();
    assert!(past.is_none());

    store
        .set_with_timeout(&cx, "ttl:short", &item(3), Duration::from_millis(50))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(80)).await;
    let short: Option<Item> = store.get(&cx, "ttl:short").await.unwrap();
    assert!(short.is_none());
}

async fn check_bulk_reads<S: Reader + Writer + Lister>(store: &S) {
    let cx = Context::background();

    for id in [3, 1, 2] {
        store.set(&cx, &format!("bulk:{id}"), &item(id)).await.unwrap();
    }

    let mut all: HashMap<String, Item> = HashMap::new();
    store.get_all(&cx, &mut all).await.unwrap();
    assert_eq!(all.get("bulk:2"), Some(&item(2)));

    let keys = store.keys(&cx).collect_keys().await.unwrap();
    let bulk: Vec<&str> = keys
        .iter()
        .map(String::as_str)
        .filter(|k| k.starts_with("bulk:"))
        .collect();
    assert_eq!(bulk, vec!["bulk:1", "bulk:2", "bulk:3"]);
    assert_eq!(keys.len(), all.len());
}

async fn check_lifecycle<S: Store>(store: &S) {
    let cx = Context::background();

    store.ping(&cx).await.unwrap();
    store.close().await.unwrap();
    assert!(store.ping(&cx).await.is_err());
}

async fn run_contract<S: Store>(store: S) {
    check_point_reads(&store).await;
    check_add_semantics(&store).await;
    check_update_and_delete(&store).await;
    check_timed_writes(&store).await;
    check_bulk_reads(&store).await;
    check_lifecycle(&store).await;
}

// =============================================================================
// Backends
// =============================================================================

#[tokio::test]
async fn test_memory_store_contract() {
    run_contract(KvStore::memory()).await;
}

#[tokio::test]
async fn test_redb_store_contract() {
    let tmp = TempDir::new().unwrap();
    let store = KvStore::file(tmp.path().join("contract.redb")).unwrap();
    run_contract(store).await;
}

#[tokio::test]
async fn test_redb_ttl_survives_reopen() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("reopen.redb");
    let cx = Context::background();

    {
        let store = KvStore::file(&path).unwrap();
        store
            .set_with_timeout(&cx, "short", &1, Duration::from_millis(50))
            .await
            .unwrap();
        store.set(&cx, "forever", &2).await.unwrap();
        store.close().await.unwrap();
    }

    tokio::time::sleep(Duration::from_millis(80)).await;

    let store = KvStore::file(&path).unwrap();
    let short: Option<u32> = store.get(&cx, "short").await.unwrap();
    assert_eq!(short, None);
    let forever: Option<u32> = store.get(&cx, "forever").await.unwrap();
    assert_eq!(forever, Some(2));
}
