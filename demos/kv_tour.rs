//! # Key-Value Store Tour
//!
//! Walks through the store contract against a redb-backed store.
//!
//! ## What This Tour Shows
//!
//! - Opening a store from a TOML configuration
//! - Writes with and without expiry
//! - `add` collisions and `update` on missing keys
//! - Bulk reads into a collection
//! - Streaming key enumeration with cancellation
//! - Background expiry sweeping
//!
//! ## Running
//!
//! ```bash
//! cargo run --example kv_tour
//! ```
//!
//! The database lives in a temporary directory that is removed on exit.

use anyhow::Result;
use futures::StreamExt;
use kvstore::config::StoreConfig;
use kvstore::logging;
use kvstore::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tempfile::TempDir;

#[derive(Debug, Serialize, Deserialize)]
struct Session {
    user: String,
    scopes: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    println!("=== kvstore tour ===\n");

    // =========================================================================
    // Part 1: Configuration
    // =========================================================================

    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("tour.redb");
    let config = StoreConfig::from_toml_str(&format!(
        r#"
        [backend]
        kind = "redb"
        path = "{}"

        [keys]
        page_size = 2

        [sweeper]
        enabled = true
        interval_ms = 200

        [logging]
        level = "warn"
        "#,
        db_path.display()
    ))?;

    for warning in config.validate()?.warnings {
        println!("config warning: {warning}");
    }
    logging::init(&config.logging)?;

    let store = KvStore::open(&config)?;
    let cx = Context::background();
    store.ping(&cx).await?;
    println!("Opened store at {}\n", db_path.display());

    // =========================================================================
    // Part 2: Writes
    // =========================================================================

    println!("--- Part 2: Writes ---\n");

    store.set(&cx, "user:1001", &"Alice").await?;
    store.add(&cx, "user:1002", &"Bob").await?;

    match store.add(&cx, "user:1002", &"Mallory").await {
        Err(err) if err.is_already_exists() => println!("add refused: {err}"),
        other => println!("unexpected: {other:?}"),
    }

    let updated = store.update(&cx, "user:9999", &"Nobody").await?;
    println!("update of a missing key changed anything: {updated}");

    let id = store.add_auto(&cx, &"Carol").await?;
    println!("add_auto generated key {id}");

    let name: Option<String> = store.get(&cx, "user:1001").await?;
    println!("user:1001 = {name:?}\n");

    // =========================================================================
    // Part 3: Expiry
    // =========================================================================

    println!("--- Part 3: Expiry ---\n");

    let session = Session {
        user: "user:1001".to_string(),
        scopes: vec!["read".to_string(), "write".to_string()],
    };
    store
        .set_with_timeout(&cx, "session:abc", &session, Duration::from_millis(300))
        .await?;

    let live: Option<Session> = store.get(&cx, "session:abc").await?;
    println!("session before expiry: {live:?}");

    let (sweeper_cx, stop_sweeper) = Context::with_cancel();
    let sweeper = store.spawn_sweeper(
        config.sweeper.interval().unwrap_or(Duration::from_secs(1)),
        sweeper_cx,
    );

    tokio::time::sleep(Duration::from_millis(500)).await;
    let gone: Option<Session> = store.get(&cx, "session:abc").await?;
    println!("session after expiry: {gone:?}\n");

    stop_sweeper.cancel();
    sweeper.await?;

    // =========================================================================
    // Part 4: Bulk reads and enumeration
    // =========================================================================

    println!("--- Part 4: Bulk reads ---\n");

    let mut users: BTreeMap<String, String> = BTreeMap::new();
    store.get_all(&cx, &mut users).await?;
    for (key, name) in &users {
        println!("  {key} -> {name}");
    }

    println!("\nStreaming keys with prefix 'user:':");
    let mut stream = store.keys_with_prefix(&cx, "user:");
    while let Some(key) = stream.next().await {
        println!("  {}", key?);
    }

    let (scoped, cancel) = Context::with_cancel();
    let mut stream = store.keys(&scoped);
    if let Some(first) = stream.next().await {
        println!("\nfirst key before cancelling: {}", first?);
    }
    cancel.cancel();
    while let Some(item) = stream.next().await {
        if let Err(err) = item {
            println!("enumeration ended with: {err}");
        }
    }

    // =========================================================================
    // Part 5: Cleanup
    // =========================================================================

    println!("\n--- Part 5: Cleanup ---\n");

    for key in users.keys() {
        store.delete(&cx, key).await?;
    }
    store.close().await?;
    println!("closed; ping now reports: {:?}", store.ping(&cx).await.err());

    println!("\n=== tour complete ===");
    Ok(())
}
