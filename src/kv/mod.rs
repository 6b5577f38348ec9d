//! Key-value store contract with pluggable backends.
//!
//! The contract is a set of small capability traits ([`Reader`],
//! [`Writer`], [`TimedWriter`], [`Lister`], [`Pinger`], [`Closer`]).
//! Consumers depend on the subset they use. [`KvStore`] implements all of
//! them on top of any [`KvBackend`]:
//!
//! - [`MemoryBackend`]: shared DashMap, lost on exit
//! - [`RedbBackend`]: single redb file, expiry survives restarts
//!
//! # Example
//!
//! ```ignore
//! use kvstore::prelude::*;
//!
//! async fn greet<S: Reader + Writer>(store: &S, cx: &Context) -> kvstore::Result<()> {
//!     store.set(cx, "greeting", &"hello").await?;
//!     let greeting: Option<String> = store.get(cx, "greeting").await?;
//!     assert_eq!(greeting.as_deref(), Some("hello"));
//!     Ok(())
//! }
//!
//! greet(&KvStore::memory(), &cx).await?;
//! greet(&KvStore::file("data/kv.redb")?, &cx).await?;
//! ```
//!
//! Other storage engines plug in through [`KvBackend`] and
//! [`KvStore::custom`].

mod backend;
pub mod collection;
mod contract;
mod keys;
mod memory;
mod redb;
mod store;
mod sweeper;
mod types;


pub use backend::KvBackend;
pub use collection::Collection;
pub use contract::{Closer, Lister, Pinger, Reader, Store, TimedWriter, Writer};
pub use keys::KeyStream;
pub use memory::MemoryBackend;
pub use redb::RedbBackend;
pub use store::KvStore;
