//! Key-value store contract with in-memory and redb backends.
//!
//! Applications depend on the capability traits in [`kv`] and receive a
//! [`KvStore`](kv::KvStore) (or their own implementation) at startup:
//!
//! ```
//! use kvstore::prelude::*;
//!
//! # #[tokio::main]
//! # async fn main() -> kvstore::Result<()> {
//! let store = KvStore::memory();
//! let cx = Context::background();
//!
//! store.add(&cx, "user:1", &"alice").await?;
//! assert!(store.add(&cx, "user:1", &"mallory").await.unwrap_err().is_already_exists());
//!
//! let name: Option<String> = store.get(&cx, "user:1").await?;
//! assert_eq!(name.as_deref(), Some("alice"));
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod config;
pub mod context;
pub mod error;
pub mod kv;
pub mod logging;

pub use context::{CancelHandle, Context};
pub use error::{Error, Result};

/// Everything needed to use a store.
pub mod prelude {
    pub use crate::context::{CancelHandle, Context};
    pub use crate::error::{Error, Result};
    pub use crate::kv::{
        Closer, Collection, KeyStream, KvStore, Lister, Pinger, Reader, Store, TimedWriter,
        Writer,
    };
}
