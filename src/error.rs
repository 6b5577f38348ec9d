//! Store error types for typed error handling.
//!
//! Absence is never an error: lookups report it through `Option` and
//! existence-aware writes through `bool`. Everything else that can go wrong
//! with a store operation is a variant of [`Error`].

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed error produced by a storage engine.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Store errors with structured context.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// `add` found a live record under the key.
    #[error("key already exists: {key}")]
    AlreadyExists { key: String },

    /// The caller's context was cancelled.
    #[error("operation cancelled")]
    Cancelled,

    /// The caller's context deadline passed.
    #[error("context deadline exceeded")]
    DeadlineExceeded,

    /// A value could not be serialized.
    #[error("failed to encode value for key '{key}': {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// A stored value could not be deserialized into the requested type.
    #[error("failed to decode value for key '{key}': {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// The storage engine failed.
    #[error("storage error in {context}: {source}")]
    Storage {
        context: String,
        #[source]
        source: BoxError,
    },

    /// IO error with context.
    #[error("IO error in {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// The store was used after `close`.
    #[error("store is closed")]
    Closed,

    /// A blocking storage task panicked or was aborted.
    #[error("storage task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl Error {
    /// Create a storage error with context.
    pub fn storage<E>(context: impl Into<String>, source: E) -> Self
    where
        E: Into<BoxError>,
    {
        Self::Storage {
            context: context.into(),
            source: source.into(),
        }
    }

    /// Create an IO error with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create an already-exists error.
    pub fn already_exists(key: impl Into<String>) -> Self {
        Self::AlreadyExists { key: key.into() }
    }

    /// Returns true for `add` collisions.
    #[must_use]
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }

    /// Returns true if the caller's context ended the operation.
    #[must_use]
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled | Self::DeadlineExceeded)
    }
}

/// Adapter for `map_err` on storage engine results.
pub(crate) fn storage_err<E>(context: &'static str) -> impl FnOnce(E) -> Error
where
    E: Into<BoxError>,
{
    move |source| Error::storage(context, source)
}
