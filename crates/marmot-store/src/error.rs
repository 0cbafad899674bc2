//! Error types for keyed persistence.

use thiserror::Error;

/// Errors raised by a [`crate::GroupStoreBackend`] or
/// [`crate::KeyPackageStore`] implementation.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The stored value failed to (de)serialize as JSON.
    #[error("store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The on-disk backend reported a database error.
    #[error("store backend error: {0}")]
    Backend(String),

    /// A lookup key was empty, which every backend here rejects since an
    /// empty key collides with the prefix-only sentinel.
    #[error("store key must not be empty")]
    EmptyKey,
}
