//! Keyed, prefixed persistence for serialized MLS client state and for
//! published key packages.
//!
//! This crate has no notion of MLS, groups, or the Marmot wire format: it
//! stores and retrieves `serde_json::Value` trees under string keys
//! ([`GroupStore`]) and raw key-package bytes under their hash reference
//! ([`KeyPackageStore`]). The MLS-aware layer lives in `marmot-core`, which
//! depends on this crate rather than the other way around.

pub mod backend;
pub mod error;
pub mod key_package;
pub mod memory;
pub mod redb_backend;

pub use backend::{GroupStore, GroupStoreBackend};
pub use error::StoreError;
pub use key_package::{KeyPackageEntry, KeyPackageStore, StoreOutcome};
pub use memory::MemoryBackend;
pub use redb_backend::RedbBackend;
