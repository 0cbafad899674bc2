//! Durable state projection (§4.3) and the typed group-state store (§4.4).

pub mod serializer;
pub mod store;

pub use serializer::{deserialize, serialize, StateError};
pub use store::{GroupStateStore, GroupStateStoreError};
