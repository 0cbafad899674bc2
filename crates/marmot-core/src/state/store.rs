//! Typed state-level layer over [`GroupStore`] (§4.4's `add/update/get/list`
//! contract), sitting above the raw JSON `get/set/remove/clear/keys`
//! substrate and the untyped `has`/`count` additions on `GroupStore` itself.
//!
//! `marmot_store::GroupStore` deliberately knows nothing about
//! `ClientState`/`ClientConfig` (it is the generic key/value layer, grounded
//! on `lockframe_server::storage::Storage`); this module is where that
//! knowledge lives, the way `lockframe_core`'s room registries sit on top of
//! its generic `Storage` trait.

use std::sync::Arc;

use marmot_store::{GroupStore, GroupStoreBackend, StoreError};
use thiserror::Error;

use crate::config::{ClientConfig, Network, Signer};
use crate::env::Environment;
use crate::provider::MlsProvider;
use crate::{
    client_state::ClientState,
    state::{self, StateError},
};

/// Errors from the typed group-state store.
#[derive(Error, Debug)]
pub enum GroupStateStoreError {
    /// The underlying key/value backend failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// A stored projection failed to (de)serialize.
    #[error(transparent)]
    State(#[from] StateError),
}

/// A [`GroupStore`] paired with the capabilities needed to deserialize the
/// states it holds (§4.4: `get`/`list` "deserialize via §4.3 using the
/// stored `ClientConfig`").
///
/// `env`/`signer`/`network` stand in for the spec's "stored `ClientConfig`":
/// a fresh [`ClientConfig`] is built from them for every `get`/`list` call,
/// since [`ClientConfig`] itself holds a live `MlsProvider` and is not
/// `Clone`.
pub struct GroupStateStore<E: Environment, B: GroupStoreBackend> {
    store: GroupStore<B>,
    env: E,
    signer: Arc<dyn Signer>,
    network: Arc<dyn Network>,
}

impl<E: Environment, B: GroupStoreBackend> GroupStateStore<E, B> {
    /// Wrap `store`, remembering the capabilities needed to rebuild a
    /// [`ClientConfig`] on every deserialize.
    pub fn new(store: GroupStore<B>, env: E, signer: Arc<dyn Signer>, network: Arc<dyn Network>) -> Self {
        Self { store, env, signer, network }
    }

    fn config(&self) -> ClientConfig<E> {
        ClientConfig::new(MlsProvider::new(self.env.clone()), self.signer.clone(), self.network.clone())
    }

    fn key(state: &ClientState<E>) -> String {
        hex::encode(state.group_id_bytes())
    }

    /// Upsert `state`, keyed by the hex of its private group id (§4.4
    /// `add(state)`/`update(state)`; both directions of the upsert are the
    /// same operation, as in the teacher's own `set`).
    ///
    /// # Errors
    ///
    /// Returns [`GroupStateStoreError::State`] if the projection fails to
    /// serialize, or [`GroupStateStoreError::Store`] if the backend write
    /// fails.
    pub fn add(&self, state: &ClientState<E>) -> Result<(), GroupStateStoreError> {
        self.update(state)
    }

    /// See [`Self::add`].
    ///
    /// # Errors
    ///
    /// Returns [`GroupStateStoreError::State`] if the projection fails to
    /// serialize, or [`GroupStateStoreError::Store`] if the backend write
    /// fails.
    pub fn update(&self, state: &ClientState<E>) -> Result<(), GroupStateStoreError> {
        let projection = state::serialize(state)?;
        self.store.set(&Self::key(state), projection)?;
        Ok(())
    }

    /// Fetch and deserialize the state for `group_id`, `None` if absent
    /// (§4.4 `get(groupId)`).
    ///
    /// # Errors
    ///
    /// Returns [`GroupStateStoreError::Store`] if the backend read fails, or
    /// [`GroupStateStoreError::State`] if a stored projection is malformed.
    pub fn get(&self, group_id: &[u8; 32]) -> Result<Option<ClientState<E>>, GroupStateStoreError> {
        let Some(value) = self.store.get(&hex::encode(group_id))? else {
            return Ok(None);
        };
        Ok(Some(state::deserialize(&value, self.config())?))
    }

    /// Deserialize every state under the store's prefix, in unspecified
    /// order (§4.4 `list()`).
    ///
    /// # Errors
    ///
    /// Returns [`GroupStateStoreError::Store`] if enumerating keys fails, or
    /// [`GroupStateStoreError::State`] if any stored projection is
    /// malformed.
    pub fn list(&self) -> Result<Vec<ClientState<E>>, GroupStateStoreError> {
        let mut states = Vec::new();
        for key in self.store.keys()? {
            if let Some(value) = self.store.get(&key)? {
                states.push(state::deserialize(&value, self.config())?);
            }
        }
        Ok(states)
    }

    /// Remove the state for `group_id`, if any (§4.4 `remove(groupId)`).
    ///
    /// # Errors
    ///
    /// Returns [`GroupStateStoreError::Store`] if the backend removal
    /// fails.
    pub fn remove(&self, group_id: &[u8; 32]) -> Result<(), GroupStateStoreError> {
        Ok(self.store.remove(&hex::encode(group_id))?)
    }

    /// Whether a state for `group_id` is currently stored (§4.4
    /// `has(groupId)`).
    ///
    /// # Errors
    ///
    /// Returns [`GroupStateStoreError::Store`] if the backend read fails.
    pub fn has(&self, group_id: &[u8; 32]) -> Result<bool, GroupStateStoreError> {
        Ok(self.store.has(&hex::encode(group_id))?)
    }

    /// Count the states under the store's prefix (§4.4 `count()`).
    ///
    /// # Errors
    ///
    /// Returns [`GroupStateStoreError::Store`] if enumerating keys fails.
    pub fn count(&self) -> Result<usize, GroupStateStoreError> {
        Ok(self.store.count()?)
    }

    /// Remove every state under the store's prefix (§4.4 `clear()`).
    ///
    /// # Errors
    ///
    /// Returns [`GroupStateStoreError::Store`] if the backend clear fails.
    pub fn clear(&self) -> Result<(), GroupStateStoreError> {
        Ok(self.store.clear()?)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use marmot_store::MemoryBackend;
    use url::Url;

    use super::*;
    use crate::client_state::CreateGroupOptions;
    use crate::config::{Filter, PublishAck, SignerError, UnsignedEvent};
    use crate::data::event::TransportEvent;
    use crate::env::SystemEnvironment;

    struct NullSigner;

    impl Signer for NullSigner {
        fn public_key(&self) -> [u8; 32] {
            [7u8; 32]
        }

        fn sign_event(&self, _draft: UnsignedEvent) -> Result<TransportEvent, SignerError> {
            unreachable!("not exercised by the typed-store tests")
        }
    }

    struct NullNetwork;

    impl Network for NullNetwork {
        fn publish(&self, _relays: &[Url], _event: &TransportEvent) -> HashMap<Url, PublishAck> {
            unreachable!("not exercised by the typed-store tests")
        }

        fn request(&self, _relays: &[Url], _filter: &Filter) -> Vec<TransportEvent> {
            unreachable!("not exercised by the typed-store tests")
        }

        fn get_user_inbox_relays(&self, _pubkey: &[u8; 32]) -> Vec<Url> {
            unreachable!("not exercised by the typed-store tests")
        }
    }

    fn typed_store() -> GroupStateStore<SystemEnvironment, MemoryBackend> {
        let backend = MemoryBackend::new();
        let store = GroupStore::with_prefix(backend, "acct");
        GroupStateStore::new(store, SystemEnvironment, Arc::new(NullSigner), Arc::new(NullNetwork))
    }

    #[test]
    fn add_get_list_has_count_and_remove_round_trip() {
        let typed = typed_store();
        let pubkey = [1u8; 32];
        let state = ClientState::create(SystemEnvironment, &pubkey, "typed-store-test", &CreateGroupOptions::default())
            .expect("group creation succeeds");
        let group_id = state.group_id_bytes();

        assert!(!typed.has(&group_id).unwrap());
        assert_eq!(typed.count().unwrap(), 0);
        assert!(typed.get(&group_id).unwrap().is_none());

        typed.add(&state).unwrap();

        assert!(typed.has(&group_id).unwrap());
        assert_eq!(typed.count().unwrap(), 1);
        let reloaded = typed.get(&group_id).unwrap().expect("state was just added");
        assert_eq!(reloaded.group_id_bytes(), group_id);
        assert_eq!(reloaded.epoch(), state.epoch());

        let listed = typed.list().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].group_id_bytes(), group_id);

        typed.update(&state).unwrap();
        assert_eq!(typed.count().unwrap(), 1);

        typed.remove(&group_id).unwrap();
        assert!(!typed.has(&group_id).unwrap());
        assert!(typed.get(&group_id).unwrap().is_none());
        assert_eq!(typed.count().unwrap(), 0);
    }

    #[test]
    fn clear_removes_every_state_under_the_prefix() {
        let typed = typed_store();
        for i in 0..3u8 {
            let pubkey = [i; 32];
            let state = ClientState::create(SystemEnvironment, &pubkey, "typed-store-clear", &CreateGroupOptions::default())
                .expect("group creation succeeds");
            typed.add(&state).unwrap();
        }
        assert_eq!(typed.count().unwrap(), 3);
        typed.clear().unwrap();
        assert_eq!(typed.count().unwrap(), 0);
        assert!(typed.list().unwrap().is_empty());
    }
}
