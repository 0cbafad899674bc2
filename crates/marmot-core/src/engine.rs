//! Group engine (§4.8): owns one `ClientState`, exposes send/ingest
//! operations, and enforces the forward-secrecy persistence invariant.
//!
//! The direct generalization of `lockframe_core::mls::group::MlsGroup` (the
//! single-writer owned-state object paired with an `MlsProvider`) from a
//! server-sequenced room to a client-side, relay-addressed group.

use std::sync::Arc;

use openmls::prelude::{KeyPackage, KeyPackageIn, ProtocolVersion};
use openmls_traits::OpenMlsProvider;
use thiserror::Error;
use url::Url;

use marmot_store::{GroupStore, GroupStoreBackend, StoreError};

use crate::{
    client_state::{ClientState, ClientStateError, CreateGroupOptions},
    config::{Network, PublishAck, Signer, UnsignedEvent},
    data::{
        event::{Kind, TransportEvent},
        group_data::GroupDataError,
    },
    env::Environment,
    envelope::{self, EnvelopeError},
    key_package::KeyPackageError,
    state::{GroupStateStore, GroupStateStoreError, StateError},
    welcome::{self, WelcomeError},
};

/// Errors from [`GroupEngine`] operations.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The engine's group has been removed; all subsequent operations fail
    /// (§4.8's state machine: `Removed` is absorbing).
    #[error("group not found")]
    GroupNotFound,

    /// An `openmls` operation failed.
    #[error("mls operation failed: {0}")]
    Mls(#[from] ClientStateError),

    /// The key-package event could not be decoded.
    #[error(transparent)]
    KeyPackage(#[from] KeyPackageError),

    /// The commit or welcome message could not be sealed.
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),

    /// No relays were supplied to publish to.
    #[error("no relays available to publish to")]
    NoRelaysAvailable,

    /// No relay acknowledged the published commit; the add-member
    /// transaction aborts before the Welcome is ever produced for
    /// gift-wrapping (§4.9's add-member transaction, property 6).
    #[error("no relay acknowledged the commit publish")]
    NoAck,

    /// Persisting state after a successful mutation failed. This is fatal:
    /// the in-memory state is now ahead of the store (§4.8, §7).
    #[error("failed to persist state after mutation: {0}")]
    Persistence(#[from] StoreError),

    /// The state projection itself failed to (de)serialize.
    #[error(transparent)]
    State(#[from] StateError),

    /// A welcome event failed to build or parse.
    #[error(transparent)]
    Welcome(#[from] WelcomeError),

    /// The embedded Marmot Group Data extension was malformed.
    #[error(transparent)]
    GroupData(#[from] GroupDataError),

    /// An `openmls` handshake operation (add-members, create-message,
    /// commit merge, key-package parsing) failed.
    #[error("mls handshake step failed: {0}")]
    Handshake(String),
}

impl From<GroupStateStoreError> for EngineError {
    fn from(err: GroupStateStoreError) -> Self {
        match err {
            GroupStateStoreError::Store(e) => EngineError::Persistence(e),
            GroupStateStoreError::State(e) => EngineError::State(e),
        }
    }
}

/// Outcome of a successful [`GroupEngine::add_member`] call.
pub struct AddMemberOutcome {
    /// The unsigned kind-444 draft, ready for external gift-wrap and
    /// delivery.
    pub welcome_rumor: UnsignedEvent,
    /// The resolved inbox relays to deliver the gift-wrapped Welcome to.
    pub inbox_relays: Vec<Url>,
    /// Per-relay acknowledgement of the Commit publish.
    pub commit_acks: std::collections::HashMap<Url, PublishAck>,
}

/// Owns a single group's [`ClientState`] and exposes the §4.8 operations.
///
/// `state` is `None` once the group has been [`Self::remove`]d, modeling the
/// absorbing `Removed` state of §4.8's state machine.
pub struct GroupEngine<E: Environment, B: GroupStoreBackend> {
    state: Option<ClientState<E>>,
    store: GroupStore<B>,
    signer: Arc<dyn Signer>,
    network: Arc<dyn Network>,
}

impl<E: Environment, B: GroupStoreBackend> GroupEngine<E, B> {
    /// Create a fresh group, persist it, and return the engine positioned
    /// on it (state machine: `create -> Active(0)`, §4.8).
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Mls`] if group creation fails, or
    /// [`EngineError::Persistence`] if the initial upsert fails.
    pub fn create_group(
        env: E,
        store: GroupStore<B>,
        signer: Arc<dyn Signer>,
        network: Arc<dyn Network>,
        name: &str,
        options: &CreateGroupOptions,
    ) -> Result<Self, EngineError> {
        let pubkey = signer.public_key();
        let state = ClientState::create(env, &pubkey, name, options)?;
        tracing::debug!(group_id = %hex::encode(state.group_id_bytes()), name, "created group");
        let mut engine = Self { state: Some(state), store, signer, network };
        engine.persist()?;
        Ok(engine)
    }

    /// Build an engine around an already-persisted state, for reload after
    /// a restart.
    #[must_use]
    pub fn from_state(state: ClientState<E>, store: GroupStore<B>, signer: Arc<dyn Signer>, network: Arc<dyn Network>) -> Self {
        Self { state: Some(state), store, signer, network }
    }

    /// Join a group from a kind-444 Welcome event, using the private half
    /// of the key package it consumed, persist, and return the engine
    /// positioned on the new group (§3: the client state "is ... transferred
    /// to new members via Welcome").
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Welcome`] if `welcome_event` is not a kind-444
    /// event or its content does not decode, [`EngineError::KeyPackage`] if
    /// `private_package` is malformed, [`EngineError::Mls`] if the join
    /// itself fails, or [`EngineError::Persistence`] if the initial upsert
    /// fails.
    pub fn join_group(
        env: E,
        welcome_event: &TransportEvent,
        private_package: &[u8],
        store: GroupStore<B>,
        signer: Arc<dyn Signer>,
        network: Arc<dyn Network>,
    ) -> Result<Self, EngineError> {
        let welcome_bytes = welcome::get_welcome(welcome_event)?;
        let joiner_signer = crate::key_package::deserialize_signer(private_package)?;
        let state = ClientState::join(env, &welcome_bytes, joiner_signer)?;
        tracing::debug!(group_id = %hex::encode(state.group_id_bytes()), epoch = state.epoch(), "joined group via welcome");
        let mut engine = Self { state: Some(state), store, signer, network };
        engine.persist()?;
        Ok(engine)
    }

    fn active_state(&self) -> Result<&ClientState<E>, EngineError> {
        self.state.as_ref().ok_or(EngineError::GroupNotFound)
    }

    fn active_state_mut(&mut self) -> Result<&mut ClientState<E>, EngineError> {
        self.state.as_mut().ok_or(EngineError::GroupNotFound)
    }

    /// Read-only accessor to the current state.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::GroupNotFound`] once the group has been
    /// removed.
    pub fn state(&self) -> Result<&ClientState<E>, EngineError> {
        self.active_state()
    }

    /// The group's 32-byte private id.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::GroupNotFound`] once the group has been
    /// removed.
    pub fn group_id(&self) -> Result<[u8; 32], EngineError> {
        Ok(self.active_state()?.group_id_bytes())
    }

    /// Mark the group removed. Every subsequent operation fails with
    /// [`EngineError::GroupNotFound`] (§4.8's absorbing `Removed` state).
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Persistence`] if clearing the store entry
    /// fails.
    pub fn remove(&mut self) -> Result<(), EngineError> {
        if let Some(state) = &self.state {
            let group_id = state.group_id_bytes();
            self.typed_store(state).remove(&group_id)?;
            tracing::debug!(group_id = %hex::encode(group_id), "removed group");
        }
        self.state = None;
        Ok(())
    }

    /// The §4.4 typed layer over this engine's [`GroupStore`], rebuilt on
    /// every call since it borrows nothing beyond cheap-to-clone handles.
    fn typed_store(&self, state: &ClientState<E>) -> GroupStateStore<E, B> {
        GroupStateStore::new(self.store.clone(), state.provider().env(), self.signer.clone(), self.network.clone())
    }

    fn persist(&self) -> Result<(), EngineError> {
        let state = self.active_state()?;
        self.typed_store(state).update(state)?;
        tracing::debug!(group_id = %hex::encode(state.group_id_bytes()), epoch = state.epoch(), "persisted state");
        Ok(())
    }

    /// Serialize `rumor` as UTF-8 JSON, encrypt it as an MLS application
    /// message, persist (forward secrecy), and publish to the group's
    /// relays.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Handshake`] if `create_message` fails, or
    /// [`EngineError::Persistence`] if the post-mutation upsert fails — per
    /// §4.8, this persistence step is mandatory before returning.
    pub fn send_application_rumor(&mut self, rumor: &UnsignedEvent) -> Result<TransportEvent, EngineError> {
        let json = serde_json::to_vec(&rumor_to_json(rumor)).map_err(|e| EngineError::Handshake(e.to_string()))?;

        let nostr_group_id = self.active_state()?.group_data().nostr_group_id;
        let relays = self.active_state()?.group_data().relays.clone();
        let secret = exporter_secret_array(self.active_state()?)?;

        let state = self.active_state_mut()?;
        let (mls_group, provider, signer) = state.split_for_mutation();
        let message_out =
            mls_group.create_message(provider, signer, &json).map_err(|e| EngineError::Handshake(e.to_string()))?;

        let wire_bytes = tls_codec::Serialize::tls_serialize_detached(&message_out)
            .map_err(|e| EngineError::Handshake(e.to_string()))?;

        self.persist()?;

        let event = self.seal_group_event(&nostr_group_id, &secret, &wire_bytes)?;
        let acks = self.network.publish(&relays, &event);
        tracing::debug!(event_id = %event.id_hex(), relays = relays.len(), acked = acks.values().filter(|a| a.ok).count(), "published application rumor");
        Ok(event)
    }

    /// Run the add-member transaction of §4.9.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NoAck`] if no relay acknowledges the commit
    /// publish — the Welcome is never built in that case — or
    /// [`EngineError::NoRelaysAvailable`] if the group has no relays.
    pub fn add_member(
        &mut self,
        key_package_event: &TransportEvent,
        inbox_override: Option<&[Url]>,
    ) -> Result<AddMemberOutcome, EngineError> {
        if key_package_event.kind != Kind::KeyPackage.as_u16() {
            return Err(EngineError::KeyPackage(KeyPackageError::NotAKeyPackageEvent(key_package_event.id_hex())));
        }
        let package_bytes = decode_key_package_content(key_package_event)?;

        let group_relays = self.active_state()?.group_data().relays.clone();
        let nostr_group_id = self.active_state()?.group_data().nostr_group_id;
        let creator_pubkey = self.signer.public_key();

        if group_relays.is_empty() {
            return Err(EngineError::NoRelaysAvailable);
        }

        // Captured before the commit merges: every other member still at
        // the pre-commit epoch can only decrypt the transport envelope
        // wrapping this commit with the key they already have (§4.9 step
        // 1 — the outer seal is opened before the inner MLS wire message
        // is ever handed to `openmls`, so it cannot depend on an epoch the
        // receiver hasn't reached yet).
        let pre_merge_secret = exporter_secret_array(self.active_state()?)?;

        let state = self.active_state_mut()?;
        let (mls_group, provider, signer) = state.split_for_mutation();

        let kp_in: KeyPackageIn = tls_codec::Deserialize::tls_deserialize_exact_bytes(&package_bytes)
            .map_err(|e| EngineError::Handshake(e.to_string()))?;
        let key_package: KeyPackage = kp_in
            .validate(provider.crypto(), ProtocolVersion::Mls10)
            .map_err(|e| EngineError::Handshake(e.to_string()))?;

        let (commit_out, welcome_out, _group_info) = mls_group
            .add_members(provider, signer, std::slice::from_ref(&key_package))
            .map_err(|e| EngineError::Handshake(e.to_string()))?;

        mls_group.merge_pending_commit(provider).map_err(|e| EngineError::Handshake(e.to_string()))?;

        let state = self.active_state_mut()?;
        state.refresh_group_data()?;

        self.persist()?;

        let commit_bytes = tls_codec::Serialize::tls_serialize_detached(&commit_out)
            .map_err(|e| EngineError::Handshake(e.to_string()))?;
        let commit_event = self.seal_group_event(&nostr_group_id, &pre_merge_secret, &commit_bytes)?;

        let commit_acks = self.network.publish(&group_relays, &commit_event);
        if !commit_acks.values().any(|ack| ack.ok) {
            tracing::warn!(event_id = %commit_event.id_hex(), "commit publish got no acks, withholding welcome");
            return Err(EngineError::NoAck);
        }
        tracing::debug!(event_id = %commit_event.id_hex(), "commit acknowledged, building welcome");

        let welcome_bytes = tls_codec::Serialize::tls_serialize_detached(&welcome_out)
            .map_err(|e| EngineError::Handshake(e.to_string()))?;
        let welcome_rumor =
            welcome::create_welcome_rumor(&welcome_bytes, &key_package_event.id_hex(), creator_pubkey, &group_relays);

        let key_package_relays = key_package_event.tag_value("relays").map(|_| parse_relay_tag(key_package_event));
        let inbox_relays = welcome::resolve_inbox_relays(inbox_override, key_package_relays.as_deref(), &group_relays);

        Ok(AddMemberOutcome { welcome_rumor, inbox_relays, commit_acks })
    }

    /// Run the commit resolver of §4.9 over `events`, then persist once if
    /// the batch advanced the key schedule.
    ///
    /// The resolver itself classifies and orders the whole batch in one
    /// call (§4.9 step 6 persists "once the batch is exhausted"); this
    /// method is the outer half of that contract — it supplies the mutable
    /// state the resolver borrows and performs the single mandatory upsert
    /// afterward (§4.8's forward-secrecy invariant).
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Persistence`] if the post-batch upsert fails
    /// after the batch changed the state — per §7, this is fatal: the
    /// in-memory state is now ahead of the store.
    pub fn ingest(&mut self, events: &[TransportEvent]) -> Result<Vec<crate::resolver::Resolved>, EngineError> {
        let state = self.active_state_mut()?;
        let results = crate::resolver::resolve_batch(state, events);

        let advanced = results.iter().any(|result| {
            matches!(
                result,
                crate::resolver::Resolved::Application { .. } | crate::resolver::Resolved::Commit { .. }
            )
        });

        tracing::debug!(batch_len = events.len(), results = results.len(), advanced, "ingested batch");

        if advanced {
            self.persist()?;
        }

        Ok(results)
    }

    /// Seal `wire_message` under `secret` (the caller-supplied epoch's
    /// exporter secret — callers must pass the epoch the message was
    /// produced in, not necessarily the engine's current one; see
    /// `add_member`) into a signed kind-445 transport event (§4.2).
    fn seal_group_event(&self, nostr_group_id: &[u8; 32], secret: &[u8; 32], wire_message: &[u8]) -> Result<TransportEvent, EngineError> {
        let keys = envelope::derive_envelope_keys(secret);
        let env = self.active_state()?.provider().env();
        let created_at = env.unix_time_secs();
        let mut rng = EnvironmentRngAdapter(env);
        Ok(envelope::build_group_event(&keys, nostr_group_id, wire_message, created_at, &mut rng)?)
    }
}

fn decode_key_package_content(event: &TransportEvent) -> Result<Vec<u8>, EngineError> {
    let encoding = event.tag_value("encoding").unwrap_or("hex");
    if encoding == "base64" {
        use base64::{engine::general_purpose::STANDARD, Engine as _};
        STANDARD.decode(&event.content).map_err(|e| EngineError::Handshake(e.to_string()))
    } else {
        hex::decode(&event.content).map_err(|e| EngineError::Handshake(e.to_string()))
    }
}

fn parse_relay_tag(event: &TransportEvent) -> Vec<Url> {
    event
        .tags
        .iter()
        .find(|tag| tag.first().map(String::as_str) == Some("relays"))
        .map(|tag| tag[1..].iter().filter_map(|s| Url::parse(s).ok()).collect())
        .unwrap_or_default()
}

fn rumor_to_json(rumor: &UnsignedEvent) -> serde_json::Value {
    serde_json::json!({
        "kind": rumor.kind,
        "pubkey": hex::encode(rumor.pubkey),
        "content": rumor.content,
        "tags": rumor.tags,
    })
}

fn exporter_secret_array<E: Environment>(state: &ClientState<E>) -> Result<[u8; 32], EngineError> {
    let secret = state.export_secret("nostr", b"nostr", 32)?;
    let mut out = [0u8; 32];
    out.copy_from_slice(&secret);
    Ok(out)
}

/// Adapts an [`Environment`]'s randomness to the `rand_core` traits
/// `ed25519-dalek`'s key generation and `marmot_crypto`'s AEAD nonce draw
/// expect.
struct EnvironmentRngAdapter<E: Environment>(E);

impl<E: Environment> rand_core::RngCore for EnvironmentRngAdapter<E> {
    fn next_u32(&mut self) -> u32 {
        let mut bytes = [0u8; 4];
        self.0.random_bytes(&mut bytes);
        u32::from_le_bytes(bytes)
    }

    fn next_u64(&mut self) -> u64 {
        let mut bytes = [0u8; 8];
        self.0.random_bytes(&mut bytes);
        u64::from_le_bytes(bytes)
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.0.random_bytes(dest);
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand_core::Error> {
        self.0.random_bytes(dest);
        Ok(())
    }
}

impl<E: Environment> rand_core::CryptoRng for EnvironmentRngAdapter<E> {}
