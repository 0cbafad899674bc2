//! `MLSClientState` (§3): a thin wrapper around `openmls::group::MlsGroup`
//! plus the signer keypair and cached Marmot Group Data, exactly as
//! `lockframe_core::mls::group::MlsGroup` wraps the same `openmls` type.

use openmls::prelude::{
    Ciphersuite, CredentialWithKey, Extension, Extensions, GroupId, MlsGroupCreateConfig,
    MlsGroupJoinConfig, MlsMessageBodyIn, MlsMessageIn, StagedWelcome,
};
use openmls_basic_credential::SignatureKeyPair;
use openmls_traits::OpenMlsProvider;
use thiserror::Error;
use tls_codec::Deserialize as _;

use crate::{
    credential::create_credential,
    data::group_data::{GroupDataError, MarmotGroupData},
    env::Environment,
    provider::MlsProvider,
};

/// Errors constructing or operating on a [`ClientState`].
#[derive(Error, Debug)]
pub enum ClientStateError {
    /// `openmls` rejected group creation or a state-mutating operation.
    #[error("mls operation failed: {0}")]
    Mls(String),

    /// The embedded Marmot Group Data failed to encode or decode.
    #[error(transparent)]
    GroupData(#[from] GroupDataError),

    /// The private group id was not 32 bytes, violating §3's invariant.
    #[error("private group id must be 32 bytes, got {0}")]
    InvalidGroupIdLength(usize),
}

/// Options accepted by [`ClientState::create`].
#[derive(Default)]
pub struct CreateGroupOptions {
    /// Initial admin public keys, beyond the creator.
    pub admin_pubkeys: Vec<String>,
    /// Initial relay list.
    pub relays: Vec<url::Url>,
    /// Group description.
    pub description: String,
    /// Image triple, if the group has an avatar.
    pub image: Option<([u8; 32], [u8; 32], [u8; 12])>,
}

/// Owns one group's cryptographic state: the MLS client state, the signer
/// used to author MLS handshake messages, the provider, and a cached,
/// change-invalidated projection of the Marmot Group Data extension
/// (§4.8: "cached; invalidated on any state change").
pub struct ClientState<E: Environment> {
    mls_group: openmls::group::MlsGroup,
    signer: SignatureKeyPair,
    provider: MlsProvider<E>,
    group_data: MarmotGroupData,
}

impl<E: Environment> ClientState<E> {
    /// Create a fresh group at epoch 0 with `pubkey` as the sole member, and
    /// the Marmot Group Data extension embedded in the group context.
    ///
    /// # Errors
    ///
    /// Returns [`ClientStateError::Mls`] if group creation fails.
    pub fn create(
        env: E,
        pubkey: &[u8; 32],
        name: &str,
        options: &CreateGroupOptions,
    ) -> Result<Self, ClientStateError> {
        let provider = MlsProvider::new(env);
        let ciphersuite = Ciphersuite::MLS_128_DHKEMX25519_AES128GCM_SHA256_Ed25519;

        let signer = SignatureKeyPair::new(ciphersuite.signature_algorithm())
            .map_err(|e| ClientStateError::Mls(e.to_string()))?;

        let credential_with_key = CredentialWithKey {
            credential: create_credential(pubkey).into(),
            signature_key: signer.public().into(),
        };

        let mut nostr_group_id = [0u8; 32];
        provider_random(&provider, &mut nostr_group_id);

        let group_data = MarmotGroupData {
            version: crate::data::group_data::CURRENT_VERSION,
            nostr_group_id,
            name: name.to_owned(),
            description: options.description.clone(),
            admin_pubkeys: options.admin_pubkeys.clone(),
            relays: options.relays.clone(),
            image_hash: options.image.map_or_else(Vec::new, |(h, _, _)| h.to_vec()),
            image_key: options.image.map_or_else(Vec::new, |(_, k, _)| k.to_vec()),
            image_nonce: options.image.map_or_else(Vec::new, |(_, _, n)| n.to_vec()),
        };
        let encoded_group_data = group_data.encode()?;

        let extensions = Extensions::single(Extension::Unknown(
            crate::data::group_data::GROUP_DATA_EXTENSION_TYPE,
            openmls::prelude::UnknownExtension(encoded_group_data),
        ));

        let group_config = MlsGroupCreateConfig::builder()
            .ciphersuite(ciphersuite)
            .use_ratchet_tree_extension(true)
            .with_group_context_extensions(extensions)
            .map_err(|e| ClientStateError::Mls(e.to_string()))?
            .build();

        let mls_group = openmls::group::MlsGroup::new(&provider, &signer, &group_config, credential_with_key)
            .map_err(|e| ClientStateError::Mls(e.to_string()))?;

        if mls_group.group_id().as_slice().len() != 32 {
            return Err(ClientStateError::InvalidGroupIdLength(mls_group.group_id().as_slice().len()));
        }

        Ok(Self { mls_group, signer, provider, group_data })
    }

    /// Join a group from an MLS Welcome, using the signer keypair that
    /// authored the key package the Welcome consumed (§3: the state is
    /// "transferred to new members via Welcome").
    ///
    /// Requests the ratchet-tree extension is present on `welcome_bytes` so
    /// no out-of-band tree is required (§4.9 step 2's add-member note).
    ///
    /// # Errors
    ///
    /// Returns [`ClientStateError::Mls`] if `welcome_bytes` does not parse
    /// as a Welcome message or the join is otherwise rejected, or
    /// [`ClientStateError::GroupData`] if the post-join group context does
    /// not carry a well-formed Marmot Group Data extension.
    pub fn join(env: E, welcome_bytes: &[u8], signer: SignatureKeyPair) -> Result<Self, ClientStateError> {
        let provider = MlsProvider::new(env);

        let mls_message = MlsMessageIn::tls_deserialize_exact_bytes(welcome_bytes)
            .map_err(|e| ClientStateError::Mls(e.to_string()))?;
        let welcome = match mls_message.extract() {
            MlsMessageBodyIn::Welcome(welcome) => welcome,
            _ => return Err(ClientStateError::Mls("expected a welcome message".to_owned())),
        };

        let join_config = MlsGroupJoinConfig::builder().use_ratchet_tree_extension(true).build();
        let staged_welcome = StagedWelcome::new_from_welcome(&provider, &join_config, welcome, None)
            .map_err(|e| ClientStateError::Mls(e.to_string()))?;
        let mls_group = staged_welcome.into_group(&provider).map_err(|e| ClientStateError::Mls(e.to_string()))?;

        if mls_group.group_id().as_slice().len() != 32 {
            return Err(ClientStateError::InvalidGroupIdLength(mls_group.group_id().as_slice().len()));
        }

        let extensions = mls_group.export_group_context().extensions();
        let raw = extensions
            .iter()
            .find_map(|extension| match extension {
                Extension::Unknown(crate::data::group_data::GROUP_DATA_EXTENSION_TYPE, data) => {
                    Some(data.0.clone())
                }
                _ => None,
            })
            .unwrap_or_default();
        let group_data = MarmotGroupData::decode(&raw)?;

        Ok(Self { mls_group, signer, provider, group_data })
    }

    /// The current epoch, monotonically increasing on commit application.
    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.mls_group.epoch().as_u64()
    }

    /// The 32-byte private MLS group id.
    ///
    /// # Panics
    ///
    /// Panics if the underlying group id is not 32 bytes; [`Self::create`]
    /// and [`Self::group_id_bytes`]'s other constructors guarantee this
    /// invariant so this should never trigger in practice.
    #[must_use]
    pub fn group_id_bytes(&self) -> [u8; 32] {
        let slice = self.mls_group.group_id().as_slice();
        let mut out = [0u8; 32];
        out.copy_from_slice(slice);
        out
    }

    /// The raw `openmls` group id.
    #[must_use]
    pub fn raw_group_id(&self) -> GroupId {
        self.mls_group.group_id().clone()
    }

    /// Cached Marmot Group Data (§4.8: invalidated and refreshed on any
    /// state change that could have touched the group context).
    #[must_use]
    pub fn group_data(&self) -> &MarmotGroupData {
        &self.group_data
    }

    /// Re-derive the cached Marmot Group Data from the current group
    /// context. Call after any operation that may have changed it
    /// (processing a commit that updates group context extensions).
    ///
    /// # Errors
    ///
    /// Returns [`ClientStateError::GroupData`] if the group context no
    /// longer carries a well-formed Marmot Group Data extension.
    pub fn refresh_group_data(&mut self) -> Result<(), ClientStateError> {
        let extensions = self.mls_group.export_group_context().extensions();
        let raw = extensions
            .iter()
            .find_map(|extension| match extension {
                Extension::Unknown(crate::data::group_data::GROUP_DATA_EXTENSION_TYPE, data) => {
                    Some(data.0.clone())
                }
                _ => None,
            })
            .unwrap_or_default();
        self.group_data = MarmotGroupData::decode(&raw)?;
        Ok(())
    }

    /// Export a secret from the current epoch's key schedule.
    ///
    /// # Errors
    ///
    /// Returns [`ClientStateError::Mls`] if the exporter fails (e.g.
    /// `length` is zero or exceeds the hash output size).
    pub fn export_secret(&self, label: &str, context: &[u8], length: usize) -> Result<Vec<u8>, ClientStateError> {
        self.mls_group
            .export_secret(self.provider.crypto(), label, context, length)
            .map_err(|e| ClientStateError::Mls(e.to_string()))
    }

    /// Borrow the underlying `openmls` group.
    pub(crate) fn mls_group(&self) -> &openmls::group::MlsGroup {
        &self.mls_group
    }

    /// Mutably borrow the underlying `openmls` group.
    pub(crate) fn mls_group_mut(&mut self) -> &mut openmls::group::MlsGroup {
        &mut self.mls_group
    }

    /// Borrow the provider.
    pub(crate) fn provider(&self) -> &MlsProvider<E> {
        &self.provider
    }

    /// Borrow the signer.
    pub(crate) fn signer(&self) -> &SignatureKeyPair {
        &self.signer
    }

    /// Split into the three borrows an `openmls` mutation needs at once: the
    /// group to mutate, the provider, and the signer. A single `&mut self`
    /// method so the borrow checker sees these as disjoint field borrows
    /// rather than conflicting whole-`self` borrows.
    pub(crate) fn split_for_mutation(
        &mut self,
    ) -> (&mut openmls::group::MlsGroup, &MlsProvider<E>, &SignatureKeyPair) {
        (&mut self.mls_group, &self.provider, &self.signer)
    }

    /// Construct directly from parts, used by the state serializer's
    /// `deserialize` path once it has reloaded the `openmls` group from
    /// persisted storage.
    pub(crate) fn from_parts(
        mls_group: openmls::group::MlsGroup,
        signer: SignatureKeyPair,
        provider: MlsProvider<E>,
        group_data: MarmotGroupData,
    ) -> Self {
        Self { mls_group, signer, provider, group_data }
    }
}

fn provider_random<E: Environment>(provider: &MlsProvider<E>, buffer: &mut [u8]) {
    use openmls_traits::random::OpenMlsRand;
    if let Ok(bytes) = provider.rand().random_vec(buffer.len()) {
        buffer.copy_from_slice(&bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::SystemEnvironment;

    #[test]
    fn create_starts_at_epoch_zero() {
        let state = ClientState::create(SystemEnvironment, &[1u8; 32], "book club", &CreateGroupOptions::default())
            .unwrap();
        assert_eq!(state.epoch(), 0);
        assert_eq!(state.group_id_bytes().len(), 32);
    }

    #[test]
    fn group_data_reflects_create_options() {
        let options = CreateGroupOptions {
            admin_pubkeys: vec!["a".repeat(64)],
            relays: vec![url::Url::parse("wss://relay.example.com").unwrap()],
            description: "a description".to_owned(),
            image: None,
        };
        let state = ClientState::create(SystemEnvironment, &[2u8; 32], "group", &options).unwrap();
        assert_eq!(state.group_data().name, "group");
        assert_eq!(state.group_data().description, "a description");
        assert_eq!(state.group_data().admin_pubkeys, vec!["a".repeat(64)]);
    }

    #[test]
    fn export_secret_is_deterministic_within_an_epoch() {
        let state = ClientState::create(SystemEnvironment, &[3u8; 32], "group", &CreateGroupOptions::default())
            .unwrap();
        let first = state.export_secret("nostr", b"nostr", 32).unwrap();
        let second = state.export_secret("nostr", b"nostr", 32).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn join_from_welcome_reaches_the_same_group_and_epoch() {
        use crate::key_package::{generate_key_package, KeyPackageOptions};

        let relays = vec![url::Url::parse("wss://relay.example.com").unwrap()];
        let options = CreateGroupOptions { relays: relays.clone(), ..CreateGroupOptions::default() };
        let mut alice = ClientState::create(SystemEnvironment, &[1u8; 32], "g", &options).unwrap();

        let provider = MlsProvider::new(SystemEnvironment);
        let bob_signer_bytes = {
            let generated = generate_key_package(&provider, &[2u8; 32], &KeyPackageOptions::default()).unwrap();
            let kp_in: openmls::prelude::KeyPackageIn =
                tls_codec::Deserialize::tls_deserialize_exact_bytes(&generated.public_package).unwrap();
            let key_package = kp_in
                .validate(alice.provider().crypto(), openmls::prelude::ProtocolVersion::Mls10)
                .unwrap();

            let (mls_group, alice_provider, alice_signer) = alice.split_for_mutation();
            let (_, welcome_out, _) =
                mls_group.add_members(alice_provider, alice_signer, &[key_package]).unwrap();
            mls_group.merge_pending_commit(alice_provider).unwrap();

            let welcome_bytes = tls_codec::Serialize::tls_serialize_detached(&welcome_out).unwrap();
            (welcome_bytes, generated.private_package)
        };
        alice.refresh_group_data().unwrap();

        let bob_signer = crate::key_package::deserialize_signer(&bob_signer_bytes.1).unwrap();
        let bob = ClientState::join(SystemEnvironment, &bob_signer_bytes.0, bob_signer).unwrap();

        assert_eq!(bob.group_id_bytes(), alice.group_id_bytes());
        assert_eq!(bob.epoch(), alice.epoch());
        assert_eq!(bob.group_data().relays, relays);
    }
}
