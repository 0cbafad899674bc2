//! State serializer (§4.3): a stable, `serde_json::Value` projection of
//! `ClientState`, tagging byte strings and big integers the way the
//! source's JavaScript-facing store does, so the projection round-trips
//! through any JSON-capable key/value store.
//!
//! Grounded on the `other_examples` `nostr-mls-storage`/`mdk-core`
//! reference crates, which persist MLS group state as JSON rather than the
//! teacher's CBOR-everywhere default (see `SPEC_FULL.md` §4.3).
//!
//! The `openmls` storage backend itself is opaque to us (`MemoryStorage`
//! keeps its key/value map private behind the `StorageProvider` trait), so
//! it is persisted through its own `save_to_file`/`load_from_file`
//! round-trip (`persistence` feature; see `var-che-spacepanda`'s
//! `persistent_provider.rs`) into a single byte blob, then tagged like any
//! other byte field rather than decomposed field-by-field.

use std::collections::HashMap;

use openmls::prelude::{GroupId, SignatureScheme};
use openmls_basic_credential::SignatureKeyPair;
use openmls_memory_storage::MemoryStorage;
use openmls_traits::OpenMlsProvider;
use serde_json::Value;
use thiserror::Error;

use crate::{
    client_state::ClientState,
    config::ClientConfig,
    data::group_data::{GroupDataError, MarmotGroupData},
    env::Environment,
    provider::MlsProvider,
};

/// Errors serializing or deserializing a [`ClientState`] projection.
#[derive(Error, Debug)]
pub enum StateError {
    /// The `openmls` storage backend failed to serialize to or deserialize
    /// from its own persistence format.
    #[error("storage (de)serialization failed: {0}")]
    Storage(String),

    /// A required field was missing, the wrong shape, or carried the wrong
    /// tag.
    #[error("malformed state: {0}")]
    Malformed(String),

    /// The Marmot Group Data extension failed to decode from the restored
    /// group context.
    #[error(transparent)]
    GroupData(#[from] GroupDataError),

    /// Reloading the `openmls` group from restored storage failed.
    #[error("failed to reload group: {0}")]
    LoadFailed(String),

    /// The persisted group id did not correspond to any group in the
    /// restored storage.
    #[error("group not found in restored storage")]
    GroupNotFound,
}

/// Tag a byte string as `"hex:" || lowercase-hex` (§4.3).
#[must_use]
pub fn tag_bytes(bytes: &[u8]) -> Value {
    Value::String(format!("hex:{}", hex::encode(bytes)))
}

/// Recover bytes from a `"hex:..."`-tagged value.
#[must_use]
pub fn untag_bytes(value: &Value) -> Option<Vec<u8>> {
    let s = value.as_str()?;
    let hex_part = s.strip_prefix("hex:")?;
    hex::decode(hex_part).ok()
}

/// Tag an integer as `"bigint:" || decimal` (§4.3).
#[must_use]
pub fn tag_bigint(value: u64) -> Value {
    Value::String(format!("bigint:{value}"))
}

/// Recover an integer from a `"bigint:..."`-tagged value.
#[must_use]
pub fn untag_bigint(value: &Value) -> Option<u64> {
    let s = value.as_str()?;
    s.strip_prefix("bigint:")?.parse().ok()
}

/// Wrap ordered key/value pairs as `{"dataType": "Map", "value": [[k,v], ...]}`
/// (§4.3).
#[must_use]
pub fn wrap_map(pairs: Vec<(String, Value)>) -> Value {
    let entries: Vec<Value> =
        pairs.into_iter().map(|(k, v)| Value::Array(vec![Value::String(k), v])).collect();
    let mut map = serde_json::Map::new();
    map.insert("dataType".to_owned(), Value::String("Map".to_owned()));
    map.insert("value".to_owned(), Value::Array(entries));
    Value::Object(map)
}

/// Invert [`wrap_map`], recovering the key/value pairs.
#[must_use]
pub fn unwrap_map(value: &Value) -> Option<HashMap<String, Value>> {
    let object = value.as_object()?;
    if object.get("dataType")?.as_str()? != "Map" {
        return None;
    }
    let entries = object.get("value")?.as_array()?;
    let mut map = HashMap::with_capacity(entries.len());
    for entry in entries {
        let pair = entry.as_array()?;
        let key = pair.first()?.as_str()?.to_owned();
        let value = pair.get(1)?.clone();
        map.insert(key, value);
    }
    Some(map)
}

/// Serialize `state` to its durable `serde_json::Value` projection.
///
/// The `clientConfig`-equivalent capability handles (provider randomness,
/// network, signer) are never included; only the `openmls` storage
/// backend's own entries, the signer keypair, the group id, the epoch, and
/// the cached Marmot Group Data are projected.
///
/// # Errors
///
/// Returns [`StateError::Storage`] if the storage backend fails to
/// serialize, or [`StateError::GroupData`] if the cached group data fails
/// to encode.
pub fn serialize<E: Environment>(state: &ClientState<E>) -> Result<Value, StateError> {
    let mut storage_bytes = Vec::new();
    state
        .provider()
        .storage()
        .save_to_file(&mut storage_bytes)
        .map_err(|e| StateError::Storage(e.to_string()))?;
    let group_data_bytes = state.group_data().encode()?;

    let pairs = vec![
        ("privateGroupId".to_owned(), tag_bytes(&state.group_id_bytes())),
        ("epoch".to_owned(), tag_bigint(state.epoch())),
        ("storage".to_owned(), tag_bytes(&storage_bytes)),
        ("signerPrivate".to_owned(), tag_bytes(state.signer().private())),
        ("signerPublic".to_owned(), tag_bytes(state.signer().public())),
        ("groupData".to_owned(), tag_bytes(&group_data_bytes)),
    ];
    Ok(wrap_map(pairs))
}

/// Deserialize a [`ClientState`] projection, re-attaching `config`'s
/// capability handles (§9's "dynamic dispatch" note).
///
/// # Errors
///
/// Returns [`StateError::Malformed`] if the projection is not a
/// well-formed wrapped map with the expected tagged fields,
/// [`StateError::Storage`] if the storage entry fails to parse, or
/// [`StateError::LoadFailed`]/[`StateError::GroupNotFound`] if the
/// `openmls` group cannot be reconstructed from the restored storage.
pub fn deserialize<E: Environment>(value: &Value, config: ClientConfig<E>) -> Result<ClientState<E>, StateError> {
    let fields = unwrap_map(value).ok_or_else(|| StateError::Malformed("expected a tagged Map".to_owned()))?;

    let group_id_bytes = fields
        .get("privateGroupId")
        .and_then(untag_bytes)
        .ok_or_else(|| StateError::Malformed("missing privateGroupId".to_owned()))?;
    let storage_bytes = fields
        .get("storage")
        .and_then(untag_bytes)
        .ok_or_else(|| StateError::Malformed("missing storage".to_owned()))?;
    let mut storage = MemoryStorage::default();
    storage
        .load_from_file(std::io::Cursor::new(storage_bytes))
        .map_err(|e| StateError::Storage(e.to_string()))?;
    let signer_private = fields
        .get("signerPrivate")
        .and_then(untag_bytes)
        .ok_or_else(|| StateError::Malformed("missing signerPrivate".to_owned()))?;
    let signer_public = fields
        .get("signerPublic")
        .and_then(untag_bytes)
        .ok_or_else(|| StateError::Malformed("missing signerPublic".to_owned()))?;
    let group_data_bytes = fields
        .get("groupData")
        .and_then(untag_bytes)
        .ok_or_else(|| StateError::Malformed("missing groupData".to_owned()))?;

    let group_data = MarmotGroupData::decode(&group_data_bytes)?;
    let signer = SignatureKeyPair::from_raw(SignatureScheme::ED25519, signer_private, signer_public);

    let env = config.provider.env();
    let provider = MlsProvider::with_storage(env, storage);
    let group_id = GroupId::from_slice(&group_id_bytes);

    let mls_group = openmls::group::MlsGroup::load(provider.storage(), &group_id)
        .map_err(|e| StateError::LoadFailed(e.to_string()))?
        .ok_or(StateError::GroupNotFound)?;

    Ok(ClientState::from_parts(mls_group, signer, provider, group_data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_bytes_round_trips() {
        let bytes = [1u8, 2, 3, 255];
        let tagged = tag_bytes(&bytes);
        assert_eq!(untag_bytes(&tagged).unwrap(), bytes);
    }

    #[test]
    fn tag_bigint_round_trips() {
        let value = 18_446_744_073_709_551_615u64;
        let tagged = tag_bigint(value);
        assert_eq!(untag_bigint(&tagged).unwrap(), value);
    }

    #[test]
    fn wrap_map_round_trips() {
        let pairs = vec![("a".to_owned(), Value::from(1)), ("b".to_owned(), Value::from("two"))];
        let wrapped = wrap_map(pairs.clone());
        let recovered = unwrap_map(&wrapped).unwrap();
        assert_eq!(recovered.get("a"), Some(&Value::from(1)));
        assert_eq!(recovered.get("b"), Some(&Value::from("two")));
    }

    #[test]
    fn untag_bytes_rejects_missing_prefix() {
        assert!(untag_bytes(&Value::String("deadbeef".to_owned())).is_none());
    }

    #[test]
    fn unwrap_map_rejects_non_map_shape() {
        assert!(unwrap_map(&Value::String("plain".to_owned())).is_none());
    }
}
