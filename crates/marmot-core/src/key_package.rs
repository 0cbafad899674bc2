//! Key-package builder (§4.6): augments capabilities/extensions with the
//! Marmot-required extension types, and produces both halves of a
//! [`KeyPackageRecord`] plus its kind-443/kind-5 transport events.
//!
//! Grounded on `lockframe_core::mls::group::MlsGroup::generate_key_package`,
//! generalized from an 8-byte member id credential to a 32-byte public key
//! credential and augmented with the capability/extension rules of §4.6.

use std::collections::BTreeSet;

use openmls::prelude::{
    Capabilities, Ciphersuite, CredentialWithKey, Extension, ExtensionType, Extensions, KeyPackage,
    Lifetime, ProtocolVersion, UnknownExtension,
};
use thiserror::Error;
use url::Url;

use crate::{
    credential::{create_credential, CredentialError},
    data::{
        event::{Kind, TransportEvent},
        group_data::GROUP_DATA_EXTENSION_TYPE,
    },
    env::Environment,
    provider::MlsProvider,
};

/// The "Last Resort" key-package marker extension type (§4.6).
pub const LAST_RESORT_EXTENSION_TYPE: u16 = 0x000A;

/// Default key-package lifetime: three months, in seconds.
pub const DEFAULT_LIFETIME_SECS: u64 = 60 * 60 * 24 * 90;

/// Errors from key-package construction or the transport events built
/// around it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyPackageError {
    /// The credential was not a basic credential.
    #[error("unsupported credential type")]
    UnsupportedCredential,

    /// Underlying credential validation failed.
    #[error(transparent)]
    Credential(#[from] CredentialError),

    /// `openmls` rejected the key-package build.
    #[error("key package build failed: {0}")]
    BuildFailed(String),

    /// The announced `pubkey` did not match the credential embedded in the
    /// key package.
    #[error("pubkey does not match key package credential")]
    PubkeyMismatch,

    /// The key package could not be parsed back out of an event's content.
    #[error("malformed key package content: {0}")]
    MalformedContent(String),

    /// A deletion target was not itself a kind-443 event.
    #[error("deletion target {0} is not a kind-443 event")]
    NotAKeyPackageEvent(String),
}

/// Caller-supplied options for [`generate_key_package`]; any field left
/// `None` falls back to the §4.6 defaults.
#[derive(Default)]
pub struct KeyPackageOptions {
    /// Extra capability extension types to advertise, beyond the Marmot
    /// defaults (§4.6 always adds `0xF2EE` and `0x000A`).
    pub extra_capability_extensions: Vec<u16>,
    /// Key-package lifetime. Defaults to [`DEFAULT_LIFETIME_SECS`].
    pub lifetime_secs: Option<u64>,
}

/// The two halves of a generated key package (§3's `KeyPackageRecord`).
pub struct GeneratedKeyPackage {
    /// TLS-serialized public key package, suitable for publishing.
    pub public_package: Vec<u8>,
    /// Opaque private material (signature keypair), never published.
    pub private_package: Vec<u8>,
}

/// Build a key package for `pubkey` with the Marmot-required capabilities
/// and extensions.
///
/// # Errors
///
/// Returns [`KeyPackageError::BuildFailed`] if `openmls` rejects the build.
pub fn generate_key_package<E: Environment>(
    provider: &MlsProvider<E>,
    pubkey: &[u8; 32],
    options: &KeyPackageOptions,
) -> Result<GeneratedKeyPackage, KeyPackageError> {
    let ciphersuite = Ciphersuite::MLS_128_DHKEMX25519_AES128GCM_SHA256_Ed25519;

    let signer = openmls_basic_credential::SignatureKeyPair::new(ciphersuite.signature_algorithm())
        .map_err(|e| KeyPackageError::BuildFailed(e.to_string()))?;

    let credential_with_key = CredentialWithKey {
        credential: create_credential(pubkey).into(),
        signature_key: signer.public().into(),
    };

    let mut capability_extensions: BTreeSet<u16> = options.extra_capability_extensions.iter().copied().collect();
    capability_extensions.insert(GROUP_DATA_EXTENSION_TYPE);
    capability_extensions.insert(LAST_RESORT_EXTENSION_TYPE);
    let extension_types: Vec<ExtensionType> =
        capability_extensions.into_iter().map(ExtensionType::Unknown).collect();

    let capabilities = Capabilities::new(
        Some(&[ProtocolVersion::Mls10]),
        Some(&[ciphersuite]),
        Some(&extension_types),
        None,
        None,
    );

    let last_resort = Extension::Unknown(LAST_RESORT_EXTENSION_TYPE, UnknownExtension(Vec::new()));
    let key_package_extensions = Extensions::single(last_resort);

    let lifetime_secs = options.lifetime_secs.unwrap_or(DEFAULT_LIFETIME_SECS);
    let lifetime = Lifetime::new(lifetime_secs);

    let bundle = KeyPackage::builder()
        .leaf_node_capabilities(capabilities)
        .key_package_extensions(key_package_extensions)
        .key_package_lifetime(lifetime)
        .build(ciphersuite, provider, &signer, credential_with_key)
        .map_err(|e| KeyPackageError::BuildFailed(e.to_string()))?;

    let public_package = tls_codec::Serialize::tls_serialize_detached(bundle.key_package())
        .map_err(|e| KeyPackageError::BuildFailed(e.to_string()))?;

    let private_package = serialize_signer(&signer);

    Ok(GeneratedKeyPackage { public_package, private_package })
}

/// Reconstruct the [`openmls_basic_credential::SignatureKeyPair`] serialized
/// as a [`GeneratedKeyPackage::private_package`], for use when joining the
/// group a Welcome referencing this key package admits the caller to.
///
/// # Errors
///
/// Returns [`KeyPackageError::MalformedContent`] if `bytes` is not a
/// well-formed serialized signer.
pub fn deserialize_signer(bytes: &[u8]) -> Result<openmls_basic_credential::SignatureKeyPair, KeyPackageError> {
    if bytes.len() < 2 {
        return Err(KeyPackageError::MalformedContent("signer bytes shorter than length prefix".to_owned()));
    }
    let private_len = usize::from(u16::from_be_bytes([bytes[0], bytes[1]]));
    let rest = &bytes[2..];
    if rest.len() < private_len {
        return Err(KeyPackageError::MalformedContent("signer private key truncated".to_owned()));
    }
    let (private, public) = rest.split_at(private_len);
    Ok(openmls_basic_credential::SignatureKeyPair::from_raw(
        openmls::prelude::SignatureScheme::ED25519,
        private.to_vec(),
        public.to_vec(),
    ))
}

fn serialize_signer(signer: &openmls_basic_credential::SignatureKeyPair) -> Vec<u8> {
    let private = signer.private();
    let public = signer.public();
    #[allow(clippy::cast_possible_truncation)]
    let private_len = private.len() as u16;
    let mut out = Vec::with_capacity(2 + private.len() + public.len());
    out.extend_from_slice(&private_len.to_be_bytes());
    out.extend_from_slice(private);
    out.extend_from_slice(public);
    out
}

/// Options accepted by [`create_key_package_event`].
pub struct KeyPackageEventOptions<'a> {
    /// Relays the key package should be fetched from.
    pub relays: &'a [Url],
    /// Optional client tag value.
    pub client: Option<&'a str>,
    /// Whether to use `base64` (preferred) or `hex` (legacy) content
    /// encoding.
    pub use_base64: bool,
}

/// Build an unsigned kind-443 draft for `public_package`.
///
/// Refuses to build if `pubkey` does not match the credential embedded in
/// the package (§4.6).
///
/// # Errors
///
/// Returns [`KeyPackageError::MalformedContent`] if the package does not
/// parse, or [`KeyPackageError::PubkeyMismatch`] if the embedded credential
/// disagrees with `pubkey`.
pub fn create_key_package_event(
    public_package: &[u8],
    pubkey: &[u8; 32],
    ciphersuite: Ciphersuite,
    options: &KeyPackageEventOptions<'_>,
) -> Result<crate::config::UnsignedEvent, KeyPackageError> {
    let parsed: KeyPackage = tls_codec::Deserialize::tls_deserialize_exact_bytes(public_package)
        .map_err(|e| KeyPackageError::MalformedContent(e.to_string()))?;

    let embedded = crate::credential::credential_pubkey(parsed.leaf_node().credential())?;
    if &embedded != pubkey {
        return Err(KeyPackageError::PubkeyMismatch);
    }

    let encoding = if options.use_base64 { "base64" } else { "hex" };
    let content = if options.use_base64 {
        use base64::{engine::general_purpose::STANDARD, Engine as _};
        STANDARD.encode(public_package)
    } else {
        hex::encode(public_package)
    };

    let mut extension_ids: BTreeSet<u16> =
        parsed.leaf_node().capabilities().extensions().iter().map(extension_type_value).collect();
    extension_ids.extend(parsed.extensions().iter().map(Extension::extension_type).map(extension_type_value));
    extension_ids.retain(|id| !is_grease_value(*id));

    let mut tags = vec![
        vec!["mls_protocol_version".to_owned(), "1.0".to_owned()],
        vec!["mls_ciphersuite".to_owned(), format!("0x{:04X}", u16::from(ciphersuite))],
    ];
    let mut extensions_tag = vec!["mls_extensions".to_owned()];
    extensions_tag.extend(extension_ids.into_iter().map(|id| format!("0x{id:04X}")));
    tags.push(extensions_tag);

    let mut relays_tag = vec!["relays".to_owned()];
    relays_tag.extend(options.relays.iter().map(Url::to_string));
    tags.push(relays_tag);

    if let Some(client) = options.client {
        tags.push(vec!["client".to_owned(), client.to_owned()]);
    }
    tags.push(vec!["encoding".to_owned(), encoding.to_owned()]);

    Ok(crate::config::UnsignedEvent { kind: Kind::KeyPackage.as_u16(), pubkey: *pubkey, content, tags })
}

fn extension_type_value(extension_type: ExtensionType) -> u16 {
    match extension_type {
        ExtensionType::ApplicationId => 1,
        ExtensionType::RatchetTree => 2,
        ExtensionType::RequiredCapabilities => 3,
        ExtensionType::ExternalPub => 4,
        ExtensionType::ExternalSenders => 5,
        ExtensionType::Unknown(value) => value,
        _ => 0,
    }
}

/// GREASE extension-type values (MLS reserves `0x?A?A` patterns) are
/// filtered from advertised extension tags.
fn is_grease_value(value: u16) -> bool {
    matches!(value, 0x0A0A | 0x1A1A | 0x2A2A | 0x3A3A | 0x4A4A | 0x5A5A | 0x6A6A | 0x7A7A | 0x8A8A | 0x9A9A | 0xAAAA | 0xBABA | 0xCACA | 0xDADA | 0xEAEA | 0xFAFA)
}

/// Build a kind-5 deletion event retracting the listed kind-443 events.
///
/// `events`, when supplied in full, are checked to actually be kind 443;
/// bare id strings are trusted (§4.6).
///
/// # Errors
///
/// Returns [`KeyPackageError::NotAKeyPackageEvent`] if a supplied
/// [`TransportEvent`] is not kind 443.
pub fn create_delete_key_package_event(
    pubkey: &[u8; 32],
    event_ids: &[String],
    full_events: &[TransportEvent],
) -> Result<crate::config::UnsignedEvent, KeyPackageError> {
    for event in full_events {
        if event.kind != Kind::KeyPackage.as_u16() {
            return Err(KeyPackageError::NotAKeyPackageEvent(event.id_hex()));
        }
    }

    let mut tags = vec![vec!["k".to_owned(), Kind::KeyPackage.as_u16().to_string()]];
    tags.extend(event_ids.iter().map(|id| vec!["e".to_owned(), id.clone()]));
    tags.extend(full_events.iter().map(|event| vec!["e".to_owned(), event.id_hex()]));

    Ok(crate::config::UnsignedEvent { kind: Kind::Deletion.as_u16(), pubkey: *pubkey, content: String::new(), tags })
}
