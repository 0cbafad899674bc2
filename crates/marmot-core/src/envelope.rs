//! Envelope codec (§4.2): wraps MLS wire messages as kind-445 transport
//! events, keyed by the current epoch's exporter secret, signed by a fresh
//! ephemeral identity disjoint from the sender's MLS credential.
//!
//! AEAD framing is grounded on `lockframe_crypto::sender_keys::encryption`
//! (XChaCha20-Poly1305 via `marmot_crypto`). The ephemeral-signer pattern
//! (`Keys::generate()` per event, never reused) mirrors how the `nostr-mls`
//! reference crate builds its kind-445 wrapper events.

use ed25519_dalek::{Signer as _, SigningKey};
use marmot_crypto::{CryptoError, EnvelopeKeys};
use rand_core::{CryptoRng, RngCore};
use thiserror::Error;

use crate::data::event::{Kind, TransportEvent};

/// Errors from sealing or opening a group event envelope.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EnvelopeError {
    /// The inner MLS wire message could not be authenticated-encrypted.
    #[error("failed to seal envelope: {0}")]
    Seal(CryptoError),

    /// The envelope ciphertext failed to authenticate, or the event is
    /// otherwise unreadable at the receiver's current epoch (§4.9: this is
    /// non-fatal and events that fail this way are set aside).
    #[error("envelope is unreadable: {0}")]
    Unreadable(CryptoError),

    /// The event's `content` was not valid base64.
    #[error("content is not valid base64: {0}")]
    InvalidContent(String),
}

/// Derive the per-epoch envelope keys from an MLS exporter secret.
///
/// Per §4.2 and the resolved curve-interpretation open question (§9): the
/// AEAD key is the raw exporter secret, and the paired X25519 public key is
/// derived from the same secret purely for bookkeeping, never for DH.
#[must_use]
pub fn derive_envelope_keys(exporter_secret: &[u8; 32]) -> EnvelopeKeys {
    EnvelopeKeys::derive(exporter_secret)
}

/// The single `h` tag carried on every kind-445 event.
#[must_use]
pub fn group_tag(nostr_group_id: &[u8; 32]) -> Vec<String> {
    vec!["h".to_owned(), hex::encode(nostr_group_id)]
}

/// Seal an MLS wire message and build the signed kind-445 transport event.
///
/// A fresh ephemeral Ed25519 keypair is generated for this call alone and
/// discarded; its public key becomes the event's `pubkey`, so the receiver
/// learns nothing about the real sender from the envelope (§4.2, property
/// 7 of §8).
///
/// # Errors
///
/// Returns [`EnvelopeError::Seal`] if the AEAD step fails.
pub fn build_group_event(
    keys: &EnvelopeKeys,
    nostr_group_id: &[u8; 32],
    wire_message: &[u8],
    created_at: u64,
    rng: &mut (impl RngCore + CryptoRng),
) -> Result<TransportEvent, EnvelopeError> {
    let ciphertext = marmot_crypto::seal(keys.aead_key(), wire_message, rng).map_err(EnvelopeError::Seal)?;
    let content = base64_encode(&ciphertext);
    let tags = vec![group_tag(nostr_group_id)];

    let signing_key = SigningKey::generate(rng);
    let pubkey = signing_key.verifying_key().to_bytes();

    let id = compute_event_id(Kind::GroupEvent.as_u16(), &pubkey, created_at, &tags, &content);
    let sig = signing_key.sign(&id).to_bytes();

    Ok(TransportEvent { kind: Kind::GroupEvent.as_u16(), pubkey, created_at, content, tags, id, sig })
}

/// Decrypt a kind-445 event's content into the inner MLS wire message.
///
/// # Errors
///
/// Returns [`EnvelopeError::InvalidContent`] if `content` is not valid
/// base64, or [`EnvelopeError::Unreadable`] if AEAD authentication fails —
/// the latter is the expected, non-fatal outcome for an event encrypted
/// under a different epoch (§4.9 step 1).
pub fn open_group_event(keys: &EnvelopeKeys, content: &str) -> Result<Vec<u8>, EnvelopeError> {
    let ciphertext = base64_decode(content).map_err(EnvelopeError::InvalidContent)?;
    marmot_crypto::open(keys.aead_key(), &ciphertext).map_err(EnvelopeError::Unreadable)
}

fn base64_encode(bytes: &[u8]) -> String {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    STANDARD.encode(bytes)
}

fn base64_decode(s: &str) -> Result<Vec<u8>, String> {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    STANDARD.decode(s).map_err(|e| e.to_string())
}

/// NIP-01-style canonical event id: `sha256([0, pubkey_hex, created_at, kind, tags, content])`.
///
/// Public so external [`crate::config::Signer`] implementations compute the
/// same id this crate expects `TransportEvent::id` to carry for every kind,
/// not just kind-445 (§5, §6).
#[must_use]
pub fn compute_event_id(kind: u16, pubkey: &[u8; 32], created_at: u64, tags: &[Vec<String>], content: &str) -> [u8; 32] {
    use sha2::{Digest, Sha256};

    let canonical = serde_json::json!([0, hex::encode(pubkey), created_at, kind, tags, content]);
    let serialized = canonical.to_string();
    let mut hasher = Sha256::new();
    hasher.update(serialized.as_bytes());
    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

#[cfg(test)]
mod tests {
    use ed25519_dalek::Verifier as _;
    use rand::rngs::OsRng;

    use super::*;

    #[test]
    fn round_trip() {
        let exporter_secret = [7u8; 32];
        let keys = derive_envelope_keys(&exporter_secret);
        let group_id = [9u8; 32];
        let mut rng = OsRng;

        let event = build_group_event(&keys, &group_id, b"hello mls", 1_700_000_000, &mut rng).unwrap();
        assert_eq!(event.kind, Kind::GroupEvent.as_u16());
        assert_eq!(event.tags, vec![group_tag(&group_id)]);

        let plaintext = open_group_event(&keys, &event.content).unwrap();
        assert_eq!(plaintext, b"hello mls");
    }

    #[test]
    fn wrong_epoch_key_is_unreadable() {
        let sender_keys = derive_envelope_keys(&[1u8; 32]);
        let receiver_keys = derive_envelope_keys(&[2u8; 32]);
        let mut rng = OsRng;

        let event = build_group_event(&sender_keys, &[0u8; 32], b"payload", 1, &mut rng).unwrap();
        let result = open_group_event(&receiver_keys, &event.content);
        assert!(matches!(result, Err(EnvelopeError::Unreadable(_))));
    }

    #[test]
    fn pubkey_is_fresh_each_call() {
        let keys = derive_envelope_keys(&[3u8; 32]);
        let mut rng = OsRng;

        let first = build_group_event(&keys, &[0u8; 32], b"a", 1, &mut rng).unwrap();
        let second = build_group_event(&keys, &[0u8; 32], b"a", 1, &mut rng).unwrap();
        assert_ne!(first.pubkey, second.pubkey);
    }

    #[test]
    fn signature_verifies_against_event_pubkey() {
        let keys = derive_envelope_keys(&[4u8; 32]);
        let mut rng = OsRng;
        let event = build_group_event(&keys, &[0u8; 32], b"a", 1, &mut rng).unwrap();

        let verifying_key = ed25519_dalek::VerifyingKey::from_bytes(&event.pubkey).unwrap();
        let signature = ed25519_dalek::Signature::from_bytes(&event.sig);
        assert!(verifying_key.verify(&event.id, &signature).is_ok());
    }

    #[test]
    fn malformed_base64_content_is_rejected() {
        let keys = derive_envelope_keys(&[5u8; 32]);
        let result = open_group_event(&keys, "not base64!!!");
        assert!(matches!(result, Err(EnvelopeError::InvalidContent(_))));
    }
}
