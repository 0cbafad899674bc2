//! Basic-credential construction and validation from 32-byte public keys.
//!
//! Generalizes `lockframe_core::mls::group`'s
//! `extract_member_id_from_credential` / credential-construction pairing
//! (which stores an 8-byte little-endian member id) to a 32-byte raw
//! public key, per §4.5.

use openmls::prelude::{BasicCredential, Credential, CredentialWithKey, SignaturePublicKey};
use thiserror::Error;

/// Errors from credential construction or validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CredentialError {
    /// The supplied identity bytes were not exactly 32 bytes, or (for the
    /// hex-accepting path) were not a well-formed 64-char hex string.
    #[error("invalid public key: {reason}")]
    InvalidPublicKey {
        /// Human-readable detail.
        reason: String,
    },
}

/// Build a [`BasicCredential`] whose identity is exactly `pubkey`.
#[must_use]
pub fn create_credential(pubkey: &[u8; 32]) -> BasicCredential {
    BasicCredential::new(pubkey.to_vec())
}

/// Build a credential paired with its signature public key, ready to hand
/// to `openmls` group/key-package construction.
#[must_use]
pub fn credential_with_key(pubkey: &[u8; 32], signature_key: Vec<u8>) -> CredentialWithKey {
    CredentialWithKey {
        credential: create_credential(pubkey).into(),
        signature_key: SignaturePublicKey::from(signature_key),
    }
}

/// Recover the 32-byte public key from a credential's serialized identity.
///
/// For backward compatibility, also accepts a credential whose identity is
/// the 64-character hex encoding of the public key in UTF-8 (§4.5).
///
/// # Errors
///
/// Returns [`CredentialError::InvalidPublicKey`] if the identity is neither
/// 32 raw bytes nor 64 hex characters.
pub fn credential_pubkey(credential: &Credential) -> Result<[u8; 32], CredentialError> {
    let bytes = credential.serialized_content();

    if bytes.len() == 32 {
        let mut out = [0u8; 32];
        out.copy_from_slice(bytes);
        return Ok(out);
    }

    if bytes.len() == 64 {
        if let Ok(hex_str) = std::str::from_utf8(bytes) {
            if let Ok(decoded) = hex::decode(hex_str) {
                if decoded.len() == 32 {
                    let mut out = [0u8; 32];
                    out.copy_from_slice(&decoded);
                    return Ok(out);
                }
            }
        }
    }

    Err(CredentialError::InvalidPublicKey {
        reason: format!("expected 32 raw bytes or 64 hex chars, got {} bytes", bytes.len()),
    })
}

/// Parse and validate a 64-char hex public key, as used by
/// `createCredential(pubkey_hex)` in spec.md §4.5.
///
/// # Errors
///
/// Returns [`CredentialError::InvalidPublicKey`] if `pubkey_hex` is not
/// exactly 64 lowercase-or-uppercase hex characters.
pub fn pubkey_from_hex(pubkey_hex: &str) -> Result<[u8; 32], CredentialError> {
    if pubkey_hex.len() != 64 {
        return Err(CredentialError::InvalidPublicKey {
            reason: format!("expected 64 hex chars, got {}", pubkey_hex.len()),
        });
    }
    let decoded = hex::decode(pubkey_hex)
        .map_err(|e| CredentialError::InvalidPublicKey { reason: e.to_string() })?;
    let mut out = [0u8; 32];
    out.copy_from_slice(&decoded);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_raw_identity() {
        let pubkey = [7u8; 32];
        let credential: Credential = create_credential(&pubkey).into();
        assert_eq!(credential_pubkey(&credential).unwrap(), pubkey);
    }

    #[test]
    fn accepts_legacy_hex_identity() {
        let pubkey = [0xABu8; 32];
        let hex_str = hex::encode(pubkey);
        let legacy = BasicCredential::new(hex_str.into_bytes());
        let credential: Credential = legacy.into();
        assert_eq!(credential_pubkey(&credential).unwrap(), pubkey);
    }

    #[test]
    fn rejects_wrong_length() {
        let credential: Credential = BasicCredential::new(vec![1, 2, 3]).into();
        assert!(credential_pubkey(&credential).is_err());
    }

    #[test]
    fn pubkey_from_hex_rejects_short_input() {
        assert!(pubkey_from_hex("abcd").is_err());
    }

    #[test]
    fn pubkey_from_hex_rejects_non_hex() {
        let bad = "z".repeat(64);
        assert!(pubkey_from_hex(&bad).is_err());
    }

    #[test]
    fn pubkey_from_hex_accepts_well_formed() {
        let hex_str = "ab".repeat(32);
        let decoded = pubkey_from_hex(&hex_str).unwrap();
        assert_eq!(decoded, [0xabu8; 32]);
    }
}
