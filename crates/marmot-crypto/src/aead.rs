//! XChaCha20-Poly1305 envelope encryption.
//!
//! Every Marmot group event is encrypted under the same 32-byte secret for
//! the lifetime of an epoch (see [`crate::keys`]), so the nonce alone must
//! keep ciphertexts unlinkable: each call draws a fresh 24-byte nonce and
//! prepends it to the ciphertext on the wire.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use rand_core::{CryptoRng, RngCore};

use crate::error::CryptoError;

/// Size in bytes of the random nonce prefix on every envelope ciphertext.
pub const NONCE_LEN: usize = 24;
/// Size in bytes of the Poly1305 authentication tag.
pub const TAG_LEN: usize = 16;

/// Encrypt `plaintext` under `key` using a nonce drawn from `rng`.
///
/// Returns `nonce || ciphertext || tag`, ready to place on the wire as the
/// encrypted content of a group event.
pub fn seal(
    key: &[u8; 32],
    plaintext: &[u8],
    rng: &mut (impl RngCore + CryptoRng),
) -> Result<Vec<u8>, CryptoError> {
    let cipher = XChaCha20Poly1305::new(key.into());
    let mut nonce_bytes = [0u8; NONCE_LEN];
    rng.fill_bytes(&mut nonce_bytes);
    let nonce = XNonce::from(nonce_bytes);

    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|_| CryptoError::EncryptionFailed)?;

    let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt a `nonce || ciphertext || tag` blob produced by [`seal`].
pub fn open(key: &[u8; 32], sealed: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let min = NONCE_LEN + TAG_LEN;
    if sealed.len() < min {
        return Err(CryptoError::CiphertextTruncated {
            len: sealed.len(),
            min,
        });
    }
    let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LEN);
    let nonce = XNonce::from_slice(nonce_bytes);

    let cipher = XChaCha20Poly1305::new(key.into());
    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| CryptoError::DecryptionFailed {
            reason: "authentication failed".to_owned(),
        })
}
