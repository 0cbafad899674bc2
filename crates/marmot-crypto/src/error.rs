//! Error types for envelope cryptography.

use thiserror::Error;

/// Errors raised by envelope encryption, key derivation, or ephemeral
/// identity generation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// AEAD encryption failed.
    ///
    /// `XChaCha20Poly1305` encryption only fails on malformed keys, which
    /// this crate never constructs, so this variant should be unreachable
    /// in practice; it exists so callers can match exhaustively instead of
    /// relying on a panic.
    #[error("envelope encryption failed")]
    EncryptionFailed,

    /// AEAD decryption failed: wrong key (stale or future epoch) or a
    /// tampered ciphertext. Both cases are indistinguishable by design.
    #[error("envelope decryption failed: {reason}")]
    DecryptionFailed {
        /// Human-readable context (never exposes key material).
        reason: String,
    },

    /// A ciphertext was shorter than the minimum envelope framing (nonce +
    /// authentication tag).
    #[error("envelope ciphertext truncated: got {len} bytes, need at least {min}")]
    CiphertextTruncated {
        /// Bytes actually supplied.
        len: usize,
        /// Minimum valid length.
        min: usize,
    },
}
