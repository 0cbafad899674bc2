//! Derivation of the per-epoch envelope key pair from an MLS exporter secret.
//!
//! The group engine exports a 32-byte secret from the current epoch
//! (label `"nostr"`, context `b"nostr"`). Per the resolved curve-interpretation
//! question this secret is used two ways:
//!
//! - directly, as the symmetric AEAD key for [`crate::aead::seal`]/[`crate::aead::open`];
//! - as a Curve25519 scalar, clamped per RFC 7748, giving a deterministic
//!   public point every holder of the same epoch secret can compute
//!   identically. This "envelope public key" is never used for Diffie-Hellman
//!   in this crate; it exists purely so callers can group or deduplicate
//!   events known to share an epoch secret without comparing the secret
//!   itself.
//!
//! Both interpretations come from the same 32 bytes; this module does not
//! perform any additional key-derivation step, matching spec wording that
//! the exporter secret itself is the symmetric key.

use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroize;

/// The envelope key material derived from one epoch's exporter secret.
pub struct EnvelopeKeys {
    aead_key: [u8; 32],
    public: PublicKey,
}

impl EnvelopeKeys {
    /// Derive both the AEAD key and the bookkeeping public key from an
    /// exporter secret.
    #[must_use]
    pub fn derive(exporter_secret: &[u8; 32]) -> Self {
        let secret = StaticSecret::from(*exporter_secret);
        let public = PublicKey::from(&secret);
        Self { aead_key: *exporter_secret, public }
    }

    /// The symmetric key used to seal/open envelope content for this epoch.
    #[must_use]
    pub fn aead_key(&self) -> &[u8; 32] {
        &self.aead_key
    }

    /// The deterministic bookkeeping public key peers at the same epoch
    /// also derive. Not used for key agreement.
    #[must_use]
    pub fn public_bytes(&self) -> [u8; 32] {
        *self.public.as_bytes()
    }
}

impl Drop for EnvelopeKeys {
    fn drop(&mut self) {
        self.aead_key.zeroize();
    }
}
