//! Envelope cryptography for Marmot group events.
//!
//! This crate owns exactly two things: deriving the per-epoch envelope key
//! material from an MLS exporter secret ([`keys::EnvelopeKeys`]), and
//! sealing or opening the encrypted envelope content of a group event with
//! it ([`aead::seal`], [`aead::open`]). Everything else — MLS group state,
//! event signing and transport, and persistence — lives in `marmot-core`
//! and `marmot-store`.

pub mod aead;
pub mod error;
pub mod keys;

pub use aead::{open, seal, NONCE_LEN, TAG_LEN};
pub use error::CryptoError;
pub use keys::EnvelopeKeys;
