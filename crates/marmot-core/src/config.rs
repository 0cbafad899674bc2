//! External collaborator interfaces (§6) and capability injection (§9).
//!
//! `ClientConfig` plays the role the teacher's `ClientConfig` callback bag
//! plays on the wrapped state object: a small struct of capabilities
//! injected at construction and re-attached on deserialize, never itself
//! persisted (§4.3, §9's "dynamic dispatch" design note).

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use url::Url;

use crate::data::event::TransportEvent;
use crate::env::Environment;
use crate::provider::MlsProvider;

/// An unsigned draft event, handed to a [`Signer`] for signing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedEvent {
    /// Numeric event kind.
    pub kind: u16,
    /// Claimed sender public key (the signer must sign for this key).
    pub pubkey: [u8; 32],
    /// Event payload.
    pub content: String,
    /// Event tags.
    pub tags: Vec<Vec<String>>,
}

/// Errors from [`Signer::sign_event`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignerError {
    /// The signer could not produce a signature for this draft.
    #[error("signing failed: {0}")]
    Failed(String),
}

/// An external identity capable of signing transport events (§6).
///
/// Group events (kind 445) are signed internally with a fresh ephemeral
/// keypair instead (§4.2) and never go through this trait; `Signer` is used
/// for the identity-bearing kinds (key package, welcome, relay list,
/// deletion).
pub trait Signer: Send + Sync {
    /// The identity's public key.
    fn public_key(&self) -> [u8; 32];

    /// Sign `draft`, producing a complete transport event.
    ///
    /// # Errors
    ///
    /// Returns [`SignerError`] if signing fails.
    fn sign_event(&self, draft: UnsignedEvent) -> Result<TransportEvent, SignerError>;
}

/// Acknowledgement from a single relay for a publish attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishAck {
    /// Whether the relay accepted the event.
    pub ok: bool,
    /// An optional human-readable relay message.
    pub message: Option<String>,
}

/// A request filter, as consumed by [`Network::request`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    /// Restrict to these event kinds, if non-empty.
    pub kinds: Vec<u16>,
    /// Restrict to these authors, if non-empty.
    pub authors: Vec<[u8; 32]>,
    /// Restrict to events whose `#h` tag matches one of these values.
    pub group_ids: Vec<[u8; 32]>,
    /// Restrict to events created at or after this time.
    pub since: Option<u64>,
}

/// The relay transport (§6). Out of scope per §1: relay connection
/// pooling; this trait is the seam the caller's pool lives behind.
pub trait Network: Send + Sync {
    /// Publish `event` to each of `relays`, returning each relay's ack.
    fn publish(&self, relays: &[Url], event: &TransportEvent) -> HashMap<Url, PublishAck>;

    /// Request events matching `filter` from `relays`.
    fn request(&self, relays: &[Url], filter: &Filter) -> Vec<TransportEvent>;

    /// The inbox relays a given pubkey advertises (kind 10051).
    fn get_user_inbox_relays(&self, pubkey: &[u8; 32]) -> Vec<Url>;
}

/// Capability bag injected into a [`crate::engine::GroupEngine`] (§9).
///
/// Deliberately not `Serialize`/persisted: the state serializer (§4.3)
/// strips this and the caller re-supplies a freshly constructed one on
/// load.
pub struct ClientConfig<E: Environment> {
    /// The `OpenMLS` provider (crypto + randomness + in-memory ratchet-tree
    /// storage).
    pub provider: MlsProvider<E>,
    /// The account identity signer used for kind 443/444/10051/5 events.
    pub signer: Arc<dyn Signer>,
    /// The relay transport.
    pub network: Arc<dyn Network>,
}

impl<E: Environment> ClientConfig<E> {
    /// Build a [`ClientConfig`] from its three capabilities.
    pub fn new(provider: MlsProvider<E>, signer: Arc<dyn Signer>, network: Arc<dyn Network>) -> Self {
        Self { provider, signer, network }
    }
}
