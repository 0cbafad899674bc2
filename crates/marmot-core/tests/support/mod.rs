//! Shared test doubles for the group-engine integration scenarios (§8).
//!
//! `TestSigner`/`TestNetwork` stand in for the caller-supplied capabilities
//! the spec's §6 traits exist to abstract over; `FixedEnvironment` gives
//! scenario tests control over event `created_at` so total-order outcomes
//! are deterministic instead of racing the wall clock.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use marmot_core::{Environment, Filter, Network, PublishAck, Signer, SignerError, TransportEvent, UnsignedEvent};
use url::Url;

/// An [`Environment`] whose clock is pinned to a caller-chosen value, so
/// scenario tests can force a specific `created_at` ordering without racing
/// the real clock. Randomness still draws from the OS.
#[derive(Clone, Copy)]
pub struct FixedEnvironment {
    pub time: u64,
}

impl Environment for FixedEnvironment {
    fn unix_time_secs(&self) -> u64 {
        self.time
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        use rand::RngCore;
        rand::rngs::OsRng.fill_bytes(buffer);
    }
}

/// A [`Signer`] for a single fixed identity. Produces syntactically
/// complete events; the signature bytes are not cryptographically
/// meaningful, since nothing in `marmot-core` itself verifies
/// `TransportEvent::sig` (that is an external relay's job, §1).
pub struct TestSigner {
    pubkey: [u8; 32],
}

impl TestSigner {
    #[must_use]
    pub fn new(pubkey: [u8; 32]) -> Self {
        Self { pubkey }
    }
}

impl Signer for TestSigner {
    fn public_key(&self) -> [u8; 32] {
        self.pubkey
    }

    fn sign_event(&self, draft: UnsignedEvent) -> Result<TransportEvent, SignerError> {
        let id = marmot_core::compute_event_id(draft.kind, &draft.pubkey, 1, &draft.tags, &draft.content);
        Ok(TransportEvent {
            kind: draft.kind,
            pubkey: draft.pubkey,
            created_at: 1,
            content: draft.content,
            tags: draft.tags,
            id,
            sig: [0u8; 64],
        })
    }
}

/// A [`Network`] that records every published event and acknowledges (or
/// refuses) publishes according to a caller-chosen policy (for S5, "every
/// relay refuses the commit").
#[derive(Clone, Default)]
pub struct TestNetwork {
    ack: Arc<Mutex<bool>>,
    published: Arc<Mutex<Vec<TransportEvent>>>,
    inbox_relays: Arc<Mutex<HashMap<[u8; 32], Vec<Url>>>>,
}

impl TestNetwork {
    #[must_use]
    pub fn new() -> Self {
        Self { ack: Arc::new(Mutex::new(true)), ..Self::default() }
    }

    #[must_use]
    pub fn always_fails() -> Self {
        Self { ack: Arc::new(Mutex::new(false)), ..Self::default() }
    }

    pub fn published(&self) -> Vec<TransportEvent> {
        self.published.lock().unwrap().clone()
    }
}

impl Network for TestNetwork {
    fn publish(&self, relays: &[Url], event: &TransportEvent) -> HashMap<Url, PublishAck> {
        self.published.lock().unwrap().push(event.clone());
        let ok = *self.ack.lock().unwrap();
        relays.iter().cloned().map(|relay| (relay, PublishAck { ok, message: None })).collect()
    }

    fn request(&self, _relays: &[Url], _filter: &Filter) -> Vec<TransportEvent> {
        Vec::new()
    }

    fn get_user_inbox_relays(&self, pubkey: &[u8; 32]) -> Vec<Url> {
        self.inbox_relays.lock().unwrap().get(pubkey).cloned().unwrap_or_default()
    }
}

#[must_use]
pub fn relay(url: &str) -> Url {
    Url::parse(url).unwrap()
}
