//! `OpenMLS` provider bridging the `Environment` abstraction into
//! `openmls_traits::OpenMlsProvider`.
//!
//! Grounded on `lockframe_core::mls::provider::MlsProvider`, simplified to
//! drop the `now()` passthrough (this crate's group engine takes wall-clock
//! time from `Environment::unix_time_secs` directly at the call sites that
//! need it, rather than through the provider).

use openmls_memory_storage::MemoryStorage;
use openmls_rust_crypto::RustCrypto;
use openmls_traits::{random::OpenMlsRand, OpenMlsProvider};

use crate::env::Environment;

/// `OpenMLS` provider using `Environment` for randomness and in-memory
/// storage for the ratchet tree / key material `openmls` itself manages.
///
/// Durable persistence of the *serialized* client state (§4.3/§4.4) is a
/// separate concern, handled by `marmot_store`, not by this provider's
/// storage backend.
pub struct MlsProvider<E: Environment> {
    crypto: RustCrypto,
    rand: EnvironmentRng<E>,
    storage: MemoryStorage,
}

impl<E: Environment> MlsProvider<E> {
    /// Build a provider whose randomness is drawn from `env`.
    pub fn new(env: E) -> Self {
        Self { crypto: RustCrypto::default(), rand: EnvironmentRng { env }, storage: MemoryStorage::default() }
    }

    /// Build a provider around previously persisted storage, re-attaching
    /// randomness from `env` (§4.3/§9: capability handles are re-attached
    /// on load, never themselves serialized).
    pub fn with_storage(env: E, storage: MemoryStorage) -> Self {
        Self { crypto: RustCrypto::default(), rand: EnvironmentRng { env }, storage }
    }

    /// Clone out the environment backing this provider's randomness, so a
    /// fresh provider can be built around restored storage (§4.3).
    pub fn env(&self) -> E {
        self.rand.env.clone()
    }
}

/// `rand`/`OpenMlsRand` adapter delegating to an `Environment`.
pub struct EnvironmentRng<E: Environment> {
    env: E,
}

impl<E: Environment> rand::RngCore for EnvironmentRng<E> {
    fn next_u32(&mut self) -> u32 {
        let mut bytes = [0u8; 4];
        self.env.random_bytes(&mut bytes);
        u32::from_le_bytes(bytes)
    }

    fn next_u64(&mut self) -> u64 {
        let mut bytes = [0u8; 8];
        self.env.random_bytes(&mut bytes);
        u64::from_le_bytes(bytes)
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.env.random_bytes(dest);
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.env.random_bytes(dest);
        Ok(())
    }
}

impl<E: Environment> rand::CryptoRng for EnvironmentRng<E> {}

impl<E: Environment> OpenMlsRand for EnvironmentRng<E> {
    type Error = std::convert::Infallible;

    fn random_array<const N: usize>(&self) -> Result<[u8; N], Self::Error> {
        let mut bytes = [0u8; N];
        self.env.random_bytes(&mut bytes);
        Ok(bytes)
    }

    fn random_vec(&self, len: usize) -> Result<Vec<u8>, Self::Error> {
        let mut bytes = vec![0u8; len];
        self.env.random_bytes(&mut bytes);
        Ok(bytes)
    }
}

impl<E: Environment> OpenMlsProvider for MlsProvider<E> {
    type CryptoProvider = RustCrypto;
    type RandProvider = EnvironmentRng<E>;
    type StorageProvider = MemoryStorage;

    fn crypto(&self) -> &Self::CryptoProvider {
        &self.crypto
    }

    fn rand(&self) -> &Self::RandProvider {
        &self.rand
    }

    fn storage(&self) -> &Self::StorageProvider {
        &self.storage
    }
}
