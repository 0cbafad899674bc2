//! Environment abstraction for deterministic testing.
//!
//! Decouples the group engine from wall-clock time and system entropy, the
//! same way `lockframe_core::env::Environment` decouples the teacher's
//! protocol logic from them. This spec's operations are all synchronous
//! (§2's "async-free determinism"), so unlike the teacher's trait this one
//! carries no `sleep`/`Instant` associated type — only the two primitives
//! the engine actually needs: wall-clock seconds for event `created_at`,
//! and randomness for MLS key generation and ephemeral envelope keys.
use std::time::{SystemTime, UNIX_EPOCH};

/// Abstract environment providing wall-clock time and randomness.
///
/// # Invariants
///
/// Implementations must guarantee `random_bytes` draws from a
/// cryptographically secure source in production, and that
/// `unix_time_secs` never returns a value that decreases within one
/// process's lifetime.
pub trait Environment: Clone + Send + Sync + 'static {
    /// Current wall-clock time, in seconds since the Unix epoch.
    fn unix_time_secs(&self) -> u64;

    /// Fill `buffer` with random bytes.
    fn random_bytes(&self, buffer: &mut [u8]);
}

/// Production environment backed by the system clock and OS entropy.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemEnvironment;

impl Environment for SystemEnvironment {
    fn unix_time_secs(&self) -> u64 {
        SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        use rand::RngCore;
        rand::rngs::OsRng.fill_bytes(buffer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_environment_produces_distinct_randomness() {
        let env = SystemEnvironment;
        let mut a = [0u8; 16];
        let mut b = [0u8; 16];
        env.random_bytes(&mut a);
        env.random_bytes(&mut b);
        assert_ne!(a, b);
    }

    #[test]
    fn system_environment_time_is_recent() {
        let env = SystemEnvironment;
        assert!(env.unix_time_secs() > 1_700_000_000);
    }
}
