//! Environment abstraction for deterministic testing.
//!
//! Keeps the relay driver free of system resources. The driver only needs a
//! clock for log timestamps; the runtime also draws connection ids from the
//! environment's RNG, so tests can seed it and replay a run exactly.

use std::time::Instant;

/// Abstract environment providing time and randomness.
///
/// Implementations MUST guarantee that `now()` never goes backwards.
pub trait Environment: Clone + Send + Sync + 'static {
    /// Current time (monotonic).
    fn now(&self) -> Instant;

    /// Fills the provided buffer with random bytes.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Generates a random `u64`.
    ///
    /// Used by the runtime to assign connection ids.
    fn random_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        self.random_bytes(&mut bytes);
        u64::from_be_bytes(bytes)
    }
}
