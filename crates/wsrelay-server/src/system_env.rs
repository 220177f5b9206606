//! Production Environment implementation using system time and RNG.
//!
//! Connection ids come from the OS RNG, so they are unpredictable and not
//! reproducible across runs. Tests that need replayable ids use a seeded
//! environment instead.

use wsrelay_core::Environment;

/// Production environment using system time and the OS RNG.
///
/// # Panics
///
/// Panics if the OS RNG fails. Without it the server cannot assign
/// connection ids.
#[derive(Clone, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    #[allow(clippy::disallowed_methods)]
    fn now(&self) -> std::time::Instant {
        std::time::Instant::now()
    }

    #[allow(clippy::expect_used)]
    fn random_bytes(&self, buffer: &mut [u8]) {
        getrandom::fill(buffer).expect("invariant: OS RNG failure is unrecoverable");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn system_env_time_advances() {
        let env = SystemEnv::new();

        let t1 = env.now();
        std::thread::sleep(Duration::from_millis(10));
        let t2 = env.now();

        assert!(t2 > t1, "Time should advance");
    }

    #[test]
    fn connection_ids_differ() {
        let env = SystemEnv::new();

        // Extremely unlikely to collide if random
        assert_ne!(env.random_u64(), env.random_u64());
    }
}
