//! Environment abstraction for deterministic testing.
//!
//! Decouples timing logic from system resources (clocks, randomness). The
//! simulation harness substitutes a seeded RNG and a controllable wall clock;
//! production uses [`SystemEnv`]. Scheduling goes through [`Environment::sleep`]
//! only, so drivers never read a monotonic clock themselves.

use std::time::Duration;

/// Abstract environment providing wall-clock time, randomness, and async
/// sleep.
///
/// Implementations MUST guarantee:
///
/// - `random_bytes()` uses OS entropy in production
/// - a simulated `wall_clock_ms()` moves only when the test advances it
pub trait Environment: Clone + Send + Sync + 'static {
    /// Sleeps for the specified duration.
    ///
    /// Only driver code awaits this; generator and replay logic take time as
    /// a parameter.
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send;

    /// Fills the provided buffer with random bytes.
    ///
    /// Given the same seed, a simulated environment produces the same bytes.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Generates a random `u64`, typically to seed a per-session RNG.
    fn random_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        self.random_bytes(&mut bytes);
        u64::from_be_bytes(bytes)
    }

    /// Wall-clock milliseconds since the Unix epoch.
    ///
    /// Used for message timestamps and session clocks, never for scheduling.
    fn wall_clock_ms(&self) -> u64;
}

/// Production environment: system clocks, tokio sleep, OS entropy.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }

    #[allow(clippy::expect_used)]
    fn random_bytes(&self, buffer: &mut [u8]) {
        getrandom::fill(buffer).expect("invariant: OS RNG failure is unrecoverable");
    }

    fn wall_clock_ms(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map_or(0, |d| d.as_millis() as u64)
    }
}
