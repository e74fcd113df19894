//! Production environment using system time and OS randomness.
//!
//! # Capabilities
//!
//! - Real monotonic time (`std::time::Instant`)
//! - OS RNG (getrandom) for message ids
//! - Tokio async sleep for actual wall-clock delays

use std::time::Duration;

use huddle_core::Environment;

/// Production environment.
///
/// # Panics
///
/// Panics if the OS RNG fails. Message ids must be unique, and a process
/// without working entropy cannot guarantee that.
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
    type Instant = std::time::Instant;

    fn now(&self) -> Self::Instant {
        std::time::Instant::now()
    }

    fn wall_clock_millis(&self) -> i64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map_or(0, |elapsed| elapsed.as_millis() as i64)
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }

    #[allow(clippy::expect_used)]
    fn random_bytes(&self, buffer: &mut [u8]) {
        getrandom::fill(buffer).expect("invariant: OS RNG failure is unrecoverable");
    }
}
