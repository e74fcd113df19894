//! Environment abstraction for deterministic testing.
//!
//! Decouples protocol logic from system resources (time, randomness). The
//! simulation harness supplies a virtual clock and seeded RNG; production
//! uses the system clock and OS entropy.

use std::{
    fmt,
    ops::{Add, Sub},
    time::{Duration, Instant},
};

use uuid::{Builder, Uuid};

/// Point on a monotonic clock.
///
/// Implemented for `std::time::Instant` and for the harness's virtual instant.
pub trait MonotonicInstant:
    Copy
    + Ord
    + Send
    + Sync
    + fmt::Debug
    + Sub<Output = Duration>
    + Add<Duration, Output = Self>
    + 'static
{
    /// `self + duration`, or `None` if that falls off the clock.
    ///
    /// Deadlines built from caller-supplied durations go through here.
    fn checked_add(self, duration: Duration) -> Option<Self>;
}

impl MonotonicInstant for Instant {
    fn checked_add(self, duration: Duration) -> Option<Self> {
        Instant::checked_add(&self, duration)
    }
}

/// Abstract environment providing time, randomness, and async primitives.
///
/// Implementations MUST guarantee:
///
/// - `now()` never goes backwards
/// - Given the same seed, `random_bytes()` yields the same sequence
pub trait Environment: Clone + Send + Sync + 'static {
    /// Monotonic instant type. Production uses `std::time::Instant`.
    type Instant: MonotonicInstant;

    /// Current time (monotonic).
    fn now(&self) -> Self::Instant;

    /// Wall-clock milliseconds since the Unix epoch, for wire timestamps.
    ///
    /// Never used for timeouts; those run on [`Environment::now`].
    fn wall_clock_millis(&self) -> i64;

    /// Sleeps for the specified duration.
    ///
    /// Only driver code awaits this; state machines take time as input.
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send;

    /// Fills the provided buffer with random bytes.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Generates a random `u64`.
    fn random_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        self.random_bytes(&mut bytes);
        u64::from_be_bytes(bytes)
    }

    /// Generates a random version 4 UUID from this environment's entropy.
    ///
    /// Message ids come from here so simulated runs are reproducible.
    fn random_uuid(&self) -> Uuid {
        let mut bytes = [0u8; 16];
        self.random_bytes(&mut bytes);
        Builder::from_random_bytes(bytes).into_uuid()
    }
}

#[cfg(test)]
pub(crate) mod test_utils {
    use std::{
        sync::{
            Arc,
            atomic::{AtomicU64, Ordering},
        },
        time::{Duration, Instant},
    };

    use super::Environment;

    /// Real clock, counter-based randomness.
    #[derive(Clone, Default)]
    pub(crate) struct MockEnv {
        counter: Arc<AtomicU64>,
    }

    impl Environment for MockEnv {
        type Instant = Instant;

        fn now(&self) -> Instant {
            Instant::now()
        }

        fn wall_clock_millis(&self) -> i64 {
            1_700_000_000_000
        }

        fn sleep(&self, _duration: Duration) -> impl std::future::Future<Output = ()> + Send {
            async {}
        }

        fn random_bytes(&self, buffer: &mut [u8]) {
            let next = self.counter.fetch_add(1, Ordering::Relaxed);
            for (i, byte) in buffer.iter_mut().enumerate() {
                *byte = (next as u8).wrapping_add(i as u8);
            }
        }
    }
}
