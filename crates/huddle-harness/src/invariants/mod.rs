//! Channel invariants checked after every simulated step.
//!
//! Each step captures what the clients and Apps show as a
//! [`SystemSnapshot`]; the registry then runs every [`Invariant`] over it.
//! Scenario and property tests call [`InvariantRegistry::check_all`], the
//! simulation driver calls [`InvariantRegistry::assert_all`] on each render.

mod checks;
mod snapshot;

use std::fmt;

pub use checks::{
    ActiveChannelJoined, ConsistentMessageBodies, LiveRequiresConnection, PresenceRequiresSync,
    UniqueMessageIds,
};
pub use snapshot::{ChannelSnapshot, ClientSnapshot, SystemSnapshot};

/// Outcome of a single check.
pub type InvariantResult = Result<(), Violation>;

/// A broken invariant.
#[derive(Debug, Clone)]
pub struct Violation {
    /// Invariant that failed
    pub invariant: &'static str,
    /// Which client or channel broke it, and how
    pub message: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.invariant, self.message)
    }
}

impl std::error::Error for Violation {}

/// Property over a [`SystemSnapshot`].
pub trait Invariant: Send + Sync {
    /// Name used in violation reports.
    fn name(&self) -> &'static str;

    /// `Err` with the first offending client or channel.
    fn check(&self, state: &SystemSnapshot) -> InvariantResult;
}

/// Ordered set of invariants.
#[derive(Default)]
pub struct InvariantRegistry {
    invariants: Vec<Box<dyn Invariant>>,
}

impl fmt::Debug for InvariantRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

impl InvariantRegistry {
    /// No invariants.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every channel invariant:
    ///
    /// - [`ActiveChannelJoined`]
    /// - [`UniqueMessageIds`]
    /// - [`LiveRequiresConnection`]
    /// - [`PresenceRequiresSync`]
    /// - [`ConsistentMessageBodies`]
    pub fn standard() -> Self {
        Self::new()
            .with(ActiveChannelJoined)
            .with(UniqueMessageIds)
            .with(LiveRequiresConnection)
            .with(PresenceRequiresSync)
            .with(ConsistentMessageBodies)
    }

    /// Registry with `invariant` appended.
    #[must_use]
    pub fn with(mut self, invariant: impl Invariant + 'static) -> Self {
        self.invariants.push(Box::new(invariant));
        self
    }

    /// Names in check order.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.invariants.iter().map(|invariant| invariant.name())
    }

    /// Run every check and collect the failures.
    pub fn check_all(&self, state: &SystemSnapshot) -> Result<(), Vec<Violation>> {
        let violations: Vec<_> =
            self.invariants.iter().filter_map(|invariant| invariant.check(state).err()).collect();
        if violations.is_empty() { Ok(()) } else { Err(violations) }
    }

    /// Panic listing every failure, prefixed with `context`.
    #[allow(clippy::panic, reason = "test assertion helper")]
    pub fn assert_all(&self, state: &SystemSnapshot, context: &str) {
        if let Err(violations) = self.check_all(state) {
            let lines: Vec<_> = violations.iter().map(ToString::to_string).collect();
            panic!("invariant violated {context}:\n  {}", lines.join("\n  "));
        }
    }
}
