//! Deterministic simulation harness for Huddle channel testing.
//!
//! Virtual-clock implementations of the Environment and Driver traits, plus an
//! in-memory relay, so multi-user channel behavior can be reproduced exactly
//! from a seed.
//!
//! # Components
//!
//! - [`SimEnv`]: virtual clock and seeded randomness
//! - [`SimRelay`]: model of the relay server with fault knobs
//! - [`RecordingServices`]: collaborators that record every side effect
//! - [`Scenario`]: several sans-IO clients pumped through one relay
//! - [`SimDriver`]: [`huddle_app::Driver`] over a shared relay
//!
//! # Invariant Testing
//!
//! The `invariants` module provides behavioral testing through invariant
//! checks. Invariants verify WHAT must be true across all execution paths, not
//! specific scenarios. Use [`InvariantRegistry::standard()`] for the common
//! channel invariants.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod invariants;
pub mod scenario;
pub mod services;
pub mod sim_driver;
pub mod sim_env;
pub mod sim_relay;

pub use invariants::{
    ActiveChannelJoined, ChannelSnapshot, ClientSnapshot, ConsistentMessageBodies, Invariant,
    InvariantRegistry, InvariantResult, LiveRequiresConnection, PresenceRequiresSync,
    SystemSnapshot, UniqueMessageIds, Violation,
};
pub use scenario::Scenario;
pub use services::RecordingServices;
pub use sim_driver::{SimDriver, SimDriverError};
pub use sim_env::{SIM_EPOCH_MILLIS, SimEnv, SimInstant};
pub use sim_relay::{ReceivedFrame, SharedRelay, SimRelay, create_shared_relay};
