//! Core state machines for Huddle project channels.
//!
//! Everything here is sans-IO: methods take the current time as a parameter
//! and return actions for a driver to execute. No method blocks, sleeps or
//! touches a socket, so the same code runs under a simulated clock in tests
//! and under the system clock in production.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐   acks / state   ┌────────────────────┐
//! │  ConnectionManager   │─────────────────>│ ChannelMemberships │
//! └──────────────────────┘                  └────────────────────┘
//!            │ events                                  │ join acks
//!            ↓                                         ↓
//! ┌──────────────────────┐                  ┌────────────────────┐
//! │    MessageStream     │                  │  PresenceTracker   │
//! └──────────────────────┘                  └────────────────────┘
//! ```
//!
//! The client crate owns one of each and routes between them.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod connection;
pub mod env;
pub mod error;
pub mod membership;
pub mod message;
pub mod presence;
pub mod stream;

pub use connection::{
    Backoff, ConnectionAction, ConnectionConfig, ConnectionManager, ConnectionState, Inbound,
    ReconnectPolicy, SessionToken,
};
pub use env::{Environment, MonotonicInstant};
pub use error::{AckError, ConnectionError, JoinError, LeaveError, TimeoutError};
pub use membership::{ChannelMembership, ChannelMemberships, Leave, MembershipEvent, MembershipState};
pub use message::{ChatMessage, MessageKind};
pub use presence::{PresenceChange, PresenceConfig, PresenceSync, PresenceTracker};
pub use stream::MessageStream;
