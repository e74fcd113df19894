//! Client
//!
//! Action-based client for Huddle project channels. Owns the connection
//! manager, channel memberships, presence, message stream, per-channel
//! command parsers and the command dispatcher, and routes between them.
//!
//! # Architecture
//!
//! The client follows the same sans-IO, action-based pattern as
//! [`huddle_core`]. Transport and clock events arrive through
//! [`Client::handle`]; user intents are methods (`join`, `submit_plain_message`,
//! `confirm_command`, ...). Both return [`ClientAction`]s for the caller to
//! execute.
//!
//! # Components
//!
//! - [`Client`]: top-level state machine
//! - [`Dispatcher`]: validated command execution over a [`CommandRelay`]
//! - [`Collaborators`]: task, milestone, delegation, member and token services
//!
//! # Transport (optional)
//!
//! With the `transport` feature enabled, this crate also provides a WebSocket
//! transport ([`transport::connect`]) and [`SystemEnv`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod client;
mod collaborators;
mod config;
mod dispatcher;
mod error;
mod event;
mod relay;

#[cfg(feature = "transport")]
mod system_env;
#[cfg(feature = "transport")]
pub mod transport;

pub use client::Client;
pub use collaborators::{
    CollaboratorError, Collaborators, Delegation, DelegationService, MilestoneRef,
    MilestoneService, NewMilestone, NewTask, Priority, SessionTokenSource, TaskRef, TaskService,
};
pub use config::{ClientConfig, DEFAULT_TYPING_INTERVAL, Identity, RelayMode};
pub use dispatcher::{CommandStamp, Dispatch, Dispatcher, Settled, summarize};
pub use error::{ClientError, ExecutionError};
pub use event::{ChannelSnapshot, ClientAction, ClientEvent, TransportEvent};
pub use huddle_commands::{CommandProjection, MemberDirectory, MemberRef};
pub use huddle_core::{
    ChatMessage, ConnectionState, Environment, MessageKind, SessionToken,
};
pub use relay::{CommandRelay, LocalRelay, RelaySubmit, RemoteRelay};
#[cfg(feature = "transport")]
pub use system_env::SystemEnv;
