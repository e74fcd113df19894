//! Wire protocol for Huddle project channels.
//!
//! Every frame on the wire is a single JSON object. Client-originated and
//! server-pushed events share one envelope shape, [`Envelope`], naming the
//! event and carrying its payload. Requests that expect a server decision
//! carry an [`AckId`]; the server answers with an [`AckFrame`] echoing it.
//!
//! # Responsibilities
//!
//! - Event naming (`join:project`, `chat:message`, `presence:online`, ...)
//! - Typed payloads for each event ([`payloads`])
//! - Envelope encode/decode and classification ([`WireMessage`])
//!
//! This crate performs no I/O. Connection state, retries and acknowledgement
//! timeouts live in `huddle-core`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod envelope;
mod errors;
mod event;
mod event_name;
mod ids;
pub mod payloads;

pub use envelope::{AckFrame, AckId, AckReply, Envelope, WireMessage};
pub use errors::{ProtocolError, Result};
pub use event::Event;
pub use event_name::{EventName, PROJECT_RESOURCE};
pub use ids::{ChannelId, MessageId, UserId};
