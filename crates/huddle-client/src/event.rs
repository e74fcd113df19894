//! Client events and actions.

use std::collections::BTreeSet;

use huddle_core::{
    AckError, ChatMessage, ConnectionError, ConnectionState, JoinError, LeaveError,
    MembershipState, PresenceSync, SessionToken,
};
use huddle_proto::{
    AckId, AckReply, ChannelId, MessageId, UserId, WireMessage, payloads::CommandResultPayload,
};

use crate::error::ExecutionError;

/// What the transport reports back to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Handshake succeeded
    Opened,
    /// Handshake refused (bad or expired token)
    Rejected {
        /// Reason reported by the server or transport
        reason: String,
    },
    /// Connection closed or could not be established
    Closed {
        /// Close reason
        reason: String,
    },
    /// Text frame received
    Frame(String),
}

/// Events the caller feeds into the client.
///
/// The caller is responsible for:
/// - Forwarding transport events
/// - Driving time forward via ticks
/// - Forwarding application intents (join, send message, ...)
///
/// Generic over `I` (Instant type) to support both production
/// (`std::time::Instant`) and simulation (virtual clock) environments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent<I = std::time::Instant> {
    /// Transport state or data
    Transport(TransportEvent),

    /// Time tick for ack deadlines, reconnects and typing expiry.
    Tick {
        /// Current time from the environment.
        now: I,
    },

    /// Open the connection with the current session token
    Connect,

    /// Close the connection on purpose
    Disconnect,

    /// Join a project channel
    Join {
        /// Channel to join
        channel_id: ChannelId,
    },

    /// Leave a project channel
    Leave {
        /// Channel to leave
        channel_id: ChannelId,
    },

    /// Send a plain chat message
    SendMessage {
        /// Target channel
        channel_id: ChannelId,
        /// Message text
        text: String,
    },

    /// The user is editing a plain message
    Typing {
        /// Channel being typed in
        channel_id: ChannelId,
    },

    /// Confirm the command composed in a channel
    ConfirmCommand {
        /// Channel whose composer holds the command
        channel_id: ChannelId,
    },
}

/// Actions the client produces for the caller to execute.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientAction {
    /// Write a frame to the transport.
    Send(WireMessage),

    /// Open the transport, authenticating with `token`.
    OpenTransport {
        /// Credential for the handshake
        token: SessionToken,
        /// 0 for the first connect, otherwise the reconnect attempt
        attempt: u32,
    },

    /// Close the transport.
    CloseTransport,

    /// Connection state changed.
    ConnectionChanged(ConnectionState),

    /// Connection restored after an unexpected close.
    Reconnected,

    /// Connection failed and will not retry on its own.
    ConnectionFailed(ConnectionError),

    /// A join (or automatic rejoin) was acknowledged.
    ChannelJoined {
        /// Channel
        channel_id: ChannelId,
        /// True if this restored a stale membership
        rejoin: bool,
    },

    /// A join was refused or timed out.
    JoinFailed {
        /// Channel
        channel_id: ChannelId,
        /// Cause
        error: JoinError,
    },

    /// Membership ended.
    ChannelLeft {
        /// Channel
        channel_id: ChannelId,
    },

    /// A leave was refused or timed out.
    LeaveFailed {
        /// Channel
        channel_id: ChannelId,
        /// Cause
        error: LeaveError,
    },

    /// A new entry is at the end of a channel's stream.
    MessageAppended(ChatMessage),

    /// Online or typing sets of a channel changed.
    PresenceChanged {
        /// Channel
        channel_id: ChannelId,
    },

    /// An ack requested through `send_with_ack` settled.
    AckSettled {
        /// Correlation id
        ack_id: AckId,
        /// Reply or failure
        result: Result<AckReply, AckError>,
    },

    /// A command passed validation and was handed to the relay.
    CommandSent {
        /// Channel the command runs in
        channel_id: ChannelId,
        /// Id of the `chat:command` event
        command_id: MessageId,
    },

    /// A command finished, successfully or not.
    CommandCompleted {
        /// Channel the command ran in
        channel_id: ChannelId,
        /// Id of the `chat:command` event, as in [`ClientAction::CommandSent`]
        command_id: MessageId,
        /// Command name
        command: String,
        /// Result, or why it failed
        result: Result<CommandResultPayload, ExecutionError>,
    },
}

/// Read-only view of one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSnapshot {
    /// Channel
    pub channel_id: ChannelId,
    /// Membership state
    pub membership: MembershipState,
    /// Joined and connected
    pub live: bool,
    /// Presence reliability
    pub presence: PresenceSync,
    /// Online members
    pub online: BTreeSet<UserId>,
    /// Members typing
    pub typing: BTreeSet<UserId>,
    /// Entries in the stream
    pub messages: usize,
}
