//! Application input events.
//!
//! This module defines [`AppEvent`], the inputs that drive the [`crate::App`]
//! state machine.
//!
//! Events originate from two sources:
//! - User interactions (keys) and system ticks.
//! - Protocol notifications translated from the client by the bridge.

use std::collections::BTreeSet;

use huddle_commands::CommandProjection;
use huddle_core::{ChatMessage, ConnectionState};
use huddle_proto::{ChannelId, UserId};

use crate::KeyInput;

/// Events processed by the App state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent {
    /// Keyboard input.
    Key(KeyInput),

    /// Periodic tick.
    Tick,

    /// Connection state changed.
    ConnectionChanged(ConnectionState),

    /// Connection restored after an unexpected close.
    Reconnected,

    /// Connection failed and will not retry on its own.
    ConnectionFailed {
        /// Failure description.
        message: String,
    },

    /// Joined (or rejoined) a channel.
    ChannelJoined {
        /// Channel.
        channel_id: ChannelId,
    },

    /// Left a channel.
    ChannelLeft {
        /// Channel.
        channel_id: ChannelId,
    },

    /// New stream entry.
    MessageAppended(ChatMessage),

    /// Presence of a channel changed.
    PresenceChanged {
        /// Channel.
        channel_id: ChannelId,
        /// Online members.
        online: BTreeSet<UserId>,
        /// Members typing.
        typing: BTreeSet<UserId>,
    },

    /// Parser state for the composer.
    CommandProjected(CommandProjection),

    /// A command finished.
    CommandCompleted {
        /// Channel the command ran in.
        channel_id: ChannelId,
        /// Command name.
        command: String,
        /// Failure description, `None` on success.
        error: Option<String>,
    },

    /// Error occurred.
    Error {
        /// Error description.
        message: String,
    },
}
