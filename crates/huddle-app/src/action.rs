//! Application side-effects and intents.
//!
//! This module defines the [`AppAction`] enum, which represents instructions
//! produced by the [`crate::App`] state machine for the runtime to execute.

use huddle_proto::ChannelId;

/// Actions produced by the App state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppAction {
    /// Render the UI.
    Render,

    /// Quit the application.
    Quit,

    /// Connect to the relay.
    Connect,

    /// Close the connection.
    Disconnect,

    /// Join a channel.
    JoinChannel {
        /// Channel to join.
        channel_id: ChannelId,
    },

    /// Leave a channel.
    LeaveChannel {
        /// Channel to leave.
        channel_id: ChannelId,
    },

    /// Send a plain message.
    SendMessage {
        /// Target channel.
        channel_id: ChannelId,
        /// Message text.
        text: String,
    },

    /// The user is typing a plain message.
    Typing {
        /// Channel being typed in.
        channel_id: ChannelId,
    },

    /// Composer text starting with the command marker changed.
    ComposeCommand {
        /// Channel of the composer.
        channel_id: ChannelId,
        /// Full composer text.
        input: String,
    },

    /// Execute the ready command.
    ConfirmCommand {
        /// Channel of the composer.
        channel_id: ChannelId,
    },

    /// Abandon the command being composed.
    CancelCommand {
        /// Channel of the composer.
        channel_id: ChannelId,
    },
}
