//! Observable application state types.
//!
//! These structures are the view model: the subset of client state needed
//! to render a channel.

use std::collections::BTreeSet;

use huddle_core::ChatMessage;
use huddle_proto::{ChannelId, UserId};

/// Marker for commands handled by the app itself, never sent.
pub const LOCAL_MARKER: char = ':';

/// Per-channel view state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelView {
    /// Channel id.
    pub channel_id: ChannelId,
    /// Stream entries in delivery order.
    pub messages: Vec<ChatMessage>,
    /// Online members.
    pub online: BTreeSet<UserId>,
    /// Members typing.
    pub typing: BTreeSet<UserId>,
    /// New entries since the channel was last active.
    pub unread: bool,
}

impl ChannelView {
    /// Empty view of `channel_id`.
    pub fn new(channel_id: ChannelId) -> Self {
        Self {
            channel_id,
            messages: Vec::new(),
            online: BTreeSet::new(),
            typing: BTreeSet::new(),
            unread: false,
        }
    }
}

/// App-level command typed after [`LOCAL_MARKER`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalCommand {
    /// `:join <channel>`
    Join(ChannelId),
    /// `:leave [channel]`
    Leave(Option<ChannelId>),
    /// `:connect`
    Connect,
    /// `:disconnect`
    Disconnect,
    /// `:help`
    Help,
    /// `:quit`
    Quit,
}

impl LocalCommand {
    /// Parse the text after the marker.
    pub fn parse(text: &str) -> Result<Self, String> {
        let mut words = text.split_whitespace();
        let command = words.next().unwrap_or_default();
        let argument = words.next().map(ChannelId::from);

        match (command, argument) {
            ("join", Some(channel)) => Ok(Self::Join(channel)),
            ("join", None) => Err("usage: :join <channel>".to_owned()),
            ("leave", channel) => Ok(Self::Leave(channel)),
            ("connect", None) => Ok(Self::Connect),
            ("disconnect", None) => Ok(Self::Disconnect),
            ("help", None) => Ok(Self::Help),
            ("quit" | "q", None) => Ok(Self::Quit),
            (other, _) => Err(format!("unknown command :{other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_local_commands() {
        assert_eq!(LocalCommand::parse("join p1"), Ok(LocalCommand::Join(ChannelId::from("p1"))));
        assert_eq!(LocalCommand::parse("leave"), Ok(LocalCommand::Leave(None)));
        assert_eq!(LocalCommand::parse("q"), Ok(LocalCommand::Quit));
        assert!(LocalCommand::parse("join").is_err());
        assert!(LocalCommand::parse("dance").is_err());
    }
}
