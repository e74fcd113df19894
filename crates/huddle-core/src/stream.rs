//! Per-channel message buffers.
//!
//! The stream is the single owner of every channel's history. Entries are
//! appended in arrival order and de-duplicated by id, so an optimistic local
//! append and the relay's echo of the same message produce one entry.

use std::collections::{HashMap, HashSet};

use huddle_proto::{ChannelId, MessageId};

use crate::message::ChatMessage;

#[derive(Debug, Default)]
struct ChannelLog {
    messages: Vec<ChatMessage>,
    ids: HashSet<MessageId>,
}

/// Ordered, de-duplicated message history for every open channel.
#[derive(Debug, Default)]
pub struct MessageStream {
    channels: HashMap<ChannelId, ChannelLog>,
}

impl MessageStream {
    /// Empty stream.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `message` to its channel's buffer.
    ///
    /// Returns false, leaving the buffer untouched, if a message with the same
    /// id is already present.
    pub fn append(&mut self, message: ChatMessage) -> bool {
        let log = self.channels.entry(message.channel_id.clone()).or_default();
        if !log.ids.insert(message.id.clone()) {
            tracing::trace!(id = %message.id, channel = %message.channel_id, "duplicate dropped");
            return false;
        }
        log.messages.push(message);
        true
    }

    /// Messages for `channel` in arrival order. Empty if none.
    pub fn messages(&self, channel: &ChannelId) -> &[ChatMessage] {
        self.channels.get(channel).map(|log| log.messages.as_slice()).unwrap_or_default()
    }

    /// Whether `channel` already holds a message with `id`.
    pub fn contains(&self, channel: &ChannelId, id: &MessageId) -> bool {
        self.channels.get(channel).is_some_and(|log| log.ids.contains(id))
    }

    /// Drop the buffer for `channel`, returning how many messages it held.
    pub fn close(&mut self, channel: &ChannelId) -> usize {
        self.channels.remove(channel).map_or(0, |log| log.messages.len())
    }
}
