//! Chat message records.

use huddle_proto::{
    ChannelId, MessageId, UserId,
    payloads::{CommandResultPayload, MessagePayload},
};

/// Sender id used for locally synthesized notices.
pub const SYSTEM_SENDER: &str = "system";

/// What a stream entry represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Plain chat text
    Message,
    /// Locally synthesized notice (failures, status)
    System,
    /// Outcome of a slash command
    CommandResult,
    /// A member came online or went offline
    PresenceChange,
}

/// One entry in a channel's message stream. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    /// Unique within the channel
    pub id: MessageId,
    /// Owning channel
    pub channel_id: ChannelId,
    /// Entry kind
    pub kind: MessageKind,
    /// Author (or [`SYSTEM_SENDER`])
    pub sender_id: UserId,
    /// Author's display name
    pub sender_display: String,
    /// Rendered text
    pub body: String,
    /// Milliseconds since the Unix epoch
    pub created_at: i64,
    /// Structured result, for [`MessageKind::CommandResult`]
    pub command_result: Option<CommandResultPayload>,
}

impl ChatMessage {
    /// A plain message as relayed on the wire.
    pub fn from_payload(payload: MessagePayload) -> Self {
        Self {
            id: payload.id,
            channel_id: payload.channel_id,
            kind: MessageKind::Message,
            sender_id: payload.sender_id,
            sender_display: payload.sender_display,
            body: payload.body,
            created_at: payload.timestamp,
            command_result: None,
        }
    }

    /// A command result. The body is the result summary.
    pub fn from_command_result(result: CommandResultPayload) -> Self {
        Self {
            id: result.id.clone(),
            channel_id: result.channel_id.clone(),
            kind: MessageKind::CommandResult,
            sender_id: result.sender_id.clone(),
            sender_display: result.sender_display.clone(),
            body: result.summary.clone(),
            created_at: result.timestamp,
            command_result: Some(result),
        }
    }

    /// A locally synthesized notice.
    pub fn system(
        id: MessageId,
        channel_id: ChannelId,
        body: impl Into<String>,
        created_at: i64,
    ) -> Self {
        Self {
            id,
            channel_id,
            kind: MessageKind::System,
            sender_id: UserId::from(SYSTEM_SENDER),
            sender_display: SYSTEM_SENDER.to_owned(),
            body: body.into(),
            created_at,
            command_result: None,
        }
    }

    /// A presence notice for `user`.
    pub fn presence(
        id: MessageId,
        channel_id: ChannelId,
        user: UserId,
        display: Option<String>,
        online: bool,
        created_at: i64,
    ) -> Self {
        let display = display.unwrap_or_else(|| user.to_string());
        let body = if online {
            format!("{display} is online")
        } else {
            format!("{display} went offline")
        };
        Self {
            id,
            channel_id,
            kind: MessageKind::PresenceChange,
            sender_id: user,
            sender_display: display,
            body,
            created_at,
            command_result: None,
        }
    }
}
