//! Typed payloads for each event.
//!
//! All payloads use camelCase field names and carry the channel they concern
//! plus a wall-clock timestamp in milliseconds since the Unix epoch.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ids::{ChannelId, MessageId, UserId};

/// `join:project` / `leave:project` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MembershipPayload {
    /// Channel being joined or left
    pub channel_id: ChannelId,
    /// Requesting member
    pub user_id: UserId,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
}

/// `chat:message`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePayload {
    /// Destination channel
    pub channel_id: ChannelId,
    /// Client-generated message id, echoed back by the relay
    pub id: MessageId,
    /// Author
    pub sender_id: UserId,
    /// Author's display name at send time
    pub sender_display: String,
    /// Message text
    pub body: String,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
}

/// `chat:command`: a validated command invocation.
///
/// Parameter values are rendered to their canonical text form (member ids for
/// mentions, `YYYY-MM-DD` for dates).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandPayload {
    /// Channel the command was issued in
    pub channel_id: ChannelId,
    /// Invocation id; the result message reuses it unless the server assigns one
    pub id: MessageId,
    /// Command name without the marker, e.g. `create-task`
    pub command: String,
    /// Bound parameters keyed by parameter name
    pub params: BTreeMap<String, String>,
    /// Issuer
    pub sender_id: UserId,
    /// Issuer's display name
    pub sender_display: String,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
}

/// `chat:command_result`: the structured outcome rendered in the stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResultPayload {
    /// Channel the command was issued in
    pub channel_id: ChannelId,
    /// Result message id
    pub id: MessageId,
    /// Command name without the marker
    pub command: String,
    /// Bound parameters keyed by parameter name
    pub params: BTreeMap<String, String>,
    /// Human-readable outcome
    pub summary: String,
    /// Issuer
    pub sender_id: UserId,
    /// Issuer's display name
    pub sender_display: String,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
}

/// `presence:online` / `presence:offline`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresencePayload {
    /// Channel whose presence changed
    pub channel_id: ChannelId,
    /// Member that came online or went offline
    pub user_id: UserId,
    /// Display name, when the server knows it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
}

/// `presence:typing`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingPayload {
    /// Channel being typed in
    pub channel_id: ChannelId,
    /// Member who is typing
    pub user_id: UserId,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presence_uses_camel_case_and_omits_missing_display() {
        let payload = PresencePayload {
            channel_id: ChannelId::from("p1"),
            user_id: UserId::from("alice"),
            display: None,
            timestamp: 1_700_000_000_000,
        };

        insta::assert_json_snapshot!(payload, @r#"
        {
          "channelId": "p1",
          "userId": "alice",
          "timestamp": 1700000000000
        }
        "#);
    }

    #[test]
    fn command_params_are_ordered_by_name() {
        let payload = CommandPayload {
            channel_id: ChannelId::from("p1"),
            id: MessageId::from("m1"),
            command: "create-task".to_owned(),
            params: BTreeMap::from([
                ("title".to_owned(), "Fix bug".to_owned()),
                ("assignee".to_owned(), "alice".to_owned()),
            ]),
            sender_id: UserId::from("bob"),
            sender_display: "Bob".to_owned(),
            timestamp: 0,
        };

        let json = serde_json::to_string(&payload).unwrap();
        let assignee = json.find("assignee").unwrap();
        let title = json.find("title").unwrap();
        assert!(assignee < title);
        assert!(json.contains("\"senderDisplay\":\"Bob\""));
    }
}
