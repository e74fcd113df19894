//! Typed view over event frames.
//!
//! Each variant maps to exactly one [`EventName`]; adding a variant forces
//! every match below to account for it.

use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::{
    envelope::{AckId, Envelope},
    errors::{ProtocolError, Result},
    event_name::EventName,
    ids::ChannelId,
    payloads::{
        CommandPayload, CommandResultPayload, MembershipPayload, MessagePayload, PresencePayload,
        TypingPayload,
    },
};

/// A decoded event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// `join:<resource>`
    Join {
        /// Resource kind (`project`)
        resource: String,
        /// Request body
        payload: MembershipPayload,
    },
    /// `leave:<resource>`
    Leave {
        /// Resource kind (`project`)
        resource: String,
        /// Request body
        payload: MembershipPayload,
    },
    /// `chat:message`
    Message(MessagePayload),
    /// `chat:command`
    Command(CommandPayload),
    /// `chat:command_result`
    CommandResult(CommandResultPayload),
    /// `presence:online`
    Online(PresencePayload),
    /// `presence:offline`
    Offline(PresencePayload),
    /// `presence:typing`
    Typing(TypingPayload),
}

impl Event {
    /// Wire name for this event.
    pub fn name(&self) -> EventName {
        match self {
            Self::Join { resource, .. } => EventName::Join(resource.clone()),
            Self::Leave { resource, .. } => EventName::Leave(resource.clone()),
            Self::Message(_) => EventName::ChatMessage,
            Self::Command(_) => EventName::ChatCommand,
            Self::CommandResult(_) => EventName::ChatCommandResult,
            Self::Online(_) => EventName::PresenceOnline,
            Self::Offline(_) => EventName::PresenceOffline,
            Self::Typing(_) => EventName::PresenceTyping,
        }
    }

    /// Channel the event concerns.
    pub fn channel_id(&self) -> &ChannelId {
        match self {
            Self::Join { payload, .. } | Self::Leave { payload, .. } => &payload.channel_id,
            Self::Message(p) => &p.channel_id,
            Self::Command(p) => &p.channel_id,
            Self::CommandResult(p) => &p.channel_id,
            Self::Online(p) | Self::Offline(p) => &p.channel_id,
            Self::Typing(p) => &p.channel_id,
        }
    }

    /// Wrap into an envelope, optionally requesting an acknowledgement.
    pub fn into_envelope(self, ack: Option<AckId>) -> Result<Envelope> {
        let event = self.name();
        let data = match self {
            Self::Join { payload, .. } | Self::Leave { payload, .. } => to_value(&payload)?,
            Self::Message(p) => to_value(&p)?,
            Self::Command(p) => to_value(&p)?,
            Self::CommandResult(p) => to_value(&p)?,
            Self::Online(p) | Self::Offline(p) => to_value(&p)?,
            Self::Typing(p) => to_value(&p)?,
        };
        Ok(Envelope { event, data, ack })
    }

    /// Decode the payload of an envelope according to its event name.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::InvalidPayload` if `data` does not match the event
    pub fn from_envelope(envelope: &Envelope) -> Result<Self> {
        let data = &envelope.data;
        let name = &envelope.event;
        Ok(match name {
            EventName::Join(resource) => {
                Self::Join { resource: resource.clone(), payload: from_value(name, data)? }
            },
            EventName::Leave(resource) => {
                Self::Leave { resource: resource.clone(), payload: from_value(name, data)? }
            },
            EventName::ChatMessage => Self::Message(from_value(name, data)?),
            EventName::ChatCommand => Self::Command(from_value(name, data)?),
            EventName::ChatCommandResult => Self::CommandResult(from_value(name, data)?),
            EventName::PresenceOnline => Self::Online(from_value(name, data)?),
            EventName::PresenceOffline => Self::Offline(from_value(name, data)?),
            EventName::PresenceTyping => Self::Typing(from_value(name, data)?),
        })
    }
}

fn to_value<T: Serialize>(payload: &T) -> Result<Value> {
    Ok(serde_json::to_value(payload)?)
}

fn from_value<T: DeserializeOwned>(name: &EventName, data: &Value) -> Result<T> {
    T::deserialize(data).map_err(|err| ProtocolError::InvalidPayload {
        event: name.to_string(),
        reason: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::ids::{MessageId, UserId};

    fn message() -> MessagePayload {
        MessagePayload {
            channel_id: ChannelId::from("p1"),
            id: MessageId::from("m1"),
            sender_id: UserId::from("alice"),
            sender_display: "Alice".to_owned(),
            body: "hi".to_owned(),
            timestamp: 42,
        }
    }

    #[test]
    fn envelope_preserves_event_and_payload() {
        let event = Event::Message(message());
        let envelope = event.clone().into_envelope(None).unwrap();

        assert_eq!(envelope.event, EventName::ChatMessage);
        assert_eq!(envelope.data["channelId"], json!("p1"));
        assert_eq!(Event::from_envelope(&envelope).unwrap(), event);
    }

    #[test]
    fn payload_mismatch_names_the_event() {
        let envelope =
            Envelope { event: EventName::PresenceOnline, data: json!({"body": "x"}), ack: None };

        let err = Event::from_envelope(&envelope).unwrap_err();
        assert!(
            matches!(&err, ProtocolError::InvalidPayload { event, .. } if event == "presence:online")
        );
    }

    #[test]
    fn channel_id_is_reachable_for_every_event() {
        let event = Event::Typing(TypingPayload {
            channel_id: ChannelId::from("p9"),
            user_id: UserId::from("bob"),
            timestamp: 0,
        });
        assert_eq!(event.channel_id().as_str(), "p9");
    }
}
