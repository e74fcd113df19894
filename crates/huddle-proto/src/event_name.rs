//! Event names as they appear on the wire.
//!
//! Names are `category:action` strings. Membership events carry the resource
//! kind in the action slot (`join:project`, `leave:project`).

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::errors::ProtocolError;

/// Resource kind for project channel membership events.
pub const PROJECT_RESOURCE: &str = "project";

/// Every event the protocol knows about.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum EventName {
    /// `join:<resource>`
    Join(String),
    /// `leave:<resource>`
    Leave(String),
    /// `chat:message`
    ChatMessage,
    /// `chat:command`
    ChatCommand,
    /// `chat:command_result`
    ChatCommandResult,
    /// `presence:online`
    PresenceOnline,
    /// `presence:offline`
    PresenceOffline,
    /// `presence:typing`
    PresenceTyping,
}

impl EventName {
    /// `join:project`
    pub fn join_project() -> Self {
        Self::Join(PROJECT_RESOURCE.to_owned())
    }

    /// `leave:project`
    pub fn leave_project() -> Self {
        Self::Leave(PROJECT_RESOURCE.to_owned())
    }

    /// Whether the server answers this event with an acknowledgement.
    pub fn expects_ack(&self) -> bool {
        matches!(self, Self::Join(_) | Self::Leave(_) | Self::ChatCommand)
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Join(resource) => write!(f, "join:{resource}"),
            Self::Leave(resource) => write!(f, "leave:{resource}"),
            Self::ChatMessage => f.write_str("chat:message"),
            Self::ChatCommand => f.write_str("chat:command"),
            Self::ChatCommandResult => f.write_str("chat:command_result"),
            Self::PresenceOnline => f.write_str("presence:online"),
            Self::PresenceOffline => f.write_str("presence:offline"),
            Self::PresenceTyping => f.write_str("presence:typing"),
        }
    }
}

impl FromStr for EventName {
    type Err = ProtocolError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        let unknown = || ProtocolError::UnknownEvent(name.to_owned());
        let (category, action) = name.split_once(':').ok_or_else(unknown)?;

        match (category, action) {
            ("join", resource) if !resource.is_empty() => Ok(Self::Join(resource.to_owned())),
            ("leave", resource) if !resource.is_empty() => Ok(Self::Leave(resource.to_owned())),
            ("chat", "message") => Ok(Self::ChatMessage),
            ("chat", "command") => Ok(Self::ChatCommand),
            ("chat", "command_result") => Ok(Self::ChatCommandResult),
            ("presence", "online") => Ok(Self::PresenceOnline),
            ("presence", "offline") => Ok(Self::PresenceOffline),
            ("presence", "typing") => Ok(Self::PresenceTyping),
            _ => Err(unknown()),
        }
    }
}

impl TryFrom<String> for EventName {
    type Error = ProtocolError;

    fn try_from(name: String) -> Result<Self, Self::Error> {
        name.parse()
    }
}

impl From<EventName> for String {
    fn from(name: EventName) -> Self {
        name.to_string()
    }
}
