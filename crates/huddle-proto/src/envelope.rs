//! Frame envelopes.
//!
//! ```text
//! event frame: {"event": "chat:message", "data": {...}, "ack": 7}
//! ack frame:   {"ack": 7, "data": {"ok": true, "online": ["alice"]}}
//! ```
//!
//! `ack` on an event frame is present only when the sender wants a decision.
//! Frames are told apart by the presence of the `event` key.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    errors::{ProtocolError, Result},
    event_name::EventName,
    ids::{MessageId, UserId},
};

/// Correlates a request with its acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AckId(pub u64);

impl fmt::Display for AckId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// An event frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Event name
    pub event: EventName,
    /// Event payload; shape depends on `event`
    #[serde(default)]
    pub data: Value,
    /// Acknowledgement id when the sender expects a decision
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ack: Option<AckId>,
}

/// Server decision for an acknowledged request.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AckReply {
    /// Whether the request was accepted
    pub ok: bool,
    /// Rejection reason
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Members currently online (join acknowledgements only)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub online: Vec<UserId>,
    /// Server-assigned result message id (command acknowledgements only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_id: Option<MessageId>,
}

impl AckReply {
    /// Plain acceptance.
    pub fn accepted() -> Self {
        Self { ok: true, ..Self::default() }
    }

    /// Rejection with a reason.
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self { ok: false, reason: Some(reason.into()), ..Self::default() }
    }

    /// Attach the online member list.
    #[must_use]
    pub fn with_online(mut self, online: impl IntoIterator<Item = UserId>) -> Self {
        self.online = online.into_iter().collect();
        self
    }

    /// Attach a server-assigned result id.
    #[must_use]
    pub fn with_result_id(mut self, id: MessageId) -> Self {
        self.result_id = Some(id);
        self
    }
}

/// An acknowledgement frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AckFrame {
    /// Id of the request being answered
    pub ack: AckId,
    /// Decision
    pub data: AckReply,
}

/// Any frame that can cross the wire.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum WireMessage {
    /// Event frame
    Event(Envelope),
    /// Acknowledgement frame
    Ack(AckFrame),
}

impl WireMessage {
    /// Serialize to frame text.
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse frame text.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::Malformed` if the text is not a JSON object of either
    ///   frame shape
    /// - `ProtocolError::UnknownEvent` if the event name is not recognised
    /// - `ProtocolError::MissingField` if neither `event` nor `ack` is present
    pub fn decode(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)?;
        let Value::Object(fields) = &value else {
            return Err(ProtocolError::Malformed("frame is not a JSON object".to_owned()));
        };

        if let Some(name) = fields.get("event") {
            // Surface unknown names distinctly from shape errors.
            if let Value::String(name) = name {
                name.parse::<EventName>()?;
            }
            return Ok(Self::Event(serde_json::from_value(value)?));
        }

        if fields.contains_key("ack") {
            return Ok(Self::Ack(serde_json::from_value(value)?));
        }

        Err(ProtocolError::MissingField("event"))
    }
}

impl From<Envelope> for WireMessage {
    fn from(envelope: Envelope) -> Self {
        Self::Event(envelope)
    }
}

impl From<AckFrame> for WireMessage {
    fn from(frame: AckFrame) -> Self {
        Self::Ack(frame)
    }
}
