//! Protocol error types.

use thiserror::Error;

/// Result alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors raised while encoding or decoding frames.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Frame text is not valid JSON or does not match the expected shape
    #[error("malformed frame: {0}")]
    Malformed(String),

    /// Event name is not part of the protocol
    #[error("unknown event name: {0:?}")]
    UnknownEvent(String),

    /// Frame is missing a field every frame must carry
    #[error("frame is missing required field `{0}`")]
    MissingField(&'static str),

    /// Payload does not match the shape required by its event
    #[error("invalid payload for {event}: {reason}")]
    InvalidPayload {
        /// Wire name of the event whose payload failed to decode
        event: String,
        /// Decoder message
        reason: String,
    },
}

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        Self::Malformed(err.to_string())
    }
}
