//! Error types for the core state machines.
//!
//! Each operation family gets its own enum so callers can match on exactly
//! the failures that operation can produce.

use std::time::Duration;

use huddle_proto::{AckId, ChannelId, EventName, ProtocolError};
use thiserror::Error;

use crate::connection::ConnectionState;

/// Errors from the connection manager.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// No session token was available to authenticate with
    #[error("no session token available")]
    MissingToken,

    /// Server refused the handshake; the caller must re-authenticate
    #[error("handshake rejected: {reason}")]
    HandshakeRejected {
        /// Rejection reason reported by the transport
        reason: String,
    },

    /// Operation requires an open connection
    #[error("not connected (state: {state:?})")]
    NotConnected {
        /// State at the time of the call
        state: ConnectionState,
    },

    /// Automatic reconnection gave up
    #[error("reconnect failed after {attempts} attempts")]
    ReconnectExhausted {
        /// Attempts made before giving up
        attempts: u32,
    },

    /// Underlying transport failure
    #[error("transport error: {0}")]
    Transport(String),

    /// Frame could not be encoded or decoded
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Acknowledgement deadline cannot be represented on the clock
    #[error("ack timeout {timeout:?} is out of range")]
    TimeoutOutOfRange {
        /// Requested wait
        timeout: Duration,
    },
}

impl ConnectionError {
    /// Returns true if retrying later may succeed without user action.
    ///
    /// A rejected handshake or a missing token needs new credentials, so
    /// neither is transient.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::NotConnected { .. } | Self::Transport(_))
    }
}

impl From<ProtocolError> for ConnectionError {
    fn from(err: ProtocolError) -> Self {
        Self::Protocol(err.to_string())
    }
}

/// An acknowledged request got no answer within its deadline.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{event} {ack_id} timed out after {waited:?}")]
pub struct TimeoutError {
    /// Event that was waiting
    pub event: EventName,
    /// Correlation id of the request
    pub ack_id: AckId,
    /// Configured wait
    pub waited: Duration,
}

/// Failure of an acknowledged request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AckError {
    /// No acknowledgement arrived in time
    #[error(transparent)]
    Timeout(#[from] TimeoutError),

    /// Server answered `ok: false`
    #[error("rejected: {reason}")]
    Rejected {
        /// Reason given by the server
        reason: String,
    },
}

/// Failure to join a channel.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JoinError {
    /// Join request could not be sent
    #[error("cannot join {channel}: {source}")]
    Connection {
        /// Target channel
        channel: ChannelId,
        /// Underlying connection failure
        source: ConnectionError,
    },

    /// Server did not answer in time
    #[error("join {channel} timed out")]
    Timeout {
        /// Target channel
        channel: ChannelId,
    },

    /// Server refused the join
    #[error("join {channel} rejected: {reason}")]
    Rejected {
        /// Target channel
        channel: ChannelId,
        /// Reason given by the server
        reason: String,
    },

    /// A leave for this channel is still waiting on the server
    #[error("leave of {channel} still in progress")]
    LeaveInProgress {
        /// Target channel
        channel: ChannelId,
    },
}

impl JoinError {
    pub(crate) fn from_ack(channel: ChannelId, err: AckError) -> Self {
        match err {
            AckError::Timeout(_) => Self::Timeout { channel },
            AckError::Rejected { reason } => Self::Rejected { channel, reason },
        }
    }
}

/// Failure to leave a channel.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LeaveError {
    /// Server did not answer in time
    #[error("leave {channel} timed out")]
    Timeout {
        /// Target channel
        channel: ChannelId,
    },

    /// Server refused the leave
    #[error("leave {channel} rejected: {reason}")]
    Rejected {
        /// Target channel
        channel: ChannelId,
        /// Reason given by the server
        reason: String,
    },

    /// A join for this channel is still waiting on the server
    #[error("join of {channel} still in progress")]
    JoinInProgress {
        /// Target channel
        channel: ChannelId,
    },

    /// Leave request could not be sent
    #[error("cannot leave {channel}: {source}")]
    Connection {
        /// Target channel
        channel: ChannelId,
        /// Underlying connection failure
        source: ConnectionError,
    },
}

impl LeaveError {
    pub(crate) fn from_ack(channel: ChannelId, err: AckError) -> Self {
        match err {
            AckError::Timeout(_) => Self::Timeout { channel },
            AckError::Rejected { reason } => Self::Rejected { channel, reason },
        }
    }
}
