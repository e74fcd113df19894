//! Async request/response facade over a running [`crate::Runtime`].
//!
//! A [`SessionHandle`] turns the client's action-driven operations into
//! awaitable calls: `join` resolves when the join is acknowledged,
//! `execute_command` when the command result is known. Requests travel to
//! the runtime over a channel and are answered through oneshot replies, so
//! handles are cheap to clone and safe to use from other tasks.

use std::time::Duration;

use huddle_client::{ChannelSnapshot, ClientError};
use huddle_core::ChatMessage;
use huddle_proto::{AckReply, ChannelId, Event, payloads::CommandResultPayload};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// Errors from a session call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The runtime stopped before answering
    #[error("session closed")]
    Closed,

    /// The client refused or failed the operation
    #[error(transparent)]
    Client(#[from] ClientError),
}

pub(crate) type Reply<T> = oneshot::Sender<Result<T, SessionError>>;

/// Work submitted to the runtime.
#[derive(Debug)]
pub(crate) enum Request {
    Connect { reply: Reply<()> },
    Disconnect { reply: Reply<()> },
    Join { channel_id: ChannelId, reply: Reply<()> },
    Leave { channel_id: ChannelId, reply: Reply<()> },
    SendWithAck { event: Event, timeout: Option<Duration>, reply: Reply<AckReply> },
    SendMessage { channel_id: ChannelId, text: String, reply: Reply<()> },
    ExecuteCommand { channel_id: ChannelId, input: String, reply: Reply<CommandResultPayload> },
    Snapshot { channel_id: ChannelId, reply: oneshot::Sender<Option<ChannelSnapshot>> },
    Messages { channel_id: ChannelId, reply: oneshot::Sender<Vec<ChatMessage>> },
    Shutdown,
}

/// Handle for issuing requests to a running runtime.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    requests: mpsc::Sender<Request>,
}

impl SessionHandle {
    pub(crate) fn new(requests: mpsc::Sender<Request>) -> Self {
        Self { requests }
    }

    /// Connect and wait until the connection is up.
    ///
    /// # Errors
    ///
    /// - `ConnectionError::MissingToken` if no token is available
    /// - `ConnectionError::HandshakeRejected` if the relay refused the token
    pub async fn connect(&self) -> Result<(), SessionError> {
        self.call(|reply| Request::Connect { reply }).await
    }

    /// Close the connection.
    pub async fn disconnect(&self) -> Result<(), SessionError> {
        self.call(|reply| Request::Disconnect { reply }).await
    }

    /// Join `channel_id` and wait for the acknowledgement.
    ///
    /// Resolves at once if already joined.
    pub async fn join(&self, channel_id: ChannelId) -> Result<(), SessionError> {
        self.call(|reply| Request::Join { channel_id, reply }).await
    }

    /// Leave `channel_id` and wait for the acknowledgement.
    pub async fn leave(&self, channel_id: ChannelId) -> Result<(), SessionError> {
        self.call(|reply| Request::Leave { channel_id, reply }).await
    }

    /// Send `event` and wait for its acknowledgement.
    ///
    /// `timeout` overrides the connection's default ack timeout.
    pub async fn send_with_ack(
        &self,
        event: Event,
        timeout: Option<Duration>,
    ) -> Result<AckReply, SessionError> {
        self.call(|reply| Request::SendWithAck { event, timeout, reply }).await
    }

    /// Send a plain message.
    pub async fn submit_plain_message(
        &self,
        channel_id: ChannelId,
        text: impl Into<String>,
    ) -> Result<(), SessionError> {
        let text = text.into();
        self.call(|reply| Request::SendMessage { channel_id, text, reply }).await
    }

    /// Parse `input` as a slash command in `channel_id`, execute it and wait
    /// for the result.
    pub async fn execute_command(
        &self,
        channel_id: ChannelId,
        input: impl Into<String>,
    ) -> Result<CommandResultPayload, SessionError> {
        let input = input.into();
        self.call(|reply| Request::ExecuteCommand { channel_id, input, reply }).await
    }

    /// Snapshot of `channel_id`, if it has a membership.
    pub async fn snapshot(&self, channel_id: ChannelId) -> Result<Option<ChannelSnapshot>, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.submit(Request::Snapshot { channel_id, reply }).await?;
        rx.await.map_err(|_| SessionError::Closed)
    }

    /// Messages of `channel_id` in delivery order.
    pub async fn messages(&self, channel_id: ChannelId) -> Result<Vec<ChatMessage>, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.submit(Request::Messages { channel_id, reply }).await?;
        rx.await.map_err(|_| SessionError::Closed)
    }

    /// Ask the runtime to stop.
    pub async fn shutdown(&self) -> Result<(), SessionError> {
        self.submit(Request::Shutdown).await
    }

    async fn call<T>(
        &self,
        request: impl FnOnce(Reply<T>) -> Request,
    ) -> Result<T, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.submit(request(reply)).await?;
        rx.await.map_err(|_| SessionError::Closed)?
    }

    async fn submit(&self, request: Request) -> Result<(), SessionError> {
        self.requests.send(request).await.map_err(|_| SessionError::Closed)
    }
}
