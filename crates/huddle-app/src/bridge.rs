//! Protocol-to-Application translation layer.
//!
//! The [`Bridge`] wraps the [`huddle_client::Client`] and adapts it to the
//! application lifecycle.
//!
//! # Responsibilities
//!
//! - Converts [`crate::AppAction`] into client operations.
//! - Accumulates outgoing encoded frames and transport requests for the
//!   driver to execute in the next I/O cycle.
//! - Interprets client actions and converts them back into
//!   [`crate::AppEvent`]s to update the UI, and into [`Settlement`]s that
//!   complete outstanding session requests.
//! - Manages time ticks generically to support both real-time execution and
//!   deterministic simulation.

use huddle_client::{
    Client, ClientAction, ClientConfig, ClientError, ClientEvent, Collaborators, ExecutionError,
    TransportEvent,
};
use huddle_commands::CommandProjection;
use huddle_core::{
    AckError, ConnectionError, ConnectionState, Environment, JoinError, LeaveError, SessionToken,
};
use huddle_proto::{AckId, AckReply, ChannelId, MessageId, payloads::CommandResultPayload};

use crate::{AppAction, AppEvent};

/// Transport work the driver must perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportRequest {
    /// Open the transport with `token`
    Open {
        /// Handshake credential
        token: SessionToken,
        /// 0 for the first connect, otherwise the reconnect attempt
        attempt: u32,
    },
    /// Close the transport
    Close,
}

/// Completion of a request that a session caller may be waiting on.
#[derive(Debug, Clone, PartialEq)]
pub enum Settlement {
    /// Connection came up, or failed for good
    Connected(Result<(), ConnectionError>),
    /// A join completed
    Joined {
        /// Channel
        channel_id: ChannelId,
        /// Outcome
        result: Result<(), JoinError>,
    },
    /// A leave completed
    Left {
        /// Channel
        channel_id: ChannelId,
        /// Outcome
        result: Result<(), LeaveError>,
    },
    /// A raw acknowledged send settled
    Ack {
        /// Correlation id
        ack_id: AckId,
        /// Outcome
        result: Result<AckReply, AckError>,
    },
    /// A command finished
    Command {
        /// Channel
        channel_id: ChannelId,
        /// Id of the command event
        command_id: MessageId,
        /// Outcome
        result: Result<CommandResultPayload, ExecutionError>,
    },
}

/// Bridge between App and Client protocol logic.
///
/// Generic over Environment to support both production and simulation.
/// The Instant type is determined by the Environment's associated type.
pub struct Bridge<E: Environment> {
    client: Client<E>,
    outgoing: Vec<String>,
    transport_requests: Vec<TransportRequest>,
    settlements: Vec<Settlement>,
}

impl<E: Environment> Bridge<E> {
    /// Create a new Bridge around a fresh client.
    pub fn new(env: E, config: ClientConfig, collaborators: Collaborators) -> Self {
        Self {
            client: Client::new(env, config, collaborators),
            outgoing: Vec::new(),
            transport_requests: Vec::new(),
            settlements: Vec::new(),
        }
    }

    /// Wrapped client.
    pub fn client(&self) -> &Client<E> {
        &self.client
    }

    /// Wrapped client, for operations the App does not issue.
    ///
    /// Results must be passed back through [`Bridge::absorb`].
    pub fn client_mut(&mut self) -> &mut Client<E> {
        &mut self.client
    }

    /// Process an App action and return resulting App events.
    pub fn process_app_action(&mut self, action: AppAction) -> Vec<AppEvent> {
        match action {
            AppAction::Connect => {
                let result = self.client.connect();
                self.absorb(result)
            },
            AppAction::Disconnect => {
                let actions = self.client.disconnect();
                self.absorb(Ok(actions))
            },
            AppAction::JoinChannel { channel_id } => {
                let result = self.client.join(&channel_id);
                self.absorb(result)
            },
            AppAction::LeaveChannel { channel_id } => {
                let result = self.client.leave(&channel_id);
                self.absorb(result)
            },
            AppAction::SendMessage { channel_id, text } => {
                let result = self.client.submit_plain_message(&channel_id, &text);
                self.absorb(result)
            },
            AppAction::Typing { channel_id } => {
                let result = self.client.notify_typing(&channel_id);
                self.absorb(result)
            },
            AppAction::ComposeCommand { channel_id, input } => {
                vec![AppEvent::CommandProjected(self.client.begin_command(&channel_id, &input))]
            },
            AppAction::ConfirmCommand { channel_id } => {
                let result = self.client.confirm_command(&channel_id);
                self.absorb(result)
            },
            AppAction::CancelCommand { channel_id } => {
                self.client.cancel_command(&channel_id);
                vec![AppEvent::CommandProjected(CommandProjection::idle())]
            },
            AppAction::Render | AppAction::Quit => vec![],
        }
    }

    /// Handle an event from the transport.
    pub fn handle_transport(&mut self, event: TransportEvent) -> Vec<AppEvent> {
        let result = self.client.handle(ClientEvent::Transport(event));
        self.absorb(result)
    }

    /// Process a time tick.
    pub fn handle_tick(&mut self, now: E::Instant) -> Vec<AppEvent> {
        let result = self.client.handle(ClientEvent::Tick { now });
        self.absorb(result)
    }

    /// Take pending outgoing frames.
    pub fn take_outgoing(&mut self) -> Vec<String> {
        std::mem::take(&mut self.outgoing)
    }

    /// Take pending transport requests.
    pub fn take_transport_requests(&mut self) -> Vec<TransportRequest> {
        std::mem::take(&mut self.transport_requests)
    }

    /// Take completions produced since the last call.
    pub fn take_settlements(&mut self) -> Vec<Settlement> {
        std::mem::take(&mut self.settlements)
    }

    /// Translate a client result into App events, queuing frames, transport
    /// requests and settlements on the way.
    pub fn absorb(&mut self, result: Result<Vec<ClientAction>, ClientError>) -> Vec<AppEvent> {
        match result {
            Ok(actions) => self.process_client_actions(actions),
            Err(e) => vec![AppEvent::Error { message: e.to_string() }],
        }
    }

    fn process_client_actions(&mut self, actions: Vec<ClientAction>) -> Vec<AppEvent> {
        let mut events = Vec::new();

        for action in actions {
            match action {
                ClientAction::Send(message) => match message.encode() {
                    Ok(frame) => self.outgoing.push(frame),
                    Err(e) => tracing::warn!(error = %e, "failed to encode outgoing frame"),
                },
                ClientAction::OpenTransport { token, attempt } => {
                    self.transport_requests.push(TransportRequest::Open { token, attempt });
                },
                ClientAction::CloseTransport => {
                    self.transport_requests.push(TransportRequest::Close);
                },
                ClientAction::ConnectionChanged(state) => {
                    if state == ConnectionState::Connected {
                        self.settlements.push(Settlement::Connected(Ok(())));
                    }
                    events.push(AppEvent::ConnectionChanged(state));
                },
                ClientAction::Reconnected => events.push(AppEvent::Reconnected),
                ClientAction::ConnectionFailed(error) => {
                    events.push(AppEvent::ConnectionFailed { message: error.to_string() });
                    self.settlements.push(Settlement::Connected(Err(error)));
                },
                ClientAction::ChannelJoined { channel_id, .. } => {
                    self.settlements
                        .push(Settlement::Joined { channel_id: channel_id.clone(), result: Ok(()) });
                    events.push(AppEvent::ChannelJoined { channel_id });
                },
                ClientAction::JoinFailed { channel_id, error } => {
                    events.push(AppEvent::Error { message: format!("join {channel_id}: {error}") });
                    self.settlements.push(Settlement::Joined { channel_id, result: Err(error) });
                },
                ClientAction::ChannelLeft { channel_id } => {
                    self.settlements
                        .push(Settlement::Left { channel_id: channel_id.clone(), result: Ok(()) });
                    events.push(AppEvent::ChannelLeft { channel_id });
                },
                ClientAction::LeaveFailed { channel_id, error } => {
                    events.push(AppEvent::Error { message: format!("leave {channel_id}: {error}") });
                    self.settlements.push(Settlement::Left { channel_id, result: Err(error) });
                },
                ClientAction::MessageAppended(message) => {
                    events.push(AppEvent::MessageAppended(message));
                },
                ClientAction::PresenceChanged { channel_id } => {
                    events.push(AppEvent::PresenceChanged {
                        online: self.client.online_users(&channel_id),
                        typing: self.client.typing_users(&channel_id),
                        channel_id,
                    });
                },
                ClientAction::AckSettled { ack_id, result } => {
                    self.settlements.push(Settlement::Ack { ack_id, result });
                },
                ClientAction::CommandSent { channel_id, command_id } => {
                    tracing::debug!(channel = %channel_id, %command_id, "command sent");
                },
                ClientAction::CommandCompleted { channel_id, command_id, command, result } => {
                    events.push(AppEvent::CommandCompleted {
                        channel_id: channel_id.clone(),
                        command,
                        error: result.as_ref().err().map(ToString::to_string),
                    });
                    self.settlements.push(Settlement::Command { channel_id, command_id, result });
                },
            }
        }

        events
    }
}

impl<E: Environment> std::fmt::Debug for Bridge<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("client", &self.client)
            .field("outgoing", &self.outgoing.len())
            .field("transport_requests", &self.transport_requests)
            .finish_non_exhaustive()
    }
}
