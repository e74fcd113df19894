//! Client state machine.
//!
//! The `Client` is the top-level state machine. It owns one connection, the
//! memberships and presence of every joined channel, their message streams
//! and command composers, and routes acknowledgements to whichever component
//! issued the request.

use std::{
    collections::{BTreeSet, HashMap},
    time::Duration,
};

use huddle_commands::{
    Catalog, CommandInvocation, CommandParser, CommandProjection, ParserState,
};
use huddle_core::{
    AckError, ChannelMemberships, ChatMessage, ConnectionAction, ConnectionManager,
    ConnectionState, Environment, Inbound, Leave, MembershipEvent, MessageStream, PresenceChange,
    PresenceTracker,
};
use huddle_proto::{
    AckId, AckReply, ChannelId, Event, MessageId, UserId,
    payloads::{CommandResultPayload, MessagePayload, PresencePayload, TypingPayload},
};

use crate::{
    collaborators::Collaborators,
    config::{ClientConfig, Identity},
    dispatcher::{CommandStamp, Dispatch, Dispatcher, apply_side_effect},
    error::{ClientError, ExecutionError},
    event::{ChannelSnapshot, ClientAction, ClientEvent, TransportEvent},
};

/// Client for one user session.
pub struct Client<E: Environment> {
    /// Environment for time, randomness and wall-clock stamps.
    env: E,

    config: ClientConfig,

    conn: ConnectionManager<E::Instant>,

    memberships: ChannelMemberships<E::Instant>,

    presence: PresenceTracker<E::Instant>,

    stream: MessageStream,

    /// One composer per channel; never shared across channels.
    parsers: HashMap<ChannelId, CommandParser>,

    dispatcher: Dispatcher<E::Instant>,

    collaborators: Collaborators,

    catalog: Catalog,

    /// Last outgoing typing notification per channel.
    last_typing: HashMap<ChannelId, E::Instant>,
}

impl<E: Environment> std::fmt::Debug for Client<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("user", &self.config.identity.user_id)
            .field("state", &self.conn.state())
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}

impl<E: Environment> Client<E> {
    /// Create a disconnected client.
    pub fn new(env: E, config: ClientConfig, collaborators: Collaborators) -> Self {
        Self {
            env,
            conn: ConnectionManager::new(config.connection.clone()),
            memberships: ChannelMemberships::new(),
            presence: PresenceTracker::new(config.presence),
            stream: MessageStream::new(),
            parsers: HashMap::new(),
            dispatcher: Dispatcher::new(config.relay),
            collaborators,
            catalog: Catalog::standard(),
            last_typing: HashMap::new(),
            config,
        }
    }

    /// Signed-in member.
    pub fn identity(&self) -> &Identity {
        &self.config.identity
    }

    /// Active configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Command catalog.
    pub fn catalog(&self) -> Catalog {
        self.catalog
    }

    /// Process an event and return actions for the caller to execute.
    pub fn handle(
        &mut self,
        event: ClientEvent<E::Instant>,
    ) -> Result<Vec<ClientAction>, ClientError> {
        match event {
            ClientEvent::Transport(event) => self.handle_transport(event),
            ClientEvent::Tick { now } => Ok(self.handle_tick(now)),
            ClientEvent::Connect => self.connect(),
            ClientEvent::Disconnect => Ok(self.disconnect()),
            ClientEvent::Join { channel_id } => self.join(&channel_id),
            ClientEvent::Leave { channel_id } => self.leave(&channel_id),
            ClientEvent::SendMessage { channel_id, text } => {
                self.submit_plain_message(&channel_id, &text)
            },
            ClientEvent::Typing { channel_id } => self.notify_typing(&channel_id),
            ClientEvent::ConfirmCommand { channel_id } => self.confirm_command(&channel_id),
        }
    }

    /// Open the connection with the current session token.
    ///
    /// No-op while already connecting or connected.
    pub fn connect(&mut self) -> Result<Vec<ClientAction>, ClientError> {
        let token = self.collaborators.tokens.current_session_token();
        let actions = self.conn.connect(token)?;
        Ok(self.absorb(actions))
    }

    /// Close the connection. Every membership goes stale.
    pub fn disconnect(&mut self) -> Vec<ClientAction> {
        let actions = self.conn.disconnect();
        self.absorb(actions)
    }

    /// Join `channel_id`. Completion arrives as [`ClientAction::ChannelJoined`]
    /// or [`ClientAction::JoinFailed`].
    pub fn join(&mut self, channel_id: &ChannelId) -> Result<Vec<ClientAction>, ClientError> {
        let now = self.env.now();
        let wall = self.env.wall_clock_millis();
        let user = self.config.identity.user_id.clone();

        let sent = self.memberships.join(channel_id, &user, &mut self.conn, now, wall)?;
        self.presence.track(channel_id);
        Ok(sent.map(|action| self.absorb(vec![action])).unwrap_or_default())
    }

    /// Leave `channel_id`. Completes immediately when disconnected.
    pub fn leave(&mut self, channel_id: &ChannelId) -> Result<Vec<ClientAction>, ClientError> {
        let now = self.env.now();
        let wall = self.env.wall_clock_millis();
        let user = self.config.identity.user_id.clone();

        match self.memberships.leave(channel_id, &user, &mut self.conn, now, wall)? {
            Leave::Completed => {
                Ok(self.membership_event(MembershipEvent::Left { channel_id: channel_id.clone() }))
            },
            Leave::Sent(action) => Ok(self.absorb(vec![action])),
            Leave::InFlight => Ok(vec![]),
        }
    }

    /// Send plain text to `channel_id` and append it locally.
    ///
    /// The relay's echo carries the same id and is de-duplicated. Blank text
    /// sends nothing.
    pub fn submit_plain_message(
        &mut self,
        channel_id: &ChannelId,
        text: &str,
    ) -> Result<Vec<ClientAction>, ClientError> {
        let body = text.trim();
        if body.is_empty() {
            return Ok(vec![]);
        }

        let payload = MessagePayload {
            channel_id: channel_id.clone(),
            id: self.next_message_id(),
            sender_id: self.config.identity.user_id.clone(),
            sender_display: self.config.identity.display.clone(),
            body: body.to_owned(),
            timestamp: self.env.wall_clock_millis(),
        };
        let send = self.conn.send(Event::Message(payload.clone()))?;
        self.last_typing.remove(channel_id);

        let mut actions = self.absorb(vec![send]);
        actions.extend(self.append(ChatMessage::from_payload(payload)));
        Ok(actions)
    }

    /// Send an arbitrary event and wait for its acknowledgement.
    ///
    /// The outcome arrives as [`ClientAction::AckSettled`] for `ack_id`.
    pub fn send_with_ack(
        &mut self,
        event: Event,
        timeout: Option<Duration>,
    ) -> Result<(AckId, Vec<ClientAction>), ClientError> {
        let now = self.env.now();
        let (ack_id, action) = self.conn.send_with_ack(event, timeout, now)?;
        Ok((ack_id, self.absorb(vec![action])))
    }

    /// Tell the channel the user is typing, at most once per
    /// `typing_interval`.
    pub fn notify_typing(
        &mut self,
        channel_id: &ChannelId,
    ) -> Result<Vec<ClientAction>, ClientError> {
        let now = self.env.now();
        let interval = self.config.typing_interval;
        if self.last_typing.get(channel_id).is_some_and(|last| now - *last < interval) {
            return Ok(vec![]);
        }

        let payload = TypingPayload {
            channel_id: channel_id.clone(),
            user_id: self.config.identity.user_id.clone(),
            timestamp: self.env.wall_clock_millis(),
        };
        let send = self.conn.send(Event::Typing(payload))?;
        self.last_typing.insert(channel_id.clone(), now);
        Ok(self.absorb(vec![send]))
    }

    /// Feed the composer of `channel_id` and project its state.
    pub fn begin_command(&mut self, channel_id: &ChannelId, input: &str) -> CommandProjection {
        let catalog = self.catalog;
        let markers = self.config.markers;
        let parser = self
            .parsers
            .entry(channel_id.clone())
            .or_insert_with(|| CommandParser::new(catalog, channel_id.clone(), markers));
        parser.update(input, self.collaborators.members.as_ref());
        parser.projection()
    }

    /// Abandon the command composed in `channel_id`.
    pub fn cancel_command(&mut self, channel_id: &ChannelId) -> bool {
        self.parsers.get_mut(channel_id).is_some_and(CommandParser::cancel)
    }

    /// Parser state of `channel_id`'s composer.
    pub fn command_state(&self, channel_id: &ChannelId) -> Option<&ParserState> {
        self.parsers.get(channel_id).map(CommandParser::state)
    }

    /// Confirm and execute the ready command in `channel_id`'s composer.
    ///
    /// # Errors
    ///
    /// - `ExecutionError::Validation` if the composer holds no ready command
    pub fn confirm_command(
        &mut self,
        channel_id: &ChannelId,
    ) -> Result<Vec<ClientAction>, ClientError> {
        let invocation = match self.parsers.get_mut(channel_id) {
            Some(parser) => parser.confirm().map_err(ExecutionError::from)?,
            None => {
                return Err(ExecutionError::from(
                    huddle_commands::ParameterValidationError::NoCommand,
                )
                .into());
            },
        };
        self.execute(invocation)
    }

    /// Execute a bound command.
    ///
    /// Validation failures are returned without touching the transport. Send
    /// and acknowledgement failures become a system message and a failed
    /// [`ClientAction::CommandCompleted`].
    pub fn execute(
        &mut self,
        invocation: CommandInvocation,
    ) -> Result<Vec<ClientAction>, ClientError> {
        let now = self.env.now();
        let stamp = CommandStamp {
            command_id: self.next_message_id(),
            result_id: self.next_message_id(),
            timestamp: self.env.wall_clock_millis(),
        };
        let identity = self.config.identity.clone();
        let command_id = stamp.command_id.clone();
        let sent = ClientAction::CommandSent {
            channel_id: invocation.channel_id().clone(),
            command_id: command_id.clone(),
        };

        match self.dispatcher.execute(invocation.clone(), &identity, stamp, &mut self.conn, now) {
            Ok(Dispatch::Completed { actions, invocation, result }) => {
                let mut out = vec![sent];
                out.extend(self.absorb(actions));
                out.extend(self.finish_command(command_id, &invocation, Ok(result)));
                Ok(out)
            },
            Ok(Dispatch::Awaiting { action, .. }) => {
                let mut out = vec![sent];
                out.extend(self.absorb(vec![action]));
                Ok(out)
            },
            Err(err @ ExecutionError::Validation(_)) => Err(err.into()),
            Err(err) => {
                let mut out = vec![sent];
                out.extend(self.finish_command(command_id, &invocation, Err(err)));
                Ok(out)
            },
        }
    }

    /// Current connection state.
    pub fn connection_state(&self) -> ConnectionState {
        self.conn.state()
    }

    /// Messages of `channel_id` in delivery order.
    pub fn messages(&self, channel_id: &ChannelId) -> &[ChatMessage] {
        self.stream.messages(channel_id)
    }

    /// Online members of `channel_id`. Empty until presence is synced.
    pub fn online_users(&self, channel_id: &ChannelId) -> BTreeSet<UserId> {
        self.presence.online_users(channel_id)
    }

    /// Members typing in `channel_id`.
    pub fn typing_users(&self, channel_id: &ChannelId) -> BTreeSet<UserId> {
        self.presence.typing_users(channel_id, self.env.now())
    }

    /// Whether `channel_id` is joined and live.
    pub fn is_live(&self, channel_id: &ChannelId) -> bool {
        self.memberships.is_live(channel_id)
    }

    /// Channels with a membership, ordered by id.
    pub fn channels(&self) -> Vec<ChannelId> {
        self.memberships.iter().map(|m| m.channel_id().clone()).collect()
    }

    /// Acknowledgements still outstanding.
    pub fn pending_acks(&self) -> usize {
        self.conn.pending_acks()
    }

    /// Snapshot of `channel_id`, if it has a membership.
    pub fn snapshot(&self, channel_id: &ChannelId) -> Option<ChannelSnapshot> {
        let membership = self.memberships.get(channel_id)?;
        Some(ChannelSnapshot {
            channel_id: channel_id.clone(),
            membership: membership.state(),
            live: membership.is_live(),
            presence: self.presence.sync_state(channel_id),
            online: self.online_users(channel_id),
            typing: self.typing_users(channel_id),
            messages: self.messages(channel_id).len(),
        })
    }

    fn handle_transport(
        &mut self,
        event: TransportEvent,
    ) -> Result<Vec<ClientAction>, ClientError> {
        let actions = match event {
            TransportEvent::Opened => self.conn.transport_opened(),
            TransportEvent::Rejected { reason } => self.conn.transport_rejected(reason),
            TransportEvent::Closed { reason } => {
                let now = self.env.now();
                self.conn.transport_closed(&reason, now)
            },
            TransportEvent::Frame(text) => return self.handle_frame(&text),
        };
        Ok(self.absorb(actions))
    }

    fn handle_frame(&mut self, text: &str) -> Result<Vec<ClientAction>, ClientError> {
        match self.conn.handle_frame(text)? {
            Inbound::Event(event) => Ok(self.handle_inbound(event)),
            Inbound::Ack { ack_id, result, .. } => Ok(self.route_ack(ack_id, result)),
            Inbound::Ignored => Ok(vec![]),
        }
    }

    fn handle_tick(&mut self, now: E::Instant) -> Vec<ClientAction> {
        if self.conn.reconnect_due(now) {
            self.conn.set_token(self.collaborators.tokens.current_session_token());
        }

        let conn_actions = self.conn.tick(now);
        let mut actions = self.absorb(conn_actions);
        for channel_id in self.presence.expire_typing(now) {
            actions.push(ClientAction::PresenceChanged { channel_id });
        }
        actions
    }

    fn handle_inbound(&mut self, event: Event) -> Vec<ClientAction> {
        let channel_id = event.channel_id().clone();
        if self.memberships.get(&channel_id).is_none() {
            tracing::debug!(
                channel = %channel_id,
                event = %event.name(),
                "event for unjoined channel dropped"
            );
            return vec![];
        }

        match event {
            Event::Message(payload) => {
                let sender = payload.sender_id.clone();
                let mut actions = self.append(ChatMessage::from_payload(payload));
                if self.presence.stop_typing(&channel_id, &sender) {
                    actions.push(ClientAction::PresenceChanged { channel_id });
                }
                actions
            },
            Event::CommandResult(payload) => self.append(ChatMessage::from_command_result(payload)),
            Event::Online(payload) => self.presence_event(payload, true),
            Event::Offline(payload) => self.presence_event(payload, false),
            Event::Typing(payload) => {
                if payload.user_id == self.config.identity.user_id {
                    return vec![];
                }
                let now = self.env.now();
                if self.presence.typing(&channel_id, payload.user_id, now) {
                    vec![ClientAction::PresenceChanged { channel_id }]
                } else {
                    vec![]
                }
            },
            Event::Command(_) | Event::Join { .. } | Event::Leave { .. } => {
                tracing::trace!(channel = %channel_id, "relayed request ignored");
                vec![]
            },
        }
    }

    fn presence_event(&mut self, payload: PresencePayload, online: bool) -> Vec<ClientAction> {
        let change = if online {
            PresenceChange::Online { user: payload.user_id, display: payload.display }
        } else {
            PresenceChange::Offline { user: payload.user_id, display: payload.display }
        };

        if self.presence.apply(&payload.channel_id, change.clone()) {
            self.presence_changed(&payload.channel_id, change)
        } else {
            vec![]
        }
    }

    fn presence_changed(
        &mut self,
        channel_id: &ChannelId,
        change: PresenceChange,
    ) -> Vec<ClientAction> {
        let (user, display, online) = match change {
            PresenceChange::Online { user, display } => (user, display, true),
            PresenceChange::Offline { user, display } => (user, display, false),
        };
        let notice = ChatMessage::presence(
            self.next_message_id(),
            channel_id.clone(),
            user,
            display,
            online,
            self.env.wall_clock_millis(),
        );

        let mut actions = self.append(notice);
        actions.push(ClientAction::PresenceChanged { channel_id: channel_id.clone() });
        actions
    }

    /// Translate connection actions, reacting to state changes on the way.
    fn absorb(&mut self, actions: Vec<ConnectionAction>) -> Vec<ClientAction> {
        let mut out = Vec::with_capacity(actions.len());
        for action in actions {
            match action {
                ConnectionAction::Open { token, attempt } => {
                    out.push(ClientAction::OpenTransport { token, attempt });
                },
                ConnectionAction::Close => out.push(ClientAction::CloseTransport),
                ConnectionAction::Send(message) => out.push(ClientAction::Send(message)),
                ConnectionAction::StateChanged(state) => {
                    out.push(ClientAction::ConnectionChanged(state));
                    if state == ConnectionState::Connected {
                        out.extend(self.rejoin_stale());
                    } else {
                        out.extend(self.connection_lost());
                    }
                },
                ConnectionAction::Reconnected => out.push(ClientAction::Reconnected),
                ConnectionAction::AckResolved { ack_id, result, .. } => {
                    out.extend(self.route_ack(ack_id, result));
                },
                ConnectionAction::Failed(err) => {
                    tracing::warn!(error = %err, "connection failed");
                    out.push(ClientAction::ConnectionFailed(err));
                },
            }
        }
        out
    }

    fn connection_lost(&mut self) -> Vec<ClientAction> {
        let events = self.memberships.connection_lost();
        self.presence.reset_all();

        let mut out = Vec::new();
        for event in events {
            out.extend(self.membership_event(event));
        }
        out
    }

    fn rejoin_stale(&mut self) -> Vec<ClientAction> {
        let now = self.env.now();
        let wall = self.env.wall_clock_millis();
        let user = self.config.identity.user_id.clone();

        let (sends, failures) = self.memberships.rejoin_all(&user, &mut self.conn, now, wall);
        if !sends.is_empty() {
            tracing::info!(channels = sends.len(), "rejoining channels");
        }

        let mut out: Vec<ClientAction> = sends
            .into_iter()
            .filter_map(|action| match action {
                ConnectionAction::Send(message) => Some(ClientAction::Send(message)),
                _ => None,
            })
            .collect();
        for event in failures {
            out.extend(self.membership_event(event));
        }
        out
    }

    fn route_ack(
        &mut self,
        ack_id: AckId,
        result: Result<AckReply, AckError>,
    ) -> Vec<ClientAction> {
        if self.memberships.owns(ack_id) {
            let now = self.env.now();
            return self
                .memberships
                .resolve(ack_id, result, now)
                .map(|event| self.membership_event(event))
                .unwrap_or_default();
        }

        if let Some(settled) = self.dispatcher.settle(ack_id, result.clone()) {
            return self.finish_command(settled.command_id, &settled.invocation, settled.outcome);
        }

        vec![ClientAction::AckSettled { ack_id, result }]
    }

    fn membership_event(&mut self, event: MembershipEvent) -> Vec<ClientAction> {
        match event {
            MembershipEvent::Joined { channel_id, online, rejoin } => {
                let replayed = self.presence.sync(&channel_id, online);
                let mut out = vec![
                    ClientAction::ChannelJoined { channel_id: channel_id.clone(), rejoin },
                    ClientAction::PresenceChanged { channel_id: channel_id.clone() },
                ];
                for change in replayed {
                    out.extend(self.presence_changed(&channel_id, change));
                }
                out
            },
            MembershipEvent::JoinFailed { channel_id, error } => {
                if self.memberships.get(&channel_id).is_none() {
                    self.presence.forget(&channel_id);
                }
                vec![ClientAction::JoinFailed { channel_id, error }]
            },
            MembershipEvent::Left { channel_id } => {
                self.presence.forget(&channel_id);
                let dropped = self.stream.close(&channel_id);
                self.parsers.remove(&channel_id);
                self.last_typing.remove(&channel_id);
                tracing::debug!(channel = %channel_id, dropped, "channel closed");
                vec![ClientAction::ChannelLeft { channel_id }]
            },
            MembershipEvent::LeaveFailed { channel_id, error } => {
                vec![ClientAction::LeaveFailed { channel_id, error }]
            },
        }
    }

    /// Append the result, then call the collaborator; or report the failure.
    fn finish_command(
        &mut self,
        command_id: MessageId,
        invocation: &CommandInvocation,
        outcome: Result<CommandResultPayload, ExecutionError>,
    ) -> Vec<ClientAction> {
        let channel_id = invocation.channel_id().clone();
        let mut out = Vec::new();

        let outcome = match outcome {
            Ok(result) => {
                out.extend(self.append(ChatMessage::from_command_result(result.clone())));
                let issuer = self.config.identity.user_id.clone();
                match apply_side_effect(invocation, &self.collaborators, &issuer) {
                    Ok(()) => Ok(result),
                    Err(err) => {
                        tracing::error!(
                            command = invocation.name(),
                            error = %err,
                            "collaborator failed"
                        );
                        Err(ExecutionError::from(err))
                    },
                }
            },
            Err(err) => Err(err),
        };

        if let Err(err) = &outcome {
            let notice = ChatMessage::system(
                self.next_message_id(),
                channel_id.clone(),
                format!("command /{} failed: {err}", invocation.name()),
                self.env.wall_clock_millis(),
            );
            out.extend(self.append(notice));
        }

        if let Some(parser) = self
            .parsers
            .get_mut(&channel_id)
            .filter(|parser| matches!(parser.state(), ParserState::Sent(_)))
        {
            parser.reset();
        }

        out.push(ClientAction::CommandCompleted {
            channel_id,
            command_id,
            command: invocation.name().to_owned(),
            result: outcome,
        });
        out
    }

    fn append(&mut self, message: ChatMessage) -> Vec<ClientAction> {
        if self.stream.append(message.clone()) {
            vec![ClientAction::MessageAppended(message)]
        } else {
            vec![]
        }
    }

    fn next_message_id(&self) -> MessageId {
        MessageId::new(self.env.random_uuid().to_string())
    }
}
