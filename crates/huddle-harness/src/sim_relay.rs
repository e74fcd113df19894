//! In-memory model of the relay server.
//!
//! `SimRelay` speaks the wire protocol to any number of simulated users.
//! Frames go in through [`SimRelay::receive`] and come out of per-user
//! outboxes, so tests control exactly when each user sees what.
//!
//! Behavior:
//!
//! - `join:project` is acknowledged with the channel's online members and
//!   announced to the rest of the channel as `presence:online`.
//! - `leave:project` and disconnects are announced as `presence:offline`.
//! - `chat:message` is echoed to every member, sender included.
//! - `presence:typing` goes to every member except the sender.
//! - `chat:command` with an ack gets a server-assigned result id, then the
//!   result is broadcast as `chat:command_result`.
//! - `chat:command_result` from a client (local relay mode) is broadcast.
//!
//! Knobs let tests drop acknowledgements, refuse joins, reject commands and
//! revoke tokens.

use std::{
    collections::{BTreeMap, BTreeSet, HashSet, VecDeque},
    sync::{Arc, Mutex},
};

use huddle_client::TransportEvent;
use huddle_core::SessionToken;
use huddle_proto::{
    AckFrame, AckId, AckReply, ChannelId, Event, MessageId, UserId, WireMessage,
    payloads::{CommandPayload, CommandResultPayload, PresencePayload},
};

use crate::sim_env::SIM_EPOCH_MILLIS;

/// Relay shared between simulation drivers.
pub type SharedRelay = Arc<Mutex<SimRelay>>;

/// Create a relay that several drivers can share.
pub fn create_shared_relay() -> SharedRelay {
    Arc::new(Mutex::new(SimRelay::new()))
}

#[derive(Debug, Default)]
struct Session {
    outbox: VecDeque<String>,
}

/// Frames the relay has seen, for assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedFrame {
    /// Sender
    pub user: UserId,
    /// Decoded event
    pub event: Event,
    /// Whether the sender asked for an ack
    pub ack: Option<AckId>,
}

/// Pure model of the relay server.
#[derive(Debug, Default)]
pub struct SimRelay {
    sessions: BTreeMap<UserId, Session>,
    channels: BTreeMap<ChannelId, BTreeSet<UserId>>,
    received: Vec<ReceivedFrame>,
    revoked_tokens: HashSet<String>,
    unreachable: bool,
    drop_acks: bool,
    refused_channels: HashSet<ChannelId>,
    command_rejection: Option<String>,
    next_result: u64,
    clock_ms: i64,
}

impl SimRelay {
    /// Empty relay accepting every token.
    pub fn new() -> Self {
        Self { clock_ms: SIM_EPOCH_MILLIS, ..Self::default() }
    }

    /// Handshake for `user`.
    ///
    /// Returns [`TransportEvent::Opened`], or the rejection or close the
    /// client would observe.
    pub fn connect(&mut self, user: &UserId, token: &SessionToken) -> TransportEvent {
        if self.unreachable {
            return TransportEvent::Closed { reason: "relay unreachable".to_owned() };
        }
        if self.revoked_tokens.contains(token.expose()) {
            tracing::debug!(%user, "sim relay rejected token");
            return TransportEvent::Rejected { reason: "invalid token".to_owned() };
        }

        // A second connection replaces the first.
        self.drop_session(user);
        self.sessions.insert(user.clone(), Session::default());
        TransportEvent::Opened
    }

    /// Connection of `user` ended; every channel sees it go offline.
    pub fn disconnect(&mut self, user: &UserId) {
        self.drop_session(user);
    }

    /// Whether `user` has an open connection.
    pub fn is_connected(&self, user: &UserId) -> bool {
        self.sessions.contains_key(user)
    }

    /// Members of `channel` as the relay sees them.
    pub fn members(&self, channel: &ChannelId) -> BTreeSet<UserId> {
        self.channels.get(channel).cloned().unwrap_or_default()
    }

    /// Every event received so far, in arrival order.
    pub fn received(&self) -> &[ReceivedFrame] {
        &self.received
    }

    /// Handle one frame sent by `user`.
    pub fn receive(&mut self, user: &UserId, frame: &str) {
        if !self.sessions.contains_key(user) {
            tracing::debug!(%user, "frame from disconnected user dropped");
            return;
        }

        let envelope = match WireMessage::decode(frame) {
            Ok(WireMessage::Event(envelope)) => envelope,
            Ok(WireMessage::Ack(_)) => return,
            Err(e) => {
                tracing::warn!(%user, error = %e, "sim relay got malformed frame");
                return;
            },
        };
        let event = match Event::from_envelope(&envelope) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(%user, error = %e, "sim relay got invalid payload");
                return;
            },
        };

        self.clock_ms += 1;
        self.received.push(ReceivedFrame {
            user: user.clone(),
            event: event.clone(),
            ack: envelope.ack,
        });

        match event {
            Event::Join { payload, .. } => {
                let channel = payload.channel_id;
                if self.refused_channels.contains(&channel) {
                    self.ack(user, envelope.ack, AckReply::rejected("not a member of this project"));
                    return;
                }
                let newly_joined =
                    self.channels.entry(channel.clone()).or_default().insert(user.clone());
                let online = self.online(&channel);
                self.ack(user, envelope.ack, AckReply::accepted().with_online(online));
                if newly_joined {
                    let notice = self.presence(&channel, user);
                    self.broadcast(&channel, Some(user), &Event::Online(notice));
                }
            },
            Event::Leave { payload, .. } => {
                let channel = payload.channel_id;
                let was_member =
                    self.channels.get_mut(&channel).is_some_and(|members| members.remove(user));
                self.ack(user, envelope.ack, AckReply::accepted());
                if was_member {
                    let notice = self.presence(&channel, user);
                    self.broadcast(&channel, None, &Event::Offline(notice));
                }
            },
            Event::Message(payload) => {
                if self.is_member(&payload.channel_id, user) {
                    let channel = payload.channel_id.clone();
                    self.broadcast(&channel, None, &Event::Message(payload));
                }
            },
            Event::Typing(payload) => {
                if self.is_member(&payload.channel_id, user) {
                    let channel = payload.channel_id.clone();
                    self.broadcast(&channel, Some(user), &Event::Typing(payload));
                }
            },
            Event::Command(payload) => {
                // Without an ack the command is informational (local relay mode).
                if envelope.ack.is_some() {
                    self.run_command(user, envelope.ack, payload);
                }
            },
            Event::CommandResult(payload) => {
                if self.is_member(&payload.channel_id, user) {
                    let channel = payload.channel_id.clone();
                    self.broadcast(&channel, None, &Event::CommandResult(payload));
                }
            },
            Event::Online(_) | Event::Offline(_) => {},
        }
    }

    /// Push a server event to every member of its channel.
    pub fn inject(&mut self, event: &Event) {
        let channel = event.channel_id().clone();
        self.broadcast(&channel, None, event);
    }

    /// Take the frames waiting for `user`.
    pub fn take_outbox(&mut self, user: &UserId) -> Vec<String> {
        self.sessions.get_mut(user).map(|s| s.outbox.drain(..).collect()).unwrap_or_default()
    }

    /// Pop the next frame waiting for `user`.
    pub fn pop_frame(&mut self, user: &UserId) -> Option<String> {
        self.sessions.get_mut(user).and_then(|s| s.outbox.pop_front())
    }

    /// Refuse handshakes presenting `token`.
    pub fn revoke_token(&mut self, token: &SessionToken) {
        self.revoked_tokens.insert(token.expose().to_owned());
    }

    /// Make every handshake fail as if the relay were down.
    pub fn set_unreachable(&mut self, unreachable: bool) {
        self.unreachable = unreachable;
    }

    /// Swallow every acknowledgement from now on.
    pub fn set_drop_acks(&mut self, drop_acks: bool) {
        self.drop_acks = drop_acks;
    }

    /// Reject joins of `channel`.
    pub fn refuse_channel(&mut self, channel: ChannelId) {
        self.refused_channels.insert(channel);
    }

    /// Reject acknowledged commands with `reason`; `None` accepts them again.
    pub fn reject_commands(&mut self, reason: Option<String>) {
        self.command_rejection = reason;
    }

    fn run_command(&mut self, user: &UserId, ack: Option<AckId>, command: CommandPayload) {
        if let Some(reason) = self.command_rejection.clone() {
            self.ack(user, ack, AckReply::rejected(reason));
            return;
        }
        if !self.is_member(&command.channel_id, user) {
            self.ack(user, ack, AckReply::rejected("not joined"));
            return;
        }

        self.next_result += 1;
        let result_id = MessageId::new(format!("result-{}", self.next_result));
        self.ack(user, ack, AckReply::accepted().with_result_id(result_id.clone()));

        let result = CommandResultPayload {
            channel_id: command.channel_id.clone(),
            id: result_id,
            summary: format!("{} ran /{}", command.sender_display, command.command),
            command: command.command,
            params: command.params,
            sender_id: command.sender_id,
            sender_display: command.sender_display,
            timestamp: self.clock_ms,
        };
        self.broadcast(&command.channel_id, None, &Event::CommandResult(result));
    }

    fn drop_session(&mut self, user: &UserId) {
        if self.sessions.remove(user).is_none() {
            return;
        }
        let joined: Vec<ChannelId> = self
            .channels
            .iter_mut()
            .filter_map(|(channel, members)| members.remove(user).then(|| channel.clone()))
            .collect();
        for channel in joined {
            let notice = self.presence(&channel, user);
            self.broadcast(&channel, None, &Event::Offline(notice));
        }
    }

    fn is_member(&self, channel: &ChannelId, user: &UserId) -> bool {
        self.channels.get(channel).is_some_and(|members| members.contains(user))
    }

    /// Members of `channel` with an open connection.
    fn online(&self, channel: &ChannelId) -> Vec<UserId> {
        self.channels
            .get(channel)
            .map(|members| {
                members.iter().filter(|m| self.sessions.contains_key(*m)).cloned().collect()
            })
            .unwrap_or_default()
    }

    fn presence(&self, channel: &ChannelId, user: &UserId) -> PresencePayload {
        PresencePayload {
            channel_id: channel.clone(),
            user_id: user.clone(),
            display: None,
            timestamp: self.clock_ms,
        }
    }

    fn ack(&mut self, user: &UserId, ack: Option<AckId>, reply: AckReply) {
        let Some(ack) = ack else {
            return;
        };
        if self.drop_acks {
            tracing::debug!(%user, %ack, "sim relay dropped ack");
            return;
        }
        match WireMessage::Ack(AckFrame { ack, data: reply }).encode() {
            Ok(frame) => self.deliver(user, frame),
            Err(e) => tracing::warn!(error = %e, "sim relay failed to encode ack"),
        }
    }

    fn broadcast(&mut self, channel: &ChannelId, except: Option<&UserId>, event: &Event) {
        let frame = match event.clone().into_envelope(None).map(WireMessage::Event) {
            Ok(message) => match message.encode() {
                Ok(frame) => frame,
                Err(e) => {
                    tracing::warn!(error = %e, "sim relay failed to encode event");
                    return;
                },
            },
            Err(e) => {
                tracing::warn!(error = %e, "sim relay failed to wrap event");
                return;
            },
        };

        let recipients: Vec<UserId> = self
            .channels
            .get(channel)
            .map(|members| members.iter().filter(|m| Some(*m) != except).cloned().collect())
            .unwrap_or_default();
        for recipient in recipients {
            self.deliver(&recipient, frame.clone());
        }
    }

    fn deliver(&mut self, user: &UserId, frame: String) {
        if let Some(session) = self.sessions.get_mut(user) {
            session.outbox.push_back(frame);
        }
    }
}
