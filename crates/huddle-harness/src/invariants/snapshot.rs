//! Observable state snapshots for invariant checking.
//!
//! Snapshots capture the observable state of the system at a point in time.
//! Invariants operate on snapshots rather than live state to ensure
//! consistent, atomic checks.

use std::collections::{BTreeMap, BTreeSet};

use huddle_app::App;
use huddle_client::Client;
use huddle_core::{ConnectionState, Environment, PresenceSync};
use huddle_proto::{ChannelId, MessageId, UserId};
use serde::Serialize;

/// Snapshot of the entire system state.
///
/// Contains observable state from one or more clients for invariant checking.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SystemSnapshot {
    /// Per-client state snapshots.
    pub clients: Vec<ClientSnapshot>,
}

impl SystemSnapshot {
    /// Create an empty snapshot (no clients).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Create a snapshot with a single client.
    pub fn single(client: ClientSnapshot) -> Self {
        Self { clients: vec![client] }
    }

    /// Create a snapshot from multiple clients.
    pub fn from_clients(clients: Vec<ClientSnapshot>) -> Self {
        Self { clients }
    }

    /// Add a client snapshot.
    pub fn add_client(&mut self, client: ClientSnapshot) {
        self.clients.push(client);
    }
}

/// Snapshot of a single client's observable state.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ClientSnapshot {
    /// Client identifier.
    pub id: String,
    /// Whether the connection is up.
    pub connected: bool,
    /// Currently active channel. `None` if no channel is selected.
    pub active_channel: Option<ChannelId>,
    /// Every channel with a membership.
    pub channels: BTreeMap<ChannelId, ChannelSnapshot>,
}

impl ClientSnapshot {
    /// Create a new client snapshot.
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), ..Default::default() }
    }

    /// Capture the observable state of a client.
    pub fn from_client<E: Environment>(client: &Client<E>) -> Self {
        let mut snapshot = Self::new(client.identity().user_id.as_str());
        snapshot.connected = client.connection_state() == ConnectionState::Connected;

        for channel_id in client.channels() {
            let Some(view) = client.snapshot(&channel_id) else {
                continue;
            };
            snapshot.channels.insert(channel_id.clone(), ChannelSnapshot {
                live: view.live,
                presence_synced: view.presence == PresenceSync::Synced,
                online: view.online,
                message_ids: client.messages(&channel_id).iter().map(|m| m.id.clone()).collect(),
                bodies: client
                    .messages(&channel_id)
                    .iter()
                    .map(|m| (m.id.clone(), m.body.clone()))
                    .collect(),
            });
        }
        snapshot
    }

    /// Capture the observable state of an App.
    ///
    /// The App does not track liveness or presence sync; channels are
    /// reported live while connected and synced once anyone is online.
    pub fn from_app(id: impl Into<String>, app: &App) -> Self {
        let mut snapshot = Self::new(id);
        snapshot.connected = app.connection_state() == ConnectionState::Connected;
        snapshot.active_channel = app.active_channel().cloned();

        for (channel_id, view) in app.channels() {
            snapshot.channels.insert(channel_id.clone(), ChannelSnapshot {
                live: snapshot.connected,
                presence_synced: !view.online.is_empty(),
                online: view.online.clone(),
                message_ids: view.messages.iter().map(|m| m.id.clone()).collect(),
                bodies: view.messages.iter().map(|m| (m.id.clone(), m.body.clone())).collect(),
            });
        }
        snapshot
    }

    /// Add a channel.
    #[must_use]
    pub fn with_channel(mut self, channel_id: impl Into<ChannelId>, channel: ChannelSnapshot) -> Self {
        self.channels.insert(channel_id.into(), channel);
        self
    }
}

/// Snapshot of one channel as a client sees it.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ChannelSnapshot {
    /// Joined and live.
    pub live: bool,
    /// Presence reflects a server snapshot.
    pub presence_synced: bool,
    /// Online members.
    pub online: BTreeSet<UserId>,
    /// Stream entries in delivery order.
    pub message_ids: Vec<MessageId>,
    /// Body of each entry.
    #[serde(skip)]
    pub bodies: BTreeMap<MessageId, String>,
}

impl ChannelSnapshot {
    /// Live, synced channel with no messages.
    pub fn live() -> Self {
        Self { live: true, presence_synced: true, ..Self::default() }
    }

    /// Set the online members.
    #[must_use]
    pub fn with_online<'a>(mut self, users: impl IntoIterator<Item = &'a str>) -> Self {
        self.online = users.into_iter().map(UserId::from).collect();
        self
    }

    /// Append a message.
    #[must_use]
    pub fn with_message(mut self, id: &str, body: &str) -> Self {
        self.message_ids.push(MessageId::from(id));
        self.bodies.insert(MessageId::from(id), body.to_owned());
        self
    }
}
