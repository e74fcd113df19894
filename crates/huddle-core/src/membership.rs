//! Channel membership lifecycle.
//!
//! ```text
//!   join()          ack ok
//! ─────────> Joining ──────> Joined ──── leave() ───> Leaving ──ack ok──> (removed)
//!               │ ack err      │  ↑                     │ ack err
//!               ↓              │  └─────────────────────┘ (restored)
//!           (removed)          │ connection lost
//!                              ↓
//!                            Stale ──reconnect──> Rejoining ──ack ok──> Joined
//!                              ↑                      │ ack err
//!                              └──────────────────────┘
//! ```
//!
//! A channel is live only in `Joined`. Stale channels still accept incoming
//! events; their buffers are kept so history survives a reconnect.

use std::collections::{BTreeMap, HashMap};

use huddle_proto::{
    AckId, AckReply, ChannelId, Event, PROJECT_RESOURCE, UserId, payloads::MembershipPayload,
};

use crate::{
    connection::{ConnectionAction, ConnectionManager},
    env::MonotonicInstant,
    error::{AckError, JoinError, LeaveError},
};

/// Lifecycle state of one channel membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipState {
    /// First join sent, awaiting acknowledgement
    Joining,
    /// Acknowledged and live
    Joined,
    /// Connection was lost; not live until rejoined
    Stale,
    /// Automatic rejoin sent after reconnect
    Rejoining,
    /// Leave sent, awaiting acknowledgement
    Leaving,
}

/// Membership record for one channel.
#[derive(Debug, Clone)]
pub struct ChannelMembership<I> {
    channel_id: ChannelId,
    state: MembershipState,
    joined_at: Option<I>,
    pending: Option<AckId>,
    /// State to restore if a leave is refused
    resume: MembershipState,
}

impl<I: Copy> ChannelMembership<I> {
    fn new(channel_id: ChannelId, state: MembershipState, pending: AckId) -> Self {
        Self { channel_id, state, joined_at: None, pending: Some(pending), resume: state }
    }

    /// Channel this record describes
    pub fn channel_id(&self) -> &ChannelId {
        &self.channel_id
    }

    /// Current lifecycle state
    pub fn state(&self) -> MembershipState {
        self.state
    }

    /// When the most recent join was acknowledged
    pub fn joined_at(&self) -> Option<I> {
        self.joined_at
    }

    /// Whether a join or leave acknowledgement is outstanding
    pub fn ack_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Whether events for this channel reflect the server right now
    pub fn is_live(&self) -> bool {
        self.state == MembershipState::Joined
    }
}

/// Outcomes surfaced to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MembershipEvent {
    /// Join (or automatic rejoin) acknowledged
    Joined {
        /// Channel
        channel_id: ChannelId,
        /// Online snapshot from the acknowledgement
        online: Vec<UserId>,
        /// True when this restored a stale membership
        rejoin: bool,
    },
    /// Join refused or timed out. Not retried.
    JoinFailed {
        /// Channel
        channel_id: ChannelId,
        /// Cause
        error: JoinError,
    },
    /// Membership ended
    Left {
        /// Channel
        channel_id: ChannelId,
    },
    /// Leave refused or timed out; prior state restored
    LeaveFailed {
        /// Channel
        channel_id: ChannelId,
        /// Cause
        error: LeaveError,
    },
}

/// Result of a leave request.
#[derive(Debug, Clone, PartialEq)]
pub enum Leave {
    /// Membership removed locally; nothing to send
    Completed,
    /// Leave request to transmit; outcome arrives as a [`MembershipEvent`]
    Sent(ConnectionAction),
    /// A leave is already waiting on the server
    InFlight,
}

/// Every channel this client has joined or is joining.
#[derive(Debug)]
pub struct ChannelMemberships<I> {
    channels: BTreeMap<ChannelId, ChannelMembership<I>>,
    by_ack: HashMap<AckId, ChannelId>,
}

impl<I> Default for ChannelMemberships<I> {
    fn default() -> Self {
        Self { channels: BTreeMap::new(), by_ack: HashMap::new() }
    }
}

impl<I: MonotonicInstant> ChannelMemberships<I> {
    /// No memberships.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request to join `channel`.
    ///
    /// Idempotent: returns `Ok(None)` when already joined or when a join is
    /// in flight, so the server never sees a duplicate request. A stale
    /// channel is rejoined.
    pub fn join(
        &mut self,
        channel: &ChannelId,
        user: &UserId,
        conn: &mut ConnectionManager<I>,
        now: I,
        wall_ms: i64,
    ) -> Result<Option<ConnectionAction>, JoinError> {
        let next = match self.channels.get(channel).map(ChannelMembership::state) {
            Some(MembershipState::Joined | MembershipState::Joining | MembershipState::Rejoining) => {
                return Ok(None);
            },
            Some(MembershipState::Leaving) => {
                return Err(JoinError::LeaveInProgress { channel: channel.clone() });
            },
            Some(MembershipState::Stale) => MembershipState::Rejoining,
            None => MembershipState::Joining,
        };

        let (ack_id, action) = conn
            .send_with_ack(join_event(channel, user, wall_ms), None, now)
            .map_err(|source| JoinError::Connection { channel: channel.clone(), source })?;

        tracing::debug!(%channel, %ack_id, ?next, "join sent");
        self.track_ack(channel, next, ack_id);
        Ok(Some(action))
    }

    /// Request to leave `channel`.
    ///
    /// Leaving a channel that is not joined, or leaving while disconnected,
    /// completes locally without contacting the server.
    pub fn leave(
        &mut self,
        channel: &ChannelId,
        user: &UserId,
        conn: &mut ConnectionManager<I>,
        now: I,
        wall_ms: i64,
    ) -> Result<Leave, LeaveError> {
        let Some(state) = self.channels.get(channel).map(ChannelMembership::state) else {
            return Ok(Leave::Completed);
        };

        match state {
            MembershipState::Joining | MembershipState::Rejoining => {
                return Err(LeaveError::JoinInProgress { channel: channel.clone() });
            },
            MembershipState::Leaving => return Ok(Leave::InFlight),
            MembershipState::Joined | MembershipState::Stale => {},
        }

        if !conn.is_connected() {
            tracing::debug!(%channel, "leave completed locally while disconnected");
            self.remove(channel);
            return Ok(Leave::Completed);
        }

        let event = Event::Leave {
            resource: PROJECT_RESOURCE.to_owned(),
            payload: membership_payload(channel, user, wall_ms),
        };
        let (ack_id, action) = conn
            .send_with_ack(event, None, now)
            .map_err(|source| LeaveError::Connection { channel: channel.clone(), source })?;

        if let Some(membership) = self.channels.get_mut(channel) {
            membership.resume = state;
            membership.state = MembershipState::Leaving;
            membership.pending = Some(ack_id);
        }
        self.by_ack.insert(ack_id, channel.clone());

        Ok(Leave::Sent(action))
    }

    /// Whether `ack_id` belongs to a membership request.
    pub fn owns(&self, ack_id: AckId) -> bool {
        self.by_ack.contains_key(&ack_id)
    }

    /// Settle a join or leave acknowledgement.
    ///
    /// Returns `None` for acks this tracker does not own or has superseded.
    pub fn resolve(
        &mut self,
        ack_id: AckId,
        result: Result<AckReply, AckError>,
        now: I,
    ) -> Option<MembershipEvent> {
        let channel_id = self.by_ack.remove(&ack_id)?;
        let membership = self.channels.get_mut(&channel_id)?;
        if membership.pending != Some(ack_id) {
            return None;
        }
        membership.pending = None;

        let event = match (membership.state, result) {
            (MembershipState::Joining | MembershipState::Rejoining, Ok(reply)) => {
                let rejoin = membership.state == MembershipState::Rejoining;
                membership.state = MembershipState::Joined;
                membership.joined_at = Some(now);
                tracing::info!(channel = %channel_id, rejoin, "joined");
                MembershipEvent::Joined { channel_id, online: reply.online, rejoin }
            },
            (MembershipState::Joining, Err(err)) => {
                self.channels.remove(&channel_id);
                let error = JoinError::from_ack(channel_id.clone(), err);
                tracing::warn!(%error, "join failed");
                MembershipEvent::JoinFailed { channel_id, error }
            },
            (MembershipState::Rejoining, Err(err)) => {
                membership.state = MembershipState::Stale;
                let error = JoinError::from_ack(channel_id.clone(), err);
                tracing::warn!(%error, "rejoin failed");
                MembershipEvent::JoinFailed { channel_id, error }
            },
            (MembershipState::Leaving, Ok(_)) => {
                self.channels.remove(&channel_id);
                tracing::info!(channel = %channel_id, "left");
                MembershipEvent::Left { channel_id }
            },
            (MembershipState::Leaving, Err(err)) => {
                membership.state = membership.resume;
                let error = LeaveError::from_ack(channel_id.clone(), err);
                tracing::warn!(%error, "leave failed");
                MembershipEvent::LeaveFailed { channel_id, error }
            },
            (MembershipState::Joined | MembershipState::Stale, _) => return None,
        };

        Some(event)
    }

    /// Mark memberships stale after the connection drops.
    ///
    /// In-flight leaves complete locally. In-flight joins keep waiting and
    /// resolve through their acknowledgement deadline.
    pub fn connection_lost(&mut self) -> Vec<MembershipEvent> {
        let mut events = Vec::new();
        let mut left = Vec::new();

        for membership in self.channels.values_mut() {
            match membership.state {
                MembershipState::Joined => membership.state = MembershipState::Stale,
                MembershipState::Leaving => left.push(membership.channel_id.clone()),
                MembershipState::Joining | MembershipState::Rejoining | MembershipState::Stale => {},
            }
        }

        for channel_id in left {
            self.remove(&channel_id);
            events.push(MembershipEvent::Left { channel_id });
        }
        events
    }

    /// Rejoin every stale channel after a reconnect.
    pub fn rejoin_all(
        &mut self,
        user: &UserId,
        conn: &mut ConnectionManager<I>,
        now: I,
        wall_ms: i64,
    ) -> (Vec<ConnectionAction>, Vec<MembershipEvent>) {
        let stale: Vec<ChannelId> = self
            .channels
            .values()
            .filter(|m| m.state == MembershipState::Stale)
            .map(|m| m.channel_id.clone())
            .collect();

        let mut actions = Vec::new();
        let mut events = Vec::new();
        for channel_id in stale {
            match self.join(&channel_id, user, conn, now, wall_ms) {
                Ok(Some(action)) => actions.push(action),
                Ok(None) => {},
                Err(error) => events.push(MembershipEvent::JoinFailed { channel_id, error }),
            }
        }
        (actions, events)
    }

    /// Membership record for `channel`.
    pub fn get(&self, channel: &ChannelId) -> Option<&ChannelMembership<I>> {
        self.channels.get(channel)
    }

    /// Whether `channel` is joined and live.
    pub fn is_live(&self, channel: &ChannelId) -> bool {
        self.channels.get(channel).is_some_and(ChannelMembership::is_live)
    }

    /// All memberships, ordered by channel id.
    pub fn iter(&self) -> impl Iterator<Item = &ChannelMembership<I>> {
        self.channels.values()
    }

    fn track_ack(&mut self, channel: &ChannelId, state: MembershipState, ack_id: AckId) {
        match self.channels.get_mut(channel) {
            Some(membership) => {
                membership.state = state;
                membership.pending = Some(ack_id);
            },
            None => {
                let membership = ChannelMembership::new(channel.clone(), state, ack_id);
                self.channels.insert(channel.clone(), membership);
            },
        }
        self.by_ack.insert(ack_id, channel.clone());
    }

    fn remove(&mut self, channel: &ChannelId) {
        if let Some(ack_id) = self.channels.remove(channel).and_then(|m| m.pending) {
            self.by_ack.remove(&ack_id);
        }
    }
}

fn membership_payload(channel: &ChannelId, user: &UserId, wall_ms: i64) -> MembershipPayload {
    MembershipPayload { channel_id: channel.clone(), user_id: user.clone(), timestamp: wall_ms }
}

fn join_event(channel: &ChannelId, user: &UserId, wall_ms: i64) -> Event {
    Event::Join {
        resource: PROJECT_RESOURCE.to_owned(),
        payload: membership_payload(channel, user, wall_ms),
    }
}
