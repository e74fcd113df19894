//! Presence tracking per channel.
//!
//! A channel's online set is only trustworthy after the join acknowledgement
//! delivers a full snapshot. Until then the channel is
//! [`PresenceSync::Unknown`], the online set reads as empty, and incoming
//! online/offline events are buffered. When the snapshot lands, buffered
//! events are replayed on top of it in arrival order.
//!
//! Any connection loss returns every channel to `Unknown`; the snapshot from
//! the rejoin acknowledgement replaces the stale view wholesale.

use std::{
    collections::{BTreeSet, HashMap},
    time::Duration,
};

use huddle_proto::{ChannelId, UserId};

use crate::env::MonotonicInstant;

/// How long a typing notification stays visible without a refresh.
pub const DEFAULT_TYPING_TTL: Duration = Duration::from_secs(5);

/// Presence configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresenceConfig {
    /// Lifetime of a typing notification
    pub typing_ttl: Duration,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self { typing_ttl: DEFAULT_TYPING_TTL }
    }
}

/// Whether a channel's online set reflects the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceSync {
    /// No snapshot yet (or invalidated by a disconnect)
    Unknown,
    /// Snapshot applied; live events keep it current
    Synced,
}

/// An online/offline transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenceChange {
    /// Member came online
    Online {
        /// Member
        user: UserId,
        /// Display name, when known
        display: Option<String>,
    },
    /// Member went offline
    Offline {
        /// Member
        user: UserId,
        /// Display name, when known
        display: Option<String>,
    },
}

impl PresenceChange {
    /// Member the change concerns.
    pub fn user(&self) -> &UserId {
        match self {
            Self::Online { user, .. } | Self::Offline { user, .. } => user,
        }
    }
}

#[derive(Debug)]
struct ChannelPresence<I> {
    sync: PresenceSync,
    online: BTreeSet<UserId>,
    typing: HashMap<UserId, I>,
    buffered: Vec<PresenceChange>,
}

impl<I> ChannelPresence<I> {
    fn unknown() -> Self {
        Self {
            sync: PresenceSync::Unknown,
            online: BTreeSet::new(),
            typing: HashMap::new(),
            buffered: Vec::new(),
        }
    }

    fn apply(&mut self, change: &PresenceChange) -> bool {
        match change {
            PresenceChange::Online { user, .. } => self.online.insert(user.clone()),
            PresenceChange::Offline { user, .. } => {
                self.typing.remove(user);
                self.online.remove(user)
            },
        }
    }
}

/// Online and typing state for every tracked channel.
#[derive(Debug)]
pub struct PresenceTracker<I: MonotonicInstant> {
    channels: HashMap<ChannelId, ChannelPresence<I>>,
    config: PresenceConfig,
}

impl<I: MonotonicInstant> PresenceTracker<I> {
    /// Tracker with no channels.
    pub fn new(config: PresenceConfig) -> Self {
        Self { channels: HashMap::new(), config }
    }

    /// Start tracking `channel` in the `Unknown` state. No-op if tracked.
    pub fn track(&mut self, channel: &ChannelId) {
        self.channels.entry(channel.clone()).or_insert_with(ChannelPresence::unknown);
    }

    /// Stop tracking `channel`.
    pub fn forget(&mut self, channel: &ChannelId) {
        self.channels.remove(channel);
    }

    /// Apply a live online/offline event.
    ///
    /// Returns true if the visible online set changed. Events for an
    /// `Unknown` channel are buffered and return false.
    pub fn apply(&mut self, channel: &ChannelId, change: PresenceChange) -> bool {
        let Some(presence) = self.channels.get_mut(channel) else {
            tracing::trace!(%channel, "presence for untracked channel ignored");
            return false;
        };

        match presence.sync {
            PresenceSync::Unknown => {
                presence.buffered.push(change);
                false
            },
            PresenceSync::Synced => presence.apply(&change),
        }
    }

    /// Install the authoritative snapshot, then replay buffered events.
    ///
    /// Returns the replayed changes that altered the set, in order.
    pub fn sync(
        &mut self,
        channel: &ChannelId,
        online: impl IntoIterator<Item = UserId>,
    ) -> Vec<PresenceChange> {
        let presence = self.channels.entry(channel.clone()).or_insert_with(ChannelPresence::unknown);

        presence.online = online.into_iter().collect();
        presence.typing.clear();
        presence.sync = PresenceSync::Synced;

        let buffered = std::mem::take(&mut presence.buffered);
        tracing::debug!(
            %channel,
            online = presence.online.len(),
            replayed = buffered.len(),
            "presence synced"
        );

        buffered.into_iter().filter(|change| presence.apply(change)).collect()
    }

    /// Record that `user` is typing. Ignored unless the channel is synced.
    ///
    /// Returns true if the user was not already shown as typing.
    pub fn typing(&mut self, channel: &ChannelId, user: UserId, now: I) -> bool {
        let ttl = self.config.typing_ttl;
        match self.channels.get_mut(channel) {
            Some(presence) if presence.sync == PresenceSync::Synced => {
                let Some(deadline) = now.checked_add(ttl) else {
                    tracing::warn!(%channel, ?ttl, "typing ttl out of range");
                    return false;
                };
                let previous = presence.typing.insert(user, deadline);
                previous.is_none_or(|deadline| deadline <= now)
            },
            _ => false,
        }
    }

    /// Clear a typing indicator, e.g. once the user's message arrives.
    pub fn stop_typing(&mut self, channel: &ChannelId, user: &UserId) -> bool {
        self.channels
            .get_mut(channel)
            .is_some_and(|presence| presence.typing.remove(user).is_some())
    }

    /// Drop expired typing indicators. Returns channels whose set changed.
    pub fn expire_typing(&mut self, now: I) -> Vec<ChannelId> {
        let mut changed = Vec::new();
        for (channel, presence) in &mut self.channels {
            let before = presence.typing.len();
            presence.typing.retain(|_, deadline| *deadline > now);
            if presence.typing.len() != before {
                changed.push(channel.clone());
            }
        }
        changed.sort();
        changed
    }

    /// Invalidate every channel after a disconnect or reconnect.
    pub fn reset_all(&mut self) {
        for presence in self.channels.values_mut() {
            *presence = ChannelPresence::unknown();
        }
    }

    /// Sync state of `channel`; `Unknown` if untracked.
    pub fn sync_state(&self, channel: &ChannelId) -> PresenceSync {
        self.channels.get(channel).map_or(PresenceSync::Unknown, |presence| presence.sync)
    }

    /// Members online in `channel`. Empty unless synced.
    pub fn online_users(&self, channel: &ChannelId) -> BTreeSet<UserId> {
        match self.channels.get(channel) {
            Some(presence) if presence.sync == PresenceSync::Synced => presence.online.clone(),
            _ => BTreeSet::new(),
        }
    }

    /// Members typing in `channel` whose indicator has not expired.
    pub fn typing_users(&self, channel: &ChannelId, now: I) -> BTreeSet<UserId> {
        self.channels
            .get(channel)
            .map(|presence| {
                presence
                    .typing
                    .iter()
                    .filter(|(_, deadline)| **deadline > now)
                    .map(|(user, _)| user.clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}
