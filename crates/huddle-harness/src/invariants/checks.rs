//! Standard invariant checks.
//!
//! These invariants capture behavioral properties that must always hold.
//! They verify WHAT must be true, not specific test scenarios.

use std::collections::{BTreeMap, HashSet};

use huddle_proto::{ChannelId, MessageId};

use super::{Invariant, InvariantResult, SystemSnapshot, Violation};

/// Active channel must exist in the channels map.
///
/// If `active_channel` is `Some(id)`, then `channels` must contain `id`.
/// This prevents the UI from showing a selected channel that was left.
pub struct ActiveChannelJoined;

impl Invariant for ActiveChannelJoined {
    fn name(&self) -> &'static str {
        "active_channel_joined"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for client in &state.clients {
            let Some(active) = &client.active_channel else {
                continue;
            };
            if !client.channels.contains_key(active) {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!(
                        "client {}: active channel {} not in {:?}",
                        client.id,
                        active,
                        client.channels.keys().collect::<Vec<_>>()
                    ),
                });
            }
        }
        Ok(())
    }
}

/// A message id appears at most once in a channel's stream.
///
/// Optimistic appends and relay echoes share an id; a duplicate means
/// de-duplication failed.
pub struct UniqueMessageIds;

impl Invariant for UniqueMessageIds {
    fn name(&self) -> &'static str {
        "unique_message_ids"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for client in &state.clients {
            for (channel_id, channel) in &client.channels {
                let mut seen = HashSet::new();
                for id in &channel.message_ids {
                    if !seen.insert(id) {
                        return Err(Violation {
                            invariant: self.name(),
                            message: format!(
                                "client {} channel {channel_id}: message {id} appended twice",
                                client.id
                            ),
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

/// No channel is live while its client is disconnected.
///
/// Losing the connection must mark every membership stale until the rejoin
/// is acknowledged.
pub struct LiveRequiresConnection;

impl Invariant for LiveRequiresConnection {
    fn name(&self) -> &'static str {
        "live_requires_connection"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for client in state.clients.iter().filter(|c| !c.connected) {
            if let Some((channel_id, _)) = client.channels.iter().find(|(_, c)| c.live) {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!(
                        "client {} is disconnected but channel {channel_id} is live",
                        client.id
                    ),
                });
            }
        }
        Ok(())
    }
}

/// Online members are only reported from a synced presence snapshot.
///
/// Presence gathered before a disconnect must not survive it.
pub struct PresenceRequiresSync;

impl Invariant for PresenceRequiresSync {
    fn name(&self) -> &'static str {
        "presence_requires_sync"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for client in &state.clients {
            for (channel_id, channel) in &client.channels {
                if !channel.presence_synced && !channel.online.is_empty() {
                    return Err(Violation {
                        invariant: self.name(),
                        message: format!(
                            "client {} channel {channel_id}: {} online without a sync",
                            client.id,
                            channel.online.len()
                        ),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Clients that hold the same message id agree on its text.
///
/// Every copy of a message comes from one send, so bodies never diverge.
pub struct ConsistentMessageBodies;

impl Invariant for ConsistentMessageBodies {
    fn name(&self) -> &'static str {
        "consistent_message_bodies"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        let mut seen: BTreeMap<(&ChannelId, &MessageId), (&str, &str)> = BTreeMap::new();

        for client in &state.clients {
            for (channel_id, channel) in &client.channels {
                for (id, body) in &channel.bodies {
                    match seen.get(&(channel_id, id)).copied() {
                        None => {
                            seen.insert((channel_id, id), (client.id.as_str(), body.as_str()));
                        },
                        Some((other, first)) if first != body.as_str() => {
                            return Err(Violation {
                                invariant: self.name(),
                                message: format!(
                                    "channel {channel_id} message {id}: {other} has {first:?}, {} has {body:?}",
                                    client.id
                                ),
                            });
                        },
                        Some(_) => {},
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invariants::{ChannelSnapshot, ClientSnapshot};

    #[test]
    fn active_channel_must_be_joined() {
        let mut client = ClientSnapshot::new("alice");
        client.active_channel = Some(ChannelId::from("p9"));

        let result = ActiveChannelJoined.check(&SystemSnapshot::single(client));

        assert!(result.is_err());
    }

    #[test]
    fn duplicate_message_ids_violate() {
        let client = ClientSnapshot::new("alice").with_channel(
            "p1",
            ChannelSnapshot::live().with_message("m1", "hi").with_message("m1", "hi"),
        );

        let result = UniqueMessageIds.check(&SystemSnapshot::single(client));

        assert_eq!(result.unwrap_err().invariant, "unique_message_ids");
    }

    #[test]
    fn disconnected_client_with_live_channel_violates() {
        let client = ClientSnapshot::new("alice").with_channel("p1", ChannelSnapshot::live());

        assert!(LiveRequiresConnection.check(&SystemSnapshot::single(client)).is_err());
    }

    #[test]
    fn unsynced_presence_must_be_empty() {
        let channel = ChannelSnapshot::default().with_online(["bob"]);
        let client = ClientSnapshot::new("alice").with_channel("p1", channel);

        assert!(PresenceRequiresSync.check(&SystemSnapshot::single(client)).is_err());
    }

    #[test]
    fn diverging_bodies_violate() {
        let alice = ClientSnapshot::new("alice")
            .with_channel("p1", ChannelSnapshot::live().with_message("m1", "hi"));
        let bob = ClientSnapshot::new("bob")
            .with_channel("p1", ChannelSnapshot::live().with_message("m1", "bye"));

        let result = ConsistentMessageBodies.check(&SystemSnapshot::from_clients(vec![alice, bob]));

        assert!(result.is_err());
    }
}
