//! Client configuration.

use std::time::Duration;

use huddle_commands::Markers;
use huddle_core::{ConnectionConfig, PresenceConfig};
use huddle_proto::UserId;

/// Minimum gap between outgoing typing notifications for one channel.
pub const DEFAULT_TYPING_INTERVAL: Duration = Duration::from_secs(3);

/// The signed-in member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Member id
    pub user_id: UserId,
    /// Display name stamped on outgoing messages
    pub display: String,
}

impl Identity {
    /// Identity whose display name equals its id.
    pub fn new(user_id: impl Into<String>) -> Self {
        let user_id = user_id.into();
        Self { display: user_id.clone(), user_id: UserId::new(user_id) }
    }
}

/// Where command results come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RelayMode {
    /// Results are synthesized locally once the command is sent
    #[default]
    Local,
    /// The server acknowledges each command and assigns its result id
    Remote,
}

/// Client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Signed-in member
    pub identity: Identity,
    /// Ack timeout and reconnect policy
    pub connection: ConnectionConfig,
    /// Typing indicator lifetime
    pub presence: PresenceConfig,
    /// Command result source
    pub relay: RelayMode,
    /// Command and mention markers
    pub markers: Markers,
    /// Throttle for outgoing typing notifications
    pub typing_interval: Duration,
}

impl ClientConfig {
    /// Defaults for `identity`.
    pub fn new(identity: Identity) -> Self {
        Self {
            identity,
            connection: ConnectionConfig::default(),
            presence: PresenceConfig::default(),
            relay: RelayMode::default(),
            markers: Markers::default(),
            typing_interval: DEFAULT_TYPING_INTERVAL,
        }
    }
}
