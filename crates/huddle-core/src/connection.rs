//! Connection manager state machine.
//!
//! Owns the single connection to the relay: authentication, automatic
//! reconnection, and correlation of acknowledged requests. Uses the action
//! pattern: methods take time as input and return actions for the driver to
//! execute.
//!
//! # State Machine
//!
//! ```text
//!                 connect(token)              opened
//! ┌──────────────┐ ─────────────> ┌────────────┐ ─────> ┌───────────┐
//! │ Disconnected │                │ Connecting │        │ Connected │
//! └──────────────┘ <───────────── └────────────┘        └───────────┘
//!        ↑   ↑      rejected / failed                      │      ↑
//!        │   │                                      closed │      │ opened
//!        │   │   attempts exhausted / rejected             ↓      │
//!        │   └──────────────────────────────────── ┌──────────────┐
//!        └──────────── disconnect() (any state) ── │ Reconnecting │
//!                                                  └──────────────┘
//! ```
//!
//! A rejected handshake is terminal: no retry happens until the caller
//! supplies a token and calls [`ConnectionManager::connect`] again.
//!
//! Pending acknowledgements are not cancelled by a disconnect. They resolve
//! as timeouts on a later [`ConnectionManager::tick`] if no answer arrives.

use std::{collections::BTreeMap, fmt, time::Duration};

use huddle_proto::{AckId, AckReply, Event, EventName, WireMessage};

use crate::{
    env::MonotonicInstant,
    error::{AckError, ConnectionError, TimeoutError},
};

/// Time to wait for an acknowledgement before reporting a timeout.
pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(5);

/// Reconnect attempts made after an unexpected close.
pub const DEFAULT_RECONNECT_ATTEMPTS: u32 = 5;

/// Delay before each reconnect attempt.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// Bearer credential presented when opening the transport.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken(String);

impl SessionToken {
    /// Wraps a raw token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Raw token text.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionToken(..)")
    }
}

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No transport and no retry scheduled
    Disconnected,
    /// First transport open in progress
    Connecting,
    /// Transport open and authenticated
    Connected,
    /// Transport lost unexpectedly; retries scheduled
    Reconnecting,
}

/// Delay growth between reconnect attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Same delay before every attempt
    Fixed,
    /// Delay doubles per attempt, capped at `max_delay`
    Exponential {
        /// Upper bound on a single delay
        max_delay: Duration,
    },
}

/// Reconnection limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Attempts before giving up; zero disables reconnection
    pub max_attempts: u32,
    /// Base delay before an attempt
    pub delay: Duration,
    /// Delay growth
    pub backoff: Backoff,
}

impl ReconnectPolicy {
    /// Delay before the given 1-based attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.delay,
            Backoff::Exponential { max_delay } => {
                let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
                self.delay.saturating_mul(factor).min(max_delay)
            },
        }
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_RECONNECT_ATTEMPTS,
            delay: DEFAULT_RECONNECT_DELAY,
            backoff: Backoff::Fixed,
        }
    }
}

/// Connection configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Default acknowledgement deadline
    pub ack_timeout: Duration,
    /// Reconnection limits
    pub reconnect: ReconnectPolicy,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self { ack_timeout: DEFAULT_ACK_TIMEOUT, reconnect: ReconnectPolicy::default() }
    }
}

/// Actions returned by the connection manager.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionAction {
    /// Open the transport, authenticating with `token`
    Open {
        /// Credential for the handshake
        token: SessionToken,
        /// 0 for the initial connect, otherwise the reconnect attempt number
        attempt: u32,
    },
    /// Close the transport
    Close,
    /// Write this frame to the transport
    Send(WireMessage),
    /// Connection state changed
    StateChanged(ConnectionState),
    /// Connection came back after an unexpected close
    Reconnected,
    /// An acknowledged request settled without an ack frame (timeout)
    AckResolved {
        /// Correlation id
        ack_id: AckId,
        /// Event that was waiting
        event: EventName,
        /// Outcome
        result: Result<AckReply, AckError>,
    },
    /// Connection failed and will not retry
    Failed(ConnectionError),
}

/// Classification of an inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Server-pushed event
    Event(Event),
    /// Answer to one of our acknowledged requests
    Ack {
        /// Correlation id
        ack_id: AckId,
        /// Event that was waiting
        event: EventName,
        /// Outcome
        result: Result<AckReply, AckError>,
    },
    /// Ack for a request we no longer track (already timed out)
    Ignored,
}

#[derive(Debug, Clone)]
struct PendingAck<I> {
    event: EventName,
    deadline: I,
    timeout: Duration,
}

/// Connection manager.
///
/// This is a pure state machine: no I/O, no clock. Generic over `Instant` so
/// tests can drive it with virtual time.
#[derive(Debug, Clone)]
pub struct ConnectionManager<I: MonotonicInstant> {
    state: ConnectionState,
    config: ConnectionConfig,
    /// Most recent credential, replaced before each reconnect attempt
    token: Option<SessionToken>,
    /// Current reconnect attempt (0 when not reconnecting)
    attempt: u32,
    /// When the next reconnect attempt fires; `None` while one is in flight
    next_attempt_at: Option<I>,
    pending: BTreeMap<AckId, PendingAck<I>>,
    next_ack_id: u64,
}

impl<I: MonotonicInstant> ConnectionManager<I> {
    /// Create a manager in [`ConnectionState::Disconnected`].
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            config,
            token: None,
            attempt: 0,
            next_attempt_at: None,
            pending: BTreeMap::new(),
            next_ack_id: 1,
        }
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Whether frames can be sent right now.
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Active configuration
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Current reconnect attempt, if reconnecting.
    pub fn reconnect_attempt(&self) -> Option<u32> {
        (self.state == ConnectionState::Reconnecting).then_some(self.attempt)
    }

    /// Number of acknowledgements still outstanding.
    pub fn pending_acks(&self) -> usize {
        self.pending.len()
    }

    /// Whether `ack_id` is still awaiting an answer.
    pub fn is_pending(&self, ack_id: AckId) -> bool {
        self.pending.contains_key(&ack_id)
    }

    /// Replace the credential used for the next (re)connect attempt.
    pub fn set_token(&mut self, token: Option<SessionToken>) {
        self.token = token;
    }

    /// Begin connecting.
    ///
    /// Idempotent: a no-op while connecting, connected or reconnecting.
    ///
    /// # Errors
    ///
    /// - `ConnectionError::MissingToken` if `token` is `None`; the state stays
    ///   [`ConnectionState::Disconnected`] and nothing is retried
    pub fn connect(
        &mut self,
        token: Option<SessionToken>,
    ) -> Result<Vec<ConnectionAction>, ConnectionError> {
        if self.state != ConnectionState::Disconnected {
            tracing::debug!(state = ?self.state, "connect ignored, already active");
            return Ok(vec![]);
        }

        let Some(token) = token else {
            tracing::warn!("connect refused: no session token");
            return Err(ConnectionError::MissingToken);
        };

        self.token = Some(token.clone());
        self.attempt = 0;
        self.next_attempt_at = None;
        self.state = ConnectionState::Connecting;

        Ok(vec![
            ConnectionAction::StateChanged(ConnectionState::Connecting),
            ConnectionAction::Open { token, attempt: 0 },
        ])
    }

    /// The transport finished its handshake.
    pub fn transport_opened(&mut self) -> Vec<ConnectionAction> {
        let was_reconnect = match self.state {
            ConnectionState::Connecting => false,
            ConnectionState::Reconnecting => true,
            ConnectionState::Connected | ConnectionState::Disconnected => {
                tracing::debug!(state = ?self.state, "stale transport open ignored");
                return vec![];
            },
        };

        if was_reconnect {
            tracing::info!(attempt = self.attempt, "reconnected");
        } else {
            tracing::info!("connected");
        }

        self.state = ConnectionState::Connected;
        self.attempt = 0;
        self.next_attempt_at = None;

        let mut actions = vec![ConnectionAction::StateChanged(ConnectionState::Connected)];
        if was_reconnect {
            actions.push(ConnectionAction::Reconnected);
        }
        actions
    }

    /// The server refused the handshake. Terminal until the caller reconnects.
    pub fn transport_rejected(&mut self, reason: impl Into<String>) -> Vec<ConnectionAction> {
        let reason = reason.into();
        tracing::warn!(%reason, state = ?self.state, "handshake rejected");

        self.state = ConnectionState::Disconnected;
        self.attempt = 0;
        self.next_attempt_at = None;

        vec![
            ConnectionAction::StateChanged(ConnectionState::Disconnected),
            ConnectionAction::Failed(ConnectionError::HandshakeRejected { reason }),
        ]
    }

    /// The transport closed without us asking.
    pub fn transport_closed(&mut self, reason: &str, now: I) -> Vec<ConnectionAction> {
        match self.state {
            ConnectionState::Disconnected => vec![],
            ConnectionState::Connecting => {
                tracing::warn!(%reason, "initial connect failed");
                self.state = ConnectionState::Disconnected;
                vec![
                    ConnectionAction::StateChanged(ConnectionState::Disconnected),
                    ConnectionAction::Failed(ConnectionError::Transport(reason.to_owned())),
                ]
            },
            ConnectionState::Connected => {
                tracing::warn!(%reason, "connection lost");
                self.attempt = 0;
                self.schedule_next_attempt(now)
            },
            ConnectionState::Reconnecting => {
                if self.next_attempt_at.is_some() {
                    // No attempt in flight; nothing to fail.
                    return vec![];
                }
                tracing::warn!(attempt = self.attempt, %reason, "reconnect attempt failed");
                self.schedule_next_attempt(now)
            },
        }
    }

    /// Close the connection on purpose. No reconnect follows.
    pub fn disconnect(&mut self) -> Vec<ConnectionAction> {
        if self.state == ConnectionState::Disconnected {
            return vec![];
        }

        tracing::info!(state = ?self.state, "disconnecting");
        self.state = ConnectionState::Disconnected;
        self.attempt = 0;
        self.next_attempt_at = None;

        vec![ConnectionAction::Close, ConnectionAction::StateChanged(ConnectionState::Disconnected)]
    }

    /// Whether the next [`tick`](Self::tick) will fire a reconnect attempt.
    ///
    /// Callers refresh the token with [`set_token`](Self::set_token) when this
    /// returns true, so each attempt authenticates with the latest credential.
    pub fn reconnect_due(&self, now: I) -> bool {
        self.state == ConnectionState::Reconnecting
            && self.next_attempt_at.is_some_and(|at| now >= at)
    }

    /// Process periodic maintenance: acknowledgement deadlines and reconnects.
    pub fn tick(&mut self, now: I) -> Vec<ConnectionAction> {
        let mut actions = Vec::new();

        let expired: Vec<AckId> = self
            .pending
            .iter()
            .filter(|(_, pending)| now >= pending.deadline)
            .map(|(id, _)| *id)
            .collect();

        for ack_id in expired {
            if let Some(pending) = self.pending.remove(&ack_id) {
                tracing::debug!(%ack_id, event = %pending.event, "ack timed out");
                let timeout = TimeoutError {
                    event: pending.event.clone(),
                    ack_id,
                    waited: pending.timeout,
                };
                actions.push(ConnectionAction::AckResolved {
                    ack_id,
                    event: pending.event,
                    result: Err(AckError::Timeout(timeout)),
                });
            }
        }

        if self.reconnect_due(now) {
            self.next_attempt_at = None;
            match self.token.clone() {
                Some(token) => {
                    tracing::info!(attempt = self.attempt, "reconnect attempt");
                    actions.push(ConnectionAction::Open { token, attempt: self.attempt });
                },
                None => {
                    tracing::warn!("reconnect abandoned: no session token");
                    self.state = ConnectionState::Disconnected;
                    self.attempt = 0;
                    actions.push(ConnectionAction::StateChanged(ConnectionState::Disconnected));
                    actions.push(ConnectionAction::Failed(ConnectionError::MissingToken));
                },
            }
        }

        actions
    }

    /// Send a fire-and-forget event.
    ///
    /// # Errors
    ///
    /// - `ConnectionError::NotConnected` unless [`ConnectionState::Connected`]
    /// - `ConnectionError::Protocol` if the event cannot be encoded
    pub fn send(&mut self, event: Event) -> Result<ConnectionAction, ConnectionError> {
        self.ensure_connected()?;
        let envelope = event.into_envelope(None)?;
        Ok(ConnectionAction::Send(WireMessage::Event(envelope)))
    }

    /// Send an event and register a deadline for its acknowledgement.
    ///
    /// The outcome arrives later as [`Inbound::Ack`] from
    /// [`handle_frame`](Self::handle_frame) or as
    /// [`ConnectionAction::AckResolved`] from [`tick`](Self::tick).
    ///
    /// # Errors
    ///
    /// - `ConnectionError::NotConnected` unless [`ConnectionState::Connected`]
    /// - `ConnectionError::Protocol` if the event cannot be encoded
    /// - `ConnectionError::TimeoutOutOfRange` if `now + timeout` overflows
    pub fn send_with_ack(
        &mut self,
        event: Event,
        timeout: Option<Duration>,
        now: I,
    ) -> Result<(AckId, ConnectionAction), ConnectionError> {
        self.ensure_connected()?;

        let timeout = timeout.unwrap_or(self.config.ack_timeout);
        let deadline =
            now.checked_add(timeout).ok_or(ConnectionError::TimeoutOutOfRange { timeout })?;

        let ack_id = AckId(self.next_ack_id);
        let name = event.name();
        let envelope = event.into_envelope(Some(ack_id))?;
        self.next_ack_id += 1;

        self.pending.insert(ack_id, PendingAck { event: name, deadline, timeout });

        Ok((ack_id, ConnectionAction::Send(WireMessage::Event(envelope))))
    }

    /// Decode and classify an inbound frame.
    ///
    /// # Errors
    ///
    /// - `ConnectionError::Protocol` if the frame or its payload is malformed
    pub fn handle_frame(&mut self, text: &str) -> Result<Inbound, ConnectionError> {
        match WireMessage::decode(text)? {
            WireMessage::Event(envelope) => Ok(Inbound::Event(Event::from_envelope(&envelope)?)),
            WireMessage::Ack(frame) => {
                let Some(pending) = self.pending.remove(&frame.ack) else {
                    tracing::debug!(ack_id = %frame.ack, "late or unknown ack ignored");
                    return Ok(Inbound::Ignored);
                };

                let result = if frame.data.ok {
                    Ok(frame.data)
                } else {
                    Err(AckError::Rejected {
                        reason: frame.data.reason.unwrap_or_else(|| "rejected".to_owned()),
                    })
                };

                Ok(Inbound::Ack { ack_id: frame.ack, event: pending.event, result })
            },
        }
    }

    fn ensure_connected(&self) -> Result<(), ConnectionError> {
        if self.state == ConnectionState::Connected {
            Ok(())
        } else {
            Err(ConnectionError::NotConnected { state: self.state })
        }
    }

    fn schedule_next_attempt(&mut self, now: I) -> Vec<ConnectionAction> {
        let policy = self.config.reconnect;

        if self.attempt >= policy.max_attempts {
            return self.give_up();
        }

        let Some(next_attempt_at) = now.checked_add(policy.delay_for(self.attempt + 1)) else {
            tracing::warn!(attempt = self.attempt + 1, "reconnect delay out of range");
            return self.give_up();
        };

        let entering = self.state != ConnectionState::Reconnecting;
        self.state = ConnectionState::Reconnecting;
        self.attempt += 1;
        self.next_attempt_at = Some(next_attempt_at);

        if entering {
            vec![ConnectionAction::StateChanged(ConnectionState::Reconnecting)]
        } else {
            vec![]
        }
    }

    fn give_up(&mut self) -> Vec<ConnectionAction> {
        let attempts = self.attempt;
        tracing::warn!(attempts, "giving up on reconnect");
        self.state = ConnectionState::Disconnected;
        self.attempt = 0;
        self.next_attempt_at = None;
        vec![
            ConnectionAction::StateChanged(ConnectionState::Disconnected),
            ConnectionAction::Failed(ConnectionError::ReconnectExhausted { attempts }),
        ]
    }
}
