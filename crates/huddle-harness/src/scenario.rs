//! Multi-client scenarios against the simulated relay.
//!
//! A [`Scenario`] owns several sans-IO [`Client`]s, one shared [`SimEnv`]
//! and a [`SimRelay`]. Every operation runs the client, then pumps frames
//! between clients and relay until nothing moves, so assertions always see a
//! quiescent system. Time only advances through [`Scenario::advance`].

use std::{
    collections::{BTreeMap, VecDeque},
    time::Duration,
};

use huddle_client::{
    Client, ClientAction, ClientConfig, ClientError, ClientEvent, CommandProjection, Identity,
    TransportEvent,
};
use huddle_core::Environment;
use huddle_proto::{ChannelId, UserId};

use crate::{
    RecordingServices, SimEnv, SimRelay,
    invariants::{ClientSnapshot, InvariantRegistry, SystemSnapshot},
};

/// Pump rounds before a scenario is considered livelocked.
const MAX_PUMP_ROUNDS: usize = 1_000;

/// One simulated user.
struct Participant {
    client: Client<SimEnv>,
    services: RecordingServices,
    log: Vec<ClientAction>,
    errors: Vec<ClientError>,
}

/// Several clients talking through one simulated relay.
pub struct Scenario {
    env: SimEnv,
    relay: SimRelay,
    participants: BTreeMap<UserId, Participant>,
    invariants: Option<InvariantRegistry>,
}

impl Default for Scenario {
    fn default() -> Self {
        Self::new(0)
    }
}

impl std::fmt::Debug for Scenario {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scenario")
            .field("env", &self.env)
            .field("users", &self.participants.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl Scenario {
    /// Empty scenario with a seeded environment.
    pub fn new(seed: u64) -> Self {
        Self {
            env: SimEnv::with_seed(seed),
            relay: SimRelay::new(),
            participants: BTreeMap::new(),
            invariants: None,
        }
    }

    /// Check invariants after every operation.
    #[must_use]
    pub fn with_invariants(mut self, registry: InvariantRegistry) -> Self {
        self.invariants = Some(registry);
        self
    }

    /// Add a user with default configuration and a roster of `members`
    /// (id, display) for mention resolution.
    pub fn add_user(&mut self, user: &str, members: &[(&str, &str)]) -> &mut Self {
        let config = ClientConfig::new(Identity::new(user));
        self.add_user_with_config(config, members)
    }

    /// Add a user with an explicit configuration.
    pub fn add_user_with_config(
        &mut self,
        config: ClientConfig,
        members: &[(&str, &str)],
    ) -> &mut Self {
        let user = config.identity.user_id.clone();
        let services = members.iter().fold(
            RecordingServices::new(&format!("token-{user}")),
            |services, (id, display)| services.with_member(id, display),
        );
        let client = Client::new(self.env.clone(), config, services.collaborators());
        self.participants
            .insert(user, Participant { client, services, log: Vec::new(), errors: Vec::new() });
        self
    }

    /// Shared environment.
    pub fn env(&self) -> &SimEnv {
        &self.env
    }

    /// The relay.
    pub fn relay(&self) -> &SimRelay {
        &self.relay
    }

    /// The relay, for knobs.
    pub fn relay_mut(&mut self) -> &mut SimRelay {
        &mut self.relay
    }

    /// Client of `user`.
    ///
    /// # Panics
    ///
    /// Panics if `user` was never added.
    #[allow(clippy::panic, reason = "test harness accessor")]
    pub fn client(&self, user: &str) -> &Client<SimEnv> {
        match self.participants.get(&UserId::from(user)) {
            Some(p) => &p.client,
            None => panic!("unknown user {user}"),
        }
    }

    /// Services of `user`.
    ///
    /// # Panics
    ///
    /// Panics if `user` was never added.
    #[allow(clippy::panic, reason = "test harness accessor")]
    pub fn services(&self, user: &str) -> &RecordingServices {
        match self.participants.get(&UserId::from(user)) {
            Some(p) => &p.services,
            None => panic!("unknown user {user}"),
        }
    }

    /// Every action `user`'s client produced, in order.
    pub fn log(&self, user: &str) -> &[ClientAction] {
        self.participants.get(&UserId::from(user)).map_or(&[], |p| p.log.as_slice())
    }

    /// Forget the recorded actions of every user.
    pub fn clear_logs(&mut self) {
        for participant in self.participants.values_mut() {
            participant.log.clear();
        }
    }

    /// Errors the client of `user` returned while pumping.
    pub fn errors(&self, user: &str) -> &[ClientError] {
        self.participants.get(&UserId::from(user)).map_or(&[], |p| p.errors.as_slice())
    }

    /// Run `op` against `user`'s client and pump until quiet.
    ///
    /// Returns the error `op` itself returned, if any.
    pub fn act<F>(&mut self, user: &str, op: F) -> Result<(), ClientError>
    where
        F: FnOnce(&mut Client<SimEnv>) -> Result<Vec<ClientAction>, ClientError>,
    {
        let user = UserId::from(user);
        let Some(participant) = self.participants.get_mut(&user) else {
            return Ok(());
        };
        let actions = op(&mut participant.client)?;

        let mut queue = VecDeque::new();
        queue.extend(actions.into_iter().map(|a| (user.clone(), a)));
        self.pump(queue);
        Ok(())
    }

    /// Connect `user`.
    pub fn connect(&mut self, user: &str) -> Result<(), ClientError> {
        self.act(user, Client::connect)
    }

    /// Close `user`'s connection on purpose.
    pub fn disconnect(&mut self, user: &str) -> Result<(), ClientError> {
        self.act(user, |client| Ok(client.disconnect()))
    }

    /// `user` joins `channel`.
    pub fn join(&mut self, user: &str, channel: &str) -> Result<(), ClientError> {
        let channel = ChannelId::from(channel);
        self.act(user, |client| client.join(&channel))
    }

    /// `user` leaves `channel`.
    pub fn leave(&mut self, user: &str, channel: &str) -> Result<(), ClientError> {
        let channel = ChannelId::from(channel);
        self.act(user, |client| client.leave(&channel))
    }

    /// `user` sends `text` to `channel`.
    pub fn send(&mut self, user: &str, channel: &str, text: &str) -> Result<(), ClientError> {
        let channel = ChannelId::from(channel);
        self.act(user, |client| client.submit_plain_message(&channel, text))
    }

    /// `user` types `input` into `channel`'s composer.
    pub fn compose(&mut self, user: &str, channel: &str, input: &str) -> CommandProjection {
        let channel = ChannelId::from(channel);
        match self.participants.get_mut(&UserId::from(user)) {
            Some(p) => p.client.begin_command(&channel, input),
            None => CommandProjection::idle(),
        }
    }

    /// `user` types `input` into `channel`'s composer and confirms it.
    pub fn command(&mut self, user: &str, channel: &str, input: &str) -> Result<(), ClientError> {
        self.compose(user, channel, input);
        let channel = ChannelId::from(channel);
        self.act(user, |client| client.confirm_command(&channel))
    }

    /// Everyone joins `channel`, in the order given.
    pub fn connect_and_join(&mut self, users: &[&str], channel: &str) -> Result<(), ClientError> {
        for user in users {
            self.connect(user)?;
            self.join(user, channel)?;
        }
        Ok(())
    }

    /// The relay drops `user`'s connection.
    pub fn drop_connection(&mut self, user: &str) {
        let user = UserId::from(user);
        self.relay.disconnect(&user);
        self.deliver(&user, TransportEvent::Closed { reason: "connection reset".to_owned() });
    }

    /// Advance virtual time by `duration`, tick every client and pump.
    pub fn advance(&mut self, duration: Duration) {
        self.env.advance(duration);
        let now = self.env.now();
        let users: Vec<UserId> = self.participants.keys().cloned().collect();
        for user in users {
            self.feed(&user, ClientEvent::Tick { now });
        }
    }

    /// Snapshot of every client.
    pub fn snapshot(&self) -> SystemSnapshot {
        SystemSnapshot::from_clients(
            self.participants.values().map(|p| ClientSnapshot::from_client(&p.client)).collect(),
        )
    }

    fn deliver(&mut self, user: &UserId, event: TransportEvent) {
        self.feed(user, ClientEvent::Transport(event));
    }

    fn feed(&mut self, user: &UserId, event: ClientEvent<<SimEnv as Environment>::Instant>) {
        let mut queue = VecDeque::new();
        self.handle(user, event, &mut queue);
        self.pump(queue);
    }

    fn handle(
        &mut self,
        user: &UserId,
        event: ClientEvent<<SimEnv as Environment>::Instant>,
        queue: &mut VecDeque<(UserId, ClientAction)>,
    ) {
        let Some(participant) = self.participants.get_mut(user) else {
            return;
        };
        match participant.client.handle(event) {
            Ok(actions) => queue.extend(actions.into_iter().map(|a| (user.clone(), a))),
            Err(e) => {
                tracing::debug!(%user, error = %e, "client error during scenario");
                participant.errors.push(e);
            },
        }
    }

    /// Execute client actions and deliver relay output until quiet.
    #[allow(clippy::panic, reason = "livelock is a harness failure")]
    fn pump(&mut self, mut queue: VecDeque<(UserId, ClientAction)>) {
        for _ in 0..MAX_PUMP_ROUNDS {
            while let Some((user, action)) = queue.pop_front() {
                self.execute(&user, action, &mut queue);
            }

            let users: Vec<UserId> = self.participants.keys().cloned().collect();
            for user in users {
                for frame in self.relay.take_outbox(&user) {
                    let event = ClientEvent::Transport(TransportEvent::Frame(frame));
                    self.handle(&user, event, &mut queue);
                }
            }

            if queue.is_empty() {
                self.check_invariants();
                return;
            }
        }
        panic!("scenario did not settle after {MAX_PUMP_ROUNDS} rounds");
    }

    fn execute(
        &mut self,
        user: &UserId,
        action: ClientAction,
        queue: &mut VecDeque<(UserId, ClientAction)>,
    ) {
        match &action {
            ClientAction::Send(message) => match message.encode() {
                Ok(frame) => self.relay.receive(user, &frame),
                Err(e) => tracing::warn!(%user, error = %e, "scenario failed to encode frame"),
            },
            ClientAction::OpenTransport { token, .. } => {
                let event = self.relay.connect(user, token);
                self.handle(user, ClientEvent::Transport(event), queue);
            },
            ClientAction::CloseTransport => self.relay.disconnect(user),
            _ => {},
        }

        if let Some(participant) = self.participants.get_mut(user) {
            participant.log.push(action);
        }
    }

    fn check_invariants(&self) {
        if let Some(registry) = &self.invariants {
            registry.assert_all(&self.snapshot(), "after scenario step");
        }
    }
}
