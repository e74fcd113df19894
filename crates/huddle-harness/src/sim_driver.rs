//! Simulation driver implementing the Driver trait.
//!
//! `SimDriver` provides the same interface as the terminal driver but for
//! deterministic testing. It implements [`Driver`] so the same
//! [`huddle_app::Runtime`] orchestration code runs in both production and
//! simulation. Transport traffic goes to a [`SharedRelay`], so several
//! runtimes can talk to each other through one relay.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use huddle_app::{App, AppEvent, Driver};
use huddle_client::TransportEvent;
use huddle_core::{Environment, SessionToken};
use huddle_proto::UserId;

use crate::{
    SimEnv,
    invariants::{ClientSnapshot, InvariantRegistry, SystemSnapshot},
    sim_relay::{SharedRelay, SimRelay},
};

/// Error type for simulation driver.
#[derive(Debug, Clone)]
pub struct SimDriverError(pub String);

impl std::fmt::Display for SimDriverError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SimDriverError: {}", self.0)
    }
}

impl std::error::Error for SimDriverError {}

/// Shared state for event injection.
///
/// This allows injection from outside async contexts.
#[derive(Debug, Default)]
struct SharedState {
    pending_events: VecDeque<AppEvent>,
    transport_events: VecDeque<TransportEvent>,
    connected: bool,
    renders: usize,
    frames_sent: usize,
}

/// Simulation driver for deterministic testing.
///
/// Implements [`Driver`] trait so the same [`huddle_app::Runtime`]
/// orchestration code runs in both the terminal client and simulation tests.
#[derive(Clone)]
pub struct SimDriver {
    user: UserId,
    env: SimEnv,
    relay: SharedRelay,
    state: Arc<Mutex<SharedState>>,
    invariants: Option<Arc<InvariantRegistry>>,
}

impl std::fmt::Debug for SimDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimDriver").field("user", &self.user).finish_non_exhaustive()
    }
}

impl SimDriver {
    /// Create a driver for `user` on `relay`.
    pub fn new(user: &str, env: SimEnv, relay: SharedRelay) -> Self {
        Self {
            user: UserId::from(user),
            env,
            relay,
            state: Arc::new(Mutex::new(SharedState::default())),
            invariants: None,
        }
    }

    /// Enable invariant checking on every render.
    #[must_use]
    pub fn with_invariants(mut self, registry: InvariantRegistry) -> Self {
        self.invariants = Some(Arc::new(registry));
        self
    }

    /// Inject an `AppEvent` for processing.
    pub fn inject_event(&self, event: AppEvent) {
        self.state().pending_events.push_back(event);
    }

    /// Inject a transport event, such as an unexpected close.
    pub fn inject_transport(&self, event: TransportEvent) {
        self.state().transport_events.push_back(event);
    }

    /// The relay drops this user's connection.
    pub fn drop_connection(&self) {
        self.relay().disconnect(&self.user);
        let mut state = self.state();
        state.connected = false;
        state
            .transport_events
            .push_back(TransportEvent::Closed { reason: "connection reset".to_owned() });
    }

    /// Inject a tick event.
    pub fn inject_tick(&self) {
        self.state().pending_events.push_back(AppEvent::Tick);
    }

    /// Check if there are pending events to process.
    pub fn has_pending(&self) -> bool {
        let state = self.state();
        !state.pending_events.is_empty() || !state.transport_events.is_empty()
    }

    /// Number of renders so far.
    pub fn renders(&self) -> usize {
        self.state().renders
    }

    /// Number of frames sent so far.
    pub fn frames_sent(&self) -> usize {
        self.state().frames_sent
    }

    /// Whether the transport is open.
    pub fn is_connected(&self) -> bool {
        self.state().connected
    }

    /// Create a snapshot from App state for invariant checking.
    pub fn snapshot_from_app(&self, app: &App) -> SystemSnapshot {
        SystemSnapshot::single(ClientSnapshot::from_app(self.user.as_str(), app))
    }

    /// Check invariants against App state.
    pub fn check_invariants(&self, app: &App, context: &str) {
        if let Some(registry) = &self.invariants {
            let snapshot = self.snapshot_from_app(app);
            registry.assert_all(&snapshot, context);
        }
    }

    fn state(&self) -> MutexGuard<'_, SharedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn relay(&self) -> MutexGuard<'_, SimRelay> {
        self.relay.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Driver for SimDriver {
    type Error = SimDriverError;
    type Instant = <SimEnv as Environment>::Instant;

    async fn poll_event(&mut self) -> Result<Option<AppEvent>, Self::Error> {
        Ok(self.state().pending_events.pop_front())
    }

    async fn send_frame(&mut self, frame: String) -> Result<(), Self::Error> {
        self.state().frames_sent += 1;
        self.relay().receive(&self.user, &frame);
        Ok(())
    }

    async fn recv_transport(&mut self) -> Option<TransportEvent> {
        if let Some(event) = self.state().transport_events.pop_front() {
            return Some(event);
        }
        if !self.is_connected() {
            return None;
        }
        self.relay().pop_frame(&self.user).map(TransportEvent::Frame)
    }

    async fn open(&mut self, token: &SessionToken) -> TransportEvent {
        let event = self.relay().connect(&self.user, token);
        self.state().connected = event == TransportEvent::Opened;
        event
    }

    fn close(&mut self) {
        self.relay().disconnect(&self.user);
        self.state().connected = false;
    }

    fn now(&self) -> Self::Instant {
        self.env.now()
    }

    fn render(&mut self, app: &App) -> Result<(), Self::Error> {
        self.state().renders += 1;
        self.check_invariants(app, "on render");
        Ok(())
    }

    fn stop(&mut self) {
        self.close();
    }
}
