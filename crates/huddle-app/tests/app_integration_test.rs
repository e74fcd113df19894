//! Integration tests for App and Bridge behavior.
//!
//! # Oracle Pattern
//!
//! Tests drive the App with keys and API calls, route every action through
//! the Bridge and a simulated relay, and end with oracle checks that verify:
//! - App state reflects what the user should see
//! - Frames reaching the relay match the user's intent
//! - Messages are delivered to the correct channels exactly once

use huddle_app::{App, AppAction, AppEvent, Bridge, KeyInput, TransportRequest};
use huddle_client::{ClientConfig, Identity, MessageKind, TransportEvent};
use huddle_commands::{Markers, ParserState, ProjectionStage};
use huddle_harness::{RecordingServices, SimEnv, SimRelay};
use huddle_proto::{ChannelId, Event, UserId};

/// Pump rounds before a test is considered livelocked.
const MAX_ROUNDS: usize = 100;

/// One user's App and Bridge wired to a relay.
struct Harness {
    app: App,
    bridge: Bridge<SimEnv>,
    relay: SimRelay,
    user: UserId,
    services: RecordingServices,
}

impl Harness {
    fn new(user: &str) -> Self {
        let services = RecordingServices::new(&format!("token-{user}"))
            .with_member("alice", "Alice")
            .with_member("bob", "Bob");
        let config = ClientConfig::new(Identity::new(user));
        let bridge = Bridge::new(SimEnv::with_seed(42), config, services.collaborators());
        Self {
            app: App::new(Markers::default()),
            bridge,
            relay: SimRelay::new(),
            user: UserId::from(user),
            services,
        }
    }

    /// Connected and joined to `p1`.
    fn joined(user: &str) -> Self {
        let mut harness = Self::new(user);
        let actions = harness.app.connect();
        harness.process(actions);
        let actions = harness.app.join_channel(channel());
        harness.process(actions);
        harness
    }

    /// Route actions through the Bridge and pump the relay until quiet.
    fn process(&mut self, actions: Vec<AppAction>) {
        let mut pending = actions;
        for _ in 0..MAX_ROUNDS {
            for action in std::mem::take(&mut pending) {
                for event in self.bridge.process_app_action(action) {
                    pending.extend(self.app.handle(event));
                }
            }

            let frames = self.bridge.take_outgoing();
            let requests = self.bridge.take_transport_requests();
            let mut moved = !frames.is_empty() || !requests.is_empty();
            for frame in frames {
                self.relay.receive(&self.user, &frame);
            }

            let mut events = Vec::new();
            for request in requests {
                match request {
                    TransportRequest::Open { token, .. } => {
                        let opened = self.relay.connect(&self.user, &token);
                        events.extend(self.bridge.handle_transport(opened));
                    },
                    TransportRequest::Close => self.relay.disconnect(&self.user),
                }
            }
            for frame in self.relay.take_outbox(&self.user) {
                moved = true;
                events.extend(self.bridge.handle_transport(TransportEvent::Frame(frame)));
            }
            for event in events {
                pending.extend(self.app.handle(event));
            }

            if !moved && pending.is_empty() {
                return;
            }
        }
        panic!("app did not settle after {MAX_ROUNDS} rounds");
    }

    fn type_text(&mut self, text: &str) {
        for c in text.chars() {
            self.key(KeyInput::Char(c));
        }
    }

    fn key(&mut self, key: KeyInput) {
        let actions = self.app.handle(AppEvent::Key(key));
        self.process(actions);
    }

    fn chat(&self) -> Vec<String> {
        self.app
            .channels()
            .get(&channel())
            .map(|view| {
                view.messages
                    .iter()
                    .filter(|m| m.kind == MessageKind::Message)
                    .map(|m| m.body.clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn channel() -> ChannelId {
    ChannelId::from("p1")
}

/// Test that connecting and joining shows the channel.
///
/// TUI behavior:
/// - The indicator reads "connected"
/// - `p1` becomes the active channel
/// - The user sees themselves online
#[test]
fn join_selects_the_channel() {
    let harness = Harness::joined("alice");

    assert_eq!(harness.app.connection_label(), "connected");
    assert_eq!(harness.app.active_channel(), Some(&channel()));
    assert_eq!(harness.app.status_message(), Some("Joined p1"));

    let view = harness.app.active_view().unwrap();
    assert!(view.online.contains(&UserId::from("alice")));
}

/// Test that a typed message is shown once despite the relay echo.
#[test]
fn typed_message_appears_once() {
    let mut harness = Harness::joined("alice");

    harness.type_text("hello there");
    harness.key(KeyInput::Enter);

    assert_eq!(harness.chat(), ["hello there"]);
    assert_eq!(harness.app.input(), "");

    let sent = harness
        .relay
        .received()
        .iter()
        .filter(|f| matches!(&f.event, Event::Message(m) if m.body == "hello there"))
        .count();
    assert_eq!(sent, 1);
}

/// Test that the composer follows the parser keystroke by keystroke.
///
/// TUI behavior:
/// - "/cre" shows matching candidates
/// - "/delegate Ship" shows the missing parameter
/// - Enter on an incomplete command only explains what is missing
#[test]
fn composer_tracks_the_parser() {
    let mut harness = Harness::joined("alice");

    harness.type_text("/cre");
    assert_eq!(harness.app.projection().stage, ProjectionStage::Matching);
    assert!(harness.app.projection().candidates.iter().any(|c| c.name == "create-task"));

    for _ in 0..3 {
        harness.key(KeyInput::Backspace);
    }
    harness.type_text("delegate Ship");
    assert_eq!(harness.app.projection().missing, ["to"]);
    assert!(!harness.app.projection().can_execute);

    let received = harness.relay.received().len();
    harness.key(KeyInput::Enter);

    assert_eq!(harness.relay.received().len(), received);
    assert_eq!(harness.app.status_message(), Some("Missing to"));
    assert_eq!(harness.app.input(), "/delegate Ship");
}

/// Test that a ready command runs from the keyboard.
#[test]
fn ready_command_runs_on_enter() {
    let mut harness = Harness::joined("alice");

    harness.type_text("/delegate Ship @bob");
    assert!(harness.app.projection().can_execute);
    harness.key(KeyInput::Enter);

    let delegations = harness.services.delegations();
    assert_eq!(delegations.len(), 1);
    assert_eq!(harness.app.status_message(), Some("/delegate done"));
    assert_eq!(harness.app.input(), "");

    let view = harness.app.active_view().unwrap();
    let results = view.messages.iter().filter(|m| m.kind == MessageKind::CommandResult).count();
    assert_eq!(results, 1);
    assert!(
        harness
            .relay
            .received()
            .iter()
            .any(|f| matches!(&f.event, Event::Command(c) if c.command == "delegate"))
    );
}

/// Test that Esc abandons a command without sending anything.
#[test]
fn escape_cancels_the_command() {
    let mut harness = Harness::joined("alice");
    let received = harness.relay.received().len();

    harness.type_text("/create-task Fix");
    harness.key(KeyInput::Esc);

    assert_eq!(harness.app.input(), "");
    assert!(!harness.app.projection().is_active());
    assert_eq!(harness.bridge.client().command_state(&channel()), Some(&ParserState::Cancelled));
    let commands = harness.relay.received()[received..]
        .iter()
        .filter(|f| matches!(f.event, Event::Command(_)))
        .count();
    assert_eq!(commands, 0);
}

/// Test that `:leave` removes the channel from the view.
#[test]
fn leave_command_closes_the_channel() {
    let mut harness = Harness::joined("alice");

    harness.type_text(":leave");
    harness.key(KeyInput::Enter);

    assert!(harness.app.channels().is_empty());
    assert_eq!(harness.app.active_channel(), None);
    assert!(!harness.bridge.client().channels().contains(&channel()));
}

/// Test that a refused join surfaces as an error status.
#[test]
fn refused_join_is_reported() {
    let mut harness = Harness::new("alice");
    harness.relay.refuse_channel(ChannelId::from("secret"));
    let actions = harness.app.connect();
    harness.process(actions);

    harness.type_text(":join secret");
    harness.key(KeyInput::Enter);

    assert!(!harness.app.channels().contains_key(&ChannelId::from("secret")));
    assert!(harness.app.status_message().is_some_and(|s| s.starts_with("Error: join secret")));
}

/// Test that `:disconnect` updates the indicator and keeps the view.
#[test]
fn disconnect_keeps_history() {
    let mut harness = Harness::joined("alice");
    harness.type_text("kept");
    harness.key(KeyInput::Enter);

    harness.type_text(":disconnect");
    harness.key(KeyInput::Enter);

    assert_eq!(harness.app.connection_label(), "disconnected");
    assert!(!harness.relay.is_connected(&UserId::from("alice")));
    assert_eq!(harness.chat(), ["kept"]);
}
