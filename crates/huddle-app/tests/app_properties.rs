//! Property-based tests for the App state machine.
//!
//! Tests verify that invariants hold under arbitrary event sequences.

use huddle_app::{App, AppAction, AppEvent, KeyInput};
use huddle_commands::{CommandProjection, Markers};
use huddle_core::ConnectionState;
use huddle_harness::{ClientSnapshot, InvariantRegistry, SystemSnapshot};
use huddle_proto::ChannelId;
use proptest::prelude::*;

/// Generate random printable characters for input.
fn printable_char() -> impl Strategy<Value = char> {
    prop::char::range(' ', '~')
}

/// Generate random key inputs.
fn key_strategy() -> impl Strategy<Value = KeyInput> {
    prop_oneof![
        6 => printable_char().prop_map(KeyInput::Char),
        1 => Just(KeyInput::Char('/')),
        1 => Just(KeyInput::Char(':')),
        1 => Just(KeyInput::Enter),
        1 => Just(KeyInput::Backspace),
        1 => Just(KeyInput::Tab),
        1 => Just(KeyInput::Esc),
    ]
}

fn channel_strategy() -> impl Strategy<Value = ChannelId> {
    prop_oneof![Just("p1"), Just("p2"), Just("p3")].prop_map(ChannelId::from)
}

fn state_strategy() -> impl Strategy<Value = ConnectionState> {
    prop_oneof![
        Just(ConnectionState::Disconnected),
        Just(ConnectionState::Connecting),
        Just(ConnectionState::Connected),
        Just(ConnectionState::Reconnecting),
    ]
}

/// Generate random app events.
fn event_strategy() -> impl Strategy<Value = AppEvent> {
    prop_oneof![
        8 => key_strategy().prop_map(AppEvent::Key),
        1 => Just(AppEvent::Tick),
        2 => channel_strategy().prop_map(|channel_id| AppEvent::ChannelJoined { channel_id }),
        1 => channel_strategy().prop_map(|channel_id| AppEvent::ChannelLeft { channel_id }),
        1 => state_strategy().prop_map(AppEvent::ConnectionChanged),
        1 => Just(AppEvent::CommandProjected(CommandProjection::idle())),
    ]
}

fn snapshot_from_app(app: &App) -> SystemSnapshot {
    SystemSnapshot::single(ClientSnapshot::from_app("app", app))
}

proptest! {
    /// App invariants hold under arbitrary event sequences.
    ///
    /// Verifies that the active channel is always joined (or None).
    #[test]
    fn prop_app_invariants_hold(events in prop::collection::vec(event_strategy(), 0..60)) {
        let mut app = App::new(Markers::default());
        let invariants = InvariantRegistry::standard();

        for event in events {
            let _ = app.handle(event.clone());

            let snapshot = snapshot_from_app(&app);
            prop_assert!(
                invariants.check_all(&snapshot).is_ok(),
                "Invariant violated after {:?}", event
            );
        }
    }

    /// Typing into a channel and erasing everything leaves an empty composer.
    #[test]
    fn prop_backspace_undoes_typing(text in "[a-z ]{1,30}") {
        let mut app = App::new(Markers::default());
        app.handle(AppEvent::ChannelJoined { channel_id: ChannelId::from("p1") });

        for c in text.chars() {
            app.handle(AppEvent::Key(KeyInput::Char(c)));
        }
        prop_assert_eq!(app.input(), text.as_str());

        for _ in 0..text.len() {
            app.handle(AppEvent::Key(KeyInput::Backspace));
        }
        prop_assert_eq!(app.input(), "");
    }

    /// Plain text never reaches the command parser, and Enter sends it whole.
    #[test]
    fn prop_plain_text_is_sent_verbatim(text in "[a-z][a-z ]{0,30}") {
        let mut app = App::new(Markers::default());
        app.handle(AppEvent::ChannelJoined { channel_id: ChannelId::from("p1") });

        for c in text.chars() {
            let actions = app.handle(AppEvent::Key(KeyInput::Char(c)));
            prop_assert!(
                !actions.iter().any(|a| matches!(a, AppAction::ComposeCommand { .. })),
                "plain text reached the command parser"
            );
        }
        let actions = app.handle(AppEvent::Key(KeyInput::Enter));

        let sent = actions.iter().any(|a| {
            matches!(a, AppAction::SendMessage { text: sent, .. } if *sent == text)
        });
        prop_assert!(sent);
    }

    /// Text starting with the command marker is always routed to the parser.
    #[test]
    fn prop_marker_text_goes_to_parser(rest in "[a-z -]{0,20}") {
        let mut app = App::new(Markers::default());
        app.handle(AppEvent::ChannelJoined { channel_id: ChannelId::from("p1") });

        let input = format!("/{rest}");
        let mut last = Vec::new();
        for c in input.chars() {
            last = app.handle(AppEvent::Key(KeyInput::Char(c)));
        }

        let routed = last.iter().any(|a| {
            matches!(a, AppAction::ComposeCommand { input: sent, .. } if *sent == input)
        });
        prop_assert!(routed);
    }
}
