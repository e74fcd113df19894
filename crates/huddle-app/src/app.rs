//! Application state machine.
//!
//! This module defines the [`App`] state machine, which manages the
//! interactive state of the terminal client completely decoupled from I/O and
//! protocol mechanics.
//!
//! This is a pure state machine: it consumes [`crate::AppEvent`] inputs and
//! produces [`crate::AppAction`] instructions for the runtime to execute.
//!
//! # Responsibilities
//!
//! - Owns the composer buffer and routes it: plain text, `/` commands (to the
//!   client's parser) or `:` local commands.
//! - Tracks joined channels, unread badges, and the active channel.
//! - Keeps a persistent connection indicator and the last status line.

use std::collections::BTreeMap;

use huddle_commands::{CommandProjection, Markers};
use huddle_core::ConnectionState;
use huddle_proto::ChannelId;

use crate::{
    AppAction, AppEvent, KeyInput,
    state::{ChannelView, LOCAL_MARKER, LocalCommand},
};

/// Application state machine.
///
/// Pure state machine that processes events and produces actions.
/// No I/O dependencies, fully testable in simulation.
#[derive(Debug, Clone)]
pub struct App {
    /// Connection state.
    state: ConnectionState,
    /// Joined channels by id.
    channels: BTreeMap<ChannelId, ChannelView>,
    /// Currently active channel. `None` if no channel is joined.
    active_channel: Option<ChannelId>,
    /// Composer text.
    input: String,
    /// Parser state for the composer.
    projection: CommandProjection,
    /// Command and mention markers.
    markers: Markers,
    /// Status line. `None` if nothing to show.
    status_message: Option<String>,
}

impl Default for App {
    fn default() -> Self {
        Self::new(Markers::default())
    }
}

impl App {
    /// Create a disconnected App.
    pub fn new(markers: Markers) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            channels: BTreeMap::new(),
            active_channel: None,
            input: String::new(),
            projection: CommandProjection::idle(),
            markers,
            status_message: None,
        }
    }

    /// Process an event and return actions.
    pub fn handle(&mut self, event: AppEvent) -> Vec<AppAction> {
        match event {
            AppEvent::Key(key) => self.handle_key(key),
            AppEvent::Tick => vec![],
            AppEvent::ConnectionChanged(state) => {
                self.state = state;
                vec![AppAction::Render]
            },
            AppEvent::Reconnected => {
                self.status_message = Some("Reconnected".to_owned());
                vec![AppAction::Render]
            },
            AppEvent::ConnectionFailed { message } => {
                self.status_message = Some(format!("Connection failed: {message} (:connect to retry)"));
                vec![AppAction::Render]
            },
            AppEvent::ChannelJoined { channel_id } => {
                let is_new = !self.channels.contains_key(&channel_id);
                self.channels
                    .entry(channel_id.clone())
                    .or_insert_with(|| ChannelView::new(channel_id.clone()));
                if self.active_channel.is_none() {
                    self.active_channel = Some(channel_id.clone());
                }
                if is_new {
                    self.status_message = Some(format!("Joined {channel_id}"));
                }
                vec![AppAction::Render]
            },
            AppEvent::ChannelLeft { channel_id } => {
                self.channels.remove(&channel_id);
                if self.active_channel.as_ref() == Some(&channel_id) {
                    self.active_channel = self.channels.keys().next().cloned();
                    self.reset_composer();
                }
                self.status_message = Some(format!("Left {channel_id}"));
                vec![AppAction::Render]
            },
            AppEvent::MessageAppended(message) => {
                let active = self.active_channel.as_ref() == Some(&message.channel_id);
                if let Some(view) = self.channels.get_mut(&message.channel_id) {
                    view.messages.push(message);
                    view.unread |= !active;
                }
                vec![AppAction::Render]
            },
            AppEvent::PresenceChanged { channel_id, online, typing } => {
                if let Some(view) = self.channels.get_mut(&channel_id) {
                    view.online = online;
                    view.typing = typing;
                }
                vec![AppAction::Render]
            },
            AppEvent::CommandProjected(projection) => {
                self.projection = projection;
                vec![AppAction::Render]
            },
            AppEvent::CommandCompleted { command, error, .. } => {
                self.status_message = Some(match error {
                    None => format!("/{command} done"),
                    Some(error) => format!("/{command} failed: {error}"),
                });
                vec![AppAction::Render]
            },
            AppEvent::Error { message } => {
                self.status_message = Some(format!("Error: {message}"));
                vec![AppAction::Render]
            },
        }
    }

    fn handle_key(&mut self, key: KeyInput) -> Vec<AppAction> {
        match key {
            KeyInput::Char(c) => {
                self.input.push(c);
                self.input_changed()
            },
            KeyInput::Backspace => {
                if self.input.pop().is_none() {
                    return vec![];
                }
                self.input_changed()
            },
            KeyInput::Enter => self.submit(),
            KeyInput::Tab => {
                self.cycle_channel();
                vec![AppAction::Render]
            },
            KeyInput::Esc => {
                if self.projection.is_active() {
                    let mut actions = self.cancel_command();
                    actions.push(AppAction::Render);
                    actions
                } else if !self.input.is_empty() {
                    self.input.clear();
                    vec![AppAction::Render]
                } else {
                    vec![AppAction::Quit]
                }
            },
        }
    }

    /// Route the composer after an edit.
    fn input_changed(&mut self) -> Vec<AppAction> {
        let Some(channel_id) = self.active_channel.clone() else {
            return vec![AppAction::Render];
        };

        if self.input.starts_with(self.markers.command) || self.projection.is_active() {
            // The parser also needs to see the marker disappear, to cancel.
            return vec![
                AppAction::ComposeCommand { channel_id, input: self.input.clone() },
                AppAction::Render,
            ];
        }

        if self.input.is_empty() || self.input.starts_with(LOCAL_MARKER) {
            return vec![AppAction::Render];
        }

        vec![AppAction::Typing { channel_id }, AppAction::Render]
    }

    fn submit(&mut self) -> Vec<AppAction> {
        if let Some(local) = self.input.strip_prefix(LOCAL_MARKER) {
            let parsed = LocalCommand::parse(local);
            self.input.clear();
            return match parsed {
                Ok(command) => self.run_local(command),
                Err(message) => {
                    self.status_message = Some(message);
                    vec![AppAction::Render]
                },
            };
        }

        let Some(channel_id) = self.active_channel.clone() else {
            if !self.input.trim().is_empty() {
                self.status_message = Some("Join a channel first (:join <channel>)".to_owned());
            }
            return vec![AppAction::Render];
        };

        if self.input.starts_with(self.markers.command) {
            if !self.projection.can_execute {
                self.status_message = Some(self.blocked_reason());
                return vec![AppAction::Render];
            }
            self.input.clear();
            self.projection = CommandProjection::idle();
            return vec![AppAction::ConfirmCommand { channel_id }, AppAction::Render];
        }

        let text = std::mem::take(&mut self.input);
        if text.trim().is_empty() {
            return vec![AppAction::Render];
        }
        vec![AppAction::SendMessage { channel_id, text }, AppAction::Render]
    }

    fn run_local(&mut self, command: LocalCommand) -> Vec<AppAction> {
        match command {
            LocalCommand::Join(channel_id) => self.join_channel(channel_id),
            LocalCommand::Leave(channel_id) => {
                match channel_id.or_else(|| self.active_channel.clone()) {
                    Some(channel_id) => self.leave_channel(channel_id),
                    None => {
                        self.status_message = Some("No channel to leave".to_owned());
                        vec![AppAction::Render]
                    },
                }
            },
            LocalCommand::Connect => self.connect(),
            LocalCommand::Disconnect => vec![AppAction::Disconnect, AppAction::Render],
            LocalCommand::Help => {
                self.status_message =
                    Some(":join <channel>  :leave  :connect  :disconnect  :quit".to_owned());
                vec![AppAction::Render]
            },
            LocalCommand::Quit => self.quit(),
        }
    }

    fn blocked_reason(&self) -> String {
        if self.projection.no_match() {
            return "No matching command".to_owned();
        }
        if let Some(error) = self.projection.errors.first() {
            return error.clone();
        }
        match self.projection.missing.as_slice() {
            [] => "Command not ready".to_owned(),
            missing => format!("Missing {}", missing.join(", ")),
        }
    }

    fn cancel_command(&mut self) -> Vec<AppAction> {
        let Some(channel_id) = self.active_channel.clone() else {
            return vec![];
        };
        self.reset_composer();
        vec![AppAction::CancelCommand { channel_id }]
    }

    fn reset_composer(&mut self) {
        self.input.clear();
        self.projection = CommandProjection::idle();
    }

    fn cycle_channel(&mut self) {
        let next = match &self.active_channel {
            Some(current) => self
                .channels
                .range::<ChannelId, _>((
                    std::ops::Bound::Excluded(current),
                    std::ops::Bound::Unbounded,
                ))
                .next()
                .or_else(|| self.channels.iter().next())
                .map(|(id, _)| id.clone()),
            None => self.channels.keys().next().cloned(),
        };
        if let Some(channel_id) = next {
            self.set_active_channel(&channel_id);
        }
    }

    /// Set a status message to display to the user.
    pub fn set_status(&mut self, message: impl Into<String>) {
        self.status_message = Some(message.into());
    }

    /// Initiate connection to the relay.
    pub fn connect(&mut self) -> Vec<AppAction> {
        self.status_message = None;
        vec![AppAction::Connect, AppAction::Render]
    }

    /// Join `channel_id`.
    pub fn join_channel(&mut self, channel_id: ChannelId) -> Vec<AppAction> {
        self.status_message = Some(format!("Joining {channel_id}..."));
        vec![AppAction::JoinChannel { channel_id }, AppAction::Render]
    }

    /// Leave `channel_id`.
    pub fn leave_channel(&self, channel_id: ChannelId) -> Vec<AppAction> {
        vec![AppAction::LeaveChannel { channel_id }, AppAction::Render]
    }

    /// Quit the application.
    pub fn quit(&self) -> Vec<AppAction> {
        vec![AppAction::Quit]
    }

    /// Make `channel_id` active and clear its unread badge.
    ///
    /// Ignored for channels that are not joined. Switching abandons any
    /// command being composed.
    pub fn set_active_channel(&mut self, channel_id: &ChannelId) {
        if !self.channels.contains_key(channel_id) {
            return;
        }
        if self.active_channel.as_ref() != Some(channel_id) {
            self.reset_composer();
        }
        self.active_channel = Some(channel_id.clone());
        if let Some(view) = self.channels.get_mut(channel_id) {
            view.unread = false;
        }
    }

    /// Current connection state.
    pub fn connection_state(&self) -> ConnectionState {
        self.state
    }

    /// Persistent connection indicator.
    pub fn connection_label(&self) -> &'static str {
        match self.state {
            ConnectionState::Connected => "connected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Disconnected => "disconnected",
        }
    }

    /// All joined channels.
    pub fn channels(&self) -> &BTreeMap<ChannelId, ChannelView> {
        &self.channels
    }

    /// Currently selected channel.
    pub fn active_channel(&self) -> Option<&ChannelId> {
        self.active_channel.as_ref()
    }

    /// View of the active channel.
    pub fn active_view(&self) -> Option<&ChannelView> {
        self.active_channel.as_ref().and_then(|id| self.channels.get(id))
    }

    /// Composer text.
    pub fn input(&self) -> &str {
        &self.input
    }

    /// Command state of the composer.
    pub fn projection(&self) -> &CommandProjection {
        &self.projection
    }

    /// Status line. `None` if nothing to show.
    pub fn status_message(&self) -> Option<&str> {
        self.status_message.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use huddle_commands::ProjectionStage;

    use super::*;

    fn joined_app() -> App {
        let mut app = App::default();
        app.handle(AppEvent::ConnectionChanged(ConnectionState::Connected));
        app.handle(AppEvent::ChannelJoined { channel_id: ChannelId::from("p1") });
        app
    }

    fn type_text(app: &mut App, text: &str) -> Vec<AppAction> {
        text.chars().flat_map(|c| app.handle(AppEvent::Key(KeyInput::Char(c)))).collect()
    }

    fn ready_projection() -> CommandProjection {
        CommandProjection { stage: ProjectionStage::Ready, can_execute: true, ..CommandProjection::idle() }
    }

    #[test]
    fn plain_text_sends_message_and_typing() {
        let mut app = joined_app();
        let actions = type_text(&mut app, "hi");

        assert!(actions.contains(&AppAction::Typing { channel_id: ChannelId::from("p1") }));

        let actions = app.handle(AppEvent::Key(KeyInput::Enter));
        assert_eq!(actions, vec![
            AppAction::SendMessage { channel_id: ChannelId::from("p1"), text: "hi".to_owned() },
            AppAction::Render
        ]);
        assert_eq!(app.input(), "");
    }

    #[test]
    fn command_marker_routes_to_parser() {
        let mut app = joined_app();
        let actions = type_text(&mut app, "/cr");

        assert!(actions.contains(&AppAction::ComposeCommand {
            channel_id: ChannelId::from("p1"),
            input: "/cr".to_owned(),
        }));
        assert!(!actions.iter().any(|a| matches!(a, AppAction::Typing { .. })));
    }

    #[test]
    fn enter_confirms_only_when_ready() {
        let mut app = joined_app();
        type_text(&mut app, "/create-task x");

        let actions = app.handle(AppEvent::Key(KeyInput::Enter));
        assert_eq!(actions, vec![AppAction::Render]);
        assert_eq!(app.input(), "/create-task x");

        app.handle(AppEvent::CommandProjected(ready_projection()));
        let actions = app.handle(AppEvent::Key(KeyInput::Enter));
        assert_eq!(actions, vec![
            AppAction::ConfirmCommand { channel_id: ChannelId::from("p1") },
            AppAction::Render
        ]);
    }

    #[test]
    fn escape_cancels_then_quits() {
        let mut app = joined_app();
        type_text(&mut app, "/de");
        app.handle(AppEvent::CommandProjected(CommandProjection {
            stage: ProjectionStage::Matching,
            ..CommandProjection::idle()
        }));

        let actions = app.handle(AppEvent::Key(KeyInput::Esc));
        assert_eq!(actions, vec![
            AppAction::CancelCommand { channel_id: ChannelId::from("p1") },
            AppAction::Render
        ]);
        assert_eq!(app.input(), "");

        assert_eq!(app.handle(AppEvent::Key(KeyInput::Esc)), vec![AppAction::Quit]);
    }

    #[test]
    fn erasing_the_marker_notifies_parser() {
        let mut app = joined_app();
        type_text(&mut app, "/");
        app.handle(AppEvent::CommandProjected(CommandProjection {
            stage: ProjectionStage::Matching,
            ..CommandProjection::idle()
        }));

        let actions = app.handle(AppEvent::Key(KeyInput::Backspace));
        assert!(actions.contains(&AppAction::ComposeCommand {
            channel_id: ChannelId::from("p1"),
            input: String::new(),
        }));
    }

    #[test]
    fn local_commands_never_reach_the_wire() {
        let mut app = joined_app();
        type_text(&mut app, ":join p2");

        let actions = app.handle(AppEvent::Key(KeyInput::Enter));
        assert_eq!(actions, vec![
            AppAction::JoinChannel { channel_id: ChannelId::from("p2") },
            AppAction::Render
        ]);
    }

    #[test]
    fn connection_indicator_persists() {
        let mut app = joined_app();
        app.handle(AppEvent::ConnectionChanged(ConnectionState::Reconnecting));
        app.handle(AppEvent::Key(KeyInput::Char('x')));

        assert_eq!(app.connection_label(), "reconnecting");

        app.handle(AppEvent::ConnectionFailed { message: "reconnect failed".to_owned() });
        assert_eq!(app.connection_label(), "reconnecting");
        assert!(app.status_message().is_some_and(|s| s.contains(":connect")));
    }

    #[test]
    fn tab_cycles_channels() {
        let mut app = joined_app();
        app.handle(AppEvent::ChannelJoined { channel_id: ChannelId::from("p2") });
        assert_eq!(app.active_channel(), Some(&ChannelId::from("p1")));

        app.handle(AppEvent::Key(KeyInput::Tab));
        assert_eq!(app.active_channel(), Some(&ChannelId::from("p2")));

        app.handle(AppEvent::Key(KeyInput::Tab));
        assert_eq!(app.active_channel(), Some(&ChannelId::from("p1")));
    }

    #[test]
    fn leaving_active_channel_selects_another() {
        let mut app = joined_app();
        app.handle(AppEvent::ChannelJoined { channel_id: ChannelId::from("p2") });

        app.handle(AppEvent::ChannelLeft { channel_id: ChannelId::from("p1") });

        assert_eq!(app.active_channel(), Some(&ChannelId::from("p2")));
        assert_eq!(app.channels().len(), 1);
    }
}
