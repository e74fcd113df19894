//! Incremental command parser, one per channel composer.

use huddle_proto::ChannelId;

use crate::{
    binder::CommandInvocation,
    catalog::{Catalog, CommandDefinition},
    directory::MemberDirectory,
    error::ParameterValidationError,
    projection::CommandProjection,
};

/// Marker characters recognised in composer input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Markers {
    /// Starts a command, `/` by default
    pub command: char,
    /// Starts a member mention, `@` by default
    pub mention: char,
}

impl Default for Markers {
    fn default() -> Self {
        Self { command: '/', mention: '@' }
    }
}

/// Command name being typed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Matching {
    /// Text typed after the marker
    pub query: String,
    /// Commands whose name contains `query`; empty means no match
    pub candidates: Vec<&'static CommandDefinition>,
}

/// Parser state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParserState {
    /// Plain text, no command
    Idle,
    /// Narrowing the catalog by name
    Matching(Matching),
    /// Command chosen, parameters incomplete or invalid
    Binding(CommandInvocation),
    /// Every required parameter bound and valid
    Ready(CommandInvocation),
    /// Confirmed and handed to the dispatcher
    Sent(CommandInvocation),
    /// Abandoned
    Cancelled,
}

impl ParserState {
    /// Whether a command is being composed.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Matching(_) | Self::Binding(_) | Self::Ready(_))
    }
}

/// Tracks command composition for a single channel.
#[derive(Debug, Clone)]
pub struct CommandParser {
    catalog: Catalog,
    channel_id: ChannelId,
    markers: Markers,
    state: ParserState,
}

impl CommandParser {
    /// Idle parser for `channel_id`.
    pub fn new(catalog: Catalog, channel_id: ChannelId, markers: Markers) -> Self {
        Self { catalog, channel_id, markers, state: ParserState::Idle }
    }

    /// Current state
    pub fn state(&self) -> &ParserState {
        &self.state
    }

    /// Channel this parser composes for
    pub fn channel_id(&self) -> &ChannelId {
        &self.channel_id
    }

    /// Re-parse the full composer text after an edit.
    pub fn update(&mut self, input: &str, directory: &dyn MemberDirectory) -> &ParserState {
        let Some(body) = input.strip_prefix(self.markers.command) else {
            self.state =
                if self.state.is_active() { ParserState::Cancelled } else { ParserState::Idle };
            return &self.state;
        };

        let (name, args) = match body.find(char::is_whitespace) {
            Some(split) => (&body[..split], &body[split..]),
            None => (body, ""),
        };

        self.state = match self.catalog.get(name) {
            Some(definition) => {
                let invocation = CommandInvocation::bind(
                    definition,
                    args,
                    &self.channel_id,
                    directory,
                    self.markers.mention,
                );
                if invocation.is_ready() {
                    ParserState::Ready(invocation)
                } else {
                    ParserState::Binding(invocation)
                }
            },
            None => ParserState::Matching(Matching {
                query: name.to_owned(),
                candidates: self.catalog.candidates(name),
            }),
        };

        &self.state
    }

    /// Abandon the command in progress. Returns false if nothing was active.
    pub fn cancel(&mut self) -> bool {
        if self.state.is_active() {
            tracing::debug!(channel = %self.channel_id, "command cancelled");
            self.state = ParserState::Cancelled;
            true
        } else {
            false
        }
    }

    /// Confirm a ready invocation, moving to `Sent`.
    ///
    /// # Errors
    ///
    /// - the first validation failure if the invocation is not ready
    /// - `UnknownCommand` while still matching a name
    /// - `NoCommand` if nothing is being composed
    pub fn confirm(&mut self) -> Result<CommandInvocation, ParameterValidationError> {
        match &self.state {
            ParserState::Ready(invocation) => {
                let invocation = invocation.clone();
                self.state = ParserState::Sent(invocation.clone());
                Ok(invocation)
            },
            ParserState::Binding(invocation) => Err(invocation
                .validate()
                .err()
                .unwrap_or(ParameterValidationError::NoCommand)),
            ParserState::Matching(matching) => {
                Err(ParameterValidationError::UnknownCommand { name: matching.query.clone() })
            },
            ParserState::Idle | ParserState::Sent(_) | ParserState::Cancelled => {
                Err(ParameterValidationError::NoCommand)
            },
        }
    }

    /// Return to `Idle` after the composer is cleared.
    pub fn reset(&mut self) {
        self.state = ParserState::Idle;
    }

    /// Read-only view for the composer.
    pub fn projection(&self) -> CommandProjection {
        CommandProjection::from_state(&self.state, self.markers.command)
    }
}
