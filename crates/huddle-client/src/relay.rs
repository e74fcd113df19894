//! Command relays.
//!
//! A relay decides how a confirmed command reaches the channel and where its
//! result comes from. [`LocalRelay`] synthesizes the result itself for
//! deployments without a command-aware server; [`RemoteRelay`] waits for the
//! server to acknowledge the command.

use huddle_core::{ConnectionAction, ConnectionError, ConnectionManager, MonotonicInstant};
use huddle_proto::{
    AckId, Event,
    payloads::{CommandPayload, CommandResultPayload},
};

use crate::config::RelayMode;

/// Outcome of handing a command to a relay.
#[derive(Debug, Clone, PartialEq)]
pub enum RelaySubmit {
    /// Send confirmed; the result is final
    Confirmed(Vec<ConnectionAction>),
    /// Command sent; the result is final once `ack_id` is acknowledged
    Awaiting {
        /// Correlation id of the command request
        ack_id: AckId,
        /// Frame to transmit
        action: ConnectionAction,
    },
}

/// Transmits confirmed commands.
pub trait CommandRelay<I: MonotonicInstant>: Send {
    /// Submit `command`, whose expected outcome is `result`.
    ///
    /// # Errors
    ///
    /// - `ConnectionError::NotConnected` if nothing can be sent
    fn submit(
        &mut self,
        command: CommandPayload,
        result: &CommandResultPayload,
        conn: &mut ConnectionManager<I>,
        now: I,
    ) -> Result<RelaySubmit, ConnectionError>;

    /// Mode this relay implements.
    fn mode(&self) -> RelayMode;
}

/// Sends the command and broadcasts its result in one step.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalRelay;

impl<I: MonotonicInstant> CommandRelay<I> for LocalRelay {
    fn submit(
        &mut self,
        command: CommandPayload,
        result: &CommandResultPayload,
        conn: &mut ConnectionManager<I>,
        _now: I,
    ) -> Result<RelaySubmit, ConnectionError> {
        let send = conn.send(Event::Command(command))?;
        let broadcast = conn.send(Event::CommandResult(result.clone()))?;
        Ok(RelaySubmit::Confirmed(vec![send, broadcast]))
    }

    fn mode(&self) -> RelayMode {
        RelayMode::Local
    }
}

/// Sends the command with an acknowledgement; the server broadcasts the result.
#[derive(Debug, Default, Clone, Copy)]
pub struct RemoteRelay;

impl<I: MonotonicInstant> CommandRelay<I> for RemoteRelay {
    fn submit(
        &mut self,
        command: CommandPayload,
        _result: &CommandResultPayload,
        conn: &mut ConnectionManager<I>,
        now: I,
    ) -> Result<RelaySubmit, ConnectionError> {
        let (ack_id, action) = conn.send_with_ack(Event::Command(command), None, now)?;
        Ok(RelaySubmit::Awaiting { ack_id, action })
    }

    fn mode(&self) -> RelayMode {
        RelayMode::Remote
    }
}

/// Relay implementing `mode`.
pub(crate) fn relay_for<I: MonotonicInstant>(mode: RelayMode) -> Box<dyn CommandRelay<I>> {
    match mode {
        RelayMode::Local => Box::new(LocalRelay),
        RelayMode::Remote => Box::new(RemoteRelay),
    }
}
