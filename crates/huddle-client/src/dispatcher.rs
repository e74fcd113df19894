//! Command dispatcher.
//!
//! Turns a confirmed [`CommandInvocation`] into wire traffic through a
//! [`CommandRelay`], and settles it into a result once the send is
//! confirmed. The dispatcher never retries: a failed command has to be
//! re-entered, so collaborators see each side effect at most once.

use std::{collections::HashMap, fmt::Write};

use huddle_commands::{CommandInvocation, ParamValue};
use huddle_core::{AckError, ConnectionAction, ConnectionManager, MonotonicInstant};
use huddle_proto::{
    AckId, AckReply, MessageId, UserId,
    payloads::{CommandPayload, CommandResultPayload},
};

use crate::{
    collaborators::{
        CollaboratorError, Collaborators, Delegation, NewMilestone, NewTask, Priority,
    },
    config::{Identity, RelayMode},
    error::ExecutionError,
    relay::{CommandRelay, RelaySubmit, relay_for},
};

/// Ids and timestamp stamped on an outgoing command and its result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandStamp {
    /// Id of the `chat:command` event
    pub command_id: MessageId,
    /// Id of the result entry (a remote relay may replace it)
    pub result_id: MessageId,
    /// Wall-clock milliseconds
    pub timestamp: i64,
}

/// Immediate outcome of [`Dispatcher::execute`].
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    /// Send confirmed; the command is done
    Completed {
        /// Frames to transmit
        actions: Vec<ConnectionAction>,
        /// Executed command
        invocation: CommandInvocation,
        /// Result to append
        result: CommandResultPayload,
    },
    /// Waiting for the server to acknowledge
    Awaiting {
        /// Correlation id
        ack_id: AckId,
        /// Frame to transmit
        action: ConnectionAction,
    },
}

/// A remote command whose acknowledgement arrived or expired.
#[derive(Debug, Clone, PartialEq)]
pub struct Settled {
    /// Id of the `chat:command` event
    pub command_id: MessageId,
    /// Executed command
    pub invocation: CommandInvocation,
    /// Result to append, or why the command failed
    pub outcome: Result<CommandResultPayload, ExecutionError>,
}

#[derive(Debug)]
struct PendingCommand {
    command_id: MessageId,
    invocation: CommandInvocation,
    result: CommandResultPayload,
}

/// Executes commands over a relay.
pub struct Dispatcher<I: MonotonicInstant> {
    relay: Box<dyn CommandRelay<I>>,
    pending: HashMap<AckId, PendingCommand>,
}

impl<I: MonotonicInstant> std::fmt::Debug for Dispatcher<I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("mode", &self.relay.mode())
            .field("pending", &self.pending.len())
            .finish()
    }
}

impl<I: MonotonicInstant> Dispatcher<I> {
    /// Dispatcher using the relay for `mode`.
    pub fn new(mode: RelayMode) -> Self {
        Self::with_relay(relay_for(mode))
    }

    /// Dispatcher using a caller-supplied relay.
    pub fn with_relay(relay: Box<dyn CommandRelay<I>>) -> Self {
        Self { relay, pending: HashMap::new() }
    }

    /// Relay mode in use.
    pub fn mode(&self) -> RelayMode {
        self.relay.mode()
    }

    /// Commands waiting on an acknowledgement.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Whether `ack_id` belongs to a command.
    pub fn owns(&self, ack_id: AckId) -> bool {
        self.pending.contains_key(&ack_id)
    }

    /// Re-validate and send `invocation`.
    ///
    /// # Errors
    ///
    /// - `ExecutionError::Validation` if a required parameter is unbound or
    ///   any value is invalid; nothing is sent
    /// - `ExecutionError::Connection` if the relay cannot send
    pub fn execute(
        &mut self,
        invocation: CommandInvocation,
        sender: &Identity,
        stamp: CommandStamp,
        conn: &mut ConnectionManager<I>,
        now: I,
    ) -> Result<Dispatch, ExecutionError> {
        invocation.validate()?;

        let params = invocation.wire_params();
        let command_id = stamp.command_id;
        let command = CommandPayload {
            channel_id: invocation.channel_id().clone(),
            id: command_id.clone(),
            command: invocation.name().to_owned(),
            params: params.clone(),
            sender_id: sender.user_id.clone(),
            sender_display: sender.display.clone(),
            timestamp: stamp.timestamp,
        };
        let result = CommandResultPayload {
            channel_id: invocation.channel_id().clone(),
            id: stamp.result_id,
            command: invocation.name().to_owned(),
            params,
            summary: summarize(&invocation, &sender.display),
            sender_id: sender.user_id.clone(),
            sender_display: sender.display.clone(),
            timestamp: stamp.timestamp,
        };

        match self.relay.submit(command, &result, conn, now)? {
            RelaySubmit::Confirmed(actions) => {
                tracing::info!(
                    command = invocation.name(),
                    channel = %invocation.channel_id(),
                    "command executed"
                );
                Ok(Dispatch::Completed { actions, invocation, result })
            },
            RelaySubmit::Awaiting { ack_id, action } => {
                tracing::debug!(command = invocation.name(), %ack_id, "command awaiting ack");
                self.pending.insert(ack_id, PendingCommand { command_id, invocation, result });
                Ok(Dispatch::Awaiting { ack_id, action })
            },
        }
    }

    /// Settle a command acknowledgement. `None` if `ack_id` is not a command.
    pub fn settle(
        &mut self,
        ack_id: AckId,
        reply: Result<AckReply, AckError>,
    ) -> Option<Settled> {
        let PendingCommand { command_id, invocation, mut result } = self.pending.remove(&ack_id)?;

        let outcome = match reply {
            Ok(reply) => {
                if let Some(id) = reply.result_id {
                    result.id = id;
                }
                tracing::info!(command = invocation.name(), %ack_id, "command acknowledged");
                Ok(result)
            },
            Err(err) => {
                tracing::warn!(command = invocation.name(), %ack_id, error = %err, "command failed");
                Err(ExecutionError::from(err))
            },
        };

        Some(Settled { command_id, invocation, outcome })
    }
}

/// Natural-language description of what `invocation` did.
pub fn summarize(invocation: &CommandInvocation, actor: &str) -> String {
    let raw = |param: &str| invocation.raw(param).unwrap_or_default().to_owned();
    let member = |param: &str| match invocation.value(param) {
        Some(ParamValue::Member(member)) => member.display.clone(),
        _ => raw(param),
    };
    let wire = |param: &str| invocation.value(param).map(ParamValue::to_wire);

    match invocation.name() {
        "create-task" => {
            let mut summary =
                format!("{actor} created task \"{}\" for @{}", raw("title"), member("assignee"));
            if let Some(due) = wire("dueDate") {
                let _ = write!(summary, " due {due}");
            }
            if let Some(priority) = wire("priority") {
                let _ = write!(summary, " ({priority})");
            }
            summary
        },
        "set-milestone" => {
            let mut summary = format!(
                "{actor} set milestone \"{}\" due {}",
                raw("name"),
                wire("dueDate").unwrap_or_else(|| raw("dueDate"))
            );
            if let Some(description) = invocation.text("description") {
                let _ = write!(summary, ": {description}");
            }
            summary
        },
        "delegate" => format!("{actor} delegated \"{}\" to @{}", raw("task"), member("to")),
        "link-reference" => {
            let target = invocation.text("label").map_or_else(|| raw("url"), str::to_owned);
            format!("{actor} linked {target}")
        },
        other => format!("{actor} ran /{other}"),
    }
}

/// Call the collaborator behind a completed command.
///
/// Only invoked after the send was confirmed. `link-reference` has no
/// external side effect.
pub(crate) fn apply_side_effect(
    invocation: &CommandInvocation,
    collaborators: &Collaborators,
    issuer: &UserId,
) -> Result<(), CollaboratorError> {
    let channel_id = invocation.channel_id().clone();

    match invocation.name() {
        "create-task" => {
            let title = required_text(invocation, "title", "tasks")?;
            let assignee = required_member(invocation, "assignee", "tasks")?;
            let priority = invocation
                .value("priority")
                .map(|value| value.to_wire().parse::<Priority>())
                .transpose()?;
            let task = collaborators.tasks.create_task(NewTask {
                channel_id,
                title,
                assignee,
                due_date: date(invocation, "dueDate"),
                priority,
                created_by: issuer.clone(),
            })?;
            tracing::info!(task = %task.id, "task created");
            Ok(())
        },
        "set-milestone" => {
            let name = required_text(invocation, "name", "milestones")?;
            let due_date = date(invocation, "dueDate")
                .ok_or_else(|| CollaboratorError::new("milestones", "missing dueDate"))?;
            let milestone = collaborators.milestones.set_milestone(NewMilestone {
                channel_id,
                name,
                due_date,
                description: invocation.text("description").map(str::to_owned),
                created_by: issuer.clone(),
            })?;
            tracing::info!(milestone = %milestone.id, "milestone set");
            Ok(())
        },
        "delegate" => {
            let task = required_text(invocation, "task", "delegation")?;
            let to = required_member(invocation, "to", "delegation")?;
            collaborators.delegation.delegate(Delegation {
                channel_id,
                task,
                to,
                delegated_by: issuer.clone(),
            })
        },
        _ => Ok(()),
    }
}

fn required_text(
    invocation: &CommandInvocation,
    param: &str,
    service: &'static str,
) -> Result<String, CollaboratorError> {
    invocation
        .text(param)
        .map(str::to_owned)
        .ok_or_else(|| CollaboratorError::new(service, format!("missing {param}")))
}

fn required_member(
    invocation: &CommandInvocation,
    param: &str,
    service: &'static str,
) -> Result<huddle_commands::MemberRef, CollaboratorError> {
    match invocation.value(param) {
        Some(ParamValue::Member(member)) => Ok(member.clone()),
        _ => Err(CollaboratorError::new(service, format!("missing {param}"))),
    }
}

fn date(invocation: &CommandInvocation, param: &str) -> Option<chrono::NaiveDate> {
    match invocation.value(param) {
        Some(ParamValue::Date(date)) => Some(*date),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use huddle_commands::{Catalog, MemberDirectory, MemberRef};
    use huddle_core::{ConnectionConfig, SessionToken, TimeoutError};
    use huddle_proto::{ChannelId, EventName, WireMessage};

    use super::*;

    struct Members;

    impl MemberDirectory for Members {
        fn resolve_member(&self, _channel: &ChannelId, reference: &str) -> Option<MemberRef> {
            (reference == "alice")
                .then(|| MemberRef { id: UserId::from("u-alice"), display: "Alice".to_owned() })
        }
    }

    fn bind(input: &str) -> CommandInvocation {
        let (name, args) = input.split_once(' ').unwrap_or((input, ""));
        let definition = Catalog::standard().get(name).expect("known command");
        CommandInvocation::bind(definition, args, &ChannelId::from("p1"), &Members, '@')
    }

    fn connected() -> ConnectionManager<Instant> {
        let mut conn = ConnectionManager::new(ConnectionConfig::default());
        conn.connect(Some(SessionToken::new("t"))).expect("token present");
        conn.transport_opened();
        conn
    }

    fn stamp() -> CommandStamp {
        CommandStamp {
            command_id: MessageId::from("c1"),
            result_id: MessageId::from("r1"),
            timestamp: 1_700_000_000_000,
        }
    }

    fn sender() -> Identity {
        Identity { user_id: UserId::from("u-bob"), display: "Bob".to_owned() }
    }

    fn sent_events(actions: &[ConnectionAction]) -> Vec<String> {
        actions
            .iter()
            .filter_map(|a| match a {
                ConnectionAction::Send(WireMessage::Event(envelope)) => {
                    Some(envelope.event.to_string())
                },
                _ => None,
            })
            .collect()
    }

    #[test]
    fn summaries_describe_the_effect() {
        assert_eq!(
            summarize(&bind("create-task Fix bug @alice 2024-03-01 high"), "Bob"),
            "Bob created task \"Fix bug\" for @Alice due 2024-03-01 (high)"
        );
        assert_eq!(
            summarize(&bind("set-milestone \"Beta\" 2024-02-15"), "Bob"),
            "Bob set milestone \"Beta\" due 2024-02-15"
        );
        assert_eq!(
            summarize(&bind("delegate \"Write notes\" @alice"), "Bob"),
            "Bob delegated \"Write notes\" to @Alice"
        );
        assert_eq!(
            summarize(&bind("link-reference https://example.com Design notes"), "Bob"),
            "Bob linked Design notes"
        );
    }

    #[test]
    fn local_relay_completes_immediately() {
        let mut dispatcher = Dispatcher::new(RelayMode::Local);
        let mut conn = connected();

        let dispatch = dispatcher
            .execute(
                bind("set-milestone Beta 2024-02-15"),
                &sender(),
                stamp(),
                &mut conn,
                Instant::now(),
            )
            .expect("ready command");

        let Dispatch::Completed { actions, result, .. } = dispatch else {
            panic!("local relay should complete, got {dispatch:?}");
        };
        assert_eq!(sent_events(&actions), vec!["chat:command", "chat:command_result"]);
        assert_eq!(result.id, MessageId::from("r1"));
        assert_eq!(result.params.get("dueDate").map(String::as_str), Some("2024-02-15"));
        assert_eq!(dispatcher.pending(), 0);
    }

    #[test]
    fn incomplete_command_is_never_sent() {
        let mut dispatcher = Dispatcher::new(RelayMode::Local);
        let mut conn = connected();

        let err = dispatcher
            .execute(bind("create-task Fix bug"), &sender(), stamp(), &mut conn, Instant::now())
            .unwrap_err();

        assert!(matches!(err, ExecutionError::Validation(_)));
    }

    #[test]
    fn disconnected_send_fails_synchronously() {
        let mut dispatcher = Dispatcher::new(RelayMode::Remote);
        let mut conn = ConnectionManager::new(ConnectionConfig::default());

        let err = dispatcher
            .execute(bind("delegate x @alice"), &sender(), stamp(), &mut conn, Instant::now())
            .unwrap_err();

        assert!(matches!(err, ExecutionError::Connection(_)));
        assert_eq!(dispatcher.pending(), 0);
    }

    #[test]
    fn remote_ack_supplies_result_id() {
        let mut dispatcher = Dispatcher::new(RelayMode::Remote);
        let mut conn = connected();

        let Dispatch::Awaiting { ack_id, .. } = dispatcher
            .execute(bind("delegate x @alice"), &sender(), stamp(), &mut conn, Instant::now())
            .expect("ready command")
        else {
            panic!("remote relay should wait for ack");
        };
        assert!(dispatcher.owns(ack_id));

        let settled = dispatcher
            .settle(ack_id, Ok(AckReply::accepted().with_result_id(MessageId::from("srv-9"))))
            .expect("owned ack");

        assert_eq!(settled.command_id, MessageId::from("c1"));
        assert_eq!(settled.outcome.map(|r| r.id), Ok(MessageId::from("srv-9")));
        assert!(dispatcher.settle(ack_id, Ok(AckReply::accepted())).is_none());
    }

    #[test]
    fn remote_timeout_is_an_execution_error() {
        let mut dispatcher = Dispatcher::new(RelayMode::Remote);
        let mut conn = connected();
        let Dispatch::Awaiting { ack_id, .. } = dispatcher
            .execute(bind("delegate x @alice"), &sender(), stamp(), &mut conn, Instant::now())
            .expect("ready command")
        else {
            panic!("remote relay should wait for ack");
        };

        let timeout = TimeoutError {
            event: EventName::ChatCommand,
            ack_id,
            waited: Duration::from_secs(5),
        };
        let settled = dispatcher.settle(ack_id, Err(AckError::Timeout(timeout))).expect("owned");

        assert!(matches!(settled.outcome, Err(ExecutionError::Timeout(_))));
    }
}
