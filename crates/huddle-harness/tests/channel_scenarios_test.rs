//! Multi-user channel scenarios through the simulated relay.
//!
//! # Oracle Pattern
//!
//! Each test drives clients through [`Scenario`] and ends with oracle checks
//! on what every user observes:
//! - Message streams hold each entry exactly once
//! - Collaborators ran exactly as often as commands succeeded
//! - Presence reflects who is actually connected

use std::time::Duration;

use chrono::NaiveDate;
use huddle_client::{
    ClientAction, ClientConfig, ClientError, CollaboratorError, ExecutionError, Identity,
    MessageKind, RelayMode, SessionToken,
};
use huddle_core::{
    ConnectionError, ConnectionState,
    connection::{DEFAULT_ACK_TIMEOUT, DEFAULT_RECONNECT_DELAY},
};
use huddle_harness::{InvariantRegistry, Scenario};
use huddle_proto::{ChannelId, Event, UserId};

const TEAM: &[(&str, &str)] = &[("alice", "Alice"), ("bob", "Bob"), ("carol", "Carol")];

fn channel() -> ChannelId {
    ChannelId::from("p1")
}

/// Alice and Bob connected and joined to `p1`, with invariant checks.
fn pair() -> Scenario {
    let mut sim = Scenario::new(7).with_invariants(InvariantRegistry::standard());
    sim.add_user("alice", TEAM).add_user("bob", TEAM);
    sim.connect_and_join(&["alice", "bob"], "p1").unwrap();
    sim
}

/// Bodies of plain messages `user` sees in `p1`.
fn chat(sim: &Scenario, user: &str) -> Vec<String> {
    sim.client(user)
        .messages(&channel())
        .iter()
        .filter(|m| m.kind == MessageKind::Message)
        .map(|m| m.body.clone())
        .collect()
}

/// Command results `user` sees in `p1`.
fn results(sim: &Scenario, user: &str) -> Vec<(String, String)> {
    sim.client(user)
        .messages(&channel())
        .iter()
        .filter(|m| m.kind == MessageKind::CommandResult)
        .map(|m| (m.id.to_string(), m.body.clone()))
        .collect()
}

fn completions(sim: &Scenario, user: &str) -> Vec<Result<String, ExecutionError>> {
    sim.log(user)
        .iter()
        .filter_map(|action| match action {
            ClientAction::CommandCompleted { result, .. } => {
                Some(result.clone().map(|r| r.id.to_string()))
            },
            _ => None,
        })
        .collect()
}

#[test]
fn message_round_trip_appends_once_everywhere() {
    let mut sim = pair();

    sim.send("alice", "p1", "hello").unwrap();

    assert_eq!(chat(&sim, "alice"), ["hello"]);
    assert_eq!(chat(&sim, "bob"), ["hello"]);

    let sent = sim.client("alice").messages(&channel()).last().cloned().unwrap();
    let seen = sim.client("bob").messages(&channel()).last().cloned().unwrap();
    assert_eq!(sent.id, seen.id);
    assert_eq!(seen.sender_id, UserId::from("alice"));
}

#[test]
fn blank_messages_are_not_sent() {
    let mut sim = pair();
    let before = sim.relay().received().len();

    sim.send("alice", "p1", "   ").unwrap();

    assert_eq!(sim.relay().received().len(), before);
    assert!(chat(&sim, "alice").is_empty());
}

#[test]
fn joining_twice_sends_one_request() {
    let mut sim = pair();

    sim.join("alice", "p1").unwrap();

    let joins = sim
        .relay()
        .received()
        .iter()
        .filter(|f| f.user == UserId::from("alice") && matches!(f.event, Event::Join { .. }))
        .count();
    assert_eq!(joins, 1);
    assert!(sim.client("alice").is_live(&channel()));
}

#[test]
fn join_syncs_presence_and_announces_newcomers() {
    let sim = pair();

    let alice_sees = sim.client("alice").online_users(&channel());
    let bob_sees = sim.client("bob").online_users(&channel());

    assert!(alice_sees.contains(&UserId::from("bob")));
    assert_eq!(alice_sees, bob_sees);

    let notices: Vec<_> = sim
        .client("alice")
        .messages(&channel())
        .iter()
        .filter(|m| m.kind == MessageKind::PresenceChange)
        .map(|m| m.body.clone())
        .collect();
    assert_eq!(notices.len(), 1, "alice is told once that bob came online: {notices:?}");
}

#[test]
fn leaving_clears_the_channel_and_notifies_others() {
    let mut sim = pair();
    sim.send("alice", "p1", "before").unwrap();

    sim.leave("bob", "p1").unwrap();

    assert!(sim.client("bob").messages(&channel()).is_empty());
    assert!(!sim.client("bob").channels().contains(&channel()));
    assert!(!sim.client("alice").online_users(&channel()).contains(&UserId::from("bob")));
    assert!(sim.log("bob").contains(&ClientAction::ChannelLeft { channel_id: channel() }));
}

#[test]
fn refused_join_reports_failure() {
    let mut sim = Scenario::new(3);
    sim.add_user("alice", TEAM);
    sim.relay_mut().refuse_channel(ChannelId::from("secret"));

    sim.connect("alice").unwrap();
    sim.join("alice", "secret").unwrap();

    let failed = sim.log("alice").iter().any(|a| {
        matches!(a, ClientAction::JoinFailed { channel_id, .. } if channel_id.as_str() == "secret")
    });
    assert!(failed);
    assert!(!sim.client("alice").is_live(&ChannelId::from("secret")));
}

#[test]
fn typing_is_throttled_and_cleared_by_the_message() {
    let mut sim = pair();
    let ch = channel();

    sim.act("alice", |client| client.notify_typing(&ch)).unwrap();
    sim.act("alice", |client| client.notify_typing(&ch)).unwrap();

    let typing_frames = sim
        .relay()
        .received()
        .iter()
        .filter(|f| matches!(f.event, Event::Typing(_)))
        .count();
    assert_eq!(typing_frames, 1);
    assert!(sim.client("bob").typing_users(&ch).contains(&UserId::from("alice")));

    sim.send("alice", "p1", "done typing").unwrap();

    assert!(sim.client("bob").typing_users(&ch).is_empty());
}

#[test]
fn typing_indicator_expires() {
    let mut sim = pair();
    let ch = channel();
    sim.act("alice", |client| client.notify_typing(&ch)).unwrap();

    sim.advance(Duration::from_secs(10));

    assert!(sim.client("bob").typing_users(&ch).is_empty());
}

#[test]
fn milestone_command_calls_the_service_once() {
    let mut sim = pair();

    sim.command("alice", "p1", r#"/set-milestone "Beta" 2024-02-15"#).unwrap();

    let milestones = sim.services("alice").milestones();
    assert_eq!(milestones.len(), 1);
    assert_eq!(milestones[0].name, "Beta");
    assert_eq!(milestones[0].due_date, NaiveDate::from_ymd_opt(2024, 2, 15).unwrap());
    assert_eq!(milestones[0].description, None);
    assert!(sim.services("bob").milestones().is_empty());

    let alice = results(&sim, "alice");
    assert_eq!(alice.len(), 1);
    assert_eq!(alice, results(&sim, "bob"));
}

#[test]
fn mentions_bind_to_member_ids() {
    let mut sim = pair();

    sim.command("alice", "p1", r#"/create-task "Fix login" @Bob"#).unwrap();

    let tasks = sim.services("alice").tasks();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].title, "Fix login");
    assert_eq!(tasks[0].assignee.id, UserId::from("bob"));
}

#[test]
fn unresolved_mention_blocks_confirmation() {
    let mut sim = pair();

    let projection = sim.compose("alice", "p1", "/delegate Ship @nobody");
    assert!(!projection.can_execute);
    assert!(!projection.errors.is_empty());

    let before = sim.relay().received().len();
    let result = sim.command("alice", "p1", "/delegate Ship @nobody");

    assert!(matches!(result, Err(ClientError::Execution(ExecutionError::Validation(_)))));
    assert_eq!(sim.relay().received().len(), before);
    assert!(sim.services("alice").delegations().is_empty());
}

#[test]
fn collaborator_failure_is_reported_in_the_stream() {
    let mut sim = pair();
    sim.services("alice").fail_with(Some(CollaboratorError::new("tasks", "service down")));

    sim.command("alice", "p1", r#"/create-task "Fix login" @bob"#).unwrap();

    let completion = completions(&sim, "alice");
    assert!(matches!(completion.as_slice(), [Err(ExecutionError::Collaborator(_))]));

    let notices: Vec<_> = sim
        .client("alice")
        .messages(&channel())
        .iter()
        .filter(|m| m.kind == MessageKind::System)
        .map(|m| m.body.clone())
        .collect();
    assert_eq!(notices.len(), 1);
    assert!(notices[0].starts_with("command /create-task failed"));
}

fn remote_pair() -> Scenario {
    let mut sim = Scenario::new(11);
    for user in ["alice", "bob"] {
        let mut config = ClientConfig::new(Identity::new(user));
        config.relay = RelayMode::Remote;
        sim.add_user_with_config(config, TEAM);
    }
    sim.connect_and_join(&["alice", "bob"], "p1").unwrap();
    sim
}

#[test]
fn remote_commands_take_the_server_result_id() {
    let mut sim = remote_pair();

    sim.command("alice", "p1", r#"/set-milestone "Beta" 2024-02-15"#).unwrap();

    assert_eq!(completions(&sim, "alice"), [Ok("result-1".to_owned())]);
    let ids: Vec<_> = results(&sim, "alice").into_iter().map(|(id, _)| id).collect();
    assert_eq!(ids, ["result-1"]);
    assert_eq!(results(&sim, "bob").len(), 1);
    assert_eq!(sim.services("alice").milestones().len(), 1);
}

#[test]
fn rejected_remote_command_runs_nothing() {
    let mut sim = remote_pair();
    sim.relay_mut().reject_commands(Some("read-only project".to_owned()));

    sim.command("alice", "p1", r#"/set-milestone "Beta" 2024-02-15"#).unwrap();

    assert!(matches!(
        completions(&sim, "alice").as_slice(),
        [Err(ExecutionError::Rejected { reason })] if reason == "read-only project"
    ));
    assert!(sim.services("alice").milestones().is_empty());
}

#[test]
fn lost_acknowledgement_times_out_without_side_effects() {
    let mut sim = remote_pair();
    sim.relay_mut().set_drop_acks(true);

    sim.command("alice", "p1", r#"/set-milestone "Beta" 2024-02-15"#).unwrap();
    assert!(completions(&sim, "alice").is_empty());
    assert_eq!(sim.client("alice").pending_acks(), 1);

    sim.advance(DEFAULT_ACK_TIMEOUT);

    let completion = completions(&sim, "alice");
    assert!(matches!(completion.as_slice(), [Err(e)] if e.is_timeout()));
    assert!(sim.services("alice").milestones().is_empty());
    assert_eq!(sim.client("alice").pending_acks(), 0);

    // Time passing after the failure never retries the command.
    sim.advance(DEFAULT_ACK_TIMEOUT * 3);
    assert_eq!(completions(&sim, "alice").len(), 1);
    assert!(sim.services("alice").milestones().is_empty());
}

#[test]
fn dropped_connection_resets_presence_and_rejoins() {
    let mut sim = pair();
    let ch = channel();

    sim.drop_connection("alice");

    assert_eq!(sim.client("alice").connection_state(), ConnectionState::Reconnecting);
    assert!(!sim.client("alice").is_live(&ch));
    assert!(sim.client("alice").online_users(&ch).is_empty());
    assert!(!sim.client("bob").online_users(&ch).contains(&UserId::from("alice")));

    sim.clear_logs();
    sim.advance(DEFAULT_RECONNECT_DELAY);

    assert_eq!(sim.client("alice").connection_state(), ConnectionState::Connected);
    assert!(sim.client("alice").is_live(&ch));
    assert!(sim.log("alice").contains(&ClientAction::Reconnected));
    assert!(
        sim.log("alice").contains(&ClientAction::ChannelJoined { channel_id: ch.clone(), rejoin: true })
    );
    assert!(sim.client("alice").online_users(&ch).contains(&UserId::from("bob")));
    assert!(sim.client("bob").online_users(&ch).contains(&UserId::from("alice")));

    sim.send("bob", "p1", "welcome back").unwrap();
    assert_eq!(chat(&sim, "alice"), ["welcome back"]);
}

#[test]
fn unreachable_relay_exhausts_reconnects() {
    let mut sim = pair();
    sim.relay_mut().set_unreachable(true);
    sim.drop_connection("alice");

    for _ in 0..10 {
        sim.advance(Duration::from_secs(5));
    }

    assert_eq!(sim.client("alice").connection_state(), ConnectionState::Disconnected);
    let gave_up = sim.log("alice").iter().any(|a| {
        matches!(a, ClientAction::ConnectionFailed(ConnectionError::ReconnectExhausted { .. }))
    });
    assert!(gave_up);
}

#[test]
fn revoked_token_fails_without_retrying() {
    let mut sim = Scenario::new(5);
    sim.add_user("alice", TEAM);
    sim.relay_mut().revoke_token(&SessionToken::new("token-alice"));

    sim.connect("alice").unwrap();

    assert_eq!(sim.client("alice").connection_state(), ConnectionState::Disconnected);
    let rejected = sim.log("alice").iter().any(|a| {
        matches!(a, ClientAction::ConnectionFailed(ConnectionError::HandshakeRejected { .. }))
    });
    assert!(rejected);

    sim.clear_logs();
    sim.advance(Duration::from_secs(30));
    assert!(!sim.log("alice").iter().any(|a| matches!(a, ClientAction::OpenTransport { .. })));
}

#[test]
fn signed_out_user_cannot_connect() {
    let mut sim = Scenario::new(5);
    sim.add_user("alice", TEAM);
    sim.services("alice").set_token(None);

    let result = sim.connect("alice");

    assert_eq!(result, Err(ClientError::Connection(ConnectionError::MissingToken)));
    assert!(sim.relay().received().is_empty());
}

#[test]
fn sending_while_disconnected_fails() {
    let mut sim = pair();
    sim.disconnect("alice").unwrap();

    let result = sim.send("alice", "p1", "anyone?");

    assert!(matches!(
        result,
        Err(ClientError::Connection(ConnectionError::NotConnected { .. }))
    ));
    assert!(chat(&sim, "bob").is_empty());
}

#[test]
fn joined_pair_snapshot() {
    let sim = pair();

    insta::assert_json_snapshot!(sim.snapshot(), {
        ".clients[].channels.p1.message_ids" => "[ids]",
    }, @r#"
    {
      "clients": [
        {
          "id": "alice",
          "connected": true,
          "active_channel": null,
          "channels": {
            "p1": {
              "live": true,
              "presence_synced": true,
              "online": [
                "alice",
                "bob"
              ],
              "message_ids": "[ids]"
            }
          }
        },
        {
          "id": "bob",
          "connected": true,
          "active_channel": null,
          "channels": {
            "p1": {
              "live": true,
              "presence_synced": true,
              "online": [
                "alice",
                "bob"
              ],
              "message_ids": "[ids]"
            }
          }
        }
      ]
    }
    "#);
}
