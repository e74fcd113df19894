//! End-to-end tests for a single client against hand-written server frames.
//!
//! These tests play the server by hand: they read the frames the client
//! sends, then feed back the exact acknowledgements and events a relay would
//! produce, so every wire-level decision of the client is visible.

use std::time::Duration;

use huddle_client::{
    Client, ClientAction, ClientConfig, ClientEvent, ExecutionError, Identity, MessageKind,
    RelayMode, TransportEvent,
};
use huddle_core::{ConnectionState, Environment, connection::DEFAULT_ACK_TIMEOUT};
use huddle_harness::{RecordingServices, SimEnv};
use huddle_proto::{
    AckFrame, AckId, AckReply, ChannelId, Envelope, Event, EventName, MessageId, UserId,
    WireMessage,
    payloads::{MessagePayload, PresencePayload, TypingPayload},
};

struct TestClient {
    env: SimEnv,
    client: Client<SimEnv>,
    services: RecordingServices,
}

impl TestClient {
    fn new(relay: RelayMode) -> Self {
        let env = SimEnv::with_seed(9);
        let services = RecordingServices::new("token-alice").with_member("bob", "Bob");
        let mut config = ClientConfig::new(Identity::new("alice"));
        config.relay = relay;
        let client = Client::new(env.clone(), config, services.collaborators());
        Self { env, client, services }
    }

    /// Connected client with `p1` joined and `online` reported by the server.
    fn joined(relay: RelayMode, online: &[&str]) -> Self {
        let mut test = Self::new(relay);
        test.connect();
        let actions = test.client.join(&channel()).unwrap();
        let (ack, _) = sent_events(&actions).pop().unwrap();
        let online = online.iter().map(|u| UserId::from(*u));
        test.feed(ack_frame(ack.unwrap(), AckReply::accepted().with_online(online)));
        test
    }

    fn connect(&mut self) {
        let actions = self.client.connect().unwrap();
        assert!(matches!(actions.as_slice(), [ClientAction::OpenTransport { attempt: 0, .. }, ..]));
        let actions = self.transport(TransportEvent::Opened);
        assert!(actions.contains(&ClientAction::ConnectionChanged(ConnectionState::Connected)));
    }

    fn transport(&mut self, event: TransportEvent) -> Vec<ClientAction> {
        self.client.handle(ClientEvent::Transport(event)).unwrap()
    }

    fn feed(&mut self, frame: String) -> Vec<ClientAction> {
        self.transport(TransportEvent::Frame(frame))
    }

    fn tick(&mut self, elapsed: Duration) -> Vec<ClientAction> {
        self.env.advance(elapsed);
        let now = self.env.now();
        self.client.handle(ClientEvent::Tick { now }).unwrap()
    }
}

fn channel() -> ChannelId {
    ChannelId::from("p1")
}

fn event_frame(event: Event) -> String {
    WireMessage::Event(event.into_envelope(None).unwrap()).encode().unwrap()
}

fn ack_frame(ack: AckId, data: AckReply) -> String {
    WireMessage::Ack(AckFrame { ack, data }).encode().unwrap()
}

/// Events the client wants written, with their ack ids.
fn sent_events(actions: &[ClientAction]) -> Vec<(Option<AckId>, Event)> {
    actions
        .iter()
        .filter_map(|action| match action {
            ClientAction::Send(WireMessage::Event(envelope)) => Some(decode(envelope)),
            _ => None,
        })
        .collect()
}

fn decode(envelope: &Envelope) -> (Option<AckId>, Event) {
    (envelope.ack, Event::from_envelope(envelope).unwrap())
}

fn presence(user: &str) -> PresencePayload {
    PresencePayload {
        channel_id: channel(),
        user_id: UserId::from(user),
        display: Some(user.to_owned()),
        timestamp: 1,
    }
}

fn message_from(user: &str, id: &str, body: &str) -> Event {
    Event::Message(MessagePayload {
        channel_id: channel(),
        id: MessageId::from(id),
        sender_id: UserId::from(user),
        sender_display: user.to_owned(),
        body: body.to_owned(),
        timestamp: 1,
    })
}

#[test]
fn join_request_is_acknowledged_and_syncs_presence() {
    let mut test = TestClient::new(RelayMode::Local);
    test.connect();

    let actions = test.client.join(&channel()).unwrap();
    let sent = sent_events(&actions);
    assert_eq!(sent.len(), 1);
    let (ack, event) = &sent[0];
    assert!(ack.is_some());
    assert_eq!(event.name(), EventName::Join("project".to_owned()));
    assert!(!test.client.is_live(&channel()));

    let online = [UserId::from("alice"), UserId::from("bob")];
    let actions = test.feed(ack_frame(ack.unwrap(), AckReply::accepted().with_online(online)));

    assert!(actions.contains(&ClientAction::ChannelJoined { channel_id: channel(), rejoin: false }));
    assert!(test.client.is_live(&channel()));
    assert_eq!(test.client.online_users(&channel()).len(), 2);
}

#[test]
fn presence_during_join_is_replayed_after_sync() {
    let mut test = TestClient::new(RelayMode::Local);
    test.connect();
    let actions = test.client.join(&channel()).unwrap();
    let (ack, _) = sent_events(&actions).pop().unwrap();

    // Online arrives before the join acknowledgement.
    let early = test.feed(event_frame(Event::Online(presence("carol"))));
    assert!(early.is_empty());
    assert!(test.client.online_users(&channel()).is_empty());

    test.feed(ack_frame(ack.unwrap(), AckReply::accepted().with_online([UserId::from("alice")])));

    let online = test.client.online_users(&channel());
    assert!(online.contains(&UserId::from("carol")));
    let notices = test
        .client
        .messages(&channel())
        .iter()
        .filter(|m| m.kind == MessageKind::PresenceChange)
        .count();
    assert_eq!(notices, 1);
}

#[test]
fn events_for_other_channels_are_dropped() {
    let mut test = TestClient::joined(RelayMode::Local, &["alice"]);

    let stray = Event::Message(MessagePayload {
        channel_id: ChannelId::from("p9"),
        id: MessageId::from("m-stray"),
        sender_id: UserId::from("bob"),
        sender_display: "Bob".to_owned(),
        body: "wrong room".to_owned(),
        timestamp: 1,
    });
    let actions = test.feed(event_frame(stray));

    assert!(actions.is_empty());
    assert!(test.client.messages(&ChannelId::from("p9")).is_empty());
}

#[test]
fn duplicate_deliveries_append_once() {
    let mut test = TestClient::joined(RelayMode::Local, &["alice", "bob"]);

    let first = test.feed(event_frame(message_from("bob", "m-1", "hi")));
    let second = test.feed(event_frame(message_from("bob", "m-1", "hi")));

    assert!(first.iter().any(|a| matches!(a, ClientAction::MessageAppended(_))));
    assert!(second.is_empty());
    let chat = test
        .client
        .messages(&channel())
        .iter()
        .filter(|m| m.kind == MessageKind::Message)
        .count();
    assert_eq!(chat, 1);
}

#[test]
fn own_message_echo_is_deduplicated() {
    let mut test = TestClient::joined(RelayMode::Local, &["alice"]);

    let actions = test.client.submit_plain_message(&channel(), "  hello  ").unwrap();
    let (ack, event) = sent_events(&actions).pop().unwrap();
    assert_eq!(ack, None);
    let Event::Message(payload) = &event else {
        panic!("expected a message, got {event:?}");
    };
    assert_eq!(payload.body, "hello");

    let echoed = test.feed(event_frame(event.clone()));

    assert!(echoed.is_empty());
    assert_eq!(test.client.messages(&channel()).last().unwrap().id, payload.id);
}

#[test]
fn remote_typing_expires_and_own_typing_is_ignored() {
    let mut test = TestClient::joined(RelayMode::Local, &["alice", "bob"]);
    let typing = |user: &str| {
        Event::Typing(TypingPayload { channel_id: channel(), user_id: UserId::from(user), timestamp: 1 })
    };

    test.feed(event_frame(typing("alice")));
    assert!(test.client.typing_users(&channel()).is_empty());

    let actions = test.feed(event_frame(typing("bob")));
    assert!(actions.contains(&ClientAction::PresenceChanged { channel_id: channel() }));
    assert!(test.client.typing_users(&channel()).contains(&UserId::from("bob")));

    let expired = test.tick(Duration::from_secs(10));
    assert!(expired.contains(&ClientAction::PresenceChanged { channel_id: channel() }));
    assert!(test.client.typing_users(&channel()).is_empty());
}

#[test]
fn acknowledged_send_settles_with_the_reply() {
    let mut test = TestClient::joined(RelayMode::Local, &["alice"]);

    let (ack_id, actions) = test.client.send_with_ack(message_from("alice", "m-2", "ping"), None).unwrap();
    assert_eq!(sent_events(&actions)[0].0, Some(ack_id));

    let settled = test.feed(ack_frame(ack_id, AckReply::accepted()));

    assert_eq!(settled, [ClientAction::AckSettled { ack_id, result: Ok(AckReply::accepted()) }]);
    assert_eq!(test.client.pending_acks(), 0);
}

#[test]
fn acknowledged_send_times_out() {
    let mut test = TestClient::joined(RelayMode::Local, &["alice"]);
    let (ack_id, _) = test
        .client
        .send_with_ack(message_from("alice", "m-3", "ping"), Some(Duration::from_secs(1)))
        .unwrap();

    assert!(test.tick(Duration::from_millis(999)).is_empty());
    let actions = test.tick(Duration::from_millis(1));

    assert!(matches!(
        actions.as_slice(),
        [ClientAction::AckSettled { ack_id: id, result: Err(_) }] if *id == ack_id
    ));

    // A late acknowledgement is ignored.
    assert!(test.feed(ack_frame(ack_id, AckReply::accepted())).is_empty());
}

#[test]
fn local_command_sends_request_then_result() {
    let mut test = TestClient::joined(RelayMode::Local, &["alice", "bob"]);
    test.client.begin_command(&channel(), "/delegate Ship @bob");

    let actions = test.client.confirm_command(&channel()).unwrap();

    let sent: Vec<_> = sent_events(&actions).into_iter().map(|(ack, e)| (ack, e.name())).collect();
    assert_eq!(sent, [(None, EventName::ChatCommand), (None, EventName::ChatCommandResult)]);
    assert_eq!(test.services.delegations().len(), 1);
    assert!(actions.iter().any(|a| matches!(
        a,
        ClientAction::CommandCompleted { command, result: Ok(_), .. } if command == "delegate"
    )));
}

#[test]
fn remote_command_waits_for_the_server() {
    let mut test = TestClient::joined(RelayMode::Remote, &["alice", "bob"]);
    test.client.begin_command(&channel(), "/delegate Ship @bob");

    let actions = test.client.confirm_command(&channel()).unwrap();
    let (ack, event) = sent_events(&actions).pop().unwrap();
    assert_eq!(event.name(), EventName::ChatCommand);
    assert!(test.services.delegations().is_empty());

    let reply = AckReply::accepted().with_result_id(MessageId::from("srv-1"));
    let settled = test.feed(ack_frame(ack.unwrap(), reply));

    assert!(settled.iter().any(|a| matches!(
        a,
        ClientAction::CommandCompleted { result: Ok(result), .. } if result.id.as_str() == "srv-1"
    )));
    assert_eq!(test.services.delegations().len(), 1);
}

#[test]
fn completion_carries_the_sent_command_id() {
    let mut test = TestClient::joined(RelayMode::Remote, &["alice", "bob"]);
    test.client.begin_command(&channel(), "/delegate Ship @bob");
    let first = test.client.confirm_command(&channel()).unwrap();
    test.client.begin_command(&channel(), "/delegate Docs @bob");
    let second = test.client.confirm_command(&channel()).unwrap();

    let sent_id = |actions: &[ClientAction]| {
        actions.iter().find_map(|a| match a {
            ClientAction::CommandSent { command_id, .. } => Some(command_id.clone()),
            _ => None,
        })
    };
    let (first_id, second_id) = (sent_id(&first).unwrap(), sent_id(&second).unwrap());
    assert_ne!(first_id, second_id);

    // The server answers the second command first.
    let second_ack = sent_events(&second).pop().unwrap().0.unwrap();
    let settled = test.feed(ack_frame(second_ack, AckReply::accepted()));

    assert!(settled.iter().any(|a| matches!(
        a,
        ClientAction::CommandCompleted { command_id, .. } if *command_id == second_id
    )));
}

#[test]
fn remote_command_timeout_skips_the_collaborator() {
    let mut test = TestClient::joined(RelayMode::Remote, &["alice", "bob"]);
    test.client.begin_command(&channel(), "/delegate Ship @bob");
    test.client.confirm_command(&channel()).unwrap();

    let actions = test.tick(DEFAULT_ACK_TIMEOUT);

    assert!(actions.iter().any(|a| matches!(
        a,
        ClientAction::CommandCompleted { result: Err(ExecutionError::Timeout(_)), .. }
    )));
    assert!(test.services.delegations().is_empty());
}

#[test]
fn reconnect_rejoins_stale_channels() {
    let mut test = TestClient::joined(RelayMode::Local, &["alice", "bob"]);

    let lost = test.transport(TransportEvent::Closed { reason: "reset".to_owned() });
    assert!(lost.contains(&ClientAction::ConnectionChanged(ConnectionState::Reconnecting)));
    assert!(!test.client.is_live(&channel()));
    assert!(test.client.online_users(&channel()).is_empty());

    let retry = test.tick(Duration::from_secs(2));
    assert!(matches!(retry.as_slice(), [ClientAction::OpenTransport { attempt: 1, .. }]));

    let opened = test.transport(TransportEvent::Opened);
    assert!(opened.contains(&ClientAction::Reconnected));
    let (ack, event) = sent_events(&opened).pop().unwrap();
    assert_eq!(event.name(), EventName::Join("project".to_owned()));

    let rejoined = test.feed(ack_frame(ack.unwrap(), AckReply::accepted().with_online([UserId::from("alice")])));
    assert!(rejoined.contains(&ClientAction::ChannelJoined { channel_id: channel(), rejoin: true }));
    assert!(test.client.is_live(&channel()));
}
