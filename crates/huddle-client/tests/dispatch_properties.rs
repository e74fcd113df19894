//! Property tests for remote command execution.
//!
//! A remote relay acknowledges commands in any order, rejects some and loses
//! others. Whatever happens, each command completes exactly once and the
//! collaborator runs only for commands the server accepted.

use std::collections::HashMap;

use huddle_client::{
    Client, ClientAction, ClientConfig, ClientEvent, Identity, RelayMode, TransportEvent,
};
use huddle_core::{Environment, connection::DEFAULT_ACK_TIMEOUT};
use huddle_harness::{RecordingServices, SimEnv, SimInstant};
use huddle_proto::{AckFrame, AckId, AckReply, ChannelId, MessageId, WireMessage};
use proptest::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fate {
    Accepted,
    Rejected,
    Lost,
}

fn fate() -> impl Strategy<Value = Fate> {
    prop_oneof![Just(Fate::Accepted), Just(Fate::Rejected), Just(Fate::Lost)]
}

/// Fates for up to five commands, plus the order their acks arrive in.
fn schedule() -> impl Strategy<Value = (Vec<Fate>, Vec<usize>)> {
    prop::collection::vec(fate(), 1..6).prop_flat_map(|fates| {
        let order: Vec<usize> = (0..fates.len()).collect();
        (Just(fates), Just(order).prop_shuffle())
    })
}

fn channel() -> ChannelId {
    ChannelId::from("p1")
}

fn ack_of(actions: &[ClientAction]) -> Option<AckId> {
    actions.iter().find_map(|action| match action {
        ClientAction::Send(WireMessage::Event(envelope)) => envelope.ack,
        _ => None,
    })
}

fn sent_id(actions: &[ClientAction]) -> Option<MessageId> {
    actions.iter().find_map(|action| match action {
        ClientAction::CommandSent { command_id, .. } => Some(command_id.clone()),
        _ => None,
    })
}

fn ack_frame(ack: AckId, data: AckReply) -> ClientEvent<SimInstant> {
    let frame = WireMessage::Ack(AckFrame { ack, data }).encode().unwrap();
    ClientEvent::Transport(TransportEvent::Frame(frame))
}

fn joined_client(env: &SimEnv, services: &RecordingServices) -> Client<SimEnv> {
    let mut config = ClientConfig::new(Identity::new("alice"));
    config.relay = RelayMode::Remote;
    let mut client = Client::new(env.clone(), config, services.collaborators());

    client.connect().unwrap();
    client.handle(ClientEvent::Transport(TransportEvent::Opened)).unwrap();
    let join = client.join(&channel()).unwrap();
    client.handle(ack_frame(ack_of(&join).unwrap(), AckReply::accepted())).unwrap();
    assert!(client.is_live(&channel()));
    client
}

/// Record every completion in `actions`, keyed by command id.
fn collect(actions: Vec<ClientAction>, completed: &mut HashMap<MessageId, Vec<bool>>) {
    for action in actions {
        if let ClientAction::CommandCompleted { command_id, result, .. } = action {
            completed.entry(command_id).or_default().push(result.is_ok());
        }
    }
}

proptest! {
    #[test]
    fn each_command_completes_once((fates, order) in schedule(), replay in any::<bool>()) {
        let env = SimEnv::with_seed(21);
        let services = RecordingServices::new("token-alice").with_member("bob", "Bob");
        let mut client = joined_client(&env, &services);

        let mut sent = Vec::new();
        for i in 0..fates.len() {
            client.begin_command(&channel(), &format!("/delegate Task{i} @bob"));
            let actions = client.confirm_command(&channel()).unwrap();
            sent.push((sent_id(&actions).unwrap(), ack_of(&actions).unwrap()));
        }

        let mut completed: HashMap<MessageId, Vec<bool>> = HashMap::new();
        for &i in &order {
            let reply = match fates[i] {
                Fate::Accepted => AckReply::accepted(),
                Fate::Rejected => AckReply::rejected("not allowed"),
                Fate::Lost => continue,
            };
            let (_, ack) = &sent[i];
            collect(client.handle(ack_frame(*ack, reply.clone())).unwrap(), &mut completed);
            if replay {
                collect(client.handle(ack_frame(*ack, reply)).unwrap(), &mut completed);
            }
        }

        env.advance(DEFAULT_ACK_TIMEOUT);
        let now = env.now();
        collect(client.handle(ClientEvent::Tick { now }).unwrap(), &mut completed);

        for (i, (command_id, _)) in sent.iter().enumerate() {
            let outcomes = completed.get(command_id).cloned().unwrap_or_default();
            prop_assert_eq!(outcomes, vec![fates[i] == Fate::Accepted]);
        }
        let accepted = fates.iter().filter(|f| **f == Fate::Accepted).count();
        prop_assert_eq!(services.delegations().len(), accepted);
    }
}
