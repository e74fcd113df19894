//! Generic runtime for application orchestration.
//!
//! The Runtime drives the application event loop, coordinating between:
//! - [`App`]: UI state machine
//! - [`Bridge`]: Protocol bridge to Client
//! - [`Driver`]: Platform-specific I/O
//! - [`SessionHandle`]: requests from other tasks, answered when the client
//!   settles them

use std::collections::HashMap;

use huddle_client::{ClientAction, ClientConfig, ClientError, Collaborators, ExecutionError};
use huddle_core::{ConnectionState, Environment};
use huddle_proto::{AckId, AckReply, ChannelId, MessageId, payloads::CommandResultPayload};
use tokio::sync::mpsc;

use crate::{
    App, AppAction, AppEvent, Bridge, Driver, SessionHandle,
    bridge::{Settlement, TransportRequest},
    session::{Reply, Request, SessionError},
};

/// Transport events handled per cycle, so input stays responsive under load.
const MAX_TRANSPORT_EVENTS_PER_CYCLE: usize = 64;

/// Session requests queued before senders wait.
const REQUEST_QUEUE_CAPACITY: usize = 64;

/// Session callers waiting for a settlement.
#[derive(Default)]
struct Waiters {
    connect: Vec<Reply<()>>,
    joins: HashMap<ChannelId, Vec<Reply<()>>>,
    leaves: HashMap<ChannelId, Vec<Reply<()>>>,
    acks: HashMap<AckId, Reply<AckReply>>,
    commands: HashMap<MessageId, Reply<CommandResultPayload>>,
}

/// Generic runtime that orchestrates App, Bridge, and Driver.
///
/// # Type Parameters
///
/// - `D`: Platform-specific I/O driver
/// - `E`: Environment for time and randomness
pub struct Runtime<D, E>
where
    D: Driver,
    E: Environment,
{
    driver: D,
    app: App,
    bridge: Bridge<E>,
    requests: mpsc::Receiver<Request>,
    request_tx: mpsc::Sender<Request>,
    waiters: Waiters,
}

impl<D, E> Runtime<D, E>
where
    D: Driver<Instant = E::Instant>,
    E: Environment,
{
    /// Create a new runtime with the given driver and environment.
    pub fn new(driver: D, env: E, config: ClientConfig, collaborators: Collaborators) -> Self {
        let app = App::new(config.markers);
        let bridge = Bridge::new(env, config, collaborators);
        let (request_tx, requests) = mpsc::channel(REQUEST_QUEUE_CAPACITY);
        Self { driver, app, bridge, requests, request_tx, waiters: Waiters::default() }
    }

    /// Handle for issuing requests from other tasks.
    pub fn session(&self) -> SessionHandle {
        SessionHandle::new(self.request_tx.clone())
    }

    /// Run the main event loop.
    ///
    /// This is the core orchestration loop that:
    /// 1. Connects with the current session token
    /// 2. Polls for input events from the driver
    /// 3. Serves session requests
    /// 4. Receives transport events and ticks the client
    /// 5. Sends outgoing frames and performs transport requests
    ///
    /// # Errors
    ///
    /// Returns an error if the driver encounters an I/O error.
    pub async fn run(mut self) -> Result<(), D::Error> {
        self.driver.render(&self.app)?;

        let actions = self.app.connect();
        let mut should_quit = self.process_actions(actions).await?;
        while !should_quit {
            should_quit = self.process_cycle().await?;
        }

        self.driver.stop();
        Ok(())
    }

    /// Process one cycle of the event loop.
    ///
    /// Returns `true` if the application should quit.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver encounters an I/O error.
    pub async fn process_cycle(&mut self) -> Result<bool, D::Error> {
        if let Some(event) = self.driver.poll_event().await? {
            let actions = self.app.handle(event);
            if self.process_actions(actions).await? {
                return Ok(true);
            }
        }

        while let Ok(request) = self.requests.try_recv() {
            if self.handle_request(request).await? {
                return Ok(true);
            }
        }

        for _ in 0..MAX_TRANSPORT_EVENTS_PER_CYCLE {
            let Some(event) = self.driver.recv_transport().await else {
                break;
            };
            let events = self.bridge.handle_transport(event);
            if self.process_bridge_events(events).await? {
                return Ok(true);
            }
        }

        let now = self.driver.now();
        let events = self.bridge.handle_tick(now);
        if self.process_bridge_events(events).await? {
            return Ok(true);
        }

        self.flush().await
    }

    /// Process actions returned by the App.
    ///
    /// Returns `true` if should quit.
    async fn process_actions(&mut self, initial_actions: Vec<AppAction>) -> Result<bool, D::Error> {
        let mut pending_actions = initial_actions;

        while !pending_actions.is_empty() {
            let actions = std::mem::take(&mut pending_actions);

            for action in actions {
                match action {
                    AppAction::Render => self.driver.render(&self.app)?,
                    AppAction::Quit => return Ok(true),

                    // Protocol operations go through the bridge
                    AppAction::Connect
                    | AppAction::Disconnect
                    | AppAction::JoinChannel { .. }
                    | AppAction::LeaveChannel { .. }
                    | AppAction::SendMessage { .. }
                    | AppAction::Typing { .. }
                    | AppAction::ComposeCommand { .. }
                    | AppAction::ConfirmCommand { .. }
                    | AppAction::CancelCommand { .. } => {
                        let events = self.bridge.process_app_action(action);
                        for event in events {
                            let new_actions = self.app.handle(event);
                            pending_actions.extend(new_actions);
                        }
                    },
                }
            }
        }
        Ok(false)
    }

    /// Process events from Bridge back to App.
    async fn process_bridge_events(&mut self, events: Vec<AppEvent>) -> Result<bool, D::Error> {
        for event in events {
            let actions = self.app.handle(event);
            if self.process_actions(actions).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Serve one session request. Returns `true` on shutdown.
    async fn handle_request(&mut self, request: Request) -> Result<bool, D::Error> {
        let events = match request {
            Request::Connect { reply } => {
                let result = self.bridge.client_mut().connect();
                match &result {
                    Err(e) => {
                        let _ = reply.send(Err(e.clone().into()));
                    },
                    Ok(_) if self.bridge.client().connection_state() == ConnectionState::Connected => {
                        let _ = reply.send(Ok(()));
                    },
                    Ok(_) => self.waiters.connect.push(reply),
                }
                self.bridge.absorb(result)
            },
            Request::Disconnect { reply } => {
                let actions = self.bridge.client_mut().disconnect();
                let _ = reply.send(Ok(()));
                self.bridge.absorb(Ok(actions))
            },
            Request::Join { channel_id, reply } => {
                let result = self.bridge.client_mut().join(&channel_id);
                match &result {
                    Err(e) => {
                        let _ = reply.send(Err(e.clone().into()));
                    },
                    Ok(_) if self.bridge.client().is_live(&channel_id) => {
                        let _ = reply.send(Ok(()));
                    },
                    Ok(_) => self.waiters.joins.entry(channel_id).or_default().push(reply),
                }
                self.bridge.absorb(result)
            },
            Request::Leave { channel_id, reply } => {
                let result = self.bridge.client_mut().leave(&channel_id);
                match &result {
                    Err(e) => {
                        let _ = reply.send(Err(e.clone().into()));
                    },
                    Ok(_) => self.waiters.leaves.entry(channel_id).or_default().push(reply),
                }
                self.bridge.absorb(result)
            },
            Request::SendWithAck { event, timeout, reply } => {
                match self.bridge.client_mut().send_with_ack(event, timeout) {
                    Ok((ack_id, actions)) => {
                        self.waiters.acks.insert(ack_id, reply);
                        self.bridge.absorb(Ok(actions))
                    },
                    Err(e) => {
                        let _ = reply.send(Err(e.into()));
                        vec![]
                    },
                }
            },
            Request::SendMessage { channel_id, text, reply } => {
                let result = self.bridge.client_mut().submit_plain_message(&channel_id, &text);
                let _ = reply.send(result.as_ref().map(|_| ()).map_err(|e| e.clone().into()));
                self.bridge.absorb(result)
            },
            Request::ExecuteCommand { channel_id, input, reply } => {
                let projection = self.bridge.client_mut().begin_command(&channel_id, &input);
                let result = self.bridge.client_mut().confirm_command(&channel_id);
                match &result {
                    Err(e) => {
                        let _ = reply.send(Err(e.clone().into()));
                    },
                    Ok(actions) => match actions.iter().find_map(sent_command_id) {
                        Some(command_id) => {
                            self.waiters.commands.insert(command_id.clone(), reply);
                        },
                        None => tracing::warn!(channel = %channel_id, "command not sent"),
                    },
                }
                let mut events = vec![AppEvent::CommandProjected(projection)];
                events.extend(self.bridge.absorb(result));
                events
            },
            Request::Snapshot { channel_id, reply } => {
                let _ = reply.send(self.bridge.client().snapshot(&channel_id));
                vec![]
            },
            Request::Messages { channel_id, reply } => {
                let _ = reply.send(self.bridge.client().messages(&channel_id).to_vec());
                vec![]
            },
            Request::Shutdown => return Ok(true),
        };
        self.process_bridge_events(events).await
    }

    /// Send pending frames, perform transport requests until none remain,
    /// then answer waiting sessions.
    async fn flush(&mut self) -> Result<bool, D::Error> {
        loop {
            for frame in self.bridge.take_outgoing() {
                self.driver.send_frame(frame).await?;
            }

            let requests = self.bridge.take_transport_requests();
            if requests.is_empty() {
                break;
            }

            for request in requests {
                match request {
                    TransportRequest::Open { token, attempt } => {
                        tracing::debug!(attempt, "opening transport");
                        let event = self.driver.open(&token).await;
                        let events = self.bridge.handle_transport(event);
                        if self.process_bridge_events(events).await? {
                            return Ok(true);
                        }
                    },
                    TransportRequest::Close => self.driver.close(),
                }
            }
        }

        self.resolve_settlements();
        Ok(false)
    }

    fn resolve_settlements(&mut self) {
        for settlement in self.bridge.take_settlements() {
            match settlement {
                Settlement::Connected(result) => {
                    for reply in self.waiters.connect.drain(..) {
                        let _ = reply.send(result.clone().map_err(|e| ClientError::from(e).into()));
                    }
                },
                Settlement::Joined { channel_id, result } => {
                    for reply in self.waiters.joins.remove(&channel_id).unwrap_or_default() {
                        let _ = reply.send(result.clone().map_err(|e| ClientError::from(e).into()));
                    }
                },
                Settlement::Left { channel_id, result } => {
                    for reply in self.waiters.leaves.remove(&channel_id).unwrap_or_default() {
                        let _ = reply.send(result.clone().map_err(|e| ClientError::from(e).into()));
                    }
                },
                Settlement::Ack { ack_id, result } => {
                    if let Some(reply) = self.waiters.acks.remove(&ack_id) {
                        let result = result.map_err(|e| {
                            SessionError::Client(ClientError::from(ExecutionError::from(e)))
                        });
                        let _ = reply.send(result);
                    }
                },
                Settlement::Command { command_id, result, .. } => {
                    if let Some(reply) = self.waiters.commands.remove(&command_id) {
                        let _ = reply.send(result.map_err(|e| ClientError::from(e).into()));
                    }
                },
            }
        }
    }

    /// Get a reference to the App
    pub fn app(&self) -> &App {
        &self.app
    }

    /// Get a mutable reference to the App
    pub fn app_mut(&mut self) -> &mut App {
        &mut self.app
    }

    /// Get a reference to the Bridge
    pub fn bridge(&self) -> &Bridge<E> {
        &self.bridge
    }

    /// Get a reference to the Driver
    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Get a mutable reference to the Driver
    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }
}

fn sent_command_id(action: &ClientAction) -> Option<&MessageId> {
    match action {
        ClientAction::CommandSent { command_id, .. } => Some(command_id),
        _ => None,
    }
}
