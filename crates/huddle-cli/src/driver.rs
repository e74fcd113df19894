//! Terminal driver: stdin lines in, WebSocket frames out.
//!
//! Each input line becomes the key events that type it, followed by Enter,
//! so the composer and command parser see exactly what an interactive
//! keyboard would produce. Output is written by a [`Renderer`].

use std::{collections::VecDeque, io, time::Duration};

use huddle_app::{App, AppEvent, Driver, KeyInput};
use huddle_client::{
    TransportEvent,
    transport::{self, ConnectedClient},
};
use huddle_core::SessionToken;
use thiserror::Error;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::mpsc::{self, error::TryRecvError},
};

use crate::render::Renderer;

/// How long an idle poll waits before letting the runtime tick.
const TICK: Duration = Duration::from_millis(100);

/// Stdin lines buffered ahead of the runtime.
const LINE_BUFFER: usize = 32;

/// Driver errors.
#[derive(Debug, Error)]
pub enum CliError {
    /// Writing to the terminal failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// What woke an idle poll.
enum Wake {
    Line(Option<String>),
    Transport(Option<TransportEvent>),
    Tick,
}

/// [`Driver`] over stdin, stdout and a WebSocket relay.
pub struct StdioDriver<W> {
    url: String,
    lines: Option<mpsc::Receiver<String>>,
    pending: VecDeque<AppEvent>,
    transport: VecDeque<TransportEvent>,
    connection: Option<ConnectedClient>,
    renderer: Renderer<W>,
    composer_dirty: bool,
}

impl<W: io::Write + Send> StdioDriver<W> {
    /// Driver for the relay at `url`, reading input from `lines`.
    pub fn new(url: impl Into<String>, lines: mpsc::Receiver<String>, out: W) -> Self {
        Self {
            url: url.into(),
            lines: Some(lines),
            pending: VecDeque::new(),
            transport: VecDeque::new(),
            connection: None,
            renderer: Renderer::new(out),
            composer_dirty: false,
        }
    }

    /// Queue the key events that type `line` and submit it.
    ///
    /// Leftover composer text, such as an incomplete command, is cleared
    /// first so the line replaces it.
    pub fn queue_line(&mut self, line: &str) {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            return;
        }
        if self.composer_dirty {
            self.pending.push_back(AppEvent::Key(KeyInput::Esc));
            self.composer_dirty = false;
        }
        self.pending.extend(line.chars().map(|c| AppEvent::Key(KeyInput::Char(c))));
        self.pending.push_back(AppEvent::Key(KeyInput::Enter));
    }

    /// Events queued but not yet handed to the runtime.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    async fn wait(&mut self) -> Wake {
        let Self { lines, connection, .. } = self;
        let next_line = async {
            match lines.as_mut() {
                Some(lines) => lines.recv().await,
                None => std::future::pending::<Option<String>>().await,
            }
        };
        let next_frame = async {
            match connection.as_mut() {
                Some(conn) => conn.from_server.recv().await,
                None => std::future::pending::<Option<TransportEvent>>().await,
            }
        };

        tokio::select! {
            line = next_line => Wake::Line(line),
            event = next_frame => Wake::Transport(event),
            () = tokio::time::sleep(TICK) => Wake::Tick,
        }
    }
}

impl<W: io::Write + Send> Driver for StdioDriver<W> {
    type Error = CliError;
    type Instant = std::time::Instant;

    async fn poll_event(&mut self) -> Result<Option<AppEvent>, Self::Error> {
        if let Some(event) = self.pending.pop_front() {
            return Ok(Some(event));
        }

        match self.wait().await {
            Wake::Line(Some(line)) => self.queue_line(&line),
            Wake::Line(None) => {
                tracing::debug!("input closed");
                self.lines = None;
            },
            Wake::Transport(Some(event)) => self.transport.push_back(event),
            Wake::Transport(None) => self.connection = None,
            Wake::Tick => {},
        }
        Ok(self.pending.pop_front())
    }

    async fn send_frame(&mut self, frame: String) -> Result<(), Self::Error> {
        let Some(conn) = &self.connection else {
            tracing::debug!("frame dropped: transport closed");
            return Ok(());
        };
        if conn.to_server.send(frame).await.is_err() {
            self.connection = None;
            self.transport.push_back(TransportEvent::Closed { reason: "writer stopped".to_owned() });
        }
        Ok(())
    }

    async fn recv_transport(&mut self) -> Option<TransportEvent> {
        if let Some(event) = self.transport.pop_front() {
            return Some(event);
        }
        let conn = self.connection.as_mut()?;
        match conn.from_server.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.connection = None;
                None
            },
        }
    }

    async fn open(&mut self, token: &SessionToken) -> TransportEvent {
        self.close();
        match transport::connect(&self.url, token).await {
            Ok(conn) => {
                self.connection = Some(conn);
                TransportEvent::Opened
            },
            Err(err) => {
                tracing::warn!(url = %self.url, error = %err, "connect failed");
                err.into_event()
            },
        }
    }

    fn close(&mut self) {
        if let Some(conn) = self.connection.take() {
            conn.stop();
        }
        self.transport.clear();
    }

    fn now(&self) -> Self::Instant {
        std::time::Instant::now()
    }

    fn render(&mut self, app: &App) -> Result<(), Self::Error> {
        self.renderer.render(app)?;
        self.composer_dirty = !app.input().is_empty();
        Ok(())
    }

    fn stop(&mut self) {
        self.close();
        self.lines = None;
    }
}

/// Read stdin lines on a background task.
///
/// End of input is reported as `:quit`.
pub fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(LINE_BUFFER);
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if tx.send(line).await.is_err() {
                        return;
                    }
                },
                Ok(None) => break,
                Err(err) => {
                    tracing::warn!(error = %err, "stdin read failed");
                    break;
                },
            }
        }
        let _ = tx.send(":quit".to_owned()).await;
    });
    rx
}
