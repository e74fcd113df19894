//! Line-oriented rendering of [`App`] state.
//!
//! A terminal in line mode cannot redraw, so the renderer remembers what it
//! already printed and only writes the difference: connection changes, new
//! status text, new stream entries and typing indicators.

use std::{
    collections::{BTreeMap, BTreeSet},
    io::{self, Write},
};

use huddle_app::App;
use huddle_core::{ChatMessage, MessageKind};
use huddle_proto::{ChannelId, UserId};

/// Writes App changes to `W` as plain lines.
#[derive(Debug)]
pub struct Renderer<W> {
    out: W,
    label: Option<&'static str>,
    status: Option<String>,
    printed: BTreeMap<ChannelId, usize>,
    typing: BTreeMap<ChannelId, BTreeSet<UserId>>,
}

impl<W: Write> Renderer<W> {
    /// Renderer writing to `out`.
    pub fn new(out: W) -> Self {
        Self {
            out,
            label: None,
            status: None,
            printed: BTreeMap::new(),
            typing: BTreeMap::new(),
        }
    }

    /// Print whatever changed since the previous call.
    pub fn render(&mut self, app: &App) -> io::Result<()> {
        let label = app.connection_label();
        if self.label != Some(label) {
            writeln!(self.out, "* {label}")?;
            self.label = Some(label);
        }

        let status = app.status_message();
        if let Some(text) = status.filter(|s| self.status.as_deref() != Some(*s)) {
            writeln!(self.out, "* {text}")?;
        }
        self.status = status.map(str::to_owned);

        self.printed.retain(|channel_id, _| app.channels().contains_key(channel_id));
        self.typing.retain(|channel_id, _| app.channels().contains_key(channel_id));

        for (channel_id, view) in app.channels() {
            let printed = self.printed.entry(channel_id.clone()).or_default();
            // A rejoin can rebuild the view from scratch.
            if *printed > view.messages.len() {
                *printed = 0;
            }
            for message in &view.messages[*printed..] {
                writeln!(self.out, "{}", format_message(message))?;
            }
            *printed = view.messages.len();

            let typing = self.typing.entry(channel_id.clone()).or_default();
            if *typing != view.typing {
                if !view.typing.is_empty() {
                    let names: Vec<&str> = view.typing.iter().map(UserId::as_str).collect();
                    writeln!(self.out, "[{channel_id}] ({} typing)", names.join(", "))?;
                }
                typing.clone_from(&view.typing);
            }
        }

        self.out.flush()
    }

    /// The underlying writer.
    pub fn into_inner(self) -> W {
        self.out
    }
}

/// One stream entry as a line.
pub fn format_message(message: &ChatMessage) -> String {
    let channel = &message.channel_id;
    match message.kind {
        MessageKind::Message => format!("[{channel}] <{}> {}", message.sender_display, message.body),
        MessageKind::CommandResult => {
            format!("[{channel}] = {} ({})", message.body, message.sender_display)
        },
        MessageKind::PresenceChange => format!("[{channel}] - {}", message.body),
        MessageKind::System => format!("[{channel}] ! {}", message.body),
    }
}
