//! Huddle terminal client entry point.
//!
//! # Usage
//!
//! ```bash
//! # Join p1 as alice, with bob resolvable as @bob
//! HUDDLE_TOKEN=secret huddle --user alice --join p1 --member bob=Bob
//!
//! # Let the server assign command results
//! huddle --server wss://relay.example/socket --user alice --relay remote
//! ```
//!
//! Type plain text to chat, `/command ...` to run a workspace command and
//! `:help` for client commands. Logs go to stderr (`RUST_LOG`).

use clap::{Parser, ValueEnum};
use huddle_cli::{LocalServices, Runtime, StdioDriver, spawn_stdin_reader};
use huddle_client::{ClientConfig, Identity, RelayMode, SystemEnv};
use huddle_core::SessionToken;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Huddle project channel client
#[derive(Parser, Debug)]
#[command(name = "huddle")]
#[command(about = "Line-mode client for Huddle project channels")]
#[command(version)]
struct Args {
    /// Relay WebSocket URL
    #[arg(short, long, env = "HUDDLE_SERVER", default_value = "ws://127.0.0.1:4000/socket")]
    server: String,

    /// Signed-in member id
    #[arg(short, long, env = "HUDDLE_USER")]
    user: String,

    /// Display name, defaults to the member id
    #[arg(long)]
    display: Option<String>,

    /// Session token; without one the client starts signed out
    #[arg(long, env = "HUDDLE_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Where command results come from
    #[arg(long, env = "HUDDLE_RELAY", value_enum, default_value_t = Relay::Local)]
    relay: Relay,

    /// Member that mentions resolve to, as `id=Display` (repeatable)
    #[arg(long = "member", value_parser = parse_member)]
    members: Vec<(String, String)>,

    /// Channel to join once connected (repeatable)
    #[arg(short, long = "join")]
    join: Vec<String>,

    /// Log level when RUST_LOG is unset
    #[arg(long, default_value = "warn")]
    log_level: String,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Relay {
    /// Results are produced by this client
    Local,
    /// The server acknowledges commands and assigns result ids
    Remote,
}

impl From<Relay> for RelayMode {
    fn from(relay: Relay) -> Self {
        match relay {
            Relay::Local => Self::Local,
            Relay::Remote => Self::Remote,
        }
    }
}

fn parse_member(value: &str) -> Result<(String, String), String> {
    match value.split_once('=') {
        Some((id, display)) if !id.is_empty() && !display.is_empty() => {
            Ok((id.to_owned(), display.to_owned()))
        },
        Some(_) => Err(format!("empty id or display in `{value}`")),
        None => Ok((value.to_owned(), value.to_owned())),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let mut identity = Identity::new(args.user.as_str());
    if let Some(display) = args.display {
        identity.display = display;
    }
    let mut config = ClientConfig::new(identity);
    config.relay = args.relay.into();

    let mut services = LocalServices::new(args.token.map(SessionToken::new));
    for (id, display) in &args.members {
        services = services.with_member(id, display);
    }

    tracing::info!(server = %args.server, user = %args.user, "huddle starting");

    let mut driver = StdioDriver::new(args.server, spawn_stdin_reader(), std::io::stdout());
    for channel in &args.join {
        driver.queue_line(&format!(":join {channel}"));
    }

    let runtime = Runtime::new(driver, SystemEnv::new(), config, services.into_collaborators());
    runtime.run().await?;

    Ok(())
}
