//! Parley terminal client.
//!
//! # Usage
//!
//! ```bash
//! # Local development server with the default token
//! parley --team team-alpha --user alice --name Alice
//!
//! # Remote server
//! parley --url wss://chat.example.com/ws --token "$TOKEN" --team acme --user alice
//! ```
//!
//! Plain lines go to the active channel; `/help` lists commands. Logs are
//! written to stderr so they do not interleave with chat output.

use std::{
    error::Error,
    io::{self, Write},
    time::Duration,
};

use clap::{Parser, ValueEnum};
use parley_app::{ChannelId, ChatSession, Driver, SessionConfig};
use parley_cli::{Command, HELP, render};
use parley_client::{SystemEnv, TransportError, WsDriver};
use parley_core::{
    ConnectionConfig, EventKind, ListenerError, SocketEvent,
    connection::{DEFAULT_AUTH_TOKEN, DEFAULT_SERVER_URL},
};
use parley_proto::FramingStrategy;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::mpsc,
};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

type Session = ChatSession<WsDriver, SystemEnv>;

/// How long to wait for the server to acknowledge a close on exit.
const CLOSE_GRACE: Duration = Duration::from_millis(500);

/// Events echoed to the terminal.
const PRINTED_EVENTS: [EventKind; 6] = [
    EventKind::ConnectionStatusChange,
    EventKind::SystemMessage,
    EventKind::Message,
    EventKind::OnlineUsersUpdate,
    EventKind::UserJoined,
    EventKind::UserLeft,
];

/// Parley team chat client
#[derive(Parser, Debug)]
#[command(name = "parley")]
#[command(about = "Terminal client for Parley team chat")]
#[command(version)]
struct Args {
    /// WebSocket endpoint
    #[arg(long, default_value = DEFAULT_SERVER_URL)]
    url: String,

    /// Token sent with the auth request
    #[arg(long, default_value = DEFAULT_AUTH_TOKEN)]
    token: String,

    /// Team to join
    #[arg(short, long)]
    team: String,

    /// Your user id
    #[arg(short, long)]
    user: String,

    /// Display name (defaults to the user id)
    #[arg(short, long)]
    name: Option<String>,

    /// How inbound text is split into documents
    #[arg(long, value_enum, default_value_t = Framing::StringAware)]
    framing: Framing,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Framing {
    /// Count every brace
    BraceDepth,
    /// Ignore braces inside string literals
    StringAware,
}

impl From<Framing> for FramingStrategy {
    fn from(framing: Framing) -> Self {
        match framing {
            Framing::BraceDepth => Self::BraceDepth,
            Framing::StringAware => Self::StringAware,
        }
    }
}

/// What woke the main loop.
enum Wake {
    Line(Option<String>),
    Cycle(Result<(), parley_app::SessionError<TransportError>>),
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer().with_writer(io::stderr)).with(filter).init();

    let config = SessionConfig {
        connection: ConnectionConfig {
            url: args.url,
            auth_token: args.token,
            framing: args.framing.into(),
            ..ConnectionConfig::default()
        },
        ..SessionConfig::default()
    };
    let mut session = ChatSession::new(WsDriver::new(), SystemEnv::new(), config);

    for kind in PRINTED_EVENTS {
        session.subscribe(kind, |event| {
            let Some(line) = render::event_line(event) else {
                return Ok(());
            };
            writeln!(io::stdout().lock(), "{line}")
                .map_err(|err| ListenerError::new(err.to_string()))
        });
    }

    let display_name = args.name.unwrap_or_else(|| args.user.clone());
    tracing::info!(team = %args.team, user = %args.user, "connecting");
    if let Err(err) = session.connect(&args.team, &args.user, &display_name).await {
        // A transient failure leaves a retry scheduled; the loop below runs it.
        if !err.is_transient() {
            return Err(err.into());
        }
        tracing::warn!(error = %err, "initial connection failed");
    }

    let (lines_tx, mut lines) = mpsc::channel(16);
    tokio::spawn(read_stdin(lines_tx));

    loop {
        let wake = tokio::select! {
            line = lines.recv() => Wake::Line(line),
            result = session.process_cycle() => Wake::Cycle(result),
        };

        match wake {
            Wake::Cycle(Ok(())) => {},
            Wake::Cycle(Err(err)) => tracing::warn!(error = %err, "event loop error"),
            // stdin closed
            Wake::Line(None) => break,
            Wake::Line(Some(line)) => {
                let mut out = io::stdout().lock();
                match parley_cli::parse(&line) {
                    Ok(Some(Command::Quit)) => break,
                    Ok(Some(command)) => run_command(&mut session, command, &mut out)?,
                    Ok(None) => {},
                    Err(err) => writeln!(out, "! {err}")?,
                }
            },
        }
    }

    session.disconnect()?;
    while let Ok(Some(event)) = session.driver_mut().poll_event(CLOSE_GRACE).await {
        if matches!(event, SocketEvent::Closed { .. }) {
            break;
        }
    }
    tracing::info!("session closed");

    Ok(())
}

async fn read_stdin(lines_tx: mpsc::Sender<String>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if lines_tx.send(line).await.is_err() {
                    return;
                }
            },
            Ok(None) => return,
            Err(err) => {
                tracing::warn!(error = %err, "stdin read failed");
                return;
            },
        }
    }
}

/// Run one command; session errors are reported to the user, not returned.
fn run_command(session: &mut Session, command: Command, out: &mut impl Write) -> io::Result<()> {
    let result = match command {
        Command::Say(text) => session.send_message(&text).map(|_| {
            let store = session.store();
            store.messages(store.active()).last().map(render::message_line)
        }),
        Command::Private(peer) => session.open_private_chat(&peer).map(|opened| {
            Some(if opened {
                render::prompt(&ChannelId::Private(peer))
            } else {
                "! that is you".to_string()
            })
        }),
        Command::Main => {
            session.switch_to_main().map(|()| Some(render::prompt(&ChannelId::Main)))
        },
        Command::Close(peer) => session.close_private_chat(&peer).map(|closed| {
            (!closed).then(|| format!("! no private chat with {peer}"))
        }),
        Command::Rename(name) => session.update_display_name(&name).map(|()| None),
        Command::Who => session.request_online_users().map(|queued| {
            if queued {
                return None;
            }
            let store = session.store();
            let names: Vec<_> = store.presence().map(|(_, name)| name).collect();
            Some(format!("-- offline, last seen online: {}", names.join(", ")))
        }),
        Command::Channels => {
            let store = session.store();
            let private = store
                .private_channels()
                .map(|(peer, channel)| (ChannelId::Private(peer.to_string()), channel.unread()));
            let channels = std::iter::once((ChannelId::Main, store.unread(&ChannelId::Main)))
                .chain(private)
                .collect::<Vec<_>>();
            Ok(Some(render::channel_lines(channels, store.active()).join("\n")))
        },
        Command::Help => Ok(Some(HELP.to_string())),
        Command::Quit => Ok(None),
    };

    match result {
        Ok(Some(line)) => writeln!(out, "{line}"),
        Ok(None) => Ok(()),
        Err(err) => writeln!(out, "! {err}"),
    }
}
