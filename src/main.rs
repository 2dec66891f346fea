use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use irtv_bridge::{
    ChannelConfig, ConnectionEvent, Endpoint, Notification, RelayChannel, SendPolicy,
};
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Command and notification bridge to an IR relay
#[derive(Parser, Debug)]
#[command(name = "irtv-bridge", version, about)]
struct Cli {
    /// Relay host
    #[arg(long, env = "IRTV_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Relay port
    #[arg(long, env = "IRTV_PORT", default_value_t = 81)]
    port: u16,

    /// Optional WebSocket path
    #[arg(long, env = "IRTV_PATH")]
    path: Option<String>,

    /// IR protocol used for IR-SEND (NEC, SONY, ...)
    #[arg(long, env = "IRTV_CODE_TYPE", default_value = "NEC")]
    code_type: String,

    /// Delay between reconnect attempts, in milliseconds
    #[arg(long, env = "IRTV_RECONNECT_MS", default_value_t = 1000)]
    reconnect_ms: u64,

    /// Upper bound for the reconnect delay, in milliseconds
    #[arg(long, env = "IRTV_MAX_RECONNECT_MS")]
    max_reconnect_ms: Option<u64>,

    /// Keepalive ping interval in seconds (disabled when absent)
    #[arg(long, env = "IRTV_KEEPALIVE_SECS")]
    keepalive_secs: Option<u64>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Stay connected and log every notification from the relay
    Listen,
    /// Send one command and exit
    Send {
        /// Wire command, e.g. IR-SEND
        command: String,
        /// Command payload
        #[arg(default_value = "")]
        payload: String,
    },
}

impl Cli {
    fn channel_config(&self) -> ChannelConfig {
        let mut endpoint = Endpoint::new(self.host.clone(), self.port);
        if let Some(path) = &self.path {
            endpoint = endpoint.with_path(path.clone());
        }

        let reconnect_delay = Duration::from_millis(self.reconnect_ms);
        ChannelConfig {
            endpoint,
            code_type: self.code_type.clone(),
            reconnect_delay,
            max_reconnect_delay: self
                .max_reconnect_ms
                .map(Duration::from_millis)
                .unwrap_or(reconnect_delay),
            keepalive_interval: self.keepalive_secs.map(Duration::from_secs),
            send_policy: SendPolicy::AwaitReconnect,
            ..Default::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let cli = Cli::parse();
    let config = cli.channel_config();
    info!("IR relay bridge starting: {}", config.endpoint.url());

    let channel = RelayChannel::new(config).context("invalid channel configuration")?;

    match cli.command.unwrap_or(Command::Listen) {
        Command::Listen => listen(channel).await,
        Command::Send { command, payload } => send_once(channel, &command, &payload).await,
    }
}

async fn listen(channel: RelayChannel) -> Result<()> {
    channel.add_message_listener("cli", |msg| match Notification::parse(msg) {
        Notification::PowerState(state) => info!("TV power state: {}", state),
        Notification::Other(message) => info!("Notification: {}", message),
    });

    let mut events = channel.events();
    channel.start();

    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result.context("failed to listen for Ctrl-C")?;
                info!("Shutting down");
                break;
            }
            event = events.recv() => match event {
                Ok(ConnectionEvent::Connected { transport }) => {
                    info!("Connected via {}", transport);
                }
                Ok(ConnectionEvent::Disconnected { reason }) => {
                    warn!("Disconnected: {}", reason);
                }
                Ok(ConnectionEvent::ConnectionFailed { reason }) => {
                    error!("Connection failed: {}", reason);
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Missed {} connection events", skipped);
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    channel.stop().await;
    Ok(())
}

async fn send_once(channel: RelayChannel, command: &str, payload: &str) -> Result<()> {
    channel.start();
    let result = channel.send_command(command, payload).await;
    channel.stop().await;

    result.with_context(|| format!("failed to send {}", command))?;
    info!("Sent {}", command);
    Ok(())
}
