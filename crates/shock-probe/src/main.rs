//! # shock-probe
//!
//! Connects to a Shock node, subscribes to every data event and prints each
//! delivered value as one JSON line on stdout. The liveness watchdog runs
//! alongside until Ctrl-C.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use clap::Parser;
use serde::Serialize;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use shock_core::auth::MemoryCredentialStore;
use shock_core::events::Event;
use shock_crypto::{EncryptionPolicy, HybridCipher, SessionCipher, SessionCryptoContext};
use shock_events::{EventHub, Listener};
use shock_liveness::{LivenessWatchdog, WatchdogConfig};
use shock_settings::ShockSettings;
use shock_transport::{EventSocket, WsTransportFactory, data_channel_url};

/// Shock node probe.
#[derive(Parser, Debug)]
#[command(name = "shock-probe", about = "Subscribe to a Shock node and print its events")]
struct Cli {
    /// Settings file (defaults to `~/.shock/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Node `host[:port]`, overrides settings.
    #[arg(long)]
    host: Option<String>,

    /// Auth token to attach to requests.
    #[arg(long, env = "SHOCK_TOKEN")]
    token: Option<String>,

    /// Node's public key for this session, base64.
    #[arg(long)]
    peer_public_key: Option<String>,

    /// Session id for the key exchange. A session key pair is generated and
    /// its public half printed to stderr.
    #[arg(long)]
    session_id: Option<String>,

    /// Log level, overrides settings.
    #[arg(long)]
    log_level: Option<String>,
}

fn load(cli: &Cli) -> Result<ShockSettings> {
    let mut settings = match &cli.settings {
        Some(path) => shock_settings::load_settings_from_path(path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?,
        None => shock_settings::load_settings().context("Failed to load settings")?,
    };
    if let Some(host) = &cli.host {
        settings.node.host.clone_from(host);
    }
    if let Some(level) = &cli.log_level {
        settings.logging.level.clone_from(level);
    }
    Ok(settings)
}

fn build_cipher(cli: &Cli, settings: &ShockSettings) -> Result<Arc<SessionCipher>> {
    let hybrid = Arc::new(HybridCipher::new());
    let context = Arc::new(SessionCryptoContext::new());

    if let Some(session_id) = &cli.session_id {
        let public = hybrid.generate_session_key(session_id);
        eprintln!("session {session_id} public key: {}", STANDARD.encode(public));
        context.set_session_id(session_id.clone());
    }
    if let Some(peer) = &cli.peer_public_key {
        let key = STANDARD
            .decode(peer)
            .context("--peer-public-key is not valid base64")?;
        context.set_peer_public_key(key);
    }

    let policy = EncryptionPolicy {
        disabled: settings.encryption.disabled,
        plain_events: settings.encryption.plain_events.iter().cloned().collect(),
    };
    Ok(Arc::new(SessionCipher::new(hybrid, context, policy)))
}

fn print_line<T: Serialize>(event: &str, value: &T) {
    match serde_json::to_value(value) {
        Ok(data) => println!("{}", json!({ "event": event, "data": data })),
        Err(e) => warn!(event, error = %e, "cannot print value"),
    }
}

fn printer<T: Serialize + 'static>(event: Event) -> Listener<T> {
    Arc::new(move |value: &T| print_line(event.as_str(), value))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = load(&cli)?;
    shock_core::logging::init_subscriber(&settings.logging.level);

    let store = Arc::new(match &cli.token {
        Some(token) => MemoryCredentialStore::with_token(token.clone()),
        None => MemoryCredentialStore::new(),
    });
    let cipher = build_cipher(&cli, &settings)?;

    let device_id = settings.node.device_id_or_generate();
    let url = data_channel_url(&settings.node.host, settings.node.tls, &device_id)
        .context("Invalid node host")?;
    let socket = Arc::new(
        EventSocket::open(&WsTransportFactory, &url, cipher).context("Failed to open socket")?,
    );

    let hub = EventHub::new(store.clone());
    hub.attach(socket.clone());

    let _connection = hub.on_connection(Arc::new(|connected: &bool| {
        print_line("connection", &Value::Bool(*connected));
    }))?;
    let _avatar = hub.on_avatar(printer(Event::Avatar))?;
    let _chats = hub.on_chats(printer(Event::Chats))?;
    let _handshake = hub.on_handshake_address(printer(Event::HandshakeAddress))?;
    let _display_name = hub.on_display_name(printer(Event::DisplayName))?;
    let _received = hub.on_received_requests(printer(Event::ReceivedRequests))?;
    let _sent = hub.on_sent_requests(printer(Event::SentRequests))?;
    let _users = hub.on_users(printer(Event::AllUsers))?;

    info!(url = %url, "connecting");
    if let Err(e) = socket.connect().await {
        warn!(error = %e, "initial connect failed");
    }

    let cancel = CancellationToken::new();
    let watchdog = Arc::new(LivenessWatchdog::new(
        WatchdogConfig::from_settings(&settings),
        Arc::new(WsTransportFactory),
        store,
    ));
    let runner = watchdog.clone();
    let run_cancel = cancel.clone();
    let watchdog_task = tokio::spawn(async move { runner.run(run_cancel).await });

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!("shutting down");

    cancel.cancel();
    watchdog_task.await.context("Watchdog task panicked")?;
    if let Some(socket) = hub.detach() {
        socket.close().await;
    }
    Ok(())
}
