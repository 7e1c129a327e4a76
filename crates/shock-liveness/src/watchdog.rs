//! Heartbeat channel watchdog.
//!
//! Each evaluation reads the auth token, the host and the time of the last
//! heartbeat:
//!
//! 1. the channel is dead when it exists and no heartbeat arrived within the
//!    timeout
//! 2. a dead channel, or any channel while no token is cached, is torn down
//! 3. with a token and no channel, a fresh channel is opened
//!
//! Steps 2 and 3 run in the same evaluation, so a stale channel is replaced
//! in one pass. Heartbeat-channel errors are logged and never stop the loop.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use shock_core::auth::{CredentialStore, invalidate_on_sentinel};
use shock_core::constants::{
    ERROR_EVENT, HEARTBEAT_EVENT, HEARTBEAT_PATH, HEARTBEAT_TIMEOUT_MS, NOT_AUTH_EVENT,
    WATCHDOG_TICK_MS,
};
use shock_core::events::Emission;
use shock_settings::ShockSettings;
use shock_transport::{Transport, TransportEvent, TransportEvents, TransportFactory, heartbeat_url};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Where and how strictly the watchdog checks the node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WatchdogConfig {
    /// Node `host[:port]`.
    pub host: String,
    /// Use `wss://`.
    pub tls: bool,
    /// Heartbeat endpoint path.
    pub heartbeat_path: String,
    /// Silence after which the channel is dead.
    pub heartbeat_timeout: Duration,
    /// Interval between evaluations in [`LivenessWatchdog::run`].
    pub tick_interval: Duration,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            host: format!("127.0.0.1:{}", shock_core::constants::DEFAULT_PORT),
            tls: false,
            heartbeat_path: HEARTBEAT_PATH.to_owned(),
            heartbeat_timeout: Duration::from_millis(HEARTBEAT_TIMEOUT_MS),
            tick_interval: Duration::from_millis(WATCHDOG_TICK_MS),
        }
    }
}

impl WatchdogConfig {
    /// Config from the `node` and `liveness` settings sections.
    pub fn from_settings(settings: &ShockSettings) -> Self {
        Self {
            host: settings.node.host.clone(),
            tls: settings.node.tls,
            heartbeat_path: settings.node.heartbeat_path.clone(),
            heartbeat_timeout: Duration::from_millis(settings.liveness.heartbeat_timeout_ms),
            tick_interval: Duration::from_millis(settings.liveness.tick_interval_ms),
        }
    }
}

/// What one evaluation did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Evaluation {
    /// An existing heartbeat channel was torn down.
    pub torn_down: bool,
    /// A new heartbeat channel was opened.
    pub opened: bool,
}

struct HeartbeatChannel {
    transport: Arc<dyn Transport>,
    pump: JoinHandle<()>,
}

struct LivenessState {
    last_heartbeat_at: Instant,
    channel: Option<HeartbeatChannel>,
}

/// Watches the node through a dedicated heartbeat channel.
pub struct LivenessWatchdog {
    config: RwLock<WatchdogConfig>,
    factory: Arc<dyn TransportFactory>,
    store: Arc<dyn CredentialStore>,
    state: Arc<Mutex<LivenessState>>,
    poke: Notify,
}

impl LivenessWatchdog {
    /// Watchdog opening channels through `factory` and reading tokens from
    /// `store`. Nothing happens until the first evaluation.
    pub fn new(
        config: WatchdogConfig,
        factory: Arc<dyn TransportFactory>,
        store: Arc<dyn CredentialStore>,
    ) -> Self {
        Self {
            config: RwLock::new(config),
            factory,
            store,
            state: Arc::new(Mutex::new(LivenessState {
                last_heartbeat_at: Instant::now(),
                channel: None,
            })),
            poke: Notify::new(),
        }
    }

    /// Point future channels at `host`.
    pub fn set_host(&self, host: impl Into<String>) {
        self.config.write().host = host.into();
    }

    /// Current configuration.
    pub fn config(&self) -> WatchdogConfig {
        self.config.read().clone()
    }

    /// Time the last heartbeat arrived, or the current channel was opened.
    pub fn last_heartbeat_at(&self) -> Instant {
        self.state.lock().last_heartbeat_at
    }

    /// Whether a heartbeat channel exists.
    pub fn has_channel(&self) -> bool {
        self.state.lock().channel.is_some()
    }

    /// Request an evaluation from [`run`](Self::run) without waiting for the
    /// next tick.
    pub fn poke(&self) {
        self.poke.notify_one();
    }

    /// Run one evaluation.
    pub async fn evaluate(&self) -> Evaluation {
        let token = self
            .store
            .stored_auth_data()
            .await
            .map(|data| data.auth_data.token);
        let timeout = self.config.read().heartbeat_timeout;

        let (has_channel, dead) = {
            let state = self.state.lock();
            let has_channel = state.channel.is_some();
            (has_channel, has_channel && state.last_heartbeat_at.elapsed() > timeout)
        };

        let mut outcome = Evaluation::default();
        if (token.is_none() && has_channel) || dead {
            if dead {
                info!(timeout_ms = timeout.as_millis(), "heartbeat channel went silent, tearing down");
            } else {
                info!("auth token gone, tearing down heartbeat channel");
            }
            outcome.torn_down = self.teardown().await;
        }

        if let Some(token) = token {
            if !self.has_channel() {
                outcome.opened = self.open(&token);
            }
        }
        outcome
    }

    /// Evaluate every tick and on every [`poke`](Self::poke) until `cancel`
    /// fires, then tear the channel down.
    pub async fn run(&self, cancel: CancellationToken) {
        let tick_interval = self.config.read().tick_interval;
        let mut ticker = time::interval(tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(tick_ms = tick_interval.as_millis(), "liveness watchdog started");

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {}
                () = self.poke.notified() => trace!("watchdog poked"),
            }
            let outcome = self.evaluate().await;
            if outcome.torn_down && !outcome.opened {
                let _ = self.evaluate().await;
            }
        }

        let _ = self.teardown().await;
        info!("liveness watchdog stopped");
    }

    /// Close and forget the heartbeat channel. Returns whether one existed.
    async fn teardown(&self) -> bool {
        let channel = self.state.lock().channel.take();
        let Some(channel) = channel else {
            return false;
        };
        channel.pump.abort();
        channel.transport.disconnect().await;
        debug!("heartbeat channel torn down");
        true
    }

    fn open(&self, token: &str) -> bool {
        let url = {
            let config = self.config.read();
            heartbeat_url(&config.host, config.tls, &config.heartbeat_path, token)
        };
        let url = match url {
            Ok(url) => url,
            Err(e) => {
                warn!(error = %e, "cannot build heartbeat url");
                return false;
            }
        };
        let (transport, events) = match self.factory.open(&url) {
            Ok(opened) => opened,
            Err(e) => {
                warn!(error = %e, "cannot open heartbeat channel");
                return false;
            }
        };

        let pump = tokio::spawn(pump(
            transport.clone(),
            events,
            self.state.clone(),
            self.store.clone(),
        ));
        let mut state = self.state.lock();
        state.last_heartbeat_at = Instant::now();
        state.channel = Some(HeartbeatChannel { transport, pump });
        info!("heartbeat channel opened");
        true
    }
}

impl Drop for LivenessWatchdog {
    fn drop(&mut self) {
        if let Some(channel) = self.state.lock().channel.take() {
            channel.pump.abort();
        }
    }
}

async fn pump(
    transport: Arc<dyn Transport>,
    mut events: TransportEvents,
    state: Arc<Mutex<LivenessState>>,
    store: Arc<dyn CredentialStore>,
) {
    if let Err(e) = transport.connect().await {
        warn!(error = %e, "heartbeat channel failed to connect");
    }
    while let Some(event) = events.recv().await {
        match event {
            TransportEvent::Message { event, .. } if event == HEARTBEAT_EVENT => {
                state.lock().last_heartbeat_at = Instant::now();
                trace!("heartbeat");
            }
            TransportEvent::Message { event, .. } if event == NOT_AUTH_EVENT => {
                let _ = invalidate_on_sentinel(
                    store.as_ref(),
                    HEARTBEAT_EVENT,
                    &Emission::failed(NOT_AUTH_EVENT),
                )
                .await;
            }
            TransportEvent::Message { event, data } if event == ERROR_EVENT => {
                warn!(error = %data, "heartbeat channel reported an error");
            }
            TransportEvent::Message { event, .. } => trace!(event = %event, "ignoring event"),
            TransportEvent::Error(e) => warn!(error = %e, "heartbeat transport error"),
            TransportEvent::Connected => debug!("heartbeat channel connected"),
            TransportEvent::Disconnected(reason) => debug!(%reason, "heartbeat channel disconnected"),
        }
    }
}
