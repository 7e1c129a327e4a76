//! The event hub: every listener registry plus the socket they listen on.
//!
//! [`EventHub`] is the composition root for subscriptions. It owns one
//! [`ListenerRegistry`] per data event, one for connection state and one for
//! `REGISTER` results, reads the auth token from the external
//! [`CredentialStore`], and wires itself onto an [`EventSocket`] with
//! [`attach`](EventHub::attach).
//!
//! Every transport `connect` replays one fetch per event kind that has
//! listeners. A data subscription made while the hub is already connected
//! asks for the current value one scheduling tick later, unless it was
//! cancelled or a newer `connect` has replayed the fetch in between. Each
//! kind is therefore fetched exactly once per connect. Every response, for
//! data events and actions alike, goes through the auth-invalidation rule
//! before it is parsed.

use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value, json};
use shock_core::auth::{CredentialStore, current_token, invalidate_on_response};
use shock_core::events::{Action, Emission, Event, EventPayload};
use shock_core::schema::{Chat, RegisterResult, SimpleReceivedRequest, SimpleSentRequest, User};
use shock_core::{ShockError, TransportError};
use shock_transport::{CONNECT_EVENT, DISCONNECT_EVENT, EventSocket};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::registry::{Listener, ListenerRegistry, Subscription};

struct Registries {
    connection: Arc<ListenerRegistry<bool>>,
    avatar: Arc<ListenerRegistry<Option<String>>>,
    chats: Arc<ListenerRegistry<Vec<Chat>>>,
    handshake_address: Arc<ListenerRegistry<Option<String>>>,
    display_name: Arc<ListenerRegistry<Option<String>>>,
    received_requests: Arc<ListenerRegistry<Vec<SimpleReceivedRequest>>>,
    sent_requests: Arc<ListenerRegistry<Vec<SimpleSentRequest>>>,
    users: Arc<ListenerRegistry<Vec<User>>>,
    register: Arc<ListenerRegistry<RegisterResult>>,
}

impl Registries {
    fn new() -> Self {
        Self {
            connection: Arc::new(ListenerRegistry::new("connection")),
            avatar: Arc::new(ListenerRegistry::new(Event::Avatar.as_str())),
            chats: Arc::new(ListenerRegistry::new(Event::Chats.as_str())),
            handshake_address: Arc::new(ListenerRegistry::new(Event::HandshakeAddress.as_str())),
            display_name: Arc::new(ListenerRegistry::new(Event::DisplayName.as_str())),
            received_requests: Arc::new(ListenerRegistry::new(Event::ReceivedRequests.as_str())),
            sent_requests: Arc::new(ListenerRegistry::new(Event::SentRequests.as_str())),
            users: Arc::new(ListenerRegistry::new(Event::AllUsers.as_str())),
            register: Arc::new(ListenerRegistry::new(Action::Register.as_str())),
        }
    }

    fn listener_count(&self, event: Event) -> usize {
        match event {
            Event::Avatar => self.avatar.len(),
            Event::Chats => self.chats.len(),
            Event::HandshakeAddress => self.handshake_address.len(),
            Event::DisplayName => self.display_name.len(),
            Event::ReceivedRequests => self.received_requests.len(),
            Event::SentRequests => self.sent_requests.len(),
            Event::AllUsers => self.users.len(),
        }
    }

    fn fan_out(&self, payload: &EventPayload) {
        match payload {
            EventPayload::Avatar(v) => self.avatar.fan_out(v),
            EventPayload::Chats(v) => self.chats.fan_out(v),
            EventPayload::HandshakeAddress(v) => self.handshake_address.fan_out(v),
            EventPayload::DisplayName(v) => self.display_name.fan_out(v),
            EventPayload::ReceivedRequests(v) => self.received_requests.fan_out(v),
            EventPayload::SentRequests(v) => self.sent_requests.fan_out(v),
            EventPayload::AllUsers(v) => self.users.fan_out(v),
        }
    }
}

/// The hub's view of the link, updated by its own connect and disconnect
/// handlers. `generation` counts connects seen.
#[derive(Default)]
struct Presence {
    live: bool,
    generation: u64,
}

struct HubInner {
    registries: Registries,
    store: Arc<dyn CredentialStore>,
    socket: RwLock<Option<Arc<EventSocket>>>,
    presence: Mutex<Presence>,
}

impl HubInner {
    fn socket(&self) -> Option<Arc<EventSocket>> {
        self.socket.read().clone()
    }

    /// Send `{ token }` for `event` over the attached socket.
    async fn fetch(&self, event: Event) -> Result<(), ShockError> {
        let socket = self
            .socket()
            .ok_or(ShockError::Transport(TransportError::NotConnected))?;
        let token = current_token(self.store.as_ref()).await?;
        socket.emit(event.as_str(), json!({ "token": token })).await?;
        debug!(event = %event, "requested current value");
        Ok(())
    }

    fn set_live(&self, live: bool) {
        let mut presence = self.presence.lock();
        presence.live = live;
        presence.generation += 1;
    }

    fn ticket_valid(&self, ticket: u64) -> bool {
        let presence = self.presence.lock();
        presence.live && presence.generation == ticket
    }

    async fn handle_connect(&self) {
        self.registries.connection.fan_out(&true);
        // Snapshot under the presence lock so a concurrent subscription is
        // either in the snapshot or holds a ticket for the new generation.
        let pending: Vec<Event> = {
            let mut presence = self.presence.lock();
            presence.live = true;
            presence.generation += 1;
            Event::ALL
                .into_iter()
                .filter(|event| self.registries.listener_count(*event) > 0)
                .collect()
        };
        for event in pending {
            if let Err(e) = self.fetch(event).await {
                warn!(event = %event, error = %e, "fetch on connect failed");
            }
        }
    }

    async fn handle_event(&self, event: Event, data: Value) {
        let _ = invalidate_on_response(self.store.as_ref(), event.as_str(), &data).await;
        let Some(emission) = parse_emission(event.as_str(), data) else {
            return;
        };
        if !emission.ok {
            debug!(event = %event, msg = %emission.msg, "server reported failure");
            return;
        }
        match EventPayload::decode(event, emission.msg) {
            Ok(payload) => self.registries.fan_out(&payload),
            Err(e) => warn!(event = %event, error = %e, "unexpected payload shape"),
        }
    }

    async fn handle_action(&self, action: Action, data: Value) {
        let _ = invalidate_on_response(self.store.as_ref(), action.as_str(), &data).await;
        let Some(emission) = parse_emission(action.as_str(), data) else {
            return;
        };
        trace!(action = %action, ok = emission.ok, "action response");
        if action == Action::Register {
            self.registries.register.fan_out(&register_result(&emission));
        }
    }
}

fn parse_emission(name: &str, data: Value) -> Option<Emission> {
    match serde_json::from_value(data) {
        Ok(emission) => Some(emission),
        Err(e) => {
            warn!(event = name, error = %e, "response is not an emission");
            None
        }
    }
}

fn register_result(emission: &Emission) -> RegisterResult {
    let body_field = |name: &str| {
        emission
            .orig_body
            .as_ref()
            .and_then(|body| body.get(name))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned()
    };
    RegisterResult {
        ok: emission.ok,
        msg: if emission.ok {
            None
        } else {
            Some(
                emission
                    .msg
                    .as_str()
                    .map_or_else(|| emission.msg.to_string(), str::to_owned),
            )
        },
        alias: body_field("alias"),
        pass: body_field("pass"),
    }
}

/// Composition root for every subscription made against the node.
#[derive(Clone)]
pub struct EventHub {
    inner: Arc<HubInner>,
}

impl EventHub {
    /// Hub reading tokens from `store`, with no socket attached.
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self {
            inner: Arc::new(HubInner {
                registries: Registries::new(),
                store,
                socket: RwLock::new(None),
                presence: Mutex::new(Presence::default()),
            }),
        }
    }

    /// The attached socket, if any.
    pub fn socket(&self) -> Option<Arc<EventSocket>> {
        self.inner.socket()
    }

    /// Whether a socket is attached and connected.
    pub fn connected(&self) -> bool {
        self.inner.socket().is_some_and(|s| s.connected())
    }

    /// Number of listeners registered for `event`.
    pub fn listener_count(&self, event: Event) -> usize {
        self.inner.registries.listener_count(event)
    }

    /// Wire every handler onto `socket` and make it the hub's socket.
    ///
    /// A previously attached socket is detached first. Connection listeners
    /// are told the new socket's current state right away.
    pub fn attach(&self, socket: Arc<EventSocket>) {
        let _ = self.detach();
        let weak = Arc::downgrade(&self.inner);

        on_hub(&socket, CONNECT_EVENT, &weak, |hub, _| async move {
            hub.handle_connect().await;
        });
        on_hub(&socket, DISCONNECT_EVENT, &weak, |hub, _| async move {
            hub.set_live(false);
            hub.registries.connection.fan_out(&false);
        });
        for event in Event::ALL {
            on_hub(&socket, event.as_str(), &weak, move |hub, data| async move {
                hub.handle_event(event, data).await;
            });
        }
        for action in Action::ALL {
            on_hub(&socket, action.as_str(), &weak, move |hub, data| async move {
                hub.handle_action(action, data).await;
            });
        }

        let connected = socket.connected();
        *self.inner.socket.write() = Some(socket);
        self.inner.set_live(connected);
        info!(connected, "event hub attached");
        self.inner.registries.connection.fan_out(&connected);
    }

    /// Remove the hub's handlers from the attached socket and forget it.
    /// Returns the socket so the caller can close it.
    pub fn detach(&self) -> Option<Arc<EventSocket>> {
        let socket = self.inner.socket.write().take()?;
        self.inner.set_live(false);
        socket.off(CONNECT_EVENT);
        socket.off(DISCONNECT_EVENT);
        for event in Event::ALL {
            socket.off(event.as_str());
        }
        for action in Action::ALL {
            socket.off(action.as_str());
        }
        info!("event hub detached");
        Some(socket)
    }

    /// Ask the server for the current value of `event` now.
    pub async fn request(&self, event: Event) -> Result<(), ShockError> {
        self.inner.fetch(event).await
    }

    /// Emit a user-initiated action with the current token merged into
    /// `payload`. The response arrives asynchronously.
    pub async fn perform(&self, action: Action, mut payload: Map<String, Value>) -> Result<(), ShockError> {
        let socket = self
            .inner
            .socket()
            .ok_or(ShockError::Transport(TransportError::NotConnected))?;
        let token = current_token(self.inner.store.as_ref()).await?;
        let _ = payload.insert("token".to_owned(), Value::String(token));
        socket.emit(action.as_str(), Value::Object(payload)).await?;
        debug!(action = %action, "action emitted");
        Ok(())
    }

    // ── subscriptions ──

    /// Connection state changes.
    ///
    /// One tick after subscribing the listener learns the current state:
    /// `true` if the socket is connected, `true` on the next connect if it
    /// exists but is not connected yet, `false` if no socket is attached.
    pub fn on_connection(&self, listener: Listener<bool>) -> Result<Subscription<bool>, ShockError> {
        let subscription = self.inner.registries.connection.subscribe(listener.clone())?;
        let token = subscription.token().clone();
        let socket = self.inner.socket();
        let _ = tokio::spawn(async move {
            tokio::task::yield_now().await;
            if token.is_cancelled() {
                return;
            }
            let Some(socket) = socket else {
                listener(&false);
                return;
            };
            // Register before checking so a connect in between is not missed.
            let signal = socket.connect_signal();
            if socket.connected() {
                listener(&true);
                return;
            }
            drop(socket);
            tokio::select! {
                () = token.cancelled() => {}
                fired = signal => {
                    if fired.is_ok() {
                        listener(&true);
                    }
                }
            }
        });
        Ok(subscription)
    }

    /// Own avatar.
    pub fn on_avatar(&self, listener: Listener<Option<String>>) -> Result<Subscription<Option<String>>, ShockError> {
        self.subscribe_data(Event::Avatar, &self.inner.registries.avatar, listener)
    }

    /// All chats.
    pub fn on_chats(&self, listener: Listener<Vec<Chat>>) -> Result<Subscription<Vec<Chat>>, ShockError> {
        self.subscribe_data(Event::Chats, &self.inner.registries.chats, listener)
    }

    /// Current handshake address.
    pub fn on_handshake_address(
        &self,
        listener: Listener<Option<String>>,
    ) -> Result<Subscription<Option<String>>, ShockError> {
        self.subscribe_data(
            Event::HandshakeAddress,
            &self.inner.registries.handshake_address,
            listener,
        )
    }

    /// Own display name.
    pub fn on_display_name(
        &self,
        listener: Listener<Option<String>>,
    ) -> Result<Subscription<Option<String>>, ShockError> {
        self.subscribe_data(Event::DisplayName, &self.inner.registries.display_name, listener)
    }

    /// Handshake requests received.
    pub fn on_received_requests(
        &self,
        listener: Listener<Vec<SimpleReceivedRequest>>,
    ) -> Result<Subscription<Vec<SimpleReceivedRequest>>, ShockError> {
        self.subscribe_data(
            Event::ReceivedRequests,
            &self.inner.registries.received_requests,
            listener,
        )
    }

    /// Handshake requests sent.
    pub fn on_sent_requests(
        &self,
        listener: Listener<Vec<SimpleSentRequest>>,
    ) -> Result<Subscription<Vec<SimpleSentRequest>>, ShockError> {
        self.subscribe_data(Event::SentRequests, &self.inner.registries.sent_requests, listener)
    }

    /// Every user known to the node.
    pub fn on_users(&self, listener: Listener<Vec<User>>) -> Result<Subscription<Vec<User>>, ShockError> {
        self.subscribe_data(Event::AllUsers, &self.inner.registries.users, listener)
    }

    /// `REGISTER` results, successful or not. Nothing is fetched.
    pub fn on_register(
        &self,
        listener: Listener<RegisterResult>,
    ) -> Result<Subscription<RegisterResult>, ShockError> {
        self.inner.registries.register.subscribe(listener)
    }

    fn subscribe_data<T: 'static>(
        &self,
        event: Event,
        registry: &Arc<ListenerRegistry<T>>,
        listener: Listener<T>,
    ) -> Result<Subscription<T>, ShockError> {
        // Registration and ticket are taken under one presence lock so
        // `handle_connect` sees either both or neither.
        let (subscription, ticket) = {
            let presence = self.inner.presence.lock();
            let subscription = registry.subscribe(listener)?;
            (subscription, presence.live.then_some(presence.generation))
        };
        let Some(ticket) = ticket else {
            trace!(event = %event, "not connected, fetch deferred to connect");
            return Ok(subscription);
        };
        let _ = tokio::spawn(fetch_next_tick(
            Arc::downgrade(&self.inner),
            event,
            ticket,
            subscription.token().clone(),
        ));
        Ok(subscription)
    }
}

async fn fetch_next_tick(hub: Weak<HubInner>, event: Event, ticket: u64, token: CancellationToken) {
    tokio::task::yield_now().await;
    if token.is_cancelled() {
        trace!(event = %event, "unsubscribed before fetch");
        return;
    }
    let Some(hub) = hub.upgrade() else { return };
    if !hub.ticket_valid(ticket) {
        trace!(event = %event, "link changed, fetch left to connect replay");
        return;
    }
    if let Err(e) = hub.fetch(event).await {
        warn!(event = %event, error = %e, "fetch on subscribe failed");
    }
}

/// Register a socket handler that runs `f` against the hub while it lives.
fn on_hub<F, Fut>(socket: &EventSocket, event: &str, hub: &Weak<HubInner>, f: F)
where
    F: Fn(Arc<HubInner>, Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let hub = hub.clone();
    let f = Arc::new(f);
    socket.on(event, move |data| {
        let hub = hub.upgrade();
        let f = f.clone();
        async move {
            if let Some(hub) = hub {
                f(hub, data).await;
            }
        }
    });
}
