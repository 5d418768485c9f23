//! Connection manager for the chat socket.
//!
//! [`ConnectionManager`] is a cheap, cloneable handle. All socket state lives
//! in one spawned event loop that processes, one at a time, the transport
//! events, the heartbeat ticks, the reconnect deadline, and the commands sent
//! by handles. Nothing in the loop blocks.
//!
//! Every socket the loop opens gets a new generation number. Transport
//! events and timers remember the generation they were created for and are
//! dropped if the loop has since moved on to another socket, so a timer or a
//! late close from a replaced socket can never act on the current one.

use std::sync::{Arc, Weak};

use awachat_shared::{
    parse_frame, AckPayload, ChatHistoryRequest, ChatMessagePayload, MessagePayload, MessageTag,
    WireMessage, TOKEN_QUERY_PARAM,
};
use chrono::Utc;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use url::Url;

use super::connection::{
    ConnectionState, Transport, TransportEvent, TransportEvents, TransportHandle,
};
use super::endpoint;
use super::registry::HandlerRegistry;
use crate::config::{ManagerConfig, DEFAULT_HEARTBEAT_INTERVAL};
use crate::credentials::CredentialStore;
use crate::error::ConnectionError;
use crate::notify::Notifier;

enum Command {
    Init {
        endpoint: Url,
        done: oneshot::Sender<()>,
    },
    Send {
        text: String,
        reply: oneshot::Sender<Result<(), ConnectionError>>,
    },
    Disconnect {
        done: oneshot::Sender<()>,
    },
}

/// Handle to the chat socket.
///
/// Created once per session with [`ConnectionManager::new`] and passed to
/// whoever needs to send or observe messages. The event loop stops when the
/// last handle is dropped. Handlers are owned by the event loop, so a handler
/// that needs the manager must capture a [`WeakConnectionManager`]; a strong
/// handle captured there keeps the loop running forever.
#[derive(Clone)]
pub struct ConnectionManager {
    commands: mpsc::UnboundedSender<Command>,
    registry: Arc<HandlerRegistry>,
    socket_path: Arc<str>,
    connected: watch::Receiver<bool>,
    last_message: watch::Receiver<Option<WireMessage>>,
    state: watch::Receiver<ConnectionState>,
}

impl ConnectionManager {
    /// Spawn the event loop. Must be called from within a tokio runtime.
    pub fn new(
        mut config: ManagerConfig,
        transport: Arc<dyn Transport>,
        credentials: Arc<dyn CredentialStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        if config.heartbeat_interval.is_zero() {
            crate::log_warn!(
                "Heartbeat interval must be positive, using {DEFAULT_HEARTBEAT_INTERVAL:?}"
            );
            config.heartbeat_interval = DEFAULT_HEARTBEAT_INTERVAL;
        }

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (connected_tx, connected_rx) = watch::channel(false);
        let (last_message_tx, last_message_rx) = watch::channel(None);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Idle);
        let registry = Arc::new(HandlerRegistry::new());
        let socket_path: Arc<str> = Arc::from(config.socket_path.as_str());

        let event_loop = EventLoop {
            config,
            transport,
            credentials,
            notifier,
            registry: registry.clone(),
            events_tx,
            connected: connected_tx,
            last_message: last_message_tx,
            state: state_tx,
            endpoint: None,
            socket: None,
            generation: 0,
            is_open: false,
            reconnect_attempts: 0,
            heartbeat: None,
            reconnect: None,
        };
        tokio::spawn(event_loop.run(commands_rx, events_rx));

        Self {
            commands: commands_tx,
            registry,
            socket_path,
            connected: connected_rx,
            last_message: last_message_rx,
            state: state_rx,
        }
    }

    /// Point the manager at a server origin and connect.
    ///
    /// `base_url` is an `http(s)` origin; the socket URL is derived from it.
    /// Any existing socket is closed first and the reconnect budget is reset.
    /// Returns once the connection attempt has started, not once it is open.
    pub async fn init(&self, base_url: &str) -> Result<(), ConnectionError> {
        let endpoint = endpoint::socket_url(base_url, &self.socket_path)?;
        self.request(|done| Command::Init { endpoint, done }).await
    }

    /// Close the socket and cancel the heartbeat and any pending reconnect.
    ///
    /// Safe to call when already disconnected. Nothing reconnects until the
    /// next [`init`](Self::init).
    pub async fn disconnect(&self) {
        let _ = self.request(|done| Command::Disconnect { done }).await;
    }

    /// Serialize and send an envelope.
    pub async fn try_send_message<T: Serialize>(
        &self,
        message: &WireMessage<T>,
    ) -> Result<(), ConnectionError> {
        let text = serde_json::to_string(message)?;
        self.request(|reply| Command::Send { text, reply }).await?
    }

    /// Send an envelope, returning `false` if the socket is not open or the
    /// write failed. Failures are logged.
    pub async fn send_message<T: Serialize>(&self, message: &WireMessage<T>) -> bool {
        match self.try_send_message(message).await {
            Ok(()) => true,
            Err(e) => {
                crate::log_error!(tag = %message.tag, error = %e, "Failed to send message");
                false
            }
        }
    }

    pub async fn send_chat_message(&self, payload: &ChatMessagePayload) -> bool {
        self.send_message(&WireMessage::new(MessageTag::Chat, payload))
            .await
    }

    /// Mark everything up to `ack.last_message_id` as read.
    pub async fn send_ack(&self, ack: &AckPayload) -> bool {
        self.send_message(&WireMessage::new(MessageTag::Ack, ack)).await
    }

    /// Ask for a page of history; the reply arrives as a
    /// [`MessagePayload::ChatHistory`] under the same tag.
    pub async fn request_chat_history(&self, request: &ChatHistoryRequest) -> bool {
        self.send_message(&WireMessage::new(MessageTag::RequestChatHistory, request))
            .await
    }

    /// Route inbound messages with `tag` to `handler`, replacing any previous
    /// handler for that tag.
    ///
    /// Handlers run on the event loop and must not block. A panicking handler
    /// is logged and the loop carries on.
    pub fn register_message_handler(
        &self,
        tag: impl Into<MessageTag>,
        handler: impl Fn(MessagePayload) + Send + Sync + 'static,
    ) {
        self.registry.register(tag.into(), Arc::new(handler));
    }

    pub fn unregister_message_handler(&self, tag: impl Into<MessageTag>) -> bool {
        self.registry.unregister(&tag.into())
    }

    pub fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    /// Receiver that changes whenever the socket opens or closes.
    pub fn connected(&self) -> watch::Receiver<bool> {
        self.connected.clone()
    }

    /// The most recent well-formed envelope received.
    pub fn last_message(&self) -> Option<WireMessage> {
        self.last_message.borrow().clone()
    }

    pub fn state(&self) -> ConnectionState {
        self.state.borrow().clone()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// A handle that does not keep the event loop alive.
    pub fn downgrade(&self) -> WeakConnectionManager {
        WeakConnectionManager {
            commands: self.commands.downgrade(),
            registry: Arc::downgrade(&self.registry),
            socket_path: self.socket_path.clone(),
            connected: self.connected.clone(),
            last_message: self.last_message.clone(),
            state: self.state.clone(),
        }
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, ConnectionError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(command(tx))
            .map_err(|_| ConnectionError::Stopped)?;
        rx.await.map_err(|_| ConnectionError::Stopped)
    }
}

/// Non-owning counterpart of [`ConnectionManager`], for use inside handlers.
#[derive(Clone)]
pub struct WeakConnectionManager {
    commands: mpsc::WeakUnboundedSender<Command>,
    registry: Weak<HandlerRegistry>,
    socket_path: Arc<str>,
    connected: watch::Receiver<bool>,
    last_message: watch::Receiver<Option<WireMessage>>,
    state: watch::Receiver<ConnectionState>,
}

impl WeakConnectionManager {
    /// `None` once every strong handle is gone.
    pub fn upgrade(&self) -> Option<ConnectionManager> {
        Some(ConnectionManager {
            commands: self.commands.upgrade()?,
            registry: self.registry.upgrade()?,
            socket_path: self.socket_path.clone(),
            connected: self.connected.clone(),
            last_message: self.last_message.clone(),
            state: self.state.clone(),
        })
    }
}

struct Heartbeat {
    generation: u64,
    ticker: Interval,
    last_timestamp: i64,
}

struct PendingReconnect {
    generation: u64,
    deadline: Instant,
}

struct EventLoop {
    config: ManagerConfig,
    transport: Arc<dyn Transport>,
    credentials: Arc<dyn CredentialStore>,
    notifier: Arc<dyn Notifier>,
    registry: Arc<HandlerRegistry>,
    events_tx: mpsc::UnboundedSender<(u64, TransportEvent)>,
    connected: watch::Sender<bool>,
    last_message: watch::Sender<Option<WireMessage>>,
    state: watch::Sender<ConnectionState>,

    endpoint: Option<Url>,
    socket: Option<Box<dyn TransportHandle>>,
    generation: u64,
    is_open: bool,
    reconnect_attempts: u32,
    heartbeat: Option<Heartbeat>,
    reconnect: Option<PendingReconnect>,
}

impl EventLoop {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut events: mpsc::UnboundedReceiver<(u64, TransportEvent)>,
    ) {
        loop {
            tokio::select! {
                biased;

                Some((generation, event)) = events.recv() => {
                    self.on_transport_event(generation, event);
                }
                command = commands.recv() => match command {
                    Some(command) => self.on_command(command),
                    None => break,
                },
                generation = next_heartbeat(&mut self.heartbeat) => {
                    self.on_heartbeat(generation);
                }
                generation = reconnect_due(&self.reconnect) => {
                    self.on_reconnect_due(generation);
                }
            }
        }

        self.disconnect();
        crate::log_debug!("Connection manager stopped");
    }

    fn on_command(&mut self, command: Command) {
        match command {
            Command::Init { endpoint, done } => {
                crate::log_info!(endpoint = %endpoint, "Initializing chat socket");
                self.endpoint = Some(endpoint);
                self.reconnect_attempts = 0;
                self.connect();
                let _ = done.send(());
            }
            Command::Send { text, reply } => {
                let _ = reply.send(self.send_text(text));
            }
            Command::Disconnect { done } => {
                self.disconnect();
                let _ = done.send(());
            }
        }
    }

    fn connect(&mut self) {
        self.reconnect = None;
        self.teardown_socket();
        self.generation += 1;

        let Some(endpoint) = self.endpoint.as_ref() else {
            crate::log_warn!("Connect requested before init");
            return;
        };
        let Some(token) = self.credentials.token() else {
            crate::log_error!(error = %ConnectionError::AuthMissing, "Cannot open chat socket");
            self.state.send_replace(ConnectionState::Idle);
            return;
        };

        let url = endpoint::with_token(endpoint, TOKEN_QUERY_PARAM, &token);
        let events = TransportEvents::new(self.generation, self.events_tx.clone());
        crate::log_debug!(generation = self.generation, endpoint = %endpoint, "Opening chat socket");
        self.state.send_replace(ConnectionState::Connecting);

        match self.transport.open(&url, events) {
            Ok(socket) => self.socket = Some(socket),
            Err(e) => {
                crate::log_error!(error = %e, "Failed to open chat socket");
                self.schedule_reconnect();
            }
        }
    }

    fn disconnect(&mut self) {
        self.reconnect = None;
        self.teardown_socket();
        // orphan any events still in flight from the closed socket
        self.generation += 1;
        self.state.send_replace(ConnectionState::Idle);
    }

    fn teardown_socket(&mut self) {
        self.heartbeat = None;
        if let Some(socket) = self.socket.take() {
            socket.close();
        }
        self.is_open = false;
        self.connected.send_replace(false);
    }

    fn send_text(&self, text: String) -> Result<(), ConnectionError> {
        match self.socket.as_ref() {
            Some(socket) if self.is_open => Ok(socket.send_text(text)?),
            _ => Err(ConnectionError::NotOpen),
        }
    }

    fn on_transport_event(&mut self, generation: u64, event: TransportEvent) {
        if generation != self.generation {
            crate::log_debug!(
                generation,
                current = self.generation,
                ?event,
                "Ignoring event from superseded socket"
            );
            return;
        }

        match event {
            TransportEvent::Open => self.on_open(),
            TransportEvent::Message(text) => self.on_message(&text),
            TransportEvent::Close {
                clean,
                code,
                reason,
            } => self.on_close(clean, code, &reason),
            TransportEvent::Error(detail) => self.on_error(&detail),
        }
    }

    fn on_open(&mut self) {
        crate::log_info!(generation = self.generation, "Chat socket connected");
        self.is_open = true;
        self.reconnect_attempts = 0;
        self.connected.send_replace(true);
        self.state.send_replace(ConnectionState::Open);

        let period = self.config.heartbeat_interval;
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.heartbeat = Some(Heartbeat {
            generation: self.generation,
            ticker,
            last_timestamp: 0,
        });
    }

    fn on_message(&mut self, text: &str) {
        let message = match parse_frame(text) {
            Ok(message) => message,
            Err(e) => {
                crate::log_warn!(error = %e, "Dropping malformed frame");
                return;
            }
        };

        self.last_message.send_replace(Some(message.clone()));

        if message.tag == MessageTag::Heartbeat {
            crate::log_debug!(data = ?message.data, "Heartbeat acknowledged");
        }

        if let Err(e) = self.registry.dispatch(&message) {
            crate::log_warn!(error = %e, "Dropping message with malformed payload");
        }
    }

    fn on_close(&mut self, clean: bool, code: Option<u16>, reason: &str) {
        crate::log_info!(clean, ?code, reason, "Chat socket closed");
        self.heartbeat = None;
        self.socket = None;
        self.is_open = false;
        self.connected.send_replace(false);
        self.state.send_replace(ConnectionState::Closed { clean });

        if !clean {
            self.schedule_reconnect();
        }
    }

    fn on_error(&mut self, detail: &str) {
        crate::log_error!(error = detail, "Chat socket error");
        self.notifier.report_error(
            "WebSocket connection error",
            "The connection ran into a problem, trying to reconnect",
        );
    }

    fn schedule_reconnect(&mut self) {
        let attempt = self.reconnect_attempts + 1;
        let max = self.config.reconnect.max_attempts;

        match self.config.reconnect.delay_for_attempt(attempt) {
            Some(delay) => {
                crate::log_info!(attempt, max, "Reconnecting in {delay:?}");
                self.reconnect_attempts = attempt;
                self.reconnect = Some(PendingReconnect {
                    generation: self.generation,
                    deadline: Instant::now() + delay,
                });
                self.state
                    .send_replace(ConnectionState::Reconnecting { attempt });
            }
            None => {
                crate::log_error!(max, "Reconnect attempts exhausted, giving up");
                self.reconnect = None;
                self.state.send_replace(ConnectionState::Exhausted);
                self.notifier.report_error(
                    "Connection failed",
                    "Unable to reach the chat server, reload to try again",
                );
            }
        }
    }

    fn on_reconnect_due(&mut self, generation: u64) {
        self.reconnect = None;
        if generation == self.generation {
            self.connect();
        }
    }

    fn on_heartbeat(&mut self, generation: u64) {
        if generation != self.generation || !self.is_open {
            self.heartbeat = None;
            return;
        }
        let Some(heartbeat) = self.heartbeat.as_mut() else {
            return;
        };

        // never step backwards within one connection, even if the wall clock does
        let timestamp = Utc::now().timestamp_millis().max(heartbeat.last_timestamp);
        heartbeat.last_timestamp = timestamp;

        let sent = serde_json::to_string(&WireMessage::heartbeat(timestamp))
            .map_err(ConnectionError::from)
            .and_then(|text| self.send_text(text));
        match sent {
            Ok(()) => crate::log_debug!(timestamp, "Heartbeat sent"),
            Err(e) => crate::log_warn!(error = %e, "Failed to send heartbeat"),
        }
    }
}

async fn next_heartbeat(heartbeat: &mut Option<Heartbeat>) -> u64 {
    match heartbeat {
        Some(heartbeat) => {
            heartbeat.ticker.tick().await;
            heartbeat.generation
        }
        None => std::future::pending().await,
    }
}

async fn reconnect_due(reconnect: &Option<PendingReconnect>) -> u64 {
    match reconnect {
        Some(pending) => {
            time::sleep_until(pending.deadline).await;
            pending.generation
        }
        None => std::future::pending().await,
    }
}
