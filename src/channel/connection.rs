// src/channel/connection.rs
use futures::{Sink, SinkExt, StreamExt};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use super::frame::EventFrame;
use crate::config::{AppConfig, ReconnectPolicy};
use crate::errors::{Result, WorkspaceError};
use crate::models::UserId;

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Reconnecting { attempt: u32 },
    Closed,
    /// Lost and every reconnect attempt failed.
    Failed { reason: String },
}

/// Opens push-channel connections for one endpoint.
#[derive(Debug, Clone)]
pub struct RealtimeChannel {
    endpoint: String,
    reconnect: ReconnectPolicy,
    connect_timeout: Duration,
}

impl RealtimeChannel {
    pub fn new(endpoint: impl Into<String>, reconnect: ReconnectPolicy) -> Self {
        Self {
            endpoint: endpoint.into(),
            reconnect,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.socket_url.clone(), config.reconnect.clone())
            .with_connect_timeout(config.request_timeout)
    }

    /// Bounds every connect, the first one and each reconnect attempt.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Connects and announces `identity` before anything is read from the
    /// socket. The first connect is not retried.
    pub async fn connect(&self, identity: &UserId) -> Result<Connection> {
        log::info!("channel: connecting | endpoint = {}", self.endpoint);
        let stream = open_announced(&self.endpoint, identity, self.connect_timeout).await?;
        log::info!("channel: connected, identity announced | user = {}", identity);

        let registry = Arc::new(Mutex::new(Registry::default()));
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connected);

        let session = Session {
            endpoint: self.endpoint.clone(),
            identity: identity.clone(),
            policy: self.reconnect.clone(),
            connect_timeout: self.connect_timeout,
            registry: registry.clone(),
            commands: commands_rx,
            state: state_tx,
            pending: VecDeque::new(),
        };
        let task = tokio::spawn(session.run(stream));

        Ok(Connection {
            endpoint: self.endpoint.clone(),
            identity: identity.clone(),
            registry,
            commands: commands_tx,
            state: state_rx,
            task: Some(task),
        })
    }
}

async fn open_announced(endpoint: &str, identity: &UserId, timeout: Duration) -> Result<WsStream> {
    let connection_error = |reason: String| WorkspaceError::Connection {
        endpoint: endpoint.to_string(),
        reason,
    };

    let (mut stream, _) = tokio::time::timeout(timeout, connect_async(endpoint))
        .await
        .map_err(|_| connection_error(format!("timed out after {:?}", timeout)))?
        .map_err(|e| connection_error(e.to_string()))?;

    let hello = EventFrame::set_user_id(identity.as_str()).encode()?;
    stream
        .send(Message::Text(hello.into()))
        .await
        .map_err(|e| connection_error(e.to_string()))?;

    Ok(stream)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionToken(u64);

type Handler = Box<dyn FnMut(&Value) + Send>;

struct Registration {
    token: SubscriptionToken,
    event: String,
    handler: Handler,
}

#[derive(Default)]
struct Registry {
    next_token: u64,
    entries: Vec<Registration>,
}

impl Registry {
    fn insert(&mut self, event: &str, handler: Handler) -> SubscriptionToken {
        self.next_token += 1;
        let token = SubscriptionToken(self.next_token);
        self.entries.push(Registration {
            token,
            event: event.to_string(),
            handler,
        });
        token
    }

    fn remove(&mut self, token: SubscriptionToken) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.token != token);
        self.entries.len() != before
    }

    fn count(&self, event: &str) -> usize {
        self.entries.iter().filter(|entry| entry.event == event).count()
    }

    /// Calls every handler registered for the frame's event, oldest first.
    fn deliver(&mut self, frame: &EventFrame) -> usize {
        let mut delivered = 0;
        for entry in self.entries.iter_mut().filter(|entry| entry.event == frame.event) {
            (entry.handler)(&frame.data);
            delivered += 1;
        }
        delivered
    }
}

fn lock(registry: &Mutex<Registry>) -> MutexGuard<'_, Registry> {
    registry.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Scoped registration of one handler. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes its handler"]
pub struct Subscription {
    token: SubscriptionToken,
    registry: Weak<Mutex<Registry>>,
}

impl Subscription {
    pub fn token(&self) -> SubscriptionToken {
        self.token
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            lock(&registry).remove(self.token);
        }
    }
}

enum Command {
    Emit(EventFrame),
    Close,
}

/// A live push-channel session, owned by whoever opened it.
///
/// Handlers run on the connection's I/O task in arrival order. A handler
/// must not subscribe, unsubscribe or drop a [`Subscription`] of the same
/// connection: the registry lock is held while handlers run.
pub struct Connection {
    endpoint: String,
    identity: UserId,
    registry: Arc<Mutex<Registry>>,
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ConnectionState>,
    task: Option<JoinHandle<()>>,
}

impl Connection {
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn identity(&self) -> &UserId {
        &self.identity
    }

    /// Registers `handler` for `event`. Registering the same event twice
    /// means every event is handled twice.
    pub fn subscribe<F>(&self, event: &str, handler: F) -> Subscription
    where
        F: FnMut(&Value) + Send + 'static,
    {
        let token = lock(&self.registry).insert(event, Box::new(handler));
        log::debug!("channel: subscribed | event = {} | token = {:?}", event, token);
        Subscription {
            token,
            registry: Arc::downgrade(&self.registry),
        }
    }

    pub fn unsubscribe(&self, token: SubscriptionToken) -> bool {
        lock(&self.registry).remove(token)
    }

    pub fn subscriber_count(&self, event: &str) -> usize {
        lock(&self.registry).count(event)
    }

    /// Queues an event for the service. Frames emitted while reconnecting
    /// are sent after the identity has been re-announced.
    pub fn emit(&self, event: &str, data: Value) -> Result<()> {
        self.commands
            .send(Command::Emit(EventFrame::new(event, data)))
            .map_err(|_| WorkspaceError::ChannelClosed)
    }

    pub fn state(&self) -> ConnectionState {
        self.state.borrow().clone()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Sends a close frame and waits for the I/O task to finish.
    pub async fn close(mut self) {
        let _ = self.commands.send(Command::Close);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                log::error!("channel: I/O task ended abnormally | error = {}", e);
            }
        }
        log::info!("channel: closed | endpoint = {}", self.endpoint);
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

enum Exit {
    Closed,
    Lost(String),
}

/// Everything the I/O task owns.
struct Session {
    endpoint: String,
    identity: UserId,
    policy: ReconnectPolicy,
    connect_timeout: Duration,
    registry: Arc<Mutex<Registry>>,
    commands: mpsc::UnboundedReceiver<Command>,
    state: watch::Sender<ConnectionState>,
    /// Emits that arrived while reconnecting, oldest first.
    pending: VecDeque<EventFrame>,
}

impl Session {
    async fn run(mut self, mut stream: WsStream) {
        loop {
            match self.pump(&mut stream).await {
                Exit::Closed => {
                    self.state.send_replace(ConnectionState::Closed);
                    return;
                }
                Exit::Lost(reason) => match self.reconnect(reason).await {
                    Some(fresh) => stream = fresh,
                    None => return,
                },
            }
        }
    }

    async fn pump(&mut self, stream: &mut WsStream) -> Exit {
        if let Err(e) = flush_pending(stream, &mut self.pending).await {
            return Exit::Lost(e.to_string());
        }

        let commands = &mut self.commands;
        let registry = &self.registry;
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Emit(frame)) => {
                        if let Err(e) = send_frame(stream, &frame).await {
                            return Exit::Lost(e.to_string());
                        }
                    }
                    Some(Command::Close) | None => {
                        if let Err(e) = stream.close(None).await {
                            log::debug!("channel: close handshake failed | error = {}", e);
                        }
                        return Exit::Closed;
                    }
                },
                message = stream.next() => match message {
                    Some(Ok(Message::Text(text))) => deliver_text(registry, &text),
                    Some(Ok(Message::Close(_))) => return Exit::Lost("closed by server".to_string()),
                    // pings are answered by tungstenite on the next read
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Exit::Lost(e.to_string()),
                    None => return Exit::Lost("stream ended".to_string()),
                },
            }
        }
    }

    async fn reconnect(&mut self, reason: String) -> Option<WsStream> {
        log::warn!("channel: connection lost | reason = {}", reason);

        for attempt in 1..=self.policy.max_attempts {
            self.state.send_replace(ConnectionState::Reconnecting { attempt });
            let delay = self.policy.delay_for(attempt);
            log::info!("channel: reconnecting | attempt = {} | delay = {:?}", attempt, delay);

            if !self.wait(delay).await {
                self.state.send_replace(ConnectionState::Closed);
                return None;
            }

            match open_announced(&self.endpoint, &self.identity, self.connect_timeout).await {
                Ok(stream) => {
                    log::info!("channel: reconnected, identity re-announced | user = {}", self.identity);
                    self.state.send_replace(ConnectionState::Connected);
                    return Some(stream);
                }
                Err(e) => log::warn!("channel: reconnect attempt {} failed | error = {}", attempt, e),
            }
        }

        log::error!("channel: giving up | endpoint = {}", self.endpoint);
        self.state.send_replace(ConnectionState::Failed { reason });
        None
    }

    /// Sleeps for `delay`, buffering emits. Returns false if asked to close.
    async fn wait(&mut self, delay: Duration) -> bool {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => return true,
                command = self.commands.recv() => match command {
                    Some(Command::Emit(frame)) => self.pending.push_back(frame),
                    Some(Command::Close) | None => return false,
                },
            }
        }
    }
}

async fn send_frame<S>(sink: &mut S, frame: &EventFrame) -> Result<()>
where
    S: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    let text = frame.encode()?;
    sink.send(Message::Text(text.into())).await?;
    Ok(())
}

/// Sends buffered frames in order. A frame leaves the buffer only once it
/// has been sent, so a failure keeps it and everything after it.
async fn flush_pending<S>(sink: &mut S, pending: &mut VecDeque<EventFrame>) -> Result<()>
where
    S: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    while let Some(frame) = pending.front() {
        send_frame(sink, frame).await?;
        pending.pop_front();
    }
    Ok(())
}

fn deliver_text(registry: &Mutex<Registry>, text: &str) {
    match EventFrame::decode(text) {
        Ok(frame) => {
            let delivered = lock(registry).deliver(&frame);
            log::debug!("channel: event | name = {} | handlers = {}", frame.event, delivered);
        }
        Err(e) => log::warn!("channel: skipping undecodable frame | error = {}", e),
    }
}
