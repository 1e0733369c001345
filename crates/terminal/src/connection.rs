//! Shared WebSocket connection to the terminal gateway.
//!
//! A [`TerminalConnection`] is cheaply cloneable and intended to be shared by
//! every terminal view in the process, so remounting a view reuses the live
//! socket instead of opening a second one. It owns the connect lock, the
//! keepalive ping task, and reconnect scheduling; subscribers receive raw
//! payloads and status transitions through registered handlers.

use {
    crate::{Result, error::Context},
    codequest_config::{TerminalClientConfig, resolve_ws_url},
    codequest_protocol::{ClientMessage, ServerMessage, epoch_millis},
    futures::{SinkExt, StreamExt},
    std::{
        collections::HashMap,
        sync::{Arc, Mutex, Weak},
        time::Duration,
    },
    tokio::{net::TcpStream, sync::mpsc, task::JoinHandle},
    tokio_tungstenite::{
        MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message,
    },
    tracing::{debug, info, warn},
};

/// Connection lifecycle, as observed by subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
}

/// A message delivered to subscribers. Binary frames carry PTY output;
/// text frames carry JSON control messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Binary(Vec<u8>),
    Text(String),
}

pub type MessageHandler = Arc<dyn Fn(&Payload) + Send + Sync>;
pub type StatusHandler = Arc<dyn Fn(ConnectionStatus) + Send + Sync>;

/// Reconnect delay for the given attempt number (1-based): 1s doubling per
/// attempt, capped at 16s.
pub fn backoff_delay(attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(1).min(4);
    Duration::from_millis(1000 * (1u64 << exp))
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum HandlerKind {
    Message,
    Status,
}

/// Unsubscribes its handler when dropped, so a departing view cannot leak a
/// callback into the shared connection.
pub struct Subscription {
    inner: Weak<Inner>,
    id: u64,
    kind: HandlerKind,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.upgrade()
            && let Ok(mut st) = inner.state.lock()
        {
            match self.kind {
                HandlerKind::Message => {
                    st.message_handlers.remove(&self.id);
                },
                HandlerKind::Status => {
                    st.status_handlers.remove(&self.id);
                },
            }
        }
    }
}

struct ConnState {
    status: ConnectionStatus,
    /// Held from the moment a connect is initiated until the attempt
    /// resolves; makes concurrent `connect()` calls idempotent.
    connect_lock: bool,
    /// Bumped whenever a connection attempt starts or the user disconnects.
    /// Tasks belonging to an older generation must not touch shared state.
    generation: u64,
    writer: Option<mpsc::UnboundedSender<Message>>,
    message_handlers: HashMap<u64, MessageHandler>,
    status_handlers: HashMap<u64, StatusHandler>,
    next_handler_id: u64,
    reconnect_attempts: u32,
    reconnect_task: Option<JoinHandle<()>>,
}

impl Default for ConnState {
    fn default() -> Self {
        Self {
            status: ConnectionStatus::Disconnected,
            connect_lock: false,
            generation: 0,
            writer: None,
            message_handlers: HashMap::new(),
            status_handlers: HashMap::new(),
            next_handler_id: 0,
            reconnect_attempts: 0,
            reconnect_task: None,
        }
    }
}

struct Inner {
    url: String,
    config: TerminalClientConfig,
    state: Mutex<ConnState>,
}

/// Handle to the process-wide terminal socket.
#[derive(Clone)]
pub struct TerminalConnection {
    inner: Arc<Inner>,
}

impl TerminalConnection {
    pub fn new(url: impl Into<String>, config: TerminalClientConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                url: url.into(),
                config,
                state: Mutex::new(ConnState::default()),
            }),
        }
    }

    /// Build from config, resolving the WebSocket URL override chain.
    pub fn from_config(config: TerminalClientConfig) -> Self {
        let url = resolve_ws_url(config.ws_url.as_deref(), &config.default_host, false);
        Self::new(url, config)
    }

    pub fn url(&self) -> &str {
        &self.inner.url
    }

    pub fn status(&self) -> ConnectionStatus {
        self.inner
            .state
            .lock()
            .map(|st| st.status)
            .unwrap_or(ConnectionStatus::Disconnected)
    }

    /// Open the socket if no attempt is in flight. Calling this while
    /// connecting or connected is a no-op, so any number of views may call it
    /// on mount without racing a second socket into existence.
    pub fn connect(&self) {
        let generation = {
            let Ok(mut st) = self.inner.state.lock() else {
                return;
            };
            if st.connect_lock
                || matches!(
                    st.status,
                    ConnectionStatus::Connecting | ConnectionStatus::Connected
                )
            {
                return;
            }
            st.connect_lock = true;
            st.generation += 1;
            st.generation
        };

        self.set_status(ConnectionStatus::Connecting);
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            run_connection(inner, generation).await;
        });
    }

    /// Tear the socket down and cancel any pending reconnect. Subscribers
    /// stay registered.
    pub fn disconnect(&self) {
        {
            let Ok(mut st) = self.inner.state.lock() else {
                return;
            };
            st.generation += 1;
            st.connect_lock = false;
            st.reconnect_attempts = 0;
            if let Some(task) = st.reconnect_task.take() {
                task.abort();
            }
            // Dropping the sender closes the socket task's write channel.
            st.writer = None;
        }
        self.set_status(ConnectionStatus::Disconnected);
    }

    /// Register a payload handler. The returned guard unsubscribes on drop.
    pub fn subscribe(&self, handler: MessageHandler) -> Subscription {
        let id = {
            let mut st = match self.inner.state.lock() {
                Ok(st) => st,
                Err(poisoned) => poisoned.into_inner(),
            };
            let id = st.next_handler_id;
            st.next_handler_id += 1;
            st.message_handlers.insert(id, handler);
            id
        };
        Subscription {
            inner: Arc::downgrade(&self.inner),
            id,
            kind: HandlerKind::Message,
        }
    }

    /// Register a status handler. It fires immediately with the current
    /// status so late subscribers never miss the state they mounted into.
    pub fn on_status(&self, handler: StatusHandler) -> Subscription {
        let (id, current) = {
            let mut st = match self.inner.state.lock() {
                Ok(st) => st,
                Err(poisoned) => poisoned.into_inner(),
            };
            let id = st.next_handler_id;
            st.next_handler_id += 1;
            st.status_handlers.insert(id, Arc::clone(&handler));
            (id, st.status)
        };
        handler(current);
        Subscription {
            inner: Arc::downgrade(&self.inner),
            id,
            kind: HandlerKind::Status,
        }
    }

    pub fn send_input(&self, data: &str) -> Result<()> {
        self.send(&ClientMessage::Input { data: data.into() })
    }

    pub fn send_resize(&self, cols: u16, rows: u16) -> Result<()> {
        self.send(&ClientMessage::Resize {
            cols: i64::from(cols),
            rows: i64::from(rows),
        })
    }

    /// Submit a whole command line for validation and execution.
    pub fn send_command(&self, command: &str) -> Result<()> {
        self.send(&ClientMessage::Command {
            command: command.into(),
        })
    }

    fn send(&self, message: &ClientMessage) -> Result<()> {
        let json = serde_json::to_string(message)?;
        let st = self.inner.state.lock().context("connection state")?;
        let writer = st.writer.as_ref().context("not connected")?;
        writer
            .send(Message::Text(json.into()))
            .context("socket task has exited")
    }

    fn set_status(&self, status: ConnectionStatus) {
        set_status(&self.inner, status);
    }
}

/// Update the status and notify handlers. Handlers are cloned out first so
/// they run without the state lock held.
fn set_status(inner: &Arc<Inner>, status: ConnectionStatus) {
    let handlers: Vec<StatusHandler> = {
        let Ok(mut st) = inner.state.lock() else {
            return;
        };
        if st.status == status {
            return;
        }
        st.status = status;
        st.status_handlers.values().cloned().collect()
    };
    for handler in handlers {
        handler(status);
    }
}

fn dispatch(inner: &Arc<Inner>, payload: &Payload) {
    let handlers: Vec<MessageHandler> = {
        let Ok(st) = inner.state.lock() else {
            return;
        };
        st.message_handlers.values().cloned().collect()
    };
    for handler in handlers {
        handler(payload);
    }
}

/// One connection attempt plus, on success, the socket's whole lifetime.
async fn run_connection(inner: Arc<Inner>, generation: u64) {
    let url = inner.url.clone();
    info!(url = %url, "terminal: connecting");

    let attempt = tokio::time::timeout(inner.config.connect_timeout, connect_async(&url)).await;
    let stream = match attempt {
        Ok(Ok((stream, _response))) => stream,
        Ok(Err(e)) => {
            warn!(error = %e, "terminal: connect failed");
            connect_failed(&inner, generation);
            return;
        },
        Err(_) => {
            warn!(timeout_ms = inner.config.connect_timeout.as_millis(), "terminal: connect timed out");
            connect_failed(&inner, generation);
            return;
        },
    };

    let (write_tx, write_rx) = mpsc::unbounded_channel::<Message>();
    {
        let Ok(mut st) = inner.state.lock() else {
            return;
        };
        if st.generation != generation {
            // A disconnect or newer attempt superseded this socket.
            return;
        }
        st.connect_lock = false;
        st.reconnect_attempts = 0;
        st.writer = Some(write_tx.clone());
    }
    set_status(&inner, ConnectionStatus::Connected);

    // Ask the gateway to bring up the PTY right away.
    if let Ok(init) = serde_json::to_string(&ClientMessage::Init) {
        let _ = write_tx.send(Message::Text(init.into()));
    }

    run_socket(&inner, stream, write_rx, &write_tx).await;

    info!(url = %url, "terminal: socket closed");
    cleanup(&inner, generation);
}

/// Pump the open socket: fan incoming frames out to subscribers, drain the
/// write channel, and keep the link warm with periodic pings.
async fn run_socket(
    inner: &Arc<Inner>,
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    mut write_rx: mpsc::UnboundedReceiver<Message>,
    write_tx: &mpsc::UnboundedSender<Message>,
) {
    let (mut sink, mut reader) = stream.split();

    let mut keepalive = tokio::time::interval(inner.config.keepalive_interval);
    keepalive.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    keepalive.tick().await; // the first tick fires immediately

    loop {
        tokio::select! {
            msg = reader.next() => {
                match msg {
                    Some(Ok(Message::Binary(data))) => {
                        dispatch(inner, &Payload::Binary(data.to_vec()));
                    },
                    Some(Ok(Message::Text(text))) => {
                        handle_text(inner, write_tx, text.as_str());
                    },
                    Some(Ok(Message::Ping(data))) => {
                        if sink.send(Message::Pong(data)).await.is_err() {
                            return;
                        }
                    },
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("terminal: closed by server");
                        return;
                    },
                    Some(Ok(_)) => {},
                    Some(Err(e)) => {
                        warn!(error = %e, "terminal: read error");
                        return;
                    },
                }
            },
            out = write_rx.recv() => {
                match out {
                    Some(message) => {
                        if sink.send(message).await.is_err() {
                            return;
                        }
                    },
                    None => {
                        // Writer dropped — deliberate disconnect.
                        let _ = sink.send(Message::Close(None)).await;
                        return;
                    },
                }
            },
            _ = keepalive.tick() => {
                if let Ok(ping) = serde_json::to_string(&ClientMessage::Ping { time: epoch_millis() })
                    && sink.send(Message::Text(ping.into())).await.is_err()
                {
                    return;
                }
            },
        }
    }
}

/// Route one JSON control frame. Liveness traffic is answered or swallowed
/// here; everything else goes to subscribers verbatim.
fn handle_text(
    inner: &Arc<Inner>,
    write_tx: &mpsc::UnboundedSender<Message>,
    text: &str,
) {
    match serde_json::from_str::<ServerMessage>(text) {
        Ok(ServerMessage::Ping { time }) => {
            if let Ok(pong) = serde_json::to_string(&ClientMessage::Pong { time }) {
                let _ = write_tx.send(Message::Text(pong.into()));
            }
        },
        Ok(ServerMessage::Pong { .. }) => {},
        _ => {
            // Connected, exit, error, and anything unrecognized all flow
            // through so subscribers can render them.
            dispatch(inner, &Payload::Text(text.to_string()));
        },
    }
}

fn connect_failed(inner: &Arc<Inner>, generation: u64) {
    {
        let Ok(mut st) = inner.state.lock() else {
            return;
        };
        if st.generation != generation {
            return;
        }
        st.connect_lock = false;
    }
    // A failed attempt lands back in Disconnected; the caller's warn log is
    // the only record of the failure.
    set_status(inner, ConnectionStatus::Disconnected);
    schedule_reconnect(inner, generation);
}

/// Post-close bookkeeping. Reconnects are only scheduled while somebody is
/// still listening; an idle connection stays down until the next mount.
fn cleanup(inner: &Arc<Inner>, generation: u64) {
    let has_subscribers = {
        let Ok(mut st) = inner.state.lock() else {
            return;
        };
        if st.generation != generation {
            return;
        }
        st.connect_lock = false;
        st.writer = None;
        !st.message_handlers.is_empty() || !st.status_handlers.is_empty()
    };
    set_status(inner, ConnectionStatus::Disconnected);
    if has_subscribers {
        schedule_reconnect(inner, generation);
    }
}

fn schedule_reconnect(inner: &Arc<Inner>, generation: u64) {
    let delay = {
        let Ok(mut st) = inner.state.lock() else {
            return;
        };
        if st.generation != generation
            || (st.message_handlers.is_empty() && st.status_handlers.is_empty())
        {
            return;
        }
        st.reconnect_attempts += 1;
        if let Some(task) = st.reconnect_task.take() {
            task.abort();
        }
        backoff_delay(st.reconnect_attempts)
    };

    debug!(delay_ms = delay.as_millis(), "terminal: reconnect scheduled");
    let conn = TerminalConnection {
        inner: Arc::clone(inner),
    };
    let task = tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        let stale = {
            let Ok(st) = conn.inner.state.lock() else {
                return;
            };
            st.generation != generation
        };
        if !stale {
            conn.connect();
        }
    });

    if let Ok(mut st) = inner.state.lock() {
        st.reconnect_task = Some(task);
    }
}
