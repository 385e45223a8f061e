//! Persistent KATCP client with auto-reconnect.
//!
//! [`KatcpClient::start`] spawns a background task that connects to the
//! server, performs the `?help` catalog exchange, and then keeps reading
//! replies and informs until the socket drops. Lost connections are
//! re-established with exponential backoff. Callers wait for the
//! [`Synced`](ConnectionState::Synced) state with
//! [`until_synced`](KatcpClient::until_synced) before issuing requests.
//!
//! ```rust,ignore
//! let client = KatcpClient::new("server-client_P1", "10.0.0.5:7020", TransportConfig::default());
//! client.start();
//! client.until_synced().await?;
//! let reply = client.request("capture_start", &[], None).await?;
//! assert!(reply.is_ok());
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, RwLock, broadcast, mpsc, oneshot, watch};
use tokio_util::codec::{Framed, LinesCodec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::error::Error;
use crate::message::{Message, MessageKind, wire_name};
use crate::transport::{TransportConfig, calculate_backoff};

const OUTBOUND_CHANNEL_SIZE: usize = 64;
const INFORM_CHANNEL_SIZE: usize = 256;

// ── ConnectionState ──────────────────────────────────────────────────

/// Connection state observable by consumers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not started yet.
    Disconnected,
    Connecting,
    /// Connected and the request catalog is known; requests may be sent.
    Synced,
    Reconnecting { attempt: u32 },
    /// Stopped for good (explicit stop or retry limit reached).
    Stopped,
}

// ── Reply ────────────────────────────────────────────────────────────

/// The complete answer to one request: the reply line plus any informs
/// the server sent with the same message id before it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub message: Message,
    pub informs: Vec<Message>,
}

impl Reply {
    pub fn new(message: Message) -> Self {
        Self {
            message,
            informs: Vec::new(),
        }
    }

    /// An `ok` reply carrying `arguments` after the status.
    pub fn ok<I, S>(name: &str, arguments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut args = vec!["ok".to_string()];
        args.extend(arguments.into_iter().map(Into::into));
        Self::new(Message::reply(name, args))
    }

    /// A `fail` reply with an error message.
    pub fn fail(name: &str, message: impl Into<String>) -> Self {
        Self::new(Message::reply(name, ["fail".to_string(), message.into()]))
    }

    pub fn is_ok(&self) -> bool {
        self.message.reply_ok()
    }

    /// Status word: `ok`, `fail`, or `invalid`.
    pub fn status(&self) -> &str {
        self.message.arguments.first().map_or("", String::as_str)
    }

    /// The server-supplied error text of a failed reply.
    pub fn error_message(&self) -> Option<&str> {
        if self.is_ok() {
            return None;
        }
        self.message.arguments.get(1).map(String::as_str)
    }

    /// Reply arguments after the status word.
    pub fn values(&self) -> &[String] {
        self.message.arguments.get(1..).unwrap_or_default()
    }
}

// ── KatcpClient ──────────────────────────────────────────────────────

/// A KATCP client owning one logical connection to one server.
///
/// Dropping the client stops the background task and releases the socket.
pub struct KatcpClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    name: String,
    address: String,
    config: TransportConfig,
    state: watch::Sender<ConnectionState>,
    /// Writer for the live connection; `None` while disconnected.
    outbound: Mutex<Option<mpsc::Sender<Message>>>,
    pending: Mutex<HashMap<u32, PendingRequest>>,
    /// Request names advertised by `?help`, stored in wire form.
    catalog: RwLock<HashSet<String>>,
    inform_tx: broadcast::Sender<Arc<Message>>,
    next_mid: AtomicU32,
    started: AtomicBool,
    cancel: CancellationToken,
}

struct PendingRequest {
    informs: Vec<Message>,
    reply_tx: oneshot::Sender<Reply>,
}

impl KatcpClient {
    /// Create a client. Does NOT connect -- call [`start()`](Self::start).
    pub fn new(name: impl Into<String>, address: impl Into<String>, config: TransportConfig) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (inform_tx, _) = broadcast::channel(INFORM_CHANNEL_SIZE);

        Self {
            inner: Arc::new(ClientInner {
                name: name.into(),
                address: address.into(),
                config,
                state,
                outbound: Mutex::new(None),
                pending: Mutex::new(HashMap::new()),
                catalog: RwLock::new(HashSet::new()),
                inform_tx,
                next_mid: AtomicU32::new(1),
                started: AtomicBool::new(false),
                cancel: CancellationToken::new(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn address(&self) -> &str {
        &self.inner.address
    }

    pub fn config(&self) -> &TransportConfig {
        &self.inner.config
    }

    /// Spawn the connection task. Returns immediately; calling it again
    /// is a no-op. Must be called from within a Tokio runtime.
    pub fn start(&self) {
        if self.inner.started.swap(true, Ordering::SeqCst) || self.inner.cancel.is_cancelled() {
            return;
        }
        self.inner.state.send_replace(ConnectionState::Connecting);
        tokio::spawn(connection_loop(Arc::clone(&self.inner)));
        debug!(client = %self.inner.name, address = %self.inner.address, "client started");
    }

    /// Stop the connection task and fail any in-flight requests.
    pub fn stop(&self) {
        self.inner.cancel.cancel();
        if !self.inner.started.load(Ordering::SeqCst) {
            self.inner.state.send_replace(ConnectionState::Stopped);
        }
    }

    /// Suspend until the client is synced. Safe to call repeatedly.
    ///
    /// Fails only if the client stops before reaching sync.
    pub async fn until_synced(&self) -> Result<(), Error> {
        let mut rx = self.inner.state.subscribe();
        let state = rx
            .wait_for(|s| matches!(s, ConnectionState::Synced | ConnectionState::Stopped))
            .await
            .map_err(|_| Error::Stopped)?;
        match *state {
            ConnectionState::Synced => Ok(()),
            _ => Err(Error::Stopped),
        }
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.inner.state.borrow().clone()
    }

    /// Subscribe to connection state changes.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Subscribe to informs the server sends outside any request.
    pub fn subscribe_informs(&self) -> broadcast::Receiver<Arc<Message>> {
        self.inner.inform_tx.subscribe()
    }

    /// Whether the server advertised `name` in its request catalog.
    pub async fn has_request(&self, name: &str) -> bool {
        self.inner.catalog.read().await.contains(&wire_name(name))
    }

    /// Send one request and wait for its reply.
    ///
    /// `name` may use underscores; it is sent in dashed wire form. A
    /// timeout (`None` = the configured default) is reported as a `fail`
    /// reply rather than an error, and so is a connection that drops
    /// before the reply arrives.
    pub async fn request(
        &self,
        name: &str,
        arguments: &[String],
        timeout: Option<Duration>,
    ) -> Result<Reply, Error> {
        if self.inner.cancel.is_cancelled() {
            return Err(Error::Stopped);
        }

        let wire = wire_name(name);
        {
            let catalog = self.inner.catalog.read().await;
            if !catalog.is_empty() && !catalog.contains(&wire) {
                return Err(Error::UnknownRequest { name: wire });
            }
        }

        let timeout = timeout.unwrap_or(self.inner.config.request_timeout);
        self.inner.dispatch(&wire, arguments, timeout).await
    }
}

impl Drop for KatcpClient {
    fn drop(&mut self) {
        self.inner.cancel.cancel();
    }
}

// ── Request dispatch ─────────────────────────────────────────────────

impl ClientInner {
    async fn dispatch(
        &self,
        wire: &str,
        arguments: &[String],
        timeout: Duration,
    ) -> Result<Reply, Error> {
        let mid = self.next_mid.fetch_add(1, Ordering::Relaxed);
        let message = Message::request(wire, arguments.iter().cloned()).with_mid(mid);

        let sender = self
            .outbound
            .lock()
            .await
            .clone()
            .ok_or_else(|| Error::NotConnected {
                address: self.address.clone(),
            })?;

        let (reply_tx, reply_rx) = oneshot::channel();
        self.pending.lock().await.insert(
            mid,
            PendingRequest {
                informs: Vec::new(),
                reply_tx,
            },
        );

        trace!(%message, "sending request");
        if sender.send(message).await.is_err() {
            self.pending.lock().await.remove(&mid);
            return Err(Error::NotConnected {
                address: self.address.clone(),
            });
        }

        match tokio::time::timeout(timeout, reply_rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Ok(Reply::fail(wire, "Connection closed before reply")),
            Err(_) => {
                self.pending.lock().await.remove(&mid);
                warn!(request = wire, mid, ?timeout, "request timed out");
                Ok(Reply::fail(
                    wire,
                    format!("Timed out after {} seconds", timeout.as_secs_f64()),
                ))
            }
        }
    }

    /// Route one incoming line to its pending request or the inform channel.
    async fn handle_line(&self, line: &str) {
        if line.trim().is_empty() {
            return;
        }
        let message = match Message::parse(line) {
            Ok(m) => m,
            Err(e) => {
                debug!(error = %e, line, "ignoring unparseable line");
                return;
            }
        };

        match (message.kind, message.mid) {
            (MessageKind::Reply, Some(mid)) => {
                let Some(pending) = self.pending.lock().await.remove(&mid) else {
                    debug!(mid, name = %message.name, "reply for unknown or expired request");
                    return;
                };
                let reply = Reply {
                    message,
                    informs: pending.informs,
                };
                let _ = pending.reply_tx.send(reply);
            }
            (MessageKind::Inform, Some(mid)) => {
                if let Some(pending) = self.pending.lock().await.get_mut(&mid) {
                    pending.informs.push(message);
                }
            }
            (MessageKind::Inform, None) => {
                trace!(name = %message.name, "async inform");
                let _ = self.inform_tx.send(Arc::new(message));
            }
            _ => debug!(%message, "unexpected message without id"),
        }
    }

    async fn reset_connection(&self) {
        *self.outbound.lock().await = None;
        // Dropping the senders resolves each waiter with a closed-connection fail.
        self.pending.lock().await.clear();
    }
}

// ── Background connection loop ───────────────────────────────────────

/// Main loop: connect → handshake → read → on error, backoff → reconnect.
async fn connection_loop(inner: Arc<ClientInner>) {
    let mut attempt: u32 = 0;
    let reconnect = inner.config.reconnect.clone();

    loop {
        tokio::select! {
            biased;
            () = inner.cancel.cancelled() => break,
            result = run_connection(&inner) => {
                inner.reset_connection().await;
                match result {
                    // Clean close: the server went away on purpose, start over.
                    Ok(()) => {
                        info!(address = %inner.address, "connection closed, reconnecting");
                        attempt = 0;
                    }
                    Err(e) => {
                        warn!(error = %e, attempt, address = %inner.address, "connection error");

                        if let Some(max) = reconnect.max_retries {
                            if attempt >= max {
                                error!(max_retries = max, "reconnection limit reached, giving up");
                                break;
                            }
                        }
                    }
                }
            }
        }

        inner.state.send_replace(ConnectionState::Reconnecting { attempt });
        let delay = calculate_backoff(attempt, &reconnect);
        debug!(?delay, attempt, "waiting before reconnect");

        tokio::select! {
            biased;
            () = inner.cancel.cancelled() => break,
            () = tokio::time::sleep(delay) => {}
        }

        attempt = attempt.saturating_add(1);
    }

    inner.reset_connection().await;
    inner.state.send_replace(ConnectionState::Stopped);
    debug!(client = %inner.name, "connection loop exiting");
}

/// One connection lifetime: returns `Ok` when the server closes cleanly.
async fn run_connection(inner: &ClientInner) -> Result<(), Error> {
    debug!(address = %inner.address, "connecting");
    let stream = tokio::time::timeout(
        inner.config.connect_timeout,
        TcpStream::connect(inner.address.as_str()),
    )
    .await
    .map_err(|_| Error::ConnectTimeout {
        address: inner.address.clone(),
        timeout_secs: inner.config.connect_timeout.as_secs(),
    })??;
    stream.set_nodelay(true)?;

    let framed = Framed::new(
        stream,
        LinesCodec::new_with_max_length(inner.config.max_line_length),
    );
    let (mut sink, mut lines) = framed.split();

    let (out_tx, mut out_rx) = mpsc::channel::<Message>(OUTBOUND_CHANNEL_SIZE);
    *inner.outbound.lock().await = Some(out_tx);
    info!(address = %inner.address, "connected");

    let handshake = handshake(inner);
    tokio::pin!(handshake);
    let mut synced = false;

    loop {
        tokio::select! {
            biased;
            () = inner.cancel.cancelled() => return Ok(()),
            result = &mut handshake, if !synced => {
                result?;
                synced = true;
                inner.state.send_replace(ConnectionState::Synced);
                info!(address = %inner.address, "synced");
            }
            Some(message) = out_rx.recv() => {
                sink.send(message.to_string()).await?;
            }
            line = lines.next() => match line {
                Some(Ok(line)) => inner.handle_line(&line).await,
                Some(Err(e)) => return Err(e.into()),
                None => return Ok(()),
            },
        }
    }
}

/// Fetch the request catalog with `?help`.
async fn handshake(inner: &ClientInner) -> Result<(), Error> {
    let reply = inner
        .dispatch("help", &[], inner.config.request_timeout)
        .await?;
    if !reply.is_ok() {
        return Err(Error::Handshake {
            address: inner.address.clone(),
            message: reply.error_message().unwrap_or("no reason given").to_string(),
        });
    }

    let names: HashSet<String> = reply
        .informs
        .iter()
        .filter(|m| m.name == "help")
        .filter_map(|m| m.arguments.first().cloned())
        .collect();
    debug!(requests = names.len(), "request catalog received");
    *inner.catalog.write().await = names;
    Ok(())
}
