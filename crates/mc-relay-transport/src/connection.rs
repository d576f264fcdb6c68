//! The WebSocket connection: one I/O task behind a cloneable send handle.
//!
//! All socket I/O runs on a single spawned task. [`TransportHandle::send`]
//! only pushes into the shared [`Outbox`] and wakes that task; inbound frames
//! are handed to the [`MessageHandler`] from it. When the link drops the task
//! reconnects with [`Backoff`] until [`Transport::close`] is called.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::net::TcpStream;
use tokio::sync::{oneshot, watch, Notify};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::backoff::Backoff;
use crate::constants::*;
use crate::error::{ConnectError, SendError};
use crate::outbox::Outbox;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ─── Types ───────────────────────────────────────────────────────────────────

/// Lifecycle of the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    /// A handshake is in flight.
    Connecting,
    Connected,
    /// A close frame has been sent and the session is winding down.
    Closing,
}

/// What `send` does when the link cannot take a frame right away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Buffer while disconnected and evict the oldest frame when full.
    #[default]
    DropOldest,
    /// Refuse frames unless connected.
    DropWhenDisconnected,
}

#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub outbox_capacity: usize,
    pub overflow: OverflowPolicy,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            outbox_capacity: DEFAULT_OUTBOX_CAPACITY,
            overflow: OverflowPolicy::default(),
            backoff_base: BACKOFF_BASE,
            backoff_cap: BACKOFF_CAP,
        }
    }
}

/// One outbound WebSocket message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
}

impl Frame {
    pub fn len(&self) -> usize {
        match self {
            Frame::Text(text) => text.len(),
            Frame::Binary(data) => data.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn into_message(self) -> Message {
        match self {
            Frame::Text(text) => Message::Text(text),
            Frame::Binary(data) => Message::Binary(data),
        }
    }
}

impl From<String> for Frame {
    fn from(text: String) -> Self {
        Frame::Text(text)
    }
}

impl From<&str> for Frame {
    fn from(text: &str) -> Self {
        Frame::Text(text.to_owned())
    }
}

impl From<Vec<u8>> for Frame {
    fn from(data: Vec<u8>) -> Self {
        Frame::Binary(data)
    }
}

/// Callback for inbound frames. Runs on the I/O task, once per frame.
pub type MessageHandler = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// Anything that accepts outbound frames without blocking.
pub trait FrameSink: Send + Sync {
    fn send_frame(&self, frame: Frame) -> Result<(), SendError>;
}

// ─── Stats ───────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct TransportStats {
    connect_attempts: AtomicU64,
    connections: AtomicU64,
    frames_sent: AtomicU64,
    frames_received: AtomicU64,
    frames_dropped: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub connect_attempts: u64,
    pub connections: u64,
    pub frames_sent: u64,
    pub frames_received: u64,
    pub frames_dropped: u64,
}

impl TransportStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            connect_attempts: self.connect_attempts.load(Ordering::Relaxed),
            connections: self.connections.load(Ordering::Relaxed),
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
        }
    }

    fn bump(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }
}

// ─── Shared state ────────────────────────────────────────────────────────────

struct Shared {
    config: TransportConfig,
    outbox: Mutex<Outbox<Frame>>,
    wake: Notify,
    state: watch::Sender<ConnectionState>,
    stats: TransportStats,
    cancel: CancellationToken,
    closed: AtomicBool,
}

impl Shared {
    fn outbox(&self) -> MutexGuard<'_, Outbox<Frame>> {
        self.outbox.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn pop_frame(&self) -> Option<Frame> {
        self.outbox().pop()
    }

    fn requeue(&self, frame: Frame) {
        if self.outbox().requeue(frame).is_some() {
            TransportStats::bump(&self.stats.frames_dropped, 1);
        }
    }

    fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    fn set_state(&self, next: ConnectionState) {
        self.state.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            debug!("Connection state {current:?} -> {next:?}");
            *current = next;
            true
        });
    }
}

/// Cloneable, non-blocking view of a [`Transport`].
#[derive(Clone)]
pub struct TransportHandle {
    shared: Arc<Shared>,
}

impl TransportHandle {
    /// Queue a frame for the I/O task. Never blocks on the network.
    pub fn send(&self, frame: impl Into<Frame>) -> Result<(), SendError> {
        let shared = &self.shared;
        if shared.closed.load(Ordering::Acquire) {
            return Err(SendError::Closed);
        }
        if shared.config.overflow == OverflowPolicy::DropWhenDisconnected
            && shared.state() != ConnectionState::Connected
        {
            TransportStats::bump(&shared.stats.frames_dropped, 1);
            return Err(SendError::NotConnected);
        }

        let evicted = shared.outbox().push(frame.into());
        if evicted.is_some() {
            TransportStats::bump(&shared.stats.frames_dropped, 1);
            trace!("Outbox full, dropped oldest frame");
        }
        shared.wake.notify_one();
        Ok(())
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    /// Frames waiting in the outbox.
    pub fn queued(&self) -> usize {
        self.shared.outbox().len()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }
}

impl FrameSink for TransportHandle {
    fn send_frame(&self, frame: Frame) -> Result<(), SendError> {
        self.send(frame)
    }
}

impl std::fmt::Debug for TransportHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportHandle")
            .field("state", &self.state())
            .field("queued", &self.queued())
            .finish()
    }
}

// ─── Transport ───────────────────────────────────────────────────────────────

/// Owner of the I/O task. Dropping it stops the task.
pub struct Transport {
    shared: Arc<Shared>,
    on_message: MessageHandler,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Transport {
    pub fn new(config: TransportConfig, on_message: impl Fn(&[u8]) + Send + Sync + 'static) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            shared: Arc::new(Shared {
                outbox: Mutex::new(Outbox::new(config.outbox_capacity)),
                config,
                wake: Notify::new(),
                state,
                stats: TransportStats::default(),
                cancel: CancellationToken::new(),
                closed: AtomicBool::new(false),
            }),
            on_message: Arc::new(on_message),
            worker: Mutex::new(None),
        }
    }

    pub fn handle(&self) -> TransportHandle {
        TransportHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    /// Start the I/O task and wait for its first handshake.
    ///
    /// A failed first handshake is reported, but the task keeps retrying in
    /// the background.
    pub async fn connect(&self, url: &str) -> Result<(), ConnectError> {
        if self.shared.closed.load(Ordering::Acquire) {
            return Err(ConnectError::Closed);
        }
        let url = parse_ws_url(url)?;

        let first_attempt = {
            let mut worker = self.worker();
            if worker.is_some() {
                return Err(ConnectError::AlreadyStarted);
            }
            info!("Connecting to {url}");
            let (tx, rx) = oneshot::channel();
            let task = Worker {
                shared: Arc::clone(&self.shared),
                backoff: Backoff::new(self.shared.config.backoff_base, self.shared.config.backoff_cap),
                url,
                on_message: Arc::clone(&self.on_message),
                rng: StdRng::from_entropy(),
            };
            *worker = Some(tokio::spawn(task.run(tx)));
            rx
        };

        match first_attempt.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(reason)) => Err(ConnectError::Handshake(reason)),
            Err(_) => Err(ConnectError::Closed),
        }
    }

    /// Close the session and stop reconnecting. Frames still queued are
    /// discarded.
    pub async fn close(&self) {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.shared.cancel.cancel();

        let worker = self.worker().take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                warn!("Transport worker failed: {e}");
            }
        }

        let discarded = self.shared.outbox().clear();
        if discarded > 0 {
            TransportStats::bump(&self.shared.stats.frames_dropped, discarded as u64);
            debug!("Discarded {discarded} queued frames on close");
        }
        self.shared.set_state(ConnectionState::Disconnected);
        info!("Transport closed");
    }

    fn worker(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.worker.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.shared.closed.store(true, Ordering::Release);
        self.shared.cancel.cancel();
    }
}

/// Parse and check a `ws://` or `wss://` URL.
pub fn parse_ws_url(raw: &str) -> Result<Url, ConnectError> {
    let url =
        Url::parse(raw.trim()).map_err(|e| ConnectError::InvalidUrl(format!("{raw}: {e}")))?;
    match url.scheme() {
        "ws" | "wss" => Ok(url),
        other => Err(ConnectError::UnsupportedScheme(other.to_owned())),
    }
}

// ─── I/O task ────────────────────────────────────────────────────────────────

enum SessionEnd {
    Cancelled,
    Lost(String),
}

struct Worker {
    shared: Arc<Shared>,
    url: Url,
    on_message: MessageHandler,
    backoff: Backoff,
    rng: StdRng,
}

impl Worker {
    async fn run(mut self, first_attempt: oneshot::Sender<Result<(), String>>) {
        let mut first_attempt = Some(first_attempt);

        while !self.shared.cancel.is_cancelled() {
            self.shared.set_state(ConnectionState::Connecting);
            TransportStats::bump(&self.shared.stats.connect_attempts, 1);

            let attempt = tokio::select! {
                _ = self.shared.cancel.cancelled() => break,
                result = tokio_tungstenite::connect_async(self.url.as_str()) => result,
            };

            match attempt {
                Ok((ws, _)) => {
                    info!("Connected to {}", self.url);
                    self.backoff.reset();
                    TransportStats::bump(&self.shared.stats.connections, 1);
                    self.shared.set_state(ConnectionState::Connected);
                    if let Some(tx) = first_attempt.take() {
                        let _ = tx.send(Ok(()));
                    }
                    match self.session(ws).await {
                        SessionEnd::Cancelled => break,
                        SessionEnd::Lost(reason) => {
                            warn!("Connection to {} lost: {reason}", self.url)
                        }
                    }
                }
                Err(e) => {
                    warn!("Failed to connect to {}: {e}", self.url);
                    if let Some(tx) = first_attempt.take() {
                        let _ = tx.send(Err(e.to_string()));
                    }
                }
            }

            self.shared.set_state(ConnectionState::Disconnected);
            let delay = self.backoff.next_delay(&mut self.rng);
            info!(
                "Reconnecting to {} in {delay:?} (attempt {})",
                self.url,
                self.backoff.attempt()
            );
            tokio::select! {
                _ = self.shared.cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.shared.set_state(ConnectionState::Disconnected);
        debug!("Transport worker for {} stopped", self.url);
    }

    async fn session(&self, ws: WsStream) -> SessionEnd {
        let (mut sink, mut stream) = ws.split();

        loop {
            // Flush everything queued, including frames buffered while down.
            while let Some(frame) = self.shared.pop_frame() {
                let len = frame.len();
                let result = tokio::select! {
                    _ = self.shared.cancel.cancelled() => {
                        self.shared.requeue(frame);
                        return self.close_session(&mut sink).await;
                    }
                    result = sink.send(frame.clone().into_message()) => result,
                };
                if let Err(e) = result {
                    self.shared.requeue(frame);
                    return SessionEnd::Lost(e.to_string());
                }
                TransportStats::bump(&self.shared.stats.frames_sent, 1);
                trace!("Sent {len} byte frame");
            }

            tokio::select! {
                _ = self.shared.cancel.cancelled() => {
                    return self.close_session(&mut sink).await;
                }
                _ = self.shared.wake.notified() => {}
                incoming = stream.next() => match incoming {
                    Some(Ok(Message::Text(text))) => self.deliver(text.as_bytes()),
                    Some(Ok(Message::Binary(data))) => self.deliver(&data),
                    Some(Ok(Message::Close(frame))) => {
                        let reason = match frame {
                            Some(frame) => format!("closed by peer ({} {})", frame.code, frame.reason),
                            None => "closed by peer".to_owned(),
                        };
                        return SessionEnd::Lost(reason);
                    }
                    // Ping and pong are answered by the WebSocket layer.
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return SessionEnd::Lost(e.to_string()),
                    None => return SessionEnd::Lost("stream ended".to_owned()),
                },
            }
        }
    }

    async fn close_session(&self, sink: &mut SplitSink<WsStream, Message>) -> SessionEnd {
        self.shared.set_state(ConnectionState::Closing);
        match tokio::time::timeout(CLOSE_TIMEOUT, sink.close()).await {
            Ok(Ok(())) => debug!("Sent close frame to {}", self.url),
            Ok(Err(e)) => debug!("Close handshake with {} failed: {e}", self.url),
            Err(_) => debug!("Close handshake with {} timed out", self.url),
        }
        SessionEnd::Cancelled
    }

    fn deliver(&self, payload: &[u8]) {
        TransportStats::bump(&self.shared.stats.frames_received, 1);
        trace!("Received {} byte frame", payload.len());
        (self.on_message)(payload);
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
