//! Per-connection state for the upstream market data feed
//!
//! A [`FeedConnection`] is the record the manager keeps for one named
//! WebSocket endpoint: lifecycle flags, message metrics, the subscription
//! registry replayed on every reconnect, and the write half of the socket.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use futures_util::stream::SplitSink;
use futures_util::SinkExt;
use parking_lot::RwLock;
use serde::Serialize;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use desk_core::{DeskError, DeskResult};

/// Reconnect delay base
const RECONNECT_DELAY_BASE: Duration = Duration::from_millis(1000);

/// Max reconnect attempts
const MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Upper bound on a single backoff delay
const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(30);

/// Heartbeat ping cadence
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(25);

/// Stale threshold - if no message for this duration, consider connection stale
const STALE_THRESHOLD_SECS: u64 = 60;

/// Write half of an upstream socket
pub(crate) type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Tuning options for one connection
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// Reconnect attempts consumed before the driver gives up
    pub max_reconnect_attempts: u32,
    /// Base delay for exponential backoff
    pub base_reconnect_delay: Duration,
    /// Cap on a single backoff delay, so a long outage never waits unbounded
    pub max_reconnect_delay: Duration,
    /// How often to ping the provider while the socket is open
    pub heartbeat_interval: Duration,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            max_reconnect_attempts: MAX_RECONNECT_ATTEMPTS,
            base_reconnect_delay: RECONNECT_DELAY_BASE,
            max_reconnect_delay: MAX_RECONNECT_DELAY,
            heartbeat_interval: HEARTBEAT_INTERVAL,
        }
    }
}

/// Backoff delay before reconnect attempt `attempt` (1-based)
///
/// Doubles from the base on each attempt: 1000ms, 2000ms, 4000ms, ... for the
/// default base, capped at `max_reconnect_delay`.
pub fn reconnect_delay(attempt: u32, options: &ConnectOptions) -> Duration {
    let exponent = attempt.saturating_sub(1).min(31);
    let delay = options
        .base_reconnect_delay
        .saturating_mul(2u32.saturating_pow(exponent));
    delay.min(options.max_reconnect_delay)
}

/// Point-in-time lifecycle snapshot for a connection
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionStatus {
    pub name: String,
    pub connected: bool,
    pub connecting: bool,
    pub reconnect_attempts: u32,
}

/// Health snapshot for a connection
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionHealth {
    pub name: String,
    pub connected: bool,
    pub last_message_time: Option<DateTime<Utc>>,
    pub message_count: u64,
    pub is_stale: bool,
}

/// One named upstream connection
///
/// Owned by the manager and shared with its driver task through an `Arc`.
/// The subscription registry survives every close; the driver replays it in
/// full after each successful (re)open.
pub struct FeedConnection {
    /// Connection name, unique within a manager
    pub name: String,
    /// WebSocket endpoint
    pub url: String,
    /// Tuning options
    pub options: ConnectOptions,
    /// Reconnects consumed since the last successful open
    reconnect_attempts: AtomicU32,
    /// A dial is in progress
    connecting: AtomicBool,
    /// The socket is open
    connected: AtomicBool,
    /// Total text frames received
    message_count: AtomicU64,
    /// Epoch millis of the most recent text frame
    last_message_epoch_ms: AtomicU64,
    /// Topics replayed on every (re)open; close paths never clear this
    subscriptions: RwLock<BTreeSet<String>>,
    /// Write half of the socket; `None` whenever not open
    sink: Mutex<Option<WsSink>>,
    /// Driver task handle, present once spawned
    driver: RwLock<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for FeedConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedConnection")
            .field("name", &self.name)
            .field("url", &self.url)
            .field("connected", &self.is_connected())
            .field("connecting", &self.is_connecting())
            .field("reconnect_attempts", &self.reconnect_attempts())
            .finish()
    }
}

impl FeedConnection {
    /// Create a disconnected record
    pub(crate) fn new(name: impl Into<String>, url: impl Into<String>, options: ConnectOptions) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            options,
            reconnect_attempts: AtomicU32::new(0),
            connecting: AtomicBool::new(false),
            connected: AtomicBool::new(false),
            message_count: AtomicU64::new(0),
            last_message_epoch_ms: AtomicU64::new(0),
            subscriptions: RwLock::new(BTreeSet::new()),
            sink: Mutex::new(None),
            driver: RwLock::new(None),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn is_connecting(&self) -> bool {
        self.connecting.load(Ordering::SeqCst)
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts.load(Ordering::SeqCst)
    }

    /// Registered topics, sorted
    pub fn topics(&self) -> Vec<String> {
        self.subscriptions.read().iter().cloned().collect()
    }

    /// Add a topic to the registry; returns false when already present
    pub(crate) fn register_topic(&self, topic: &str) -> bool {
        self.subscriptions.write().insert(topic.to_string())
    }

    /// Remove a topic from the registry; returns false when absent
    pub(crate) fn unregister_topic(&self, topic: &str) -> bool {
        self.subscriptions.write().remove(topic)
    }

    /// Claim the connecting flag; returns false when a dial is already active
    pub(crate) fn begin_connecting(&self) -> bool {
        self.connecting
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub(crate) fn mark_connecting(&self) {
        self.connecting.store(true, Ordering::SeqCst);
    }

    pub(crate) fn mark_connected(&self) {
        self.connected.store(true, Ordering::SeqCst);
        self.connecting.store(false, Ordering::SeqCst);
    }

    pub(crate) fn mark_disconnected(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.connecting.store(false, Ordering::SeqCst);
    }

    pub(crate) fn reset_reconnect_attempts(&self) {
        self.reconnect_attempts.store(0, Ordering::SeqCst);
    }

    /// Consume one reconnect attempt, returning the attempt number (1-based)
    pub(crate) fn begin_reconnect(&self) -> u32 {
        self.reconnect_attempts.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub(crate) fn record_message(&self) {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        self.last_message_epoch_ms.store(now, Ordering::SeqCst);
        self.message_count.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) async fn store_sink(&self, sink: WsSink) {
        *self.sink.lock().await = Some(sink);
    }

    /// Drop the write half, closing it cleanly when still open
    pub(crate) async fn close_sink(&self) {
        if let Some(mut sink) = self.sink.lock().await.take() {
            let _ = sink.close().await;
        }
    }

    /// Write a frame to the socket, failing when not open
    ///
    /// There is no send queue; a frame either goes out on the live sink or
    /// the caller gets an error.
    pub(crate) async fn send_message(&self, message: Message) -> DeskResult<()> {
        let mut guard = self.sink.lock().await;
        match guard.as_mut() {
            Some(sink) => sink
                .send(message)
                .await
                .map_err(|e| DeskError::transport(&self.name, e.to_string())),
            None => Err(DeskError::not_connected(&self.name)),
        }
    }

    pub(crate) async fn send_text(&self, text: String) -> DeskResult<()> {
        self.send_message(Message::Text(text.into())).await
    }

    pub(crate) fn set_driver(&self, handle: JoinHandle<()>) {
        *self.driver.write() = Some(handle);
    }

    /// Whether the driver task has run to completion (or never started)
    pub(crate) fn driver_finished(&self) -> bool {
        self.driver
            .read()
            .as_ref()
            .map(|handle| handle.is_finished())
            .unwrap_or(true)
    }

    pub(crate) fn abort_driver(&self) {
        if let Some(handle) = self.driver.write().take() {
            handle.abort();
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        ConnectionStatus {
            name: self.name.clone(),
            connected: self.is_connected(),
            connecting: self.is_connecting(),
            reconnect_attempts: self.reconnect_attempts(),
        }
    }

    pub fn health(&self) -> ConnectionHealth {
        let connected = self.is_connected();
        let last_ms = self.last_message_epoch_ms.load(Ordering::SeqCst);
        let message_count = self.message_count.load(Ordering::SeqCst);

        let last_message_time = if last_ms > 0 {
            DateTime::from_timestamp(
                (last_ms / 1000) as i64,
                ((last_ms % 1000) * 1_000_000) as u32,
            )
        } else {
            None
        };

        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;

        let is_stale = if connected && last_ms > 0 {
            (now_ms - last_ms) > (STALE_THRESHOLD_SECS * 1000)
        } else {
            !connected
        };

        ConnectionHealth {
            name: self.name.clone(),
            connected,
            last_message_time,
            message_count,
            is_stale,
        }
    }
}
