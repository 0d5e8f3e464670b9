//! Named connection manager with typed message dispatch
//!
//! The [`FeedManager`] owns every upstream connection, spawns one driver task
//! per socket, classifies inbound frames by their `type` field, and fans them
//! out to registered handlers. Handlers and the global error handler live in
//! a single dispatch table; `destroy` closes that table before tearing down
//! the sockets, so no callback fires after it returns.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use dashmap::DashMap;
use futures_util::StreamExt;
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use tokio::time::interval;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};
use url::Url;

use desk_core::feed::message_type;
use desk_core::{ControlMessage, DeskError, DeskResult};

use crate::connection::{
    reconnect_delay, ConnectOptions, ConnectionHealth, ConnectionStatus, FeedConnection,
};

/// Default connection name used when callers do not address one explicitly
pub const MARKET_DATA_CONNECTION: &str = "market-data";

/// Handler invoked with the raw JSON payload of a classified frame
pub type MessageHandler = Box<dyn Fn(Value) + Send + Sync>;

/// Handler invoked with transport failures and reconnect exhaustion
pub type ErrorHandler = Box<dyn Fn(DeskError) + Send + Sync>;

/// Handler registry shared between the manager and its driver tasks
///
/// Dispatch runs under the read lock; registration and `destroy` take the
/// write lock and so must not run inside a handler. `destroy` marks the
/// table closed, so it cannot return while any handler is mid-call and
/// nothing fires afterwards.
#[derive(Default)]
struct DispatchTable {
    closed: bool,
    handlers: HashMap<String, MessageHandler>,
    error_handler: Option<ErrorHandler>,
}

/// Manages named upstream connections and message fan-out
pub struct FeedManager {
    connections: DashMap<String, Arc<FeedConnection>>,
    dispatch: Arc<RwLock<DispatchTable>>,
}

impl std::fmt::Debug for FeedManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let table = self.dispatch.read();
        f.debug_struct("FeedManager")
            .field("connections", &self.connections.len())
            .field("handlers", &table.handlers.len())
            .field("closed", &table.closed)
            .finish()
    }
}

impl Default for FeedManager {
    fn default() -> Self {
        Self::new()
    }
}

impl FeedManager {
    /// Create a manager with no connections
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            dispatch: Arc::new(RwLock::new(DispatchTable::default())),
        }
    }

    /// Register a named connection and start its driver
    ///
    /// Calling again with a name that already exists reuses the existing
    /// record; after the driver has given up reconnecting this is how a
    /// caller resumes, with one fresh dial.
    pub fn connect(&self, name: &str, url: &str, options: ConnectOptions) -> DeskResult<()> {
        Url::parse(url)
            .map_err(|e| DeskError::internal(format!("invalid endpoint '{}': {}", url, e)))?;

        if self.connections.contains_key(name) {
            debug!("[Feed:{}] Already registered, reusing record", name);
        } else {
            self.connections.insert(
                name.to_string(),
                Arc::new(FeedConnection::new(name, url, options)),
            );
        }

        self.open_connection(name);
        Ok(())
    }

    /// Spawn a driver for a registered connection if none is active
    ///
    /// No-op when the record is unknown, the socket is open, a dial is in
    /// progress, or the previous driver task is still running.
    fn open_connection(&self, name: &str) {
        let Some(entry) = self.connections.get(name) else {
            debug!("[Feed:{}] Open requested for unknown connection", name);
            return;
        };
        let connection = Arc::clone(entry.value());
        drop(entry);

        if connection.is_connected() || !connection.driver_finished() {
            debug!("[Feed:{}] Driver already active", name);
            return;
        }
        if !connection.begin_connecting() {
            debug!("[Feed:{}] Dial already in progress", name);
            return;
        }

        let dispatch = Arc::clone(&self.dispatch);
        let driver = {
            let connection = Arc::clone(&connection);
            tokio::spawn(async move {
                Self::connection_loop(connection, dispatch).await;
            })
        };
        connection.set_driver(driver);
    }

    /// Main connection loop with reconnection logic
    async fn connection_loop(connection: Arc<FeedConnection>, dispatch: Arc<RwLock<DispatchTable>>) {
        loop {
            connection.mark_connecting();
            info!("[Feed:{}] Connecting to {}", connection.name, connection.url);

            match connect_async(connection.url.as_str()).await {
                Ok((ws_stream, _)) => {
                    info!("[Feed:{}] Connected", connection.name);
                    connection.reset_reconnect_attempts();

                    let (write, mut read) = ws_stream.split();
                    connection.store_sink(write).await;
                    connection.mark_connected();

                    // Replay the full registry so streams resume after a drop
                    for topic in connection.topics() {
                        let frame = ControlMessage::Subscribe {
                            symbol: topic.clone(),
                        };
                        match serde_json::to_string(&frame) {
                            Ok(json) => {
                                if let Err(e) = connection.send_text(json).await {
                                    warn!(
                                        "[Feed:{}] Failed to replay subscription {}: {}",
                                        connection.name, topic, e
                                    );
                                }
                            }
                            Err(e) => warn!(
                                "[Feed:{}] Failed to encode subscription {}: {}",
                                connection.name, topic, e
                            ),
                        }
                    }

                    // Create heartbeat interval
                    let mut heartbeat = interval(connection.options.heartbeat_interval);

                    loop {
                        tokio::select! {
                            // Handle incoming messages
                            msg = read.next() => {
                                match msg {
                                    Some(Ok(Message::Text(text))) => {
                                        connection.record_message();
                                        Self::dispatch_frame(&connection.name, &text, &dispatch);
                                    }
                                    Some(Ok(Message::Ping(data))) => {
                                        // Respond to ping
                                        if let Err(e) = connection.send_message(Message::Pong(data)).await {
                                            warn!("[Feed:{}] Failed to send pong: {}", connection.name, e);
                                            break;
                                        }
                                    }
                                    Some(Ok(Message::Close(_))) => {
                                        info!("[Feed:{}] Connection closed by server", connection.name);
                                        break;
                                    }
                                    Some(Err(e)) => {
                                        error!("[Feed:{}] Error: {}", connection.name, e);
                                        Self::emit_error(
                                            &dispatch,
                                            DeskError::transport(&connection.name, e.to_string()),
                                        );
                                        break;
                                    }
                                    None => {
                                        info!("[Feed:{}] Stream ended", connection.name);
                                        break;
                                    }
                                    _ => {}
                                }
                            }

                            // Send periodic pings to keep the connection alive
                            _ = heartbeat.tick() => {
                                if let Err(e) = connection.send_message(Message::Ping(Vec::new().into())).await {
                                    warn!("[Feed:{}] Failed to send ping: {}", connection.name, e);
                                    break;
                                }
                            }
                        }
                    }

                    connection.close_sink().await;
                    connection.mark_disconnected();
                }
                Err(e) => {
                    error!("[Feed:{}] Connection failed: {}", connection.name, e);
                    connection.mark_disconnected();
                    Self::emit_error(
                        &dispatch,
                        DeskError::transport(&connection.name, e.to_string()),
                    );
                }
            }

            // Reconnection logic
            let attempts = connection.reconnect_attempts();
            if attempts >= connection.options.max_reconnect_attempts {
                error!("[Feed:{}] Max reconnect attempts reached", connection.name);
                Self::emit_error(
                    &dispatch,
                    DeskError::reconnect_exhausted(&connection.name, attempts),
                );
                break;
            }

            let attempt = connection.begin_reconnect();
            let delay = reconnect_delay(attempt, &connection.options);
            info!(
                "[Feed:{}] Reconnecting in {:?} (attempt {})",
                connection.name, delay, attempt
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// Classify one inbound text frame and invoke its handler
    ///
    /// Malformed JSON and frames without a string `type` are dropped with a
    /// log; types nobody registered for are dropped silently. A panicking
    /// handler is contained so the driver survives.
    fn dispatch_frame(name: &str, text: &str, dispatch: &RwLock<DispatchTable>) {
        let value: Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(e) => {
                warn!("[Feed:{}] Dropping malformed frame: {}", name, e);
                return;
            }
        };
        let Some(kind) = message_type(&value).map(str::to_string) else {
            debug!("[Feed:{}] Dropping frame without type field", name);
            return;
        };

        let table = dispatch.read();
        if table.closed {
            return;
        }
        if let Some(handler) = table.handlers.get(&kind) {
            if catch_unwind(AssertUnwindSafe(|| handler(value))).is_err() {
                warn!("[Feed:{}] Handler for '{}' panicked", name, kind);
            }
        }
    }

    /// Route an error to the global handler, or log it when none is set
    fn emit_error(dispatch: &RwLock<DispatchTable>, error: DeskError) {
        let table = dispatch.read();
        if table.closed {
            return;
        }
        match table.error_handler.as_ref() {
            Some(handler) => {
                if catch_unwind(AssertUnwindSafe(|| handler(error))).is_err() {
                    warn!("[Feed] Error handler panicked");
                }
            }
            None => warn!("[Feed] Unhandled feed error: {}", error),
        }
    }

    /// Register the handler for one message type; the last registration wins
    ///
    /// Takes the dispatch write lock; must not be called from inside a
    /// handler, which runs under the read lock.
    pub fn on_message(&self, kind: &str, handler: impl Fn(Value) + Send + Sync + 'static) {
        let mut table = self.dispatch.write();
        if table.closed {
            warn!("[Feed] Handler registration after destroy ignored");
            return;
        }
        if table
            .handlers
            .insert(kind.to_string(), Box::new(handler))
            .is_some()
        {
            debug!("[Feed] Replaced handler for '{}'", kind);
        }
    }

    /// Register the global error handler, replacing any previous one
    ///
    /// Same restriction as [`FeedManager::on_message`]: must not be called
    /// from inside a handler.
    pub fn on_error(&self, handler: impl Fn(DeskError) + Send + Sync + 'static) {
        let mut table = self.dispatch.write();
        if table.closed {
            warn!("[Feed] Error handler registration after destroy ignored");
            return;
        }
        table.error_handler = Some(Box::new(handler));
    }

    /// Add a topic to a connection's registry and subscribe upstream
    ///
    /// The registry is updated whether or not the socket is open; the control
    /// frame goes out only on a live connection, and the replay on reconnect
    /// covers the rest.
    pub async fn subscribe(&self, topic: &str, connection: Option<&str>) -> DeskResult<()> {
        let name = connection.unwrap_or(MARKET_DATA_CONNECTION);
        let connection = self.lookup(name)?;

        if connection.register_topic(topic) {
            debug!("[Feed:{}] Registered topic {}", name, topic);
        }

        if connection.is_connected() {
            let frame = ControlMessage::Subscribe {
                symbol: topic.to_string(),
            };
            let json = serde_json::to_string(&frame)
                .map_err(|e| DeskError::internal(e.to_string()))?;
            connection.send_text(json).await?;
        }
        Ok(())
    }

    /// Remove a topic from a connection's registry and unsubscribe upstream
    pub async fn unsubscribe(&self, topic: &str, connection: Option<&str>) -> DeskResult<()> {
        let name = connection.unwrap_or(MARKET_DATA_CONNECTION);
        let connection = self.lookup(name)?;

        if connection.unregister_topic(topic) {
            debug!("[Feed:{}] Unregistered topic {}", name, topic);
        }

        if connection.is_connected() {
            let frame = ControlMessage::Unsubscribe {
                symbol: topic.to_string(),
            };
            let json = serde_json::to_string(&frame)
                .map_err(|e| DeskError::internal(e.to_string()))?;
            connection.send_text(json).await?;
        }
        Ok(())
    }

    /// Serialize a payload and write it to a named connection
    ///
    /// Fails when the connection is unknown or not currently open; nothing is
    /// queued for later.
    pub async fn send<T: Serialize>(&self, name: &str, payload: &T) -> DeskResult<()> {
        let connection = self.lookup(name)?;
        let json =
            serde_json::to_string(payload).map_err(|e| DeskError::internal(e.to_string()))?;
        connection.send_text(json).await
    }

    /// Tear down one connection and forget it
    pub async fn disconnect(&self, name: &str) -> DeskResult<()> {
        let Some((_, connection)) = self.connections.remove(name) else {
            return Err(DeskError::unknown_connection(name));
        };
        connection.abort_driver();
        connection.close_sink().await;
        connection.mark_disconnected();
        info!("[Feed:{}] Disconnected", name);
        Ok(())
    }

    /// Point-in-time lifecycle snapshot for one connection
    pub fn connection_state(&self, name: &str) -> Option<ConnectionStatus> {
        self.connections.get(name).map(|entry| entry.status())
    }

    /// Lifecycle snapshots for every connection, sorted by name
    pub fn connection_states(&self) -> Vec<ConnectionStatus> {
        let mut states: Vec<ConnectionStatus> = self
            .connections
            .iter()
            .map(|entry| entry.status())
            .collect();
        states.sort_by(|a, b| a.name.cmp(&b.name));
        states
    }

    /// Health snapshots for every connection, sorted by name
    pub fn health(&self) -> Vec<ConnectionHealth> {
        let mut health: Vec<ConnectionHealth> = self
            .connections
            .iter()
            .map(|entry| entry.health())
            .collect();
        health.sort_by(|a, b| a.name.cmp(&b.name));
        health
    }

    /// Registered topics for one connection, sorted
    pub fn topics(&self, name: &str) -> Option<Vec<String>> {
        self.connections.get(name).map(|entry| entry.topics())
    }

    /// Close the dispatch table and tear down every connection
    ///
    /// Waits out any in-flight handler call, then aborts drivers and closes
    /// sinks. No message or error handler fires after this returns.
    /// Idempotent. Must not be called from inside a handler.
    pub async fn destroy(&self) {
        {
            let mut table = self.dispatch.write();
            if table.closed {
                debug!("[Feed] Manager already destroyed");
            }
            table.closed = true;
            table.handlers.clear();
            table.error_handler = None;
        }

        let connections: Vec<Arc<FeedConnection>> = self
            .connections
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        self.connections.clear();

        for connection in connections {
            connection.abort_driver();
            connection.close_sink().await;
            connection.mark_disconnected();
        }
        info!("[Feed] Manager destroyed");
    }

    fn lookup(&self, name: &str) -> DeskResult<Arc<FeedConnection>> {
        self.connections
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| DeskError::unknown_connection(name))
    }
}
