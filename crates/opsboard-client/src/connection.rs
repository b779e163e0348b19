//! Live-update socket manager.
//!
//! Maintains one logical connection to the opsboard server. A driver task
//! owns the transport: it connects, runs the session (inbound dispatch,
//! outbound queue, heartbeat), and on close schedules a reconnect after
//! `reconnect_interval_ms * 2^attempt` until `max_reconnect_attempts`
//! failed cycles leave the manager in terminal `Disconnected`.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use opsboard_core::{ClientMessage, Envelope, EventTag, ServerMessage};
use opsboard_telemetry::Metrics;
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::http::Uri;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::heartbeat::Heartbeat;
use crate::subscription::{SubscriberRegistry, Subscription};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observable status of the socket manager.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    /// Last transport error. `None` when no live backend is configured.
    pub error: Option<String>,
    /// Reconnect cycles scheduled since the last stable session.
    pub reconnect_attempts: u32,
    /// Delay of the pending reconnect, if one is scheduled.
    pub next_retry_ms: Option<u64>,
    /// Reconnect attempts are exhausted; only `connect()` leaves this state.
    pub terminal: bool,
}

/// Validate a live-update URL. Only `ws://` and `wss://` with a host pass.
pub fn validate_url(raw: &str) -> ClientResult<String> {
    let trimmed = raw.trim();
    let uri: Uri = trimmed
        .parse()
        .map_err(|_| ClientError::InvalidUrl(raw.to_string()))?;

    match (uri.scheme_str(), uri.host()) {
        (Some("ws" | "wss"), Some(host)) if !host.is_empty() => Ok(trimmed.to_string()),
        _ => Err(ClientError::InvalidUrl(raw.to_string())),
    }
}

/// Delay before reconnect cycle `attempt` (0-based).
pub fn backoff_delay(base_ms: u64, attempt: u32) -> Duration {
    let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
    Duration::from_millis(base_ms.saturating_mul(factor))
}

struct Driver {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

struct Inner {
    config: ClientConfig,
    registry: SubscriberRegistry,
    status_tx: watch::Sender<ConnectionStatus>,
    driver: Mutex<Option<Driver>>,
    /// Present only while a session is open.
    outbound: Mutex<Option<mpsc::Sender<String>>>,
}

impl Inner {
    fn update(&self, f: impl FnOnce(&mut ConnectionStatus)) {
        let mut changed = None;
        self.status_tx.send_modify(|status| {
            let before = status.state;
            f(status);
            if status.state != before {
                changed = Some(status.state);
            }
        });
        if let Some(state) = changed {
            Metrics::client_state_set(state.as_str());
            debug!(state = %state, "Connection state changed");
        }
    }

    fn set_state(&self, state: ConnectionState) {
        self.update(|s| s.state = state);
    }
}

/// Reconnecting live-update client.
///
/// Cheap to clone; all clones drive the same connection. `connect()` spawns
/// the driver on the current tokio runtime and `disconnect()` stops it.
#[derive(Clone)]
pub struct SocketManager {
    inner: Arc<Inner>,
}

impl SocketManager {
    pub fn new(config: ClientConfig) -> Self {
        Self::with_registry(config, SubscriberRegistry::new())
    }

    pub fn with_registry(config: ClientConfig, registry: SubscriberRegistry) -> Self {
        let (status_tx, _) = watch::channel(ConnectionStatus::default());
        Self {
            inner: Arc::new(Inner {
                config,
                registry,
                status_tx,
                driver: Mutex::new(None),
                outbound: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn status(&self) -> ConnectionStatus {
        self.inner.status_tx.borrow().clone()
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.status_tx.borrow().state
    }

    /// Receiver notified on every status change.
    pub fn watch(&self) -> watch::Receiver<ConnectionStatus> {
        self.inner.status_tx.subscribe()
    }

    pub fn registry(&self) -> &SubscriberRegistry {
        &self.inner.registry
    }

    pub fn subscribe<F>(&self, tag: EventTag, callback: F) -> Subscription
    where
        F: Fn(&ServerMessage) + Send + Sync + 'static,
    {
        self.inner.registry.subscribe(tag, callback)
    }

    /// Start the connection driver.
    ///
    /// Without a valid URL this only marks the manager `Disconnected` with no
    /// error. While a driver is already running this is a no-op. After the
    /// reconnect budget is exhausted it starts a fresh driver with the
    /// attempt counter reset.
    pub fn connect(&self) {
        let url = match self.inner.config.url.as_deref().map(validate_url) {
            Some(Ok(url)) => url,
            Some(Err(e)) => {
                debug!(error = %e, "No usable live-update URL, staying disconnected");
                self.inner.update(|s| {
                    s.state = ConnectionState::Disconnected;
                    s.error = None;
                });
                return;
            }
            None => {
                debug!("Live-update URL not configured, staying disconnected");
                self.inner.update(|s| {
                    s.state = ConnectionState::Disconnected;
                    s.error = None;
                });
                return;
            }
        };

        let mut driver = self.inner.driver.lock();
        if let Some(current) = driver.take() {
            if !current.task.is_finished() && !self.status().terminal {
                debug!("Connection driver already running");
                *driver = Some(current);
                return;
            }
            current.cancel.cancel();
        }

        self.inner.update(|s| {
            s.reconnect_attempts = 0;
            s.next_retry_ms = None;
            s.terminal = false;
        });

        let cancel = CancellationToken::new();
        let task = tokio::spawn(drive(self.inner.clone(), url, cancel.clone()));
        *driver = Some(Driver { cancel, task });
    }

    /// Stop the driver, closing the transport and cancelling any pending
    /// reconnect. Safe to call when already disconnected.
    pub async fn disconnect(&self) {
        let driver = self.inner.driver.lock().take();
        if let Some(driver) = driver {
            info!("Disconnect requested");
            driver.cancel.cancel();
            if let Err(e) = driver.task.await {
                if e.is_panic() {
                    error!(error = %e, "Connection driver panicked");
                }
            }
        }

        *self.inner.outbound.lock() = None;
        self.inner.update(|s| {
            s.state = ConnectionState::Disconnected;
            s.reconnect_attempts = 0;
            s.next_retry_ms = None;
            s.terminal = false;
        });
    }

    /// Send `{type, payload}` to the server.
    ///
    /// Messages are not queued across disconnects: when not connected the
    /// message is dropped with a warning.
    pub fn send(&self, kind: &str, payload: serde_json::Value) -> ClientResult<()> {
        let tx = self.inner.outbound.lock().clone();
        let tx = match tx {
            Some(tx) if self.state() == ConnectionState::Connected => tx,
            _ => {
                warn!(kind, "Not connected, dropping outbound message");
                return Err(ClientError::NotConnected);
            }
        };

        let text = serde_json::to_string(&Envelope::new(kind, payload))?;
        tx.try_send(text)
            .map_err(|e| ClientError::SendFailed(e.to_string()))
    }
}

async fn drive(inner: Arc<Inner>, url: String, cancel: CancellationToken) {
    let config = &inner.config;
    let mut attempt = 0u32;

    loop {
        inner.set_state(ConnectionState::Connecting);
        info!(url = %url, attempt, "Connecting to live-update server");

        let connected = tokio::select! {
            () = cancel.cancelled() => break,
            result = connect_async(url.as_str()) => result,
        };

        match connected {
            Ok((stream, _response)) => {
                run_session(&inner, stream, &cancel, &mut attempt).await;
            }
            Err(e) => {
                warn!(error = %e, "Live-update connection failed");
                let message = ClientError::from(e).to_string();
                inner.update(|s| s.error = Some(message));
            }
        }

        if cancel.is_cancelled() {
            break;
        }
        inner.set_state(ConnectionState::Disconnected);

        if !config.auto_reconnect {
            info!("Auto-reconnect disabled, staying disconnected");
            break;
        }

        if attempt >= config.max_reconnect_attempts {
            error!(attempt, "Max reconnection attempts reached");
            Metrics::client_reconnect("exhausted");
            inner.update(|s| {
                s.terminal = true;
                s.next_retry_ms = None;
            });
            break;
        }

        let delay = backoff_delay(config.reconnect_interval_ms, attempt);
        attempt += 1;
        let delay_ms = delay.as_millis() as u64;
        Metrics::client_reconnect("scheduled");
        inner.update(|s| {
            s.reconnect_attempts = attempt;
            s.next_retry_ms = Some(delay_ms);
        });
        warn!(attempt, delay_ms, "Reconnecting");

        tokio::select! {
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(delay) => {}
        }
        inner.update(|s| s.next_retry_ms = None);
    }
}

async fn run_session(
    inner: &Inner,
    stream: WsStream,
    cancel: &CancellationToken,
    attempt: &mut u32,
) {
    let config = &inner.config;
    let (mut write, mut read) = stream.split();

    let (out_tx, mut out_rx) = mpsc::channel(config.outbound_capacity.max(1));
    *inner.outbound.lock() = Some(out_tx);
    inner.update(|s| {
        s.state = ConnectionState::Connected;
        s.error = None;
        s.next_retry_ms = None;
    });
    info!("Live-update connection established");

    let mut heartbeat = Heartbeat::new(config.heartbeat_interval_ms, config.heartbeat_timeout_ms);
    let mut ticker =
        tokio::time::interval_at(Instant::now() + heartbeat.interval(), heartbeat.interval());

    let stable = tokio::time::sleep(Duration::from_millis(config.stable_after_ms));
    tokio::pin!(stable);
    let mut stable_pending = true;
    if config.stable_after_ms == 0 {
        stable_pending = false;
        reset_attempts(inner, attempt);
    }

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                if let Err(e) = write.send(Message::Close(None)).await {
                    debug!(error = %e, "Failed to send Close frame during shutdown");
                }
                break;
            }

            () = &mut stable, if stable_pending => {
                stable_pending = false;
                reset_attempts(inner, attempt);
            }

            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    handle_text(inner, &mut heartbeat, &text);
                }
                Some(Ok(Message::Ping(data))) => {
                    if write.send(Message::Pong(data)).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    info!(?frame, "Live-update connection closed by server");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(error = %e, "Live-update read error");
                    let message = ClientError::from(e).to_string();
                    inner.update(|s| s.error = Some(message));
                    break;
                }
                None => {
                    info!("Live-update stream ended");
                    break;
                }
            },

            Some(text) = out_rx.recv() => {
                if let Err(e) = write.send(Message::Text(text)).await {
                    warn!(error = %e, "Live-update write error");
                    let message = ClientError::from(e).to_string();
                    inner.update(|s| s.error = Some(message));
                    break;
                }
            }

            _ = ticker.tick() => {
                if heartbeat.is_timed_out() {
                    warn!("Heartbeat timeout, closing session");
                    inner.update(|s| s.error = Some(ClientError::HeartbeatTimeout.to_string()));
                    break;
                }
                match ClientMessage::Ping.to_json() {
                    Ok(ping) => {
                        if write.send(Message::Text(ping)).await.is_err() {
                            break;
                        }
                        heartbeat.record_ping();
                        trace!("Sent heartbeat ping");
                    }
                    Err(e) => warn!(error = %e, "Failed to encode ping"),
                }
            }
        }
    }

    *inner.outbound.lock() = None;
}

fn reset_attempts(inner: &Inner, attempt: &mut u32) {
    if *attempt > 0 {
        debug!(previous = *attempt, "Session stable, resetting reconnect counter");
    }
    *attempt = 0;
    inner.update(|s| s.reconnect_attempts = 0);
}

fn handle_text(inner: &Inner, heartbeat: &mut Heartbeat, text: &str) {
    match ServerMessage::from_json(text) {
        Ok(ServerMessage::Pong) => heartbeat.record_pong(),
        Ok(msg) => {
            let listeners = inner.registry.dispatch(&msg);
            trace!(tag = ?msg.tag(), listeners, "Dispatched live-update event");
        }
        Err(e) => {
            warn!(error = %e, "Discarding malformed live-update frame");
        }
    }
}
