//! Fan-out of live-update events to connected clients.
//!
//! Every connection owns a bounded outbound queue drained by its socket
//! writer task. `publish` serializes an event once and offers it to every
//! open queue without waiting: a full queue loses that event for that client
//! only, a closed queue means the writer is gone and the connection is
//! removed.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use opsboard_core::ServerMessage;
use opsboard_telemetry::Metrics;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, trace, warn};

use crate::error::{ServerError, ServerResult};

pub type ConnectionId = u64;

/// Server-side handle to one client session.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    tx: mpsc::Sender<String>,
    open: Arc<AtomicBool>,
}

impl ConnectionHandle {
    /// Create a handle and the receiving end of its outbound queue.
    pub fn new(id: ConnectionId, buffer: usize) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let handle = Self {
            id,
            tx,
            open: Arc::new(AtomicBool::new(true)),
        };
        (handle, rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Whether the transport still reports open.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Mark the transport closed. Shared by every clone of the handle.
    pub fn close(&self) {
        self.open.store(false, Ordering::Release);
    }

    /// Queue a message, waiting for room.
    pub async fn send(&self, msg: &ServerMessage) -> ServerResult<()> {
        let text = msg.to_json()?;
        self.tx
            .send(text)
            .await
            .map_err(|_| ServerError::ConnectionClosed(self.id))
    }
}

/// Outcome of a single publish.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PublishReport {
    /// Connections the event was queued for.
    pub delivered: usize,
    /// Connections skipped because they are not open.
    pub skipped: usize,
    /// Connections whose queue was full.
    pub dropped: usize,
    /// Connections removed because their queue was closed.
    pub removed: usize,
}

/// Owns the set of active connections.
pub struct Broadcaster {
    connections: DashMap<ConnectionId, ConnectionHandle>,
    next_id: AtomicU64,
    buffer: usize,
}

impl Broadcaster {
    pub fn new(buffer: usize) -> Self {
        Self {
            connections: DashMap::new(),
            next_id: AtomicU64::new(1),
            buffer,
        }
    }

    /// Allocate a handle for a new session. It receives nothing from
    /// `publish` until [`register`](Self::register) is called.
    pub fn open_connection(&self) -> (ConnectionHandle, mpsc::Receiver<String>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        ConnectionHandle::new(id, self.buffer)
    }

    pub fn register(&self, connection: ConnectionHandle) {
        let id = connection.id();
        if self.connections.insert(id, connection).is_none() {
            Metrics::connection_opened();
        }
        debug!(connection_id = id, total = self.connections.len(), "Connection registered");
    }

    /// Remove a connection. Returns false if it was not registered.
    pub fn unregister(&self, id: ConnectionId) -> bool {
        let removed = self.connections.remove(&id).is_some();
        if removed {
            Metrics::connection_closed();
            debug!(connection_id = id, total = self.connections.len(), "Connection unregistered");
        }
        removed
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Write an event to every open connection.
    pub fn publish(&self, msg: &ServerMessage) -> PublishReport {
        let tag = msg.tag().map(|t| t.as_str()).unwrap_or("control");
        let text = match msg.to_json() {
            Ok(text) => text,
            Err(e) => {
                warn!(tag, error = %e, "Failed to serialize event");
                return PublishReport::default();
            }
        };

        let mut report = PublishReport::default();
        let mut dead = Vec::new();

        for entry in self.connections.iter() {
            let connection = entry.value();
            if !connection.is_open() {
                report.skipped += 1;
                continue;
            }
            match connection.tx.try_send(text.clone()) {
                Ok(()) => report.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    report.dropped += 1;
                    Metrics::event_dropped(tag);
                    debug!(connection_id = connection.id(), tag, "Connection queue full, event dropped");
                }
                Err(TrySendError::Closed(_)) => dead.push(connection.id()),
            }
        }

        // Removal happens after iteration; DashMap shards are locked while iterating.
        for id in dead {
            if self.unregister(id) {
                report.removed += 1;
            }
        }

        Metrics::event_published(tag, report.delivered);
        trace!(tag, delivered = report.delivered, "Event published");
        report
    }
}
