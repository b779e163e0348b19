//! HTTP server implementation using axum.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use futures_util::stream::StreamExt;
use futures_util::SinkExt;
use opsboard_core::{ClientMessage, Domain, ServerMessage};
use opsboard_sources::{GitHubSource, HostProbe, SourceSet};
use opsboard_telemetry::Metrics;
use serde_json::json;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};

use crate::broadcast::{Broadcaster, ConnectionHandle};
use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::handshake::send_initial_snapshots;

/// Caps the number of concurrent live-update sessions.
pub struct ConnectionLimiter {
    current: AtomicUsize,
    max: usize,
}

impl ConnectionLimiter {
    pub fn new(max: usize) -> Self {
        Self {
            current: AtomicUsize::new(0),
            max,
        }
    }

    /// Reserve a slot. The slot is released when the permit is dropped.
    pub fn try_acquire(self: &Arc<Self>) -> Option<ConnectionPermit> {
        loop {
            let current = self.current.load(Ordering::Acquire);
            if current >= self.max {
                return None;
            }
            if self
                .current
                .compare_exchange(current, current + 1, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return Some(ConnectionPermit {
                    limiter: self.clone(),
                });
            }
        }
    }

    pub fn current_count(&self) -> usize {
        self.current.load(Ordering::Relaxed)
    }
}

/// Owned slot in a [`ConnectionLimiter`]; moves into the upgraded socket task.
pub struct ConnectionPermit {
    limiter: Arc<ConnectionLimiter>,
}

impl Drop for ConnectionPermit {
    fn drop(&mut self) {
        self.limiter.current.fetch_sub(1, Ordering::Release);
    }
}

/// Shared application state for axum handlers.
#[derive(Clone)]
pub struct AppState {
    sources: SourceSet,
    broadcaster: Arc<Broadcaster>,
    limiter: Arc<ConnectionLimiter>,
    started_at: Instant,
    host: Option<Arc<HostProbe>>,
    github: Option<Arc<GitHubSource>>,
}

impl AppState {
    pub fn new(sources: SourceSet, broadcaster: Arc<Broadcaster>, max_connections: usize) -> Self {
        Self {
            sources,
            broadcaster,
            limiter: Arc::new(ConnectionLimiter::new(max_connections)),
            started_at: Instant::now(),
            host: None,
            github: None,
        }
    }

    /// Serve the host's recorded cpu and memory series on `/api/history`.
    pub fn with_host_probe(mut self, probe: Arc<HostProbe>) -> Self {
        self.host = Some(probe);
        self
    }

    /// Serve workflow run logs on `/api/github/logs/{run_id}`.
    pub fn with_github(mut self, github: Arc<GitHubSource>) -> Self {
        self.github = Some(github);
        self
    }

    pub fn broadcaster(&self) -> &Arc<Broadcaster> {
        &self.broadcaster
    }
}

/// Create the axum router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/api/health", get(health))
        .route("/api/snapshot/{domain}", get(get_snapshot))
        .route("/api/history", get(get_history))
        .route("/api/github/logs/{run_id}", get(get_workflow_logs))
        .route("/metrics", get(metrics))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let domains: Vec<_> = state
        .sources
        .domains()
        .iter()
        .map(|d| d.as_str())
        .collect();
    Json(json!({
        "status": "ok",
        "connections": state.broadcaster.connection_count(),
        "domains": domains,
        "uptimeSecs": state.started_at.elapsed().as_secs(),
    }))
}

/// Fetch one domain directly from its source.
async fn get_snapshot(State(state): State<AppState>, Path(domain): Path<String>) -> Response {
    let Some(source) = domain
        .parse::<Domain>()
        .ok()
        .and_then(|d| state.sources.get(d))
    else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("unknown domain: {domain}") })),
        )
            .into_response();
    };

    match source.fetch().await {
        Ok(snapshot) => {
            let taken_at = snapshot.taken_at;
            let events = snapshot.into_messages();
            Json(json!({
                "domain": domain,
                "takenAt": taken_at,
                "events": events,
            }))
            .into_response()
        }
        Err(e) => {
            warn!(domain = %domain, error = %e, "Snapshot request failed");
            (
                StatusCode::BAD_GATEWAY,
                Json(json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

fn not_found(message: &str) -> Response {
    (StatusCode::NOT_FOUND, Json(json!({ "error": message }))).into_response()
}

async fn get_history(State(state): State<AppState>) -> Response {
    match &state.host {
        Some(probe) => Json(probe.history()).into_response(),
        None => not_found("host history not available"),
    }
}

async fn get_workflow_logs(State(state): State<AppState>, Path(run_id): Path<u64>) -> Response {
    let Some(github) = &state.github else {
        return not_found("GitHub repository not configured");
    };

    match github.workflow_logs(run_id).await {
        Ok(lines) => Json(json!({ "runId": run_id, "logs": lines })).into_response(),
        Err(e) => {
            warn!(run_id, error = %e, "Workflow logs request failed");
            (
                StatusCode::BAD_GATEWAY,
                Json(json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

async fn metrics() -> Response {
    match Metrics::render() {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

/// WebSocket upgrade handler.
async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    let Some(permit) = state.limiter.try_acquire() else {
        warn!(
            current = state.limiter.current_count(),
            "Live-update connection limit reached"
        );
        return (StatusCode::SERVICE_UNAVAILABLE, "Too many connections").into_response();
    };

    ws.on_upgrade(move |socket| handle_socket(socket, state, permit))
}

/// Drive one live-update session.
///
/// The initial snapshots are queued before the connection is registered with
/// the broadcaster, so incremental events never precede them.
async fn handle_socket(socket: WebSocket, state: AppState, _permit: ConnectionPermit) {
    let (mut sink, mut stream) = socket.split();
    let (connection, mut outbound) = state.broadcaster.open_connection();
    let connection_id = connection.id();

    info!(
        connection_id,
        connections = state.limiter.current_count(),
        "New live-update connection"
    );

    let mut writer = tokio::spawn(async move {
        while let Some(text) = outbound.recv().await {
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    send_initial_snapshots(&state.sources, &connection).await;
    state.broadcaster.register(connection.clone());

    loop {
        tokio::select! {
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => handle_client_text(&connection, text.as_str()).await,
                Some(Ok(Message::Close(_))) | None => {
                    debug!(connection_id, "Client closed connection");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(connection_id, error = %e, "Receive error");
                    break;
                }
            },
            _ = &mut writer => {
                debug!(connection_id, "Writer finished, closing connection");
                break;
            }
        }
    }

    connection.close();
    state.broadcaster.unregister(connection_id);
    drop(connection);
    writer.abort();

    info!(connection_id, "Live-update connection closed");
}

/// Handle one inbound text frame. Only `ping` is acted on.
///
/// The pong waits for room in this connection's queue.
async fn handle_client_text(connection: &ConnectionHandle, text: &str) {
    match ClientMessage::parse(text) {
        Ok(ClientMessage::Ping) => {
            if let Err(e) = connection.send(&ServerMessage::Pong).await {
                debug!(connection_id = connection.id(), error = %e, "Failed to queue pong");
            }
        }
        Ok(ClientMessage::Other(envelope)) => {
            debug!(
                connection_id = connection.id(),
                kind = %envelope.kind,
                "Ignoring client message"
            );
        }
        Err(e) => {
            warn!(connection_id = connection.id(), error = %e, "Malformed client message");
        }
    }
}

/// Serve on an already bound listener until `shutdown` fires.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    shutdown: CancellationToken,
) -> ServerResult<()> {
    let app = create_router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}

/// Bind the configured address and serve until `shutdown` fires.
pub async fn run_server(
    state: AppState,
    config: &ServerConfig,
    shutdown: CancellationToken,
) -> ServerResult<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: addr.clone(),
            source,
        })?;
    info!(addr = %addr, "Starting opsboard server");

    serve(listener, state, shutdown).await
}
