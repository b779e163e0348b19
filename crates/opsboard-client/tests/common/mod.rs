//! Mock live-update server for socket manager tests.
//!
//! Records the instant of every accepted TCP connection and every text frame
//! received, and reacts to each connection according to a [`Behavior`].

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use opsboard_client::{ConnectionStatus, SocketManager};
use opsboard_core::{ClientMessage, ServerMessage};
use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{timeout, Instant};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;

/// Per-connection behaviour of the mock server.
#[derive(Debug, Clone)]
pub enum Behavior {
    /// Accept TCP and drop it before the WebSocket handshake.
    DropTcp,
    /// Complete the handshake, then close immediately.
    CloseAfterOpen,
    /// Keep the session open.
    HoldOpen(HoldOpen),
}

#[derive(Debug, Clone, Default)]
pub struct HoldOpen {
    /// Text frames sent right after the handshake.
    pub greeting: Vec<String>,
    /// Answer `{"type":"ping"}` with `{"type":"pong"}`.
    pub reply_pong: bool,
    /// Close the session after this long.
    pub close_after: Option<Duration>,
}

pub struct MockServer {
    addr: SocketAddr,
    accepts: Arc<Mutex<Vec<Instant>>>,
    received: Arc<Mutex<Vec<String>>>,
    shutdown: CancellationToken,
}

impl MockServer {
    pub async fn start(behavior: Behavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accepts = Arc::new(Mutex::new(Vec::new()));
        let received = Arc::new(Mutex::new(Vec::new()));
        let shutdown = CancellationToken::new();

        let accepts_clone = accepts.clone();
        let received_clone = received.clone();
        let token = shutdown.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    accepted = listener.accept() => {
                        let Ok((stream, _)) = accepted else { continue };
                        accepts_clone.lock().push(Instant::now());
                        match &behavior {
                            Behavior::DropTcp => drop(stream),
                            Behavior::CloseAfterOpen => {
                                tokio::spawn(close_after_open(stream));
                            }
                            Behavior::HoldOpen(opts) => {
                                tokio::spawn(hold_open(
                                    stream,
                                    opts.clone(),
                                    received_clone.clone(),
                                    token.clone(),
                                ));
                            }
                        }
                    }
                }
            }
        });

        Self {
            addr,
            accepts,
            received,
            shutdown,
        }
    }

    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    pub fn accept_count(&self) -> usize {
        self.accepts.lock().len()
    }

    pub fn accept_times(&self) -> Vec<Instant> {
        self.accepts.lock().clone()
    }

    pub fn received(&self) -> Vec<String> {
        self.received.lock().clone()
    }

    pub async fn wait_for_accepts(&self, n: usize) {
        timeout(Duration::from_secs(5), async {
            while self.accept_count() < n {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("accept count not reached");
    }

    pub async fn wait_for_received(&self, n: usize) {
        timeout(Duration::from_secs(5), async {
            while self.received.lock().len() < n {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("received count not reached");
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn close_after_open(stream: TcpStream) {
    if let Ok(mut ws) = accept_async(stream).await {
        let _ = ws.close(None).await;
    }
}

async fn hold_open(
    stream: TcpStream,
    opts: HoldOpen,
    received: Arc<Mutex<Vec<String>>>,
    shutdown: CancellationToken,
) {
    let Ok(ws) = accept_async(stream).await else {
        return;
    };
    let (mut write, mut read) = ws.split();

    for frame in &opts.greeting {
        if write.send(Message::Text(frame.clone())).await.is_err() {
            return;
        }
    }

    let close = async {
        match opts.close_after {
            Some(after) => tokio::time::sleep(after).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(close);

    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            () = &mut close => {
                let _ = write.send(Message::Close(None)).await;
                break;
            }
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    let is_ping = matches!(ClientMessage::parse(&text), Ok(ClientMessage::Ping));
                    received.lock().push(text);
                    if is_ping && opts.reply_pong {
                        let pong = ServerMessage::Pong.to_json().unwrap();
                        if write.send(Message::Text(pong)).await.is_err() {
                            break;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
}

/// Wait until the manager's status satisfies `pred`.
pub async fn wait_for_status(
    manager: &SocketManager,
    pred: impl FnMut(&ConnectionStatus) -> bool,
) -> ConnectionStatus {
    let mut rx = manager.watch();
    let status = timeout(Duration::from_secs(5), rx.wait_for(pred))
        .await
        .expect("status not reached")
        .expect("status channel closed")
        .clone();
    status
}
