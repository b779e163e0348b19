//! Heartbeat tracking for one live-update session.
//!
//! The session loop sends `{"type":"ping"}` every interval and records the
//! matching `pong`. With a timeout configured, a ping left unanswered for
//! longer than the timeout marks the session dead.

use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

pub struct Heartbeat {
    interval: Duration,
    /// None = never time out.
    timeout: Option<Duration>,
    last_ping: Option<Instant>,
    waiting_for_pong: bool,
}

impl Heartbeat {
    pub fn new(interval_ms: u64, timeout_ms: u64) -> Self {
        Self {
            interval: Duration::from_millis(interval_ms.max(1)),
            timeout: (timeout_ms > 0).then(|| Duration::from_millis(timeout_ms)),
            last_ping: None,
            waiting_for_pong: false,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn record_ping(&mut self) {
        self.last_ping = Some(Instant::now());
        self.waiting_for_pong = true;
    }

    pub fn record_pong(&mut self) {
        self.waiting_for_pong = false;
        if let Some(ping) = self.last_ping {
            debug!(rtt_ms = ping.elapsed().as_millis() as u64, "Received pong");
        }
    }

    pub fn is_waiting_for_pong(&self) -> bool {
        self.waiting_for_pong
    }

    /// Whether the outstanding ping has gone unanswered past the timeout.
    pub fn is_timed_out(&self) -> bool {
        match (self.timeout, self.last_ping) {
            (Some(timeout), Some(ping)) if self.waiting_for_pong => ping.elapsed() > timeout,
            _ => false,
        }
    }
}
