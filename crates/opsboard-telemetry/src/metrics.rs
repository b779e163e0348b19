//! Prometheus metrics for the live-update pipeline.
//!
//! Covers:
//! - Live-update connections (server side)
//! - Events published / dropped per tag
//! - Source adapter poll duration and failures per domain
//! - Alerts emitted per severity
//! - Client connection state and reconnects
//!
//! # Panics
//!
//! Metric registration uses `unwrap()` intentionally. A registration failure
//! means duplicate metric names, a programming error that should crash at
//! first use rather than silently drop metrics.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge_vec, register_histogram_vec, register_int_gauge,
    CounterVec, Encoder, GaugeVec, HistogramVec, IntGauge, TextEncoder,
};

use crate::error::TelemetryResult;

/// Currently registered live-update connections.
pub static WS_CONNECTIONS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "opsboard_ws_connections",
        "Live-update connections registered with the broadcaster"
    )
    .unwrap()
});

/// Events delivered to connection queues.
pub static EVENTS_PUBLISHED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "opsboard_events_published_total",
        "Events written to connection queues",
        &["tag"]
    )
    .unwrap()
});

/// Events dropped because a connection queue was full.
pub static EVENTS_DROPPED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "opsboard_events_dropped_total",
        "Events dropped for slow connections",
        &["tag"]
    )
    .unwrap()
});

/// Source adapter call duration in milliseconds.
pub static POLL_DURATION_MS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "opsboard_poll_duration_ms",
        "Metric source call duration in milliseconds",
        &["domain"],
        vec![5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0]
    )
    .unwrap()
});

/// Source adapter failures.
pub static POLL_FAILURES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "opsboard_poll_failures_total",
        "Metric source calls that returned an error",
        &["domain"]
    )
    .unwrap()
});

/// Alerts emitted.
pub static ALERTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "opsboard_alerts_total",
        "Alerts published on the alerts tag",
        &["severity"]
    )
    .unwrap()
});

/// Client connection state (1 = active, 0 = inactive).
/// Labels: state (disconnected/connecting/connected)
pub static CLIENT_STATE: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "opsboard_client_state",
        "Client socket manager state (1=active, 0=inactive)",
        &["state"]
    )
    .unwrap()
});

/// Client reconnect attempts.
pub static CLIENT_RECONNECT_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "opsboard_client_reconnect_total",
        "Client reconnect attempts",
        &["outcome"]
    )
    .unwrap()
});

/// Metrics facade.
pub struct Metrics;

impl Metrics {
    pub fn connection_opened() {
        WS_CONNECTIONS.inc();
    }

    pub fn connection_closed() {
        WS_CONNECTIONS.dec();
    }

    /// Record an event written to `receivers` connection queues.
    pub fn event_published(tag: &str, receivers: usize) {
        EVENTS_PUBLISHED_TOTAL
            .with_label_values(&[tag])
            .inc_by(receivers as f64);
    }

    pub fn event_dropped(tag: &str) {
        EVENTS_DROPPED_TOTAL.with_label_values(&[tag]).inc();
    }

    pub fn poll_duration(domain: &str, duration_ms: f64) {
        POLL_DURATION_MS
            .with_label_values(&[domain])
            .observe(duration_ms);
    }

    pub fn poll_failed(domain: &str) {
        POLL_FAILURES_TOTAL.with_label_values(&[domain]).inc();
    }

    pub fn alert_emitted(severity: &str) {
        ALERTS_TOTAL.with_label_values(&[severity]).inc();
    }

    /// Set the client state gauge. Only the active state is 1.
    pub fn client_state_set(state: &str) {
        for s in &["disconnected", "connecting", "connected"] {
            CLIENT_STATE.with_label_values(&[s]).set(0.0);
        }
        CLIENT_STATE.with_label_values(&[state]).set(1.0);
    }

    /// Record a reconnect attempt. `outcome` is "scheduled" or "exhausted".
    pub fn client_reconnect(outcome: &str) {
        CLIENT_RECONNECT_TOTAL.with_label_values(&[outcome]).inc();
    }

    /// Render every registered metric in the Prometheus text format.
    pub fn render() -> TelemetryResult<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&prometheus::gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_state_is_exclusive() {
        Metrics::client_state_set("connecting");
        Metrics::client_state_set("connected");

        assert_eq!(CLIENT_STATE.with_label_values(&["connected"]).get(), 1.0);
        assert_eq!(CLIENT_STATE.with_label_values(&["connecting"]).get(), 0.0);
        assert_eq!(CLIENT_STATE.with_label_values(&["disconnected"]).get(), 0.0);
    }

    #[test]
    fn test_render_contains_recorded_metrics() {
        Metrics::event_published("metrics", 2);
        Metrics::poll_failed("web3");

        let text = Metrics::render().unwrap();
        assert!(text.contains("opsboard_events_published_total"));
        assert!(text.contains("opsboard_poll_failures_total"));
    }
}
