//! Per-domain polling loops.
//!
//! Each registered source gets its own task. A task sleeps for its interval,
//! runs one tick to completion, then sleeps again, so two calls to the same
//! source never overlap and a slow or failing source only delays itself.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::FutureExt;
use opsboard_core::{Domain, ServerMessage};
use opsboard_sources::{MetricSource, SourceSet};
use opsboard_telemetry::Metrics;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::alerts::AlertEvaluator;
use crate::broadcast::Broadcaster;
use crate::config::PollIntervals;
use crate::notify::Notifier;

/// What one successful tick produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub events: usize,
    pub alerts: usize,
}

/// Runs every source on its own cadence and publishes the results.
pub struct Poller {
    sources: SourceSet,
    broadcaster: Arc<Broadcaster>,
    alerts: AlertEvaluator,
    notifier: Option<Notifier>,
    intervals: PollIntervals,
    deliveries: TaskTracker,
}

impl Poller {
    pub fn new(
        sources: SourceSet,
        broadcaster: Arc<Broadcaster>,
        alerts: AlertEvaluator,
        intervals: PollIntervals,
    ) -> Self {
        Self {
            sources,
            broadcaster,
            alerts,
            notifier: None,
            intervals,
            deliveries: TaskTracker::new(),
        }
    }

    pub fn with_notifier(mut self, notifier: Option<Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Spawn one loop per registered domain.
    pub fn start(self) -> PollerHandle {
        let cancel = CancellationToken::new();
        let deliveries = self.deliveries.clone();
        let poller = Arc::new(self);

        let tasks = poller
            .sources
            .domains()
            .into_iter()
            .filter_map(|domain| poller.sources.get(domain).map(|s| (domain, s)))
            .map(|(domain, source)| {
                let interval = poller.intervals.for_domain(domain);
                tokio::spawn(run_domain(
                    poller.clone(),
                    domain,
                    source,
                    interval,
                    cancel.child_token(),
                ))
            })
            .collect();

        PollerHandle {
            cancel,
            tasks,
            deliveries,
        }
    }

    /// Poll one source once and publish its events and alerts.
    ///
    /// Failures and panics in the source are logged and swallowed; the next
    /// scheduled tick is the retry.
    pub async fn tick(&self, domain: Domain, source: &dyn MetricSource) -> Option<TickReport> {
        let started = Instant::now();
        let result = AssertUnwindSafe(source.fetch()).catch_unwind().await;
        Metrics::poll_duration(domain.as_str(), started.elapsed().as_secs_f64() * 1000.0);

        let snapshot = match result {
            Ok(Ok(snapshot)) => snapshot,
            Ok(Err(e)) => {
                Metrics::poll_failed(domain.as_str());
                warn!(domain = %domain, error = %e, "Poll failed, skipping tick");
                return None;
            }
            Err(panic) => {
                Metrics::poll_failed(domain.as_str());
                error!(
                    domain = %domain,
                    panic = panic_message(panic.as_ref()),
                    "Source panicked, skipping tick"
                );
                return None;
            }
        };

        let alerts = self.alerts.evaluate(&snapshot);

        let messages = snapshot.into_messages();
        let events = messages.len();
        for msg in &messages {
            self.broadcaster.publish(msg);
        }

        for alert in &alerts {
            Metrics::alert_emitted(alert.severity.as_str());
            info!(
                severity = %alert.severity,
                source = %alert.source,
                title = %alert.title,
                "Alert raised"
            );
            self.broadcaster.publish(&ServerMessage::Alert(alert.clone()));
        }

        if let Some(notifier) = &self.notifier {
            if !alerts.is_empty() {
                let notifier = notifier.clone();
                let batch = alerts.clone();
                self.deliveries.spawn(async move {
                    for alert in &batch {
                        notifier.notify(alert).await;
                    }
                });
            }
        }

        debug!(domain = %domain, events, alerts = alerts.len(), "Tick complete");
        Some(TickReport {
            events,
            alerts: alerts.len(),
        })
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

async fn run_domain(
    poller: Arc<Poller>,
    domain: Domain,
    source: Arc<dyn MetricSource>,
    interval: Duration,
    cancel: CancellationToken,
) {
    info!(domain = %domain, interval_ms = interval.as_millis() as u64, "Poller started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = poller.tick(domain, source.as_ref()) => {}
        }
    }

    debug!(domain = %domain, "Poller stopped");
}

/// Running poller. Stopping it cancels every domain loop together and waits
/// for alert deliveries already in flight.
pub struct PollerHandle {
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    deliveries: TaskTracker,
}

impl PollerHandle {
    pub fn domain_count(&self) -> usize {
        self.tasks.len()
    }

    /// Webhook deliveries not yet finished.
    pub fn pending_deliveries(&self) -> usize {
        self.deliveries.len()
    }

    pub async fn stop(mut self) {
        self.cancel.cancel();
        for task in std::mem::take(&mut self.tasks) {
            if let Err(e) = task.await {
                warn!(error = %e, "Poller task ended abnormally");
            }
        }
        self.deliveries.close();
        if !self.deliveries.is_empty() {
            info!(pending = self.deliveries.len(), "Waiting for alert deliveries");
        }
        self.deliveries.wait().await;
        info!("Poller stopped");
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
