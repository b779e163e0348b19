//! Threshold alerts derived from snapshots.

use std::collections::HashMap;
use std::time::Duration;

use opsboard_core::{Alert, RunStatus, Severity, Snapshot, SnapshotData};
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::config::AlertConfig;

/// Turns snapshots into alerts.
///
/// Each alert carries a key (`cpu`, `deployment:<id>`, `gas:<network>`, ...).
/// With a non-zero suppression window, an alert whose key fired within the
/// window is withheld.
pub struct AlertEvaluator {
    config: AlertConfig,
    last_emitted: Mutex<HashMap<String, Instant>>,
}

impl AlertEvaluator {
    pub fn new(config: AlertConfig) -> Self {
        Self {
            config,
            last_emitted: Mutex::new(HashMap::new()),
        }
    }

    pub fn evaluate(&self, snapshot: &Snapshot) -> Vec<Alert> {
        let candidates = match &snapshot.data {
            SnapshotData::System(metrics) => metrics
                .iter()
                .filter_map(|m| {
                    let threshold = match m.id.as_str() {
                        "cpu" => self.config.cpu,
                        "memory" => self.config.memory,
                        "disk" => self.config.disk,
                        _ => return None,
                    };
                    percent_alert(&m.id, m.value, threshold).map(|a| (m.id.clone(), a))
                })
                .collect(),
            SnapshotData::CiCd { deployments, .. } => deployments
                .iter()
                .filter(|d| d.status == RunStatus::Failed)
                .map(|d| {
                    let alert = Alert::new(
                        "Workflow failed",
                        format!(
                            "GitHub Actions workflow \"{}\" failed on {} ({})",
                            d.name, d.branch, d.commit
                        ),
                        Severity::Error,
                        "github",
                    );
                    (format!("deployment:{}", d.id), alert)
                })
                .collect(),
            SnapshotData::Web3(networks) => networks
                .iter()
                .filter_map(|n| {
                    gas_alert(&n.name, n.gas_price.average, self.config.gas_price_gwei)
                        .map(|a| (format!("gas:{}", n.id), a))
                })
                .collect(),
            SnapshotData::Infrastructure(_) => Vec::new(),
        };

        self.admit(candidates)
    }

    fn admit(&self, candidates: Vec<(String, Alert)>) -> Vec<Alert> {
        if self.config.suppression_window_ms == 0 {
            return candidates.into_iter().map(|(_, alert)| alert).collect();
        }

        let window = Duration::from_millis(self.config.suppression_window_ms);
        let now = Instant::now();
        let mut last = self.last_emitted.lock();
        last.retain(|_, at| now.duration_since(*at) < window);

        candidates
            .into_iter()
            .filter_map(|(key, alert)| {
                if last.contains_key(&key) {
                    None
                } else {
                    last.insert(key, now);
                    Some(alert)
                }
            })
            .collect()
    }
}

fn percent_alert(metric: &str, value: f64, threshold: f64) -> Option<Alert> {
    if value <= threshold {
        return None;
    }
    let severity = if value >= threshold * 1.2 {
        Severity::Critical
    } else if value >= threshold * 1.1 {
        Severity::Error
    } else {
        Severity::Warning
    };

    Some(Alert::new(
        format!("{} threshold exceeded", metric.to_uppercase()),
        format!("{metric} is at {value:.1}% (threshold: {threshold}%)"),
        severity,
        "system",
    ))
}

fn gas_alert(network: &str, average_gwei: f64, threshold: f64) -> Option<Alert> {
    if average_gwei < threshold {
        return None;
    }
    let severity = if average_gwei >= threshold * 2.0 {
        Severity::Critical
    } else {
        Severity::Warning
    };

    Some(Alert::new(
        format!("High gas prices on {network}"),
        format!("Gas price is {average_gwei} Gwei (threshold: {threshold} Gwei)"),
        severity,
        "web3",
    ))
}
