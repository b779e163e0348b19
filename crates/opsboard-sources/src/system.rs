//! Host metrics via `sysinfo`.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use opsboard_core::{Domain, HealthStatus, InfraService, Metric, Snapshot, SnapshotData, Trend};
use parking_lot::Mutex;
use serde::Serialize;
use sysinfo::{Disks, System};
use tracing::debug;

use crate::error::{SourceError, SourceResult};
use crate::source::{BoxFuture, MetricSource};

/// Samples kept per series for trend detection.
const MAX_HISTORY: usize = 60;
/// Samples averaged when computing a trend.
const TREND_WINDOW: usize = 5;
/// Distance from the recent mean (percentage points) that counts as a trend.
const TREND_BAND: f64 = 5.0;

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// One host reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HostReading {
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub disk_percent: f64,
    pub uptime_secs: u64,
}

#[derive(Debug, Default)]
struct History {
    cpu: VecDeque<f64>,
    memory: VecDeque<f64>,
    timestamps: VecDeque<DateTime<Utc>>,
}

/// One timestamped sample of a series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryPoint {
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

/// Recent CPU and memory readings, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricHistory {
    pub cpu: Vec<HistoryPoint>,
    pub memory: Vec<HistoryPoint>,
}

/// Shared handle on the local host.
///
/// CPU usage is measured between consecutive refreshes, so the probe keeps
/// one `System` alive for the process lifetime.
pub struct HostProbe {
    system: Mutex<System>,
    history: Mutex<History>,
}

impl HostProbe {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu_usage();
        system.refresh_memory();
        Self {
            system: Mutex::new(system),
            history: Mutex::new(History::default()),
        }
    }

    /// Refresh and read the host. Blocking; call from `spawn_blocking`.
    pub fn read(&self) -> HostReading {
        let mut system = self.system.lock();
        system.refresh_cpu_usage();
        system.refresh_memory();

        let cpu_percent = round2(system.global_cpu_info().cpu_usage() as f64);
        let memory_percent = percent(system.used_memory(), system.total_memory());

        let disks = Disks::new_with_refreshed_list();
        let (total, available) = disks.list().iter().fold((0u64, 0u64), |(t, a), disk| {
            (t + disk.total_space(), a + disk.available_space())
        });
        let disk_percent = percent(total.saturating_sub(available), total);

        HostReading {
            cpu_percent,
            memory_percent,
            disk_percent,
            uptime_secs: System::uptime(),
        }
    }

    /// Append a reading to the history and return the cpu and memory trends
    /// it forms against the samples before it.
    pub fn record(&self, reading: &HostReading, at: DateTime<Utc>) -> (Trend, Trend) {
        let mut history = self.history.lock();
        let cpu_trend = trend(&history.cpu, reading.cpu_percent);
        let memory_trend = trend(&history.memory, reading.memory_percent);
        push_bounded(&mut history.cpu, reading.cpu_percent);
        push_bounded(&mut history.memory, reading.memory_percent);
        push_bounded(&mut history.timestamps, at);
        (cpu_trend, memory_trend)
    }

    /// The recorded series, up to the last 60 readings.
    pub fn history(&self) -> MetricHistory {
        let history = self.history.lock();
        let series = |values: &VecDeque<f64>| {
            values
                .iter()
                .zip(&history.timestamps)
                .map(|(&value, &timestamp)| HistoryPoint { value, timestamp })
                .collect::<Vec<_>>()
        };
        MetricHistory {
            cpu: series(&history.cpu),
            memory: series(&history.memory),
        }
    }

    /// Read the host and convert to metrics, recording history for trends.
    pub fn metrics(&self) -> Vec<Metric> {
        let reading = self.read();
        let now = Utc::now();
        let (cpu_trend, memory_trend) = self.record(&reading, now);

        debug!(
            cpu = reading.cpu_percent,
            memory = reading.memory_percent,
            disk = reading.disk_percent,
            "Host reading"
        );

        vec![
            Metric {
                id: "cpu".to_string(),
                name: "CPU Usage".to_string(),
                value: reading.cpu_percent,
                unit: "%".to_string(),
                status: HealthStatus::from_percent(reading.cpu_percent, 60.0, 80.0),
                trend: cpu_trend,
                timestamp: now,
            },
            Metric {
                id: "memory".to_string(),
                name: "Memory Usage".to_string(),
                value: reading.memory_percent,
                unit: "%".to_string(),
                status: HealthStatus::from_percent(reading.memory_percent, 70.0, 85.0),
                trend: memory_trend,
                timestamp: now,
            },
            Metric {
                id: "disk".to_string(),
                name: "Disk Usage".to_string(),
                value: reading.disk_percent,
                unit: "%".to_string(),
                status: HealthStatus::from_percent(reading.disk_percent, 75.0, 90.0),
                trend: Trend::Stable,
                timestamp: now,
            },
            Metric {
                id: "uptime".to_string(),
                name: "System Uptime".to_string(),
                value: (reading.uptime_secs / 3600) as f64,
                unit: "hours".to_string(),
                status: HealthStatus::Healthy,
                trend: Trend::Up,
                timestamp: now,
            },
        ]
    }

    /// Static description of this host as an infrastructure service.
    pub fn host_service(&self) -> InfraService {
        let system = self.system.lock();
        let total_memory_gb = round2(system.total_memory() as f64 / BYTES_PER_GB);

        let mut metadata = BTreeMap::new();
        metadata.insert("cpuCores".to_string(), system.cpus().len().into());
        metadata.insert(
            "totalMemory".to_string(),
            format!("{total_memory_gb} GB").into(),
        );
        metadata.insert(
            "architecture".to_string(),
            std::env::consts::ARCH.to_string().into(),
        );
        if let Some(os) = System::long_os_version() {
            metadata.insert("osVersion".to_string(), os.into());
        }
        if let Some(host) = System::host_name() {
            metadata.insert("hostname".to_string(), host.into());
        }

        InfraService {
            id: "backend-server".to_string(),
            name: "Backend Server".to_string(),
            status: HealthStatus::Healthy,
            region: std::env::consts::OS.to_string(),
            instances: Some(1),
            metadata,
        }
    }
}

impl Default for HostProbe {
    fn default() -> Self {
        Self::new()
    }
}

/// Source for the `system` domain.
pub struct SystemMetricsSource {
    probe: Arc<HostProbe>,
}

impl SystemMetricsSource {
    pub fn new(probe: Arc<HostProbe>) -> Self {
        Self { probe }
    }
}

impl MetricSource for SystemMetricsSource {
    fn domain(&self) -> Domain {
        Domain::System
    }

    fn fetch(&self) -> BoxFuture<'_, SourceResult<Snapshot>> {
        let probe = self.probe.clone();
        Box::pin(async move {
            let metrics = tokio::task::spawn_blocking(move || probe.metrics())
                .await
                .map_err(|e| SourceError::Probe(e.to_string()))?;
            Ok(Snapshot::now(SnapshotData::System(metrics)))
        })
    }
}

fn percent(part: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    round2(part as f64 / total as f64 * 100.0)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn push_bounded<T>(series: &mut VecDeque<T>, value: T) {
    series.push_back(value);
    while series.len() > MAX_HISTORY {
        series.pop_front();
    }
}

/// Compare `current` against the mean of the most recent samples.
fn trend(history: &VecDeque<f64>, current: f64) -> Trend {
    if history.len() <= 2 {
        return Trend::Stable;
    }
    let recent: Vec<f64> = history.iter().rev().take(TREND_WINDOW).copied().collect();
    let avg = recent.iter().sum::<f64>() / recent.len() as f64;

    if current > avg + TREND_BAND {
        Trend::Up
    } else if current < avg - TREND_BAND {
        Trend::Down
    } else {
        Trend::Stable
    }
}
