//! Stub metric sources for server integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use opsboard_core::{
    Domain, GasPrice, HealthStatus, InfraService, Metric, Snapshot, SnapshotData, Trend,
    Web3Network,
};
use opsboard_sources::{BoxFuture, MetricSource, SourceError, SourceResult, SourceSet};

/// A source returning canned data, optionally failing, panicking or slow.
pub struct StubSource {
    domain: Domain,
    data: SnapshotData,
    fail: AtomicBool,
    panic_next: AtomicBool,
    delay: parking_lot::Mutex<Option<Duration>>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl StubSource {
    pub fn new(domain: Domain) -> Arc<Self> {
        Self::with_data(default_data(domain))
    }

    pub fn with_data(data: SnapshotData) -> Arc<Self> {
        let domain = Snapshot::now(data.clone()).domain();
        Arc::new(Self {
            domain,
            data,
            fail: AtomicBool::new(false),
            panic_next: AtomicBool::new(false),
            delay: parking_lot::Mutex::new(None),
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        })
    }

    pub fn failing(domain: Domain) -> Arc<Self> {
        let source = Self::new(domain);
        source.set_failing(true);
        source
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Panic inside the next fetch only.
    pub fn panic_once(&self) {
        self.panic_next.store(true, Ordering::SeqCst);
    }

    /// Make every fetch take `delay` before answering.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of fetches seen running at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MetricSource for StubSource {
    fn domain(&self) -> Domain {
        self.domain
    }

    fn fetch(&self) -> BoxFuture<'_, SourceResult<Snapshot>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            let _guard = InFlight(&self.in_flight);
            self.max_in_flight.fetch_max(running, Ordering::SeqCst);

            if self.panic_next.swap(false, Ordering::SeqCst) {
                panic!("stub source panicked");
            }
            let delay = *self.delay.lock();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail.load(Ordering::SeqCst) {
                return Err(SourceError::HttpStatus {
                    status: 503,
                    body: "unavailable".to_string(),
                });
            }
            Ok(Snapshot::now(self.data.clone()))
        })
    }
}

pub fn default_data(domain: Domain) -> SnapshotData {
    match domain {
        Domain::Infrastructure => SnapshotData::Infrastructure(vec![InfraService {
            id: "backend-server".to_string(),
            name: "Backend Server".to_string(),
            status: HealthStatus::Healthy,
            region: "linux".to_string(),
            instances: Some(1),
            metadata: Default::default(),
        }]),
        Domain::System => SnapshotData::System(vec![metric("cpu", 12.0)]),
        Domain::CiCd => SnapshotData::CiCd {
            deployments: vec![],
            pipeline: None,
        },
        Domain::Web3 => SnapshotData::Web3(vec![network(20.0)]),
    }
}

pub fn metric(id: &str, value: f64) -> Metric {
    Metric {
        id: id.to_string(),
        name: id.to_string(),
        value,
        unit: "%".to_string(),
        status: HealthStatus::Healthy,
        trend: Trend::Stable,
        timestamp: Utc::now(),
    }
}

pub fn network(average_gwei: f64) -> Web3Network {
    Web3Network {
        status: HealthStatus::Healthy,
        block_number: 100,
        block_time: 12.0,
        gas_price: GasPrice {
            slow: average_gwei * 0.8,
            average: average_gwei,
            fast: average_gwei * 1.2,
        },
        ..Web3Network::offline("ethereum", "Ethereum", 1)
    }
}

/// One stub per domain.
pub fn all_sources() -> (SourceSet, Vec<Arc<StubSource>>) {
    let stubs: Vec<_> = Domain::ALL.into_iter().map(StubSource::new).collect();
    let mut set = SourceSet::new();
    for stub in &stubs {
        set.insert(stub.clone());
    }
    (set, stubs)
}
