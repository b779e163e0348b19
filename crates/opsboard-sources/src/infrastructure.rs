//! Source for the `infrastructure` domain.

use std::sync::Arc;

use opsboard_core::{Domain, Snapshot, SnapshotData};

use crate::error::SourceResult;
use crate::source::{BoxFuture, MetricSource};
use crate::system::HostProbe;
use crate::vercel::VercelClient;

/// Local host plus, when configured, the hosting platform.
pub struct InfrastructureSource {
    probe: Arc<HostProbe>,
    vercel: Option<VercelClient>,
}

impl InfrastructureSource {
    pub fn new(probe: Arc<HostProbe>) -> Self {
        Self {
            probe,
            vercel: None,
        }
    }

    pub fn with_vercel(mut self, client: VercelClient) -> Self {
        self.vercel = Some(client);
        self
    }
}

impl MetricSource for InfrastructureSource {
    fn domain(&self) -> Domain {
        Domain::Infrastructure
    }

    fn fetch(&self) -> BoxFuture<'_, SourceResult<Snapshot>> {
        Box::pin(async move {
            let mut services = vec![self.probe.host_service()];
            if let Some(vercel) = &self.vercel {
                services.extend(vercel.services().await);
            }
            Ok(Snapshot::now(SnapshotData::Infrastructure(services)))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vercel::VercelConfig;
    use opsboard_core::HealthStatus;

    #[tokio::test]
    async fn test_host_only() {
        let source = InfrastructureSource::new(Arc::new(HostProbe::new()));
        let snapshot = tokio_test::assert_ok!(source.fetch().await);

        match snapshot.data {
            SnapshotData::Infrastructure(services) => {
                assert_eq!(services.len(), 1);
                assert_eq!(services[0].id, "backend-server");
            }
            other => panic!("unexpected snapshot data: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unreachable_vercel_reports_offline() {
        let client = VercelClient::new(VercelConfig {
            token: "t".to_string(),
            team_id: None,
            api_url: "http://127.0.0.1:9".to_string(),
        })
        .unwrap();
        let source = InfrastructureSource::new(Arc::new(HostProbe::new())).with_vercel(client);
        let snapshot = tokio_test::assert_ok!(source.fetch().await);

        match snapshot.data {
            SnapshotData::Infrastructure(services) => {
                let ids: Vec<_> = services.iter().map(|s| s.id.as_str()).collect();
                assert_eq!(ids, vec!["backend-server", "vercel-deployments", "vercel-projects"]);
                assert_eq!(services[1].status, HealthStatus::Offline);
                assert_eq!(services[2].status, HealthStatus::Offline);
            }
            other => panic!("unexpected snapshot data: {other:?}"),
        }
    }
}
