//! Application wiring.
//!
//! Builds the metric sources from configuration, starts the poller, and
//! serves REST plus live updates until a shutdown signal arrives.

use std::future::Future;
use std::sync::Arc;

use opsboard_server::{
    run_server, AlertEvaluator, AppState, Broadcaster, Notifier, Poller,
};
use opsboard_sources::{
    GitHubSource, HostProbe, InfrastructureSource, SourceSet, SystemMetricsSource, VercelClient,
    Web3Source,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::AppConfig;
use crate::error::AppResult;

/// Registered sources plus the handles the REST routes read directly.
pub struct Sources {
    pub set: SourceSet,
    pub host: Arc<HostProbe>,
    pub github: Option<Arc<GitHubSource>>,
}

/// Main application.
pub struct Application {
    config: AppConfig,
    sources: Sources,
    broadcaster: Arc<Broadcaster>,
}

impl Application {
    pub fn new(config: AppConfig) -> AppResult<Self> {
        let sources = build_sources(&config)?;
        let broadcaster = Arc::new(Broadcaster::new(config.server.connection_buffer));

        info!(domains = ?sources.set.domains(), "Metric sources configured");

        Ok(Self {
            config,
            sources,
            broadcaster,
        })
    }

    pub fn sources(&self) -> &SourceSet {
        &self.sources.set
    }

    pub fn broadcaster(&self) -> &Arc<Broadcaster> {
        &self.broadcaster
    }

    /// Run until Ctrl-C.
    pub async fn run(self) -> AppResult<()> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for shutdown signal");
            }
        })
        .await
    }

    /// Run until `signal` resolves or the server stops on its own.
    pub async fn run_until<F>(self, signal: F) -> AppResult<()>
    where
        F: Future<Output = ()>,
    {
        let Self {
            config,
            sources,
            broadcaster,
        } = self;

        let notifier = Notifier::from_config(&config.notifier)?;
        if notifier.is_some() {
            info!("Alert webhooks enabled");
        }

        let poller = Poller::new(
            sources.set.clone(),
            broadcaster.clone(),
            AlertEvaluator::new(config.alerts.clone()),
            config.intervals.clone(),
        )
        .with_notifier(notifier);
        let poller = poller.start();
        info!(domains = poller.domain_count(), "Poller started");

        let shutdown = CancellationToken::new();
        let mut state = AppState::new(sources.set, broadcaster, config.server.max_connections)
            .with_host_probe(sources.host);
        if let Some(github) = sources.github {
            state = state.with_github(github);
        }
        let server_config = config.server.clone();
        let server_shutdown = shutdown.clone();
        let mut server =
            tokio::spawn(async move { run_server(state, &server_config, server_shutdown).await });

        let early_exit = tokio::select! {
            result = &mut server => Some(result),
            () = signal => {
                info!("Shutdown signal received");
                None
            }
        };

        info!("Shutting down");
        poller.stop().await;
        shutdown.cancel();

        let result = match early_exit {
            Some(result) => result,
            None => server.await,
        };
        result??;

        info!("Shutdown complete");
        Ok(())
    }
}

/// Register one source per configured domain.
///
/// Host metrics are always available; the hosted platform, CI/CD and
/// blockchain sources are added only when configured.
pub fn build_sources(config: &AppConfig) -> AppResult<Sources> {
    let probe = Arc::new(HostProbe::new());
    let mut sources = SourceSet::new().with(Arc::new(SystemMetricsSource::new(probe.clone())));

    let mut infrastructure = InfrastructureSource::new(probe.clone());
    if config.vercel.is_enabled() {
        infrastructure = infrastructure.with_vercel(VercelClient::new(config.vercel.clone())?);
    }
    sources.insert(Arc::new(infrastructure));

    let github = if config.github.is_enabled() {
        let github = Arc::new(GitHubSource::new(config.github.clone())?);
        sources.insert(github.clone());
        Some(github)
    } else {
        info!("GitHub repository not configured, CI/CD domain disabled");
        None
    };

    let networks = config.web3.all_networks();
    if networks.is_empty() {
        info!("No blockchain RPC endpoints configured, web3 domain disabled");
    } else {
        sources.insert(Arc::new(Web3Source::new(networks)?));
    }

    Ok(Sources {
        set: sources,
        host: probe,
        github,
    })
}
