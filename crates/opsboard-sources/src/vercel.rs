//! Vercel REST client.
//!
//! Summarizes recent deployments and projects as infrastructure services.

use std::collections::BTreeMap;
use std::time::Duration;

use opsboard_core::{HealthStatus, InfraService};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{SourceError, SourceResult};

/// Default timeout for API requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Deployments older than this are ignored when computing health.
const RECENT_WINDOW_MS: i64 = 24 * 60 * 60 * 1000;

/// Deployments requested per poll.
const DEPLOYMENT_LIMIT: u32 = 20;

/// Vercel API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VercelConfig {
    /// API token (empty = disabled).
    #[serde(default)]
    pub token: String,
    /// Optional team scope.
    #[serde(default)]
    pub team_id: Option<String>,
    #[serde(default = "default_api_url")]
    pub api_url: String,
}

fn default_api_url() -> String {
    "https://api.vercel.com".to_string()
}

impl Default for VercelConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            team_id: None,
            api_url: default_api_url(),
        }
    }
}

impl VercelConfig {
    pub fn is_enabled(&self) -> bool {
        !self.token.is_empty()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct VercelDeployment {
    pub uid: String,
    pub name: String,
    #[serde(default)]
    pub state: Option<String>,
    /// Creation time (Unix milliseconds).
    pub created: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VercelProject {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct DeploymentsResponse {
    #[serde(default)]
    deployments: Vec<VercelDeployment>,
}

#[derive(Debug, Deserialize)]
struct ProjectsResponse {
    #[serde(default)]
    projects: Vec<VercelProject>,
}

/// Client for the Vercel REST API.
pub struct VercelClient {
    client: Client,
    config: VercelConfig,
}

impl VercelClient {
    pub fn new(config: VercelConfig) -> SourceResult<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| SourceError::HttpClient(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, path: &str) -> SourceResult<T> {
        let url = format!("{}{}", self.config.api_url, path);
        let mut request = self.client.get(&url).bearer_auth(&self.config.token);
        if let Some(team_id) = &self.config.team_id {
            request = request.query(&[("teamId", team_id)]);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json()
            .await
            .map_err(|e| SourceError::Parse(format!("Vercel {path}: {e}")))
    }

    pub async fn fetch_deployments(&self, limit: u32) -> SourceResult<Vec<VercelDeployment>> {
        let body: DeploymentsResponse = self.get(&format!("/v6/deployments?limit={limit}")).await?;
        debug!(count = body.deployments.len(), "Fetched Vercel deployments");
        Ok(body.deployments)
    }

    pub async fn fetch_projects(&self) -> SourceResult<Vec<VercelProject>> {
        let body: ProjectsResponse = self.get("/v9/projects").await?;
        Ok(body.projects)
    }

    /// Both Vercel services. A failed call reports its service offline.
    pub async fn services(&self) -> Vec<InfraService> {
        let (deployments, projects) = tokio::join!(
            self.fetch_deployments(DEPLOYMENT_LIMIT),
            self.fetch_projects()
        );

        let deployments = match deployments {
            Ok(list) => summarize_deployments(&list, chrono::Utc::now().timestamp_millis()),
            Err(e) => {
                tracing::warn!(error = %e, "Vercel deployments unavailable");
                offline_service("vercel-deployments", "Vercel Deployments")
            }
        };
        let projects = match projects {
            Ok(list) => summarize_projects(&list),
            Err(e) => {
                tracing::warn!(error = %e, "Vercel projects unavailable");
                offline_service("vercel-projects", "Vercel Projects")
            }
        };

        vec![deployments, projects]
    }
}

/// Health of deployments created within the last 24 hours of `now_ms`.
pub fn summarize_deployments(deployments: &[VercelDeployment], now_ms: i64) -> InfraService {
    let recent: Vec<_> = deployments
        .iter()
        .filter(|d| now_ms - d.created < RECENT_WINDOW_MS)
        .collect();
    let ready = recent
        .iter()
        .filter(|d| d.state.as_deref() == Some("READY"))
        .count();
    let errors = recent
        .iter()
        .filter(|d| d.state.as_deref() == Some("ERROR"))
        .count();

    let status = match errors {
        0 => HealthStatus::Healthy,
        1..=2 => HealthStatus::Warning,
        _ => HealthStatus::Critical,
    };

    let mut metadata = BTreeMap::new();
    metadata.insert("total".to_string(), recent.len().into());
    metadata.insert("ready".to_string(), ready.into());
    metadata.insert("error".to_string(), errors.into());

    InfraService {
        id: "vercel-deployments".to_string(),
        name: "Vercel Deployments".to_string(),
        status,
        region: "global".to_string(),
        instances: Some(ready as u32),
        metadata,
    }
}

pub fn summarize_projects(projects: &[VercelProject]) -> InfraService {
    let mut metadata = BTreeMap::new();
    metadata.insert("total".to_string(), projects.len().into());

    InfraService {
        id: "vercel-projects".to_string(),
        name: "Vercel Projects".to_string(),
        status: if projects.is_empty() {
            HealthStatus::Warning
        } else {
            HealthStatus::Healthy
        },
        region: "global".to_string(),
        instances: Some(projects.len() as u32),
        metadata,
    }
}

fn offline_service(id: &str, name: &str) -> InfraService {
    InfraService {
        id: id.to_string(),
        name: name.to_string(),
        status: HealthStatus::Offline,
        region: "global".to_string(),
        instances: Some(0),
        metadata: BTreeMap::new(),
    }
}
