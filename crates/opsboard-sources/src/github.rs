//! GitHub Actions client for the `ci-cd` domain.
//!
//! Recent workflow runs become [`Deployment`]s; the jobs of the most recent
//! run become the stages of the current [`Pipeline`].

use std::time::Duration;

use chrono::{DateTime, Utc};
use opsboard_core::{
    Deployment, Domain, Pipeline, PipelineStage, RunStatus, Snapshot, SnapshotData,
};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{SourceError, SourceResult};
use crate::source::{BoxFuture, MetricSource};

/// Default timeout for API requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Workflow runs requested per poll.
const RUNS_PER_PAGE: u32 = 10;

/// GitHub repository configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    /// Personal access token. Empty for public repositories.
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub repo: String,
    #[serde(default = "default_api_url")]
    pub api_url: String,
}

fn default_api_url() -> String {
    "https://api.github.com".to_string()
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            owner: String::new(),
            repo: String::new(),
            api_url: default_api_url(),
        }
    }
}

impl GitHubConfig {
    pub fn is_enabled(&self) -> bool {
        !self.owner.is_empty() && !self.repo.is_empty()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawActor {
    pub login: String,
}

/// Workflow run as returned by `GET /repos/{owner}/{repo}/actions/runs`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawRun {
    pub id: u64,
    #[serde(default)]
    pub name: Option<String>,
    pub status: Option<String>,
    #[serde(default)]
    pub conclusion: Option<String>,
    #[serde(default)]
    pub head_branch: Option<String>,
    pub head_sha: String,
    #[serde(default)]
    pub actor: Option<RawActor>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Job as returned by `GET .../actions/runs/{id}/jobs`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawJob {
    pub id: u64,
    pub name: String,
    pub status: Option<String>,
    #[serde(default)]
    pub conclusion: Option<String>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct RunsResponse {
    #[serde(default)]
    workflow_runs: Vec<RawRun>,
}

#[derive(Debug, Deserialize)]
struct JobsResponse {
    #[serde(default)]
    jobs: Vec<RawJob>,
}

/// GitHub Actions source.
pub struct GitHubSource {
    client: Client,
    config: GitHubConfig,
}

impl GitHubSource {
    pub fn new(config: GitHubConfig) -> SourceResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("opsboard"));
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );

        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .default_headers(headers)
            .build()
            .map_err(|e| SourceError::HttpClient(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { client, config })
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, path: &str) -> SourceResult<T> {
        let url = format!(
            "{}/repos/{}/{}/{}",
            self.config.api_url, self.config.owner, self.config.repo, path
        );
        let mut request = self.client.get(&url);
        if !self.config.token.is_empty() {
            request = request.bearer_auth(&self.config.token);
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
            .map_err(|e| SourceError::Parse(format!("GitHub {path}: {e}")))
    }

    pub async fn fetch_runs(&self) -> SourceResult<Vec<RawRun>> {
        let body: RunsResponse = self
            .get(&format!("actions/runs?per_page={RUNS_PER_PAGE}"))
            .await?;
        Ok(body.workflow_runs)
    }

    pub async fn fetch_jobs(&self, run_id: u64) -> SourceResult<Vec<RawJob>> {
        let body: JobsResponse = self.get(&format!("actions/runs/{run_id}/jobs")).await?;
        Ok(body.jobs)
    }

    /// Plain-text job summary of one workflow run.
    pub async fn workflow_logs(&self, run_id: u64) -> SourceResult<Vec<String>> {
        let jobs = self.fetch_jobs(run_id).await?;
        debug!(run_id, jobs = jobs.len(), "Fetched workflow jobs for logs");
        Ok(job_log_lines(&jobs))
    }
}

impl MetricSource for GitHubSource {
    fn domain(&self) -> Domain {
        Domain::CiCd
    }

    fn fetch(&self) -> BoxFuture<'_, SourceResult<Snapshot>> {
        Box::pin(async move {
            let runs = self.fetch_runs().await?;
            let deployments: Vec<Deployment> = runs.iter().map(deployment_from_run).collect();

            let pipeline = match runs.first() {
                Some(latest) => match self.fetch_jobs(latest.id).await {
                    Ok(jobs) => Some(pipeline_from_run(latest, &jobs)),
                    Err(e) => {
                        warn!(run_id = latest.id, error = %e, "Failed to fetch pipeline jobs");
                        None
                    }
                },
                None => None,
            };

            debug!(
                runs = deployments.len(),
                has_pipeline = pipeline.is_some(),
                "Fetched GitHub Actions runs"
            );

            Ok(Snapshot::now(SnapshotData::CiCd {
                deployments,
                pipeline,
            }))
        })
    }
}

fn short_sha(sha: &str) -> String {
    sha.chars().take(7).collect()
}

fn elapsed_secs(start: DateTime<Utc>, end: Option<DateTime<Utc>>) -> Option<u64> {
    end.map(|end| (end - start).num_seconds().max(0) as u64)
}

fn run_status(status: Option<&str>, conclusion: Option<&str>) -> RunStatus {
    RunStatus::from_github(status.unwrap_or("queued"), conclusion)
}

pub fn deployment_from_run(run: &RawRun) -> Deployment {
    let branch = run
        .head_branch
        .clone()
        .unwrap_or_else(|| "unknown".to_string());

    Deployment {
        id: run.id.to_string(),
        name: run
            .name
            .clone()
            .unwrap_or_else(|| "Unnamed Workflow".to_string()),
        status: run_status(run.status.as_deref(), run.conclusion.as_deref()),
        environment: branch.clone(),
        branch,
        commit: short_sha(&run.head_sha),
        author: author(run),
        timestamp: run.created_at,
        duration: elapsed_secs(run.created_at, run.updated_at),
    }
}

pub fn pipeline_from_run(run: &RawRun, jobs: &[RawJob]) -> Pipeline {
    let stages = jobs
        .iter()
        .map(|job| PipelineStage {
            id: job.id.to_string(),
            name: job.name.clone(),
            status: run_status(job.status.as_deref(), job.conclusion.as_deref()).into(),
            duration: job
                .started_at
                .and_then(|start| elapsed_secs(start, job.completed_at)),
        })
        .collect();

    Pipeline {
        id: run.id.to_string(),
        name: run
            .name
            .clone()
            .unwrap_or_else(|| "Unnamed Pipeline".to_string()),
        branch: run
            .head_branch
            .clone()
            .unwrap_or_else(|| "unknown".to_string()),
        commit: short_sha(&run.head_sha),
        author: author(run),
        status: run_status(run.status.as_deref(), run.conclusion.as_deref()),
        stages,
        timestamp: run.created_at,
    }
}

/// Four lines per job: name, status, conclusion and a separator.
pub fn job_log_lines(jobs: &[RawJob]) -> Vec<String> {
    jobs.iter()
        .flat_map(|job| {
            [
                format!("Job: {}", job.name),
                format!("Status: {}", job.status.as_deref().unwrap_or("unknown")),
                format!("Conclusion: {}", job.conclusion.as_deref().unwrap_or("N/A")),
                "---".to_string(),
            ]
        })
        .collect()
}

fn author(run: &RawRun) -> String {
    run.actor
        .as_ref()
        .map(|a| a.login.clone())
        .unwrap_or_else(|| "unknown".to_string())
}
