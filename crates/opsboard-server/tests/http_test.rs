//! REST route tests using `tower::ServiceExt::oneshot`.

mod common;

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::extract::Path;
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Json};
use axum::routing::get as route_get;
use axum::Router;
use chrono::{TimeZone, Utc};
use common::{all_sources, StubSource};
use opsboard_core::Domain;
use opsboard_server::{create_router, AppState, Broadcaster};
use opsboard_sources::{GitHubConfig, GitHubSource, HostProbe, HostReading, SourceSet};
use serde_json::json;
use tokio::net::TcpListener;
use tower::ServiceExt;

async fn get(state: AppState, uri: &str) -> (StatusCode, String) {
    let response = create_router(state)
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(body.to_vec()).unwrap())
}

#[tokio::test]
async fn test_health() {
    let (sources, _) = all_sources();
    let state = AppState::new(sources, Arc::new(Broadcaster::new(8)), 10);

    let (status, body) = get(state, "/api/health").await;
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["connections"], 0);
    assert_eq!(json["domains"].as_array().unwrap().len(), 4);
}

#[tokio::test]
async fn test_snapshot_by_domain() {
    let (sources, _) = all_sources();
    let state = AppState::new(sources, Arc::new(Broadcaster::new(8)), 10);

    let (status, body) = get(state, "/api/snapshot/ci-cd").await;
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["domain"], "ci-cd");
    assert_eq!(json["events"][0]["type"], "deployments");
    assert_eq!(json["events"][1]["type"], "pipeline");
}

#[tokio::test]
async fn test_snapshot_unknown_or_unregistered_domain() {
    let sources = SourceSet::new().with(StubSource::new(Domain::System));
    let state = AppState::new(sources, Arc::new(Broadcaster::new(8)), 10);

    let (status, _) = get(state.clone(), "/api/snapshot/security").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = get(state, "/api/snapshot/web3").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_snapshot_source_failure_is_bad_gateway() {
    let sources = SourceSet::new().with(StubSource::failing(Domain::Web3));
    let state = AppState::new(sources, Arc::new(Broadcaster::new(8)), 10);

    let (status, body) = get(state, "/api/snapshot/web3").await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body.contains("503"));
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let state = AppState::new(SourceSet::new(), Arc::new(Broadcaster::new(8)), 10);
    opsboard_telemetry::Metrics::poll_failed("web3");

    let (status, body) = get(state, "/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("opsboard_poll_failures_total"));
}

fn empty_state() -> AppState {
    AppState::new(SourceSet::new(), Arc::new(Broadcaster::new(8)), 10)
}

#[tokio::test]
async fn test_history_series_with_timestamps() {
    let probe = Arc::new(HostProbe::new());
    let at = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
    for (i, cpu) in [15.0, 25.0].into_iter().enumerate() {
        probe.record(
            &HostReading {
                cpu_percent: cpu,
                memory_percent: 60.0,
                disk_percent: 10.0,
                uptime_secs: 100,
            },
            at + chrono::Duration::seconds(5 * i as i64),
        );
    }
    let state = empty_state().with_host_probe(probe);

    let (status, body) = get(state, "/api/history").await;
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["cpu"].as_array().unwrap().len(), 2);
    assert_eq!(json["cpu"][1]["value"], 25.0);
    assert_eq!(json["cpu"][0]["timestamp"], "2026-03-01T12:00:00Z");
    assert_eq!(json["memory"][1]["value"], 60.0);
    assert_eq!(json["memory"][1]["timestamp"], "2026-03-01T12:00:05Z");
}

#[tokio::test]
async fn test_history_without_probe_is_not_found() {
    let (status, _) = get(empty_state(), "/api/history").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

/// Serves `GET /repos/acme/web/actions/runs/{id}/jobs`; run 500 answers with
/// an upstream error.
async fn mock_github() -> GitHubSource {
    let app = Router::new().route(
        "/repos/acme/web/actions/runs/{id}/jobs",
        route_get(|Path(id): Path<u64>| async move {
            if id == 500 {
                return (StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response();
            }
            Json(json!({
                "total_count": 2,
                "jobs": [
                    {"id": 1, "name": "build", "status": "completed", "conclusion": "success"},
                    {"id": 2, "name": "deploy", "status": "in_progress", "conclusion": null}
                ]
            }))
            .into_response()
        }),
    );
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await });

    GitHubSource::new(GitHubConfig {
        owner: "acme".to_string(),
        repo: "web".to_string(),
        api_url: format!("http://{addr}"),
        ..GitHubConfig::default()
    })
    .unwrap()
}

#[tokio::test]
async fn test_workflow_logs() {
    let state = empty_state().with_github(Arc::new(mock_github().await));

    let (status, body) = get(state, "/api/github/logs/42").await;
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["runId"], 42);
    assert_eq!(
        json["logs"],
        json!([
            "Job: build",
            "Status: completed",
            "Conclusion: success",
            "---",
            "Job: deploy",
            "Status: in_progress",
            "Conclusion: N/A",
            "---"
        ])
    );
}

#[tokio::test]
async fn test_workflow_logs_errors() {
    let state = empty_state().with_github(Arc::new(mock_github().await));

    let (status, body) = get(state.clone(), "/api/github/logs/500").await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body.contains("500"));

    let (status, _) = get(state, "/api/github/logs/latest").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = get(empty_state(), "/api/github/logs/42").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
