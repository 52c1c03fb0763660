//! # Tests for Handlers
//!
//! Exercise the router end to end with `tower::ServiceExt::oneshot`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::{Body, to_bytes},
    http::{Request, StatusCode, header::AUTHORIZATION},
};
use sea_orm::Database;
use serde_json::Value;
use tower::ServiceExt;

use crate::config::AppConfig;
use crate::jobs::{Job, JobContext, JobError, JobReport};
use crate::scheduler::JobScheduler;
use crate::server::{AppState, create_app};
use crate::trigger::{SystemClock, Trigger};

const TOKEN: &str = "operator-secret";

struct SleepyJob;

#[async_trait]
impl Job for SleepyJob {
    fn name(&self) -> &str {
        "sleepy"
    }
    fn description(&self) -> &str {
        "sleeps for a while"
    }
    async fn run(&self, _ctx: &JobContext) -> Result<JobReport, JobError> {
        tokio::time::sleep(Duration::from_millis(300)).await;
        Ok(JobReport::default())
    }
}

async fn test_state() -> AppState {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    let mut scheduler = JobScheduler::new(Arc::new(SystemClock));
    scheduler
        .register(
            Arc::new(SleepyJob),
            Trigger::Interval(Duration::from_secs(3600)),
            true,
        )
        .unwrap();

    AppState {
        config: Arc::new(AppConfig {
            operator_tokens: vec![TOKEN.to_string()],
            ..AppConfig::default()
        }),
        db,
        scheduler: Arc::new(scheduler),
    }
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(token) = token {
        builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

fn post(uri: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(AUTHORIZATION, format!("Bearer {TOKEN}"))
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_root_returns_service_info() {
    let app = create_app(test_state().await);

    let response = app.oneshot(get("/", None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["service"], "sentinel-jobs");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_healthz_reports_ok() {
    let app = create_app(test_state().await);

    let response = app.oneshot(get("/healthz", None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "ok");
}

#[tokio::test]
async fn test_jobs_require_bearer_token() {
    let app = create_app(test_state().await);

    let response = app.oneshot(get("/jobs", None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "application/problem+json"
    );
    let trace_header = response
        .headers()
        .get("x-trace-id")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    let body = body_json(response).await;
    assert_eq!(body["code"], "UNAUTHORIZED");
    assert_eq!(body["trace_id"], trace_header.as_str());
}

#[tokio::test]
async fn test_jobs_rejects_wrong_token() {
    let app = create_app(test_state().await);

    let response = app.oneshot(get("/jobs", Some("nope"))).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_list_jobs() {
    let app = create_app(test_state().await);

    let response = app.oneshot(get("/jobs", Some(TOKEN))).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let jobs = body["jobs"].as_array().unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0]["name"], "sleepy");
    assert_eq!(jobs[0]["trigger"], "every 1h");
    assert_eq!(jobs[0]["enabled"], true);
    assert_eq!(jobs[0]["running"], false);
}

#[tokio::test]
async fn test_run_unknown_job_is_not_found() {
    let app = create_app(test_state().await);

    let response = app.oneshot(post("/jobs/missing/run")).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_run_job_accepts_then_conflicts_while_running() {
    let app = create_app(test_state().await);

    let first = app.clone().oneshot(post("/jobs/sleepy/run")).await.unwrap();
    assert_eq!(first.status(), StatusCode::ACCEPTED);
    let body = body_json(first).await;
    assert_eq!(body["job"], "sleepy");
    assert!(body["run_id"].as_str().is_some());

    let second = app.oneshot(post("/jobs/sleepy/run")).await.unwrap();
    assert_eq!(second.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(second).await["details"]["job"], "sleepy");
}

#[tokio::test]
async fn test_openapi_document_lists_job_routes() {
    let app = create_app(test_state().await);

    let response = app.oneshot(get("/openapi.json", None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert!(body["paths"]["/jobs"].is_object());
    assert!(body["paths"]["/jobs/{name}/run"].is_object());
}
