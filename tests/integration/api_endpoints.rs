//! Integration tests for API endpoints
//!
//! These tests drive the router directly (no socket) and verify that:
//! - Health reports map to 200/503
//! - Metrics and thresholds endpoints reach the sampler
//! - Alert lifecycle endpoints reach the alert engine
//! - Subscription endpoints reach the hub

use std::time::Duration;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode},
};
use pretty_assertions::assert_eq;
use queue_monitoring::{
    api::{ApiState, router},
    config::Config,
    sources::{JobState, MemoryQueue, Sources},
    system::MonitoringSystem,
};
use serde_json::{Value, json};
use tower::ServiceExt;

use crate::helpers::*;

fn app(sources: Sources) -> (Router, MonitoringSystem) {
    let system = MonitoringSystem::start(&Config::default(), sources);
    let state = ApiState::new(system.clone(), Duration::from_secs(60));
    (router(state), system)
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };

    (status, json)
}

#[tokio::test]
async fn test_health_endpoint() {
    let (app, system) = app(sources(healthy_queue().await, 100));

    let (status, body) = send(&app, Method::GET, "/api/v1/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "HEALTHY");
    assert_eq!(body["components"]["queue"]["status"], "HEALTHY");

    system.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_unhealthy_system_returns_503() {
    let (app, system) = app(disconnected_sources(healthy_queue().await));

    let (status, body) = send(&app, Method::GET, "/api/v1/health", None).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "UNHEALTHY");
    assert_eq!(body["components"]["cache"]["status"], "UNHEALTHY");

    system.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_metrics_endpoints() {
    let (app, system) = app(sources(MemoryQueue::new(), 100));

    let (status, body) = send(&app, Method::GET, "/api/v1/metrics", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "no metrics sampled yet");

    system.sampler.collect_now().await.unwrap();
    system.sampler.collect_now().await.unwrap();

    let (status, body) = send(&app, Method::GET, "/api/v1/metrics", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["queue"]["depth"], 0);

    let (status, body) = send(&app, Method::GET, "/api/v1/metrics/history?limit=1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (status, body) = send(&app, Method::GET, "/api/v1/metrics/jobs", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));

    system.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_thresholds_update() {
    let (app, system) = app(sources(MemoryQueue::new(), 100));

    let (status, body) = send(
        &app,
        Method::PUT,
        "/api/v1/metrics/thresholds",
        Some(json!({ "queue_depth": 25 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["queue_depth"], 25);
    assert_eq!(body["error_rate"], 10.0);

    let (status, _) = send(
        &app,
        Method::PUT,
        "/api/v1/metrics/thresholds",
        Some(json!({ "memory_mb": -1.0 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, body) = send(&app, Method::GET, "/api/v1/metrics/thresholds", None).await;
    assert_eq!(body["queue_depth"], 25);
    assert_eq!(body["memory_mb"], 600.0);

    system.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_alert_endpoints() {
    let (app, system) = app(sources(MemoryQueue::new(), 100));

    let (status, alert) = send(&app, Method::POST, "/api/v1/alerts/test", None).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(alert["alert_type"], "test");
    assert_eq!(alert["level"], "info");
    let id = alert["id"].as_str().unwrap().to_string();

    let (_, active) = send(&app, Method::GET, "/api/v1/alerts", None).await;
    assert_eq!(active.as_array().unwrap().len(), 1);

    let uri = format!("/api/v1/alerts/{id}/acknowledge");
    let (status, _) = send(&app, Method::POST, &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, Method::POST, &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(&app, Method::POST, &format!("/api/v1/alerts/{id}/resolve"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["resolved"], id.as_str());

    let (_, history) = send(&app, Method::GET, "/api/v1/alerts/history?limit=5", None).await;
    assert_eq!(history[0]["acknowledged"], true);
    assert!(history[0]["resolved_at"].is_string());

    let (status, body) = send(&app, Method::DELETE, "/api/v1/alerts", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cleared"], 1);

    system.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_rule_endpoints() {
    let (app, system) = app(sources(MemoryQueue::new(), 100));

    let (_, rules) = send(&app, Method::GET, "/api/v1/alerts/rules", None).await;
    assert_eq!(rules.as_array().unwrap().len(), 7);

    let (status, _) = send(&app, Method::DELETE, "/api/v1/alerts/rules/queue_depth", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(&app, Method::DELETE, "/api/v1/alerts/rules/queue_depth", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, rules) = send(&app, Method::GET, "/api/v1/alerts/rules", None).await;
    assert_eq!(rules.as_array().unwrap().len(), 5);

    system.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_subscription_endpoints() {
    let queue = MemoryQueue::new();
    queue.upsert_job(job("42", "enrich", JobState::Active)).await;
    let (app, system) = app(sources(queue, 100));

    let (status, _) = send(&app, Method::POST, "/api/v1/subscriptions/jobs/42", None).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = send(&app, Method::POST, "/api/v1/subscriptions/jobs/42", None).await;
    assert_eq!(status, StatusCode::OK);

    let (_, keys) = send(&app, Method::GET, "/api/v1/subscriptions", None).await;
    assert_eq!(keys, json!(["job:42"]));

    let (status, _) = send(&app, Method::DELETE, "/api/v1/subscriptions/job:42", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(&app, Method::DELETE, "/api/v1/subscriptions/job:42", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(&app, Method::DELETE, "/api/v1/subscriptions/bogus", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "unknown subscription key 'bogus'");

    system.shutdown().await.unwrap();
}
