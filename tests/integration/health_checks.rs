//! Integration tests for the health aggregator
//!
//! These tests verify that:
//! - A fully healthy system rolls up to HEALTHY
//! - Failing or panicking probes are isolated per component
//! - One degraded component degrades the whole report
//! - The metrics summary and report alerts follow the queue

use std::sync::Arc;

use pretty_assertions::assert_eq;
use queue_monitoring::{
    actors::sampler::SamplerHandle,
    config::{HealthConfig, SamplerConfig},
    health::HealthAggregator,
    monitors::health::HealthStatus,
    sources::{JobState, MemoryQueue},
};

use crate::helpers::*;

#[tokio::test]
async fn test_healthy_system() {
    let aggregator = HealthAggregator::new(sources(healthy_queue().await, 100), None, HealthConfig::default());

    let report = aggregator.check_health().await;

    for component in report.components.iter() {
        assert_eq!(component.status, HealthStatus::Healthy, "{}", component.message);
    }
    assert_eq!(report.status, HealthStatus::Healthy);
    assert_eq!(report.uptime_secs, 3600);
    assert!(report.alerts.is_empty());
}

#[tokio::test]
async fn test_every_probe_panicking_is_unhealthy() {
    let aggregator = HealthAggregator::new(panicking_sources(), None, HealthConfig::default());

    let report = aggregator.check_health().await;

    assert_eq!(report.status, HealthStatus::Unhealthy);
    for component in report.components.iter() {
        assert_eq!(component.status, HealthStatus::Unhealthy, "{}", component.message);
        assert!(component.message.contains("check failed"), "{}", component.message);
    }
    assert_eq!(report.metrics.queue_depth, 0);
    assert!(report.alerts.is_empty());
}

#[tokio::test]
async fn test_single_degraded_component_degrades_report() {
    let mut sources = sources(healthy_queue().await, 100);
    sources.api = Arc::new(FailingApi);
    let aggregator = HealthAggregator::new(sources, None, HealthConfig::default());

    let report = aggregator.check_health().await;

    let api = &report.components.external_api;
    assert_eq!(api.status, HealthStatus::Degraded);
    assert!(api.message.starts_with("External API integration not available"));
    assert_eq!(report.components.queue.status, HealthStatus::Healthy);
    assert_eq!(report.status, HealthStatus::Degraded);
}

#[tokio::test]
async fn test_paused_queue_is_degraded() {
    let queue = healthy_queue().await;
    queue.set_paused(true).await;
    let aggregator = HealthAggregator::new(sources(queue, 100), None, HealthConfig::default());

    let report = aggregator.check_health().await;

    assert_eq!(report.components.queue.status, HealthStatus::Degraded);
    assert_eq!(report.components.queue.message, "Queue is paused");
    assert_eq!(report.status, HealthStatus::Degraded);
}

#[tokio::test]
async fn test_report_alerts_from_queue_counts() {
    let queue = healthy_queue().await;
    for i in 0..51 {
        queue
            .upsert_job(job(&format!("f{i}"), "enrich", JobState::Failed))
            .await;
    }
    let aggregator = HealthAggregator::new(sources(queue, 100), None, HealthConfig::default());

    let report = aggregator.check_health().await;

    assert_eq!(report.alerts, vec!["High failure count: 51 failed jobs".to_string()]);
    assert_eq!(report.metrics.failed_jobs, 51);
}

#[tokio::test]
async fn test_summary_uses_latest_snapshot() {
    let sources = sources(healthy_queue().await, 100);
    let sampler = SamplerHandle::spawn(sources.clone(), SamplerConfig::default());
    sampler.record_job_start("a", "enrich").await.unwrap();
    sampler
        .record_job_complete("a", false, Some("boom".to_string()))
        .await
        .unwrap();
    sampler.collect_now().await.unwrap();

    let aggregator = HealthAggregator::new(sources, Some(sampler.clone()), HealthConfig::default());
    let report = aggregator.check_health().await;

    assert_eq!(report.metrics.error_rate, 100.0);
    assert_eq!(report.metrics.completed_jobs, 1);
    assert_eq!(report.alerts, vec!["High error rate: 100.00%".to_string()]);

    sampler.shutdown().await.unwrap();
}
