//! Integration tests for the metrics sampler
//!
//! These tests verify that:
//! - Snapshots combine queue, process, cache and rate-limit state
//! - The job ledger feeds throughput and error rate
//! - Metrics events precede threshold breach events
//! - History stays bounded and start/stop are idempotent

use std::time::Duration;

use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use queue_monitoring::{
    actors::{messages::SamplerEvent, sampler::SamplerHandle},
    config::{SamplerConfig, ThresholdsUpdate},
    sources::{JobState, MemoryQueue},
};

use crate::helpers::*;

async fn next_event(rx: &mut tokio::sync::broadcast::Receiver<SamplerEvent>) -> SamplerEvent {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("no sampler event within 2s")
        .expect("sampler channel closed")
}

#[tokio::test]
async fn test_snapshot_combines_all_sources() {
    let queue = MemoryQueue::new();
    queue.upsert_job(job("1", "enrich", JobState::Waiting)).await;
    queue.upsert_job(job("2", "enrich", JobState::Active)).await;
    queue.upsert_job(job("3", "enrich", JobState::Failed)).await;

    let sampler = SamplerHandle::spawn(sources(queue, 128), SamplerConfig::default());
    let snapshot = sampler.collect_now().await.unwrap();

    assert_eq!(snapshot.queue.depth, 2);
    assert_eq!(snapshot.queue.stats.failed, 1);
    assert!(snapshot.cache.connected);
    assert_eq!(snapshot.cache.memory_used, Some(1_048_576));
    assert_eq!(snapshot.cache.connected_clients, Some(3));
    assert_eq!(snapshot.cache.ops_per_sec, Some(12));
    assert_eq!(snapshot.system.memory.used_mb(), 128.0);
    assert_eq!(snapshot.rate_limit.requests_per_second, 1.0);

    let current = sampler.current().await.unwrap().expect("snapshot recorded");
    assert_eq!(current.timestamp, snapshot.timestamp);

    sampler.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_unreachable_cache_yields_disconnected_record() {
    let sampler = SamplerHandle::spawn(disconnected_sources(MemoryQueue::new()), SamplerConfig::default());

    let snapshot = sampler.collect_now().await.unwrap();

    assert!(!snapshot.cache.connected);
    assert_eq!(snapshot.cache.memory_used, None);
    assert_eq!(snapshot.cache.connected_clients, None);

    sampler.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_job_ledger_feeds_throughput() {
    let sampler = SamplerHandle::spawn(sources(MemoryQueue::new(), 100), SamplerConfig::default());
    let mut events = sampler.subscribe();

    sampler.record_job_start("a", "enrich").await.unwrap();
    sampler.record_job_start("b", "enrich").await.unwrap();
    sampler.record_job_retry("b").await.unwrap();
    sampler.record_job_complete("a", true, None).await.unwrap();
    sampler
        .record_job_complete("b", false, Some("timeout".to_string()))
        .await
        .unwrap();

    assert_matches!(next_event(&mut events).await, SamplerEvent::JobComplete(metric) if metric.job_id == "a" && metric.success);
    assert_matches!(next_event(&mut events).await, SamplerEvent::JobComplete(metric) => {
        assert_eq!(metric.job_id, "b");
        assert_eq!(metric.retries, 1);
        assert_eq!(metric.error.as_deref(), Some("timeout"));
    });

    let snapshot = sampler.collect_now().await.unwrap();
    assert_eq!(snapshot.queue.throughput.jobs_per_minute, 2);
    assert_eq!(snapshot.queue.error_rate, 50.0);
    assert_eq!(snapshot.queue.success_rate, 50.0);

    let jobs = sampler.job_metrics(10).await.unwrap();
    assert_eq!(jobs.len(), 2);

    sampler.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_metrics_event_precedes_breach() {
    let queue = MemoryQueue::new();
    queue.upsert_job(job("1", "enrich", JobState::Waiting)).await;

    let sampler = SamplerHandle::spawn(sources(queue, 100), SamplerConfig::default());
    let thresholds = sampler
        .update_thresholds(ThresholdsUpdate {
            queue_depth: Some(0),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(thresholds.queue_depth, 0);
    assert_eq!(thresholds.error_rate, 10.0);

    let mut events = sampler.subscribe();
    sampler.collect_now().await.unwrap();

    assert_matches!(next_event(&mut events).await, SamplerEvent::Metrics(_));
    assert_matches!(next_event(&mut events).await, SamplerEvent::ThresholdBreach { breaches, .. } => {
        assert_eq!(breaches, vec!["Queue depth (1) exceeds threshold (0)".to_string()]);
    });

    sampler.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_history_is_bounded_and_oldest_first() {
    let config = SamplerConfig {
        history_capacity: 3,
        ..Default::default()
    };
    let sampler = SamplerHandle::spawn(sources(MemoryQueue::new(), 100), config);

    let mut taken = Vec::new();
    for _ in 0..5 {
        taken.push(sampler.collect_now().await.unwrap().timestamp);
    }

    let history = sampler.history(10).await.unwrap();
    let timestamps: Vec<_> = history.iter().map(|s| s.timestamp).collect();
    assert_eq!(timestamps, taken[2..].to_vec());

    let last_two = sampler.history(2).await.unwrap();
    assert_eq!(last_two.len(), 2);
    assert_eq!(last_two[1].timestamp, taken[4]);

    sampler.clear_history().await.unwrap();
    assert!(sampler.current().await.unwrap().is_none());

    sampler.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_start_is_idempotent() {
    let sampler = SamplerHandle::spawn(sources(MemoryQueue::new(), 100), SamplerConfig::default());
    let mut events = sampler.subscribe();

    assert!(sampler.start(Duration::from_secs(60)).await.unwrap());
    assert!(!sampler.start(Duration::from_secs(60)).await.unwrap());
    assert!(sampler.is_running().await.unwrap());

    // first tick is immediate
    assert_matches!(next_event(&mut events).await, SamplerEvent::Metrics(_));

    assert!(sampler.stop().await.unwrap());
    assert!(!sampler.stop().await.unwrap());
    assert!(!sampler.is_running().await.unwrap());

    sampler.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_failed_sample_keeps_actor_alive() {
    let mut failing = sources(MemoryQueue::new(), 100);
    failing.runtime = std::sync::Arc::new(FailingRuntime);
    let sampler = SamplerHandle::spawn(failing, SamplerConfig::default());

    let err = sampler.collect_now().await.unwrap_err();
    assert!(format!("{err:#}").contains("failed to sample process resources"));

    // the actor survives a failed tick
    assert!(!sampler.is_running().await.unwrap());
    sampler.shutdown().await.unwrap();
}
