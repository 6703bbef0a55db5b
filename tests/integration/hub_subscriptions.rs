//! Integration tests for the broadcast hub
//!
//! These tests verify that:
//! - Each subscription kind produces its envelopes
//! - Subscriptions are keyed and idempotent
//! - Job subscriptions end on their own at a terminal state
//! - Alert lifecycle events reach hub listeners

use std::time::Duration;

use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use queue_monitoring::{
    actors::messages::{AlertEvent, SubscriptionKey, Update},
    config::Config,
    sources::{JobState, MemoryQueue},
    system::MonitoringSystem,
};

use crate::helpers::*;

const FAST: Duration = Duration::from_millis(20);

async fn wait_for_subscriptions(system: &MonitoringSystem, expected: usize) -> Vec<SubscriptionKey> {
    for _ in 0..100 {
        let keys = system.hub.active_subscriptions().await.unwrap();
        if keys.len() == expected {
            return keys;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("expected {expected} subscriptions");
}

#[tokio::test]
async fn test_queue_status_envelopes() {
    let queue = MemoryQueue::new();
    queue.upsert_job(job("1", "enrich", JobState::Waiting)).await;
    queue.set_paused(true).await;
    let system = MonitoringSystem::start(&Config::default(), sources(queue, 100));
    let mut rx = system.hub.subscribe();

    assert!(system.hub.subscribe_to_queue_status(FAST).await.unwrap());

    let envelope = next_envelope(&mut rx, "queue-status").await;
    assert_matches!(envelope.update, Update::QueueStatus(status) => {
        assert_eq!(status.depth, 1);
        assert!(status.paused);
        assert_eq!(status.rate_limit.requests_per_second, 1.0);
    });

    system.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_subscriptions_are_keyed() {
    let system = MonitoringSystem::start(&Config::default(), sources(healthy_queue().await, 100));

    assert!(system.hub.subscribe_to_queue_status(FAST).await.unwrap());
    assert!(!system.hub.subscribe_to_queue_status(FAST).await.unwrap());
    assert!(system.hub.subscribe_to_health_status(Duration::from_secs(60)).await.unwrap());

    let keys = system.hub.active_subscriptions().await.unwrap();
    assert_eq!(keys, vec![SubscriptionKey::QueueStatus, SubscriptionKey::HealthStatus]);

    assert!(system.hub.unsubscribe(SubscriptionKey::QueueStatus).await.unwrap());
    assert!(!system.hub.unsubscribe(SubscriptionKey::QueueStatus).await.unwrap());
    assert!(!system.hub.unsubscribe(SubscriptionKey::Metrics).await.unwrap());

    assert_eq!(system.hub.unsubscribe_all().await.unwrap(), 1);
    assert!(system.hub.active_subscriptions().await.unwrap().is_empty());

    system.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_health_status_envelopes() {
    let system = MonitoringSystem::start(&Config::default(), sources(healthy_queue().await, 100));
    let mut rx = system.hub.subscribe();

    system.hub.subscribe_to_health_status(Duration::from_secs(60)).await.unwrap();

    let envelope = next_envelope(&mut rx, "health-update").await;
    assert_matches!(envelope.update, Update::HealthUpdate(report) => {
        assert_eq!(report.components.queue.message, "Queue is healthy with 0 queued jobs");
    });

    system.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_metrics_subscription_drives_sampler() {
    let system = MonitoringSystem::start(&Config::default(), sources(MemoryQueue::new(), 100));
    let mut rx = system.hub.subscribe();

    assert!(system.hub.subscribe_to_metrics(Duration::from_secs(60)).await.unwrap());
    assert!(system.sampler.is_running().await.unwrap());

    let envelope = next_envelope(&mut rx, "metrics").await;
    assert_matches!(envelope.update, Update::Metrics(snapshot) => {
        assert_eq!(snapshot.queue.depth, 0);
    });

    assert!(system.hub.unsubscribe(SubscriptionKey::Metrics).await.unwrap());
    assert!(!system.sampler.is_running().await.unwrap());

    system.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_job_subscription_ends_at_terminal_state() {
    let queue = MemoryQueue::new();
    queue.upsert_job(job("42", "enrich", JobState::Active)).await;
    let system = MonitoringSystem::start(&Config::default(), sources(queue.clone(), 100));
    let mut rx = system.hub.subscribe();

    assert!(system.hub.subscribe_to_job("42", FAST).await.unwrap());

    let envelope = next_envelope(&mut rx, "job-update").await;
    assert_matches!(envelope.update, Update::JobUpdate(update) => {
        assert_eq!(update.job_id, "42");
        assert_eq!(update.state, JobState::Active);
    });

    queue.upsert_job(job("42", "enrich", JobState::Failed)).await;

    loop {
        let envelope = next_envelope(&mut rx, "job-update").await;
        let Update::JobUpdate(update) = envelope.update else {
            unreachable!()
        };
        if update.state == JobState::Failed {
            assert_eq!(update.failed_reason.as_deref(), Some("boom"));
            break;
        }
    }

    wait_for_subscriptions(&system, 0).await;

    system.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_unknown_job_subscription_ends() {
    let system = MonitoringSystem::start(&Config::default(), sources(MemoryQueue::new(), 100));

    assert!(system.hub.subscribe_to_job("missing", FAST).await.unwrap());
    wait_for_subscriptions(&system, 0).await;

    // a finished key can be subscribed again
    assert!(system.hub.subscribe_to_job("missing", Duration::from_secs(60)).await.unwrap());

    system.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_alert_events_are_relayed() {
    let system = MonitoringSystem::start(&Config::default(), sources(MemoryQueue::new(), 100));
    let mut rx = system.hub.subscribe();

    let alert = system.alerts.test_alert().await.unwrap();

    let envelope = next_envelope(&mut rx, "alert").await;
    assert_matches!(envelope.update, Update::Alert(AlertEvent::Created(created)) => {
        assert_eq!(created.id, alert.id);
    });

    assert!(system.alerts.acknowledge(&alert.id).await.unwrap());
    let envelope = next_envelope(&mut rx, "alert").await;
    let json = serde_json::to_value(&envelope).unwrap();
    assert_eq!(json["type"], "alert");
    assert_eq!(json["data"]["event"], "acknowledged");
    assert_eq!(json["data"]["alert"]["id"], alert.id.as_str());
    assert!(json["timestamp"].is_string());

    system.shutdown().await.unwrap();
}
