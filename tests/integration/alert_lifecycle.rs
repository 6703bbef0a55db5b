//! Integration tests for the alert engine
//!
//! These tests verify that:
//! - Sampler snapshots drive rule evaluation
//! - Cooldowns suppress repeated alerts of one type
//! - Recovery resolves open alerts
//! - Acknowledge/resolve/clear follow the alert lifecycle

use std::time::Duration;

use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use queue_monitoring::{
    actors::{
        alert_engine::AlertEngineHandle,
        messages::AlertEvent,
        sampler::SamplerHandle,
    },
    config::{AlertConfig, SamplerConfig},
    monitors::rules::{AlertLevel, AlertRule, AlertType, default_rules},
    sources::{JobState, MemoryQueue},
};
use tokio::sync::broadcast;

use crate::helpers::*;

async fn next_alert_event(rx: &mut broadcast::Receiver<AlertEvent>) -> AlertEvent {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("no alert event within 2s")
        .expect("alert channel closed")
}

async fn backlog_queue(waiting: usize) -> MemoryQueue {
    let queue = MemoryQueue::new();
    for i in 0..waiting {
        queue
            .upsert_job(job(&format!("j{i}"), "enrich", JobState::Waiting))
            .await;
    }
    queue
}

#[tokio::test]
async fn test_sampler_snapshot_opens_alert() {
    let sampler = SamplerHandle::spawn(sources(backlog_queue(1001).await, 100), SamplerConfig::default());
    let alerts = AlertEngineHandle::spawn(
        &AlertConfig::default(),
        default_rules(Duration::from_secs(300)),
        Some(sampler.subscribe()),
    );
    let mut events = alerts.subscribe();

    sampler.collect_now().await.unwrap();

    assert_matches!(next_alert_event(&mut events).await, AlertEvent::Created(alert) => {
        assert_eq!(alert.alert_type, AlertType::QueueDepth);
        assert_eq!(alert.level, AlertLevel::Warning);
        assert_eq!(alert.message, "Queue depth is 1001 (threshold: 1000)");
        assert!(alert.details.is_some());
    });

    let active = alerts.active().await.unwrap();
    assert_eq!(active.len(), 1);

    alerts.shutdown().await.unwrap();
    sampler.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_cooldown_suppresses_repeats_and_recovery_resolves() {
    let queue = backlog_queue(1001).await;
    let sampler = SamplerHandle::spawn(sources(queue.clone(), 100), SamplerConfig::default());
    let alerts = AlertEngineHandle::spawn(
        &AlertConfig::default(),
        default_rules(Duration::from_secs(300)),
        None,
    );
    let mut events = alerts.subscribe();

    let snapshot = sampler.collect_now().await.unwrap();
    let opened = alerts.check_rules(snapshot.clone()).await.unwrap();
    assert_eq!(opened.len(), 1);

    let repeated = alerts.check_rules(snapshot).await.unwrap();
    assert!(repeated.is_empty());
    assert_eq!(alerts.active().await.unwrap().len(), 1);

    for i in 0..1001 {
        queue
            .upsert_job(job(&format!("j{i}"), "enrich", JobState::Completed))
            .await;
    }
    let recovered = sampler.collect_now().await.unwrap();
    assert!(alerts.check_rules(recovered).await.unwrap().is_empty());

    assert_matches!(next_alert_event(&mut events).await, AlertEvent::Created(_));
    assert_matches!(next_alert_event(&mut events).await, AlertEvent::Resolved(alert) => {
        assert_eq!(alert.id, opened[0].id);
        assert!(alert.is_resolved());
    });
    assert!(alerts.active().await.unwrap().is_empty());

    alerts.shutdown().await.unwrap();
    sampler.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_acknowledge_and_resolve() {
    let alerts = AlertEngineHandle::spawn(&AlertConfig::default(), vec![], None);
    let mut events = alerts.subscribe();

    let alert = alerts
        .create_alert(AlertType::Custom("disk".to_string()), AlertLevel::Error, "Disk almost full", None)
        .await
        .unwrap();
    assert_matches!(next_alert_event(&mut events).await, AlertEvent::Created(_));

    assert!(!alerts.acknowledge("missing").await.unwrap());
    assert!(alerts.acknowledge(&alert.id).await.unwrap());
    assert!(!alerts.acknowledge(&alert.id).await.unwrap());
    assert_matches!(next_alert_event(&mut events).await, AlertEvent::Acknowledged(a) if a.acknowledged);

    assert!(alerts.resolve(&alert.id).await.unwrap());
    assert!(!alerts.resolve(&alert.id).await.unwrap());
    assert!(!alerts.acknowledge(&alert.id).await.unwrap());
    assert_matches!(next_alert_event(&mut events).await, AlertEvent::Resolved(_));

    assert!(alerts.active().await.unwrap().is_empty());
    let history = alerts.history(10).await.unwrap();
    assert_eq!(history.len(), 1);
    assert!(history[0].is_resolved());

    alerts.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_clear_publishes_count() {
    let alerts = AlertEngineHandle::spawn(&AlertConfig::default(), vec![], None);

    alerts.test_alert().await.unwrap();
    alerts.test_alert().await.unwrap();

    let mut events = alerts.subscribe();
    assert_eq!(alerts.clear().await.unwrap(), 2);
    assert_matches!(next_alert_event(&mut events).await, AlertEvent::Cleared { count: 2 });

    assert!(alerts.active().await.unwrap().is_empty());
    assert!(alerts.history(10).await.unwrap().is_empty());

    alerts.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_rule_management() {
    let alerts = AlertEngineHandle::spawn(&AlertConfig::default(), default_rules(Duration::from_secs(60)), None);

    assert_eq!(alerts.rules().await.unwrap().len(), 7);

    let custom = AlertRule::new(
        AlertType::Custom("backlog".to_string()),
        AlertLevel::Info,
        |s| s.queue.depth > 0,
        |s| format!("{} jobs queued", s.queue.depth),
    );
    assert!(!alerts.add_rule(custom).await.unwrap());
    assert_eq!(alerts.rules().await.unwrap().len(), 8);

    assert!(alerts.remove_rule(AlertType::QueueDepth).await.unwrap());
    assert!(!alerts.remove_rule(AlertType::QueueDepth).await.unwrap());
    assert_eq!(alerts.rules().await.unwrap().len(), 6);

    alerts.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_resolved_alerts_are_purged_after_retention() {
    let config = AlertConfig {
        retention_secs: 0,
        ..Default::default()
    };
    let alerts = AlertEngineHandle::spawn(&config, vec![], None);

    let alert = alerts.test_alert().await.unwrap();
    assert_eq!(alerts.purge_resolved().await.unwrap(), 0);

    alerts.resolve(&alert.id).await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(alerts.purge_resolved().await.unwrap(), 1);

    // history keeps the final state
    assert_eq!(alerts.history(10).await.unwrap().len(), 1);

    alerts.shutdown().await.unwrap();
}
