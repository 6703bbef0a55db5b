//! Fake collaborators and helper functions for integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use queue_monitoring::{
    ProcessMemory, QueueStats, RateLimitInfo, SystemMetrics,
    actors::messages::Envelope,
    sources::{
        ApiCounters, ApiMetrics, CacheService, DisconnectedCache, ExternalApi, JobInfo, JobQueue,
        JobState, MemoryQueue, ProcessRuntime, Sources, WorkerInfo,
    },
};
use tokio::sync::broadcast;

/// Process runtime reporting a fixed memory footprint
pub struct FakeRuntime {
    pub used_mb: u64,
}

#[async_trait]
impl ProcessRuntime for FakeRuntime {
    async fn sample(&self) -> anyhow::Result<SystemMetrics> {
        Ok(SystemMetrics {
            memory: ProcessMemory {
                used: self.used_mb * 1024 * 1024,
                ..Default::default()
            },
            uptime_secs: 3600,
            cpu_usage: 2.5,
        })
    }

    fn uptime_secs(&self) -> u64 {
        3600
    }
}

/// Cache that answers PONG and reports 1MB in use
pub struct FakeCache;

#[async_trait]
impl CacheService for FakeCache {
    async fn ping(&self) -> anyhow::Result<String> {
        Ok("PONG".to_string())
    }

    async fn memory_info(&self) -> anyhow::Result<String> {
        Ok("# Memory\r\nused_memory:1048576\r\nused_memory_human:1.00M\r\n".to_string())
    }

    async fn stats_info(&self) -> anyhow::Result<String> {
        Ok("# Clients\r\nconnected_clients:3\r\n# Stats\r\ninstantaneous_ops_per_sec:12\r\n".to_string())
    }
}

/// Every call panics
pub struct PanickingQueue;

#[async_trait]
impl JobQueue for PanickingQueue {
    async fn stats(&self) -> anyhow::Result<QueueStats> {
        panic!("queue exploded")
    }

    async fn is_paused(&self) -> anyhow::Result<bool> {
        panic!("queue exploded")
    }

    async fn workers(&self) -> anyhow::Result<Vec<WorkerInfo>> {
        panic!("queue exploded")
    }

    async fn recent_jobs(&self, _states: &[JobState], _limit: usize) -> anyhow::Result<Vec<JobInfo>> {
        panic!("queue exploded")
    }

    async fn job(&self, _id: &str) -> anyhow::Result<Option<JobInfo>> {
        panic!("queue exploded")
    }
}

pub struct PanickingCache;

#[async_trait]
impl CacheService for PanickingCache {
    async fn ping(&self) -> anyhow::Result<String> {
        panic!("cache exploded")
    }

    async fn memory_info(&self) -> anyhow::Result<String> {
        panic!("cache exploded")
    }

    async fn stats_info(&self) -> anyhow::Result<String> {
        panic!("cache exploded")
    }
}

pub struct PanickingApi;

#[async_trait]
impl ExternalApi for PanickingApi {
    async fn metrics(&self) -> anyhow::Result<ApiMetrics> {
        panic!("api exploded")
    }

    async fn success_rate(&self) -> anyhow::Result<f64> {
        panic!("api exploded")
    }

    fn rate_limit(&self) -> RateLimitInfo {
        RateLimitInfo::default()
    }
}

pub struct PanickingRuntime;

#[async_trait]
impl ProcessRuntime for PanickingRuntime {
    async fn sample(&self) -> anyhow::Result<SystemMetrics> {
        panic!("runtime exploded")
    }

    fn uptime_secs(&self) -> u64 {
        0
    }
}

/// Process runtime whose sampling fails
pub struct FailingRuntime;

#[async_trait]
impl ProcessRuntime for FailingRuntime {
    async fn sample(&self) -> anyhow::Result<SystemMetrics> {
        anyhow::bail!("procfs unavailable")
    }

    fn uptime_secs(&self) -> u64 {
        0
    }
}

/// External API whose calls fail
pub struct FailingApi;

#[async_trait]
impl ExternalApi for FailingApi {
    async fn metrics(&self) -> anyhow::Result<ApiMetrics> {
        anyhow::bail!("api client not initialized")
    }

    async fn success_rate(&self) -> anyhow::Result<f64> {
        anyhow::bail!("api client not initialized")
    }

    fn rate_limit(&self) -> RateLimitInfo {
        RateLimitInfo::default()
    }
}

pub fn job(id: &str, name: &str, state: JobState) -> JobInfo {
    let now = Utc::now();
    JobInfo {
        id: id.to_string(),
        name: name.to_string(),
        state,
        progress: serde_json::Value::Null,
        created_at: Some(now),
        processed_at: (state != JobState::Waiting).then_some(now),
        finished_at: state.is_terminal().then_some(now),
        failed_reason: (state == JobState::Failed).then(|| "boom".to_string()),
        attempts: 1,
    }
}

/// A queue with one worker and a fresh scheduler heartbeat
pub async fn healthy_queue() -> MemoryQueue {
    let queue = MemoryQueue::new();
    queue
        .set_workers(vec![WorkerInfo {
            id: "1".to_string(),
            name: Some("enrichment-worker".to_string()),
            addr: Some("127.0.0.1:50000".to_string()),
        }])
        .await;
    queue
        .upsert_job(job("sync-1", "scheduled-sync", JobState::Completed))
        .await;
    queue
}

pub fn sources(queue: MemoryQueue, used_mb: u64) -> Sources {
    Sources {
        queue: Arc::new(queue),
        cache: Arc::new(FakeCache),
        api: Arc::new(ApiCounters::new(1.0)),
        runtime: Arc::new(FakeRuntime { used_mb }),
    }
}

pub fn disconnected_sources(queue: MemoryQueue) -> Sources {
    Sources {
        cache: Arc::new(DisconnectedCache),
        ..sources(queue, 100)
    }
}

pub fn panicking_sources() -> Sources {
    Sources {
        queue: Arc::new(PanickingQueue),
        cache: Arc::new(PanickingCache),
        api: Arc::new(PanickingApi),
        runtime: Arc::new(PanickingRuntime),
    }
}

/// Waits for the first envelope of the given kind
pub async fn next_envelope(rx: &mut broadcast::Receiver<Envelope>, kind: &str) -> Envelope {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let envelope = rx.recv().await.expect("hub channel closed");
            if envelope.kind() == kind {
                return envelope;
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("no {kind} envelope within 2s"))
}
