//! In-process collaborators
//!
//! `MemoryQueue` holds queue state that the embedding application keeps up to
//! date itself (useful when the queue runs in the same process, and for
//! tests). `DisconnectedCache` stands in for a cache client that was never
//! configured.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{CacheService, JobInfo, JobQueue, JobState, WorkerInfo};
use crate::QueueStats;

#[derive(Debug, Default)]
struct QueueState {
    paused: bool,
    workers: Vec<WorkerInfo>,
    jobs: HashMap<String, JobInfo>,
    /// Finished jobs already removed from `jobs`; only `completed` and `failed` are used
    retired: QueueStats,
}

/// Job queue kept entirely in memory
///
/// Stats are derived from the stored jobs plus the retired counters, so
/// callers only need to upsert jobs as they move through their states.
#[derive(Debug, Clone, Default)]
pub struct MemoryQueue {
    state: Arc<RwLock<QueueState>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn upsert_job(&self, job: JobInfo) {
        self.state.write().await.jobs.insert(job.id.clone(), job);
    }

    /// Drops a job. Finished jobs stay counted as completed or failed, while
    /// a removed waiting, active or delayed job no longer counts at all.
    pub async fn retire_job(&self, id: &str) -> bool {
        let mut state = self.state.write().await;
        let Some(job) = state.jobs.remove(id) else {
            return false;
        };
        match job.state {
            JobState::Completed => state.retired.completed += 1,
            JobState::Failed => state.retired.failed += 1,
            JobState::Waiting | JobState::Active | JobState::Delayed | JobState::Unknown => {}
        }
        true
    }

    pub async fn set_paused(&self, paused: bool) {
        self.state.write().await.paused = paused;
    }

    pub async fn set_workers(&self, workers: Vec<WorkerInfo>) {
        self.state.write().await.workers = workers;
    }
}

#[async_trait]
impl JobQueue for MemoryQueue {
    async fn stats(&self) -> anyhow::Result<QueueStats> {
        let state = self.state.read().await;
        let mut stats = state.retired;
        for job in state.jobs.values() {
            match job.state {
                JobState::Waiting => stats.waiting += 1,
                JobState::Active => stats.active += 1,
                JobState::Delayed => stats.delayed += 1,
                JobState::Completed => stats.completed += 1,
                JobState::Failed => stats.failed += 1,
                JobState::Unknown => {}
            }
        }
        Ok(stats)
    }

    async fn is_paused(&self) -> anyhow::Result<bool> {
        Ok(self.state.read().await.paused)
    }

    async fn workers(&self) -> anyhow::Result<Vec<WorkerInfo>> {
        Ok(self.state.read().await.workers.clone())
    }

    async fn recent_jobs(&self, states: &[JobState], limit: usize) -> anyhow::Result<Vec<JobInfo>> {
        let state = self.state.read().await;
        let mut result = Vec::new();
        for wanted in states {
            let mut jobs: Vec<&JobInfo> = state
                .jobs
                .values()
                .filter(|job| job.state == *wanted)
                .collect();
            jobs.sort_by(|a, b| b.last_activity().cmp(&a.last_activity()));
            result.extend(jobs.into_iter().take(limit).cloned());
        }
        Ok(result)
    }

    async fn job(&self, id: &str) -> anyhow::Result<Option<JobInfo>> {
        Ok(self.state.read().await.jobs.get(id).cloned())
    }
}

/// Cache service placeholder used when no cache client is configured
#[derive(Debug, Clone, Copy, Default)]
pub struct DisconnectedCache;

#[async_trait]
impl CacheService for DisconnectedCache {
    async fn ping(&self) -> anyhow::Result<String> {
        anyhow::bail!("cache client not initialized")
    }

    async fn memory_info(&self) -> anyhow::Result<String> {
        anyhow::bail!("cache client not initialized")
    }

    async fn stats_info(&self) -> anyhow::Result<String> {
        anyhow::bail!("cache client not initialized")
    }
}
