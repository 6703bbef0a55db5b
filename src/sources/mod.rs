//! Collaborators the monitoring services read from
//!
//! The job queue, the cache service, the external API client and the host
//! process are owned by the surrounding application. The monitoring services
//! only see them through the traits in this module.
//!
//! ## Implementations
//!
//! - **MemoryQueue**: in-process queue state, updated by the embedding application
//! - **DisconnectedCache**: stands in when no cache client is configured
//! - **ApiCounters**: shared success/error counters of an API client
//! - **SysinfoRuntime**: memory, CPU and uptime of the current process
//! - **RedisCache** / **RedisQueue** (feature `redis`): live Redis-backed adapters

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{QueueStats, RateLimitInfo, SystemMetrics};

pub mod api;
pub mod cache_info;
pub mod memory;
pub mod process;
#[cfg(feature = "redis")]
pub mod redis_store;

pub use api::ApiCounters;
pub use memory::{DisconnectedCache, MemoryQueue};
pub use process::SysinfoRuntime;

/// Lifecycle state of a queued job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Waiting,
    Active,
    Delayed,
    Completed,
    Failed,
    Unknown,
}

impl JobState {
    /// Completed and failed jobs never change state again
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Waiting => "waiting",
            JobState::Active => "active",
            JobState::Delayed => "delayed",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A job as seen by the queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobInfo {
    pub id: String,
    pub name: String,
    pub state: JobState,
    /// Free-form progress payload reported by the worker
    pub progress: serde_json::Value,
    pub created_at: Option<DateTime<Utc>>,
    pub processed_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub failed_reason: Option<String>,
    pub attempts: u32,
}

impl JobInfo {
    /// Most recent point in time the job was touched by the queue
    pub fn last_activity(&self) -> Option<DateTime<Utc>> {
        self.finished_at.or(self.processed_at).or(self.created_at)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerInfo {
    pub id: String,
    pub name: Option<String>,
    pub addr: Option<String>,
}

/// Cumulative counters of the external API client
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiMetrics {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub rate_limited_requests: u64,
    pub last_request_at: Option<DateTime<Utc>>,
}

/// Read-only view of the job queue
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Aggregate job counts
    async fn stats(&self) -> anyhow::Result<QueueStats>;

    async fn is_paused(&self) -> anyhow::Result<bool>;

    /// Workers currently connected to the queue
    async fn workers(&self) -> anyhow::Result<Vec<WorkerInfo>>;

    /// Most recent jobs in the given states, at most `limit` per state
    async fn recent_jobs(&self, states: &[JobState], limit: usize) -> anyhow::Result<Vec<JobInfo>>;

    /// A single job with its current state and progress
    async fn job(&self, id: &str) -> anyhow::Result<Option<JobInfo>>;
}

/// Cache/connection service with text introspection
///
/// `memory_info` and `stats_info` return `key:value` lines in the format of
/// the Redis `INFO` command; see [`cache_info`] for the parser.
#[async_trait]
pub trait CacheService: Send + Sync {
    async fn ping(&self) -> anyhow::Result<String>;

    async fn memory_info(&self) -> anyhow::Result<String>;

    async fn stats_info(&self) -> anyhow::Result<String>;
}

#[async_trait]
pub trait ExternalApi: Send + Sync {
    async fn metrics(&self) -> anyhow::Result<ApiMetrics>;

    /// Successful share of all requests, in percent
    async fn success_rate(&self) -> anyhow::Result<f64>;

    fn rate_limit(&self) -> RateLimitInfo;
}

/// Resource counters of the host process
#[async_trait]
pub trait ProcessRuntime: Send + Sync {
    async fn sample(&self) -> anyhow::Result<SystemMetrics>;

    fn uptime_secs(&self) -> u64;
}

/// The four collaborators, shared by the sampler, the health aggregator and the hub
#[derive(Clone)]
pub struct Sources {
    pub queue: Arc<dyn JobQueue>,
    pub cache: Arc<dyn CacheService>,
    pub api: Arc<dyn ExternalApi>,
    pub runtime: Arc<dyn ProcessRuntime>,
}
