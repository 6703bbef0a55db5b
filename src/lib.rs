pub mod actors;
#[cfg(feature = "api")]
pub mod api;
pub mod config;
pub mod health;
pub mod monitors;
pub mod sources;
pub mod system;
pub mod util;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One sample of queue, process, cache and API state
///
/// Snapshots are immutable once built; the sampler shares them as
/// `Arc<MetricsSnapshot>` between its history and every event subscriber.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub queue: QueueMetrics,
    pub system: SystemMetrics,
    pub cache: CacheMetrics,
    pub rate_limit: RateLimitInfo,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueMetrics {
    /// waiting + active + delayed
    pub depth: u64,
    pub stats: QueueStats,
    pub throughput: Throughput,
    /// Failed share of jobs finished in the last hour, in percent
    pub error_rate: f64,
    /// Successful share of jobs finished in the last hour, in percent
    pub success_rate: f64,
}

/// Raw job counts as reported by the queue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub waiting: u64,
    pub active: u64,
    pub completed: u64,
    pub failed: u64,
    pub delayed: u64,
}

impl QueueStats {
    /// Jobs that still have to be (or are being) processed
    pub fn depth(&self) -> u64 {
        self.waiting + self.active + self.delayed
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Throughput {
    pub jobs_per_minute: u64,
    pub jobs_per_hour: u64,
    pub avg_processing_time_ms: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SystemMetrics {
    pub memory: ProcessMemory,
    pub uptime_secs: u64,
    pub cpu_usage: f32,
}

/// Memory footprint of the monitored process, in bytes
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ProcessMemory {
    /// Resident memory used by the process
    pub used: u64,
    pub virtual_size: u64,
    /// Total memory of the host
    pub system_total: u64,
}

impl ProcessMemory {
    pub fn used_mb(&self) -> f64 {
        util::bytes_to_mb(self.used)
    }
}

/// Cache service counters; everything but `connected` is absent when the
/// service could not be reached.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheMetrics {
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_used: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connected_clients: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ops_per_sec: Option<u64>,
}

impl CacheMetrics {
    pub fn disconnected() -> Self {
        Self::default()
    }
}

/// Rate-limit view of the external API client
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RateLimitInfo {
    /// Configured request budget
    pub requests_per_second: f64,
    pub total_requests: u64,
    /// Requests rejected by the remote side with a rate-limit response
    pub rate_limited_requests: u64,
}

/// Ledger entry for one processed job
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobMetric {
    pub job_id: String,
    pub job_type: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
    pub success: bool,
    pub error: Option<String>,
    pub retries: u32,
}

impl JobMetric {
    pub fn is_finished(&self) -> bool {
        self.finished_at.is_some()
    }
}
