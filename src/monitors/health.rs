//! Health verdicts for the probed components
//!
//! The functions here turn raw probe readings into a [`ComponentHealth`]. The
//! probes themselves (I/O, timeouts, panics) live in [`crate::health`].

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::config::HealthConfig;
use crate::sources::{ApiMetrics, JobInfo};
use crate::util::{bytes_to_mb, format_mb};
use crate::{MetricsSnapshot, ProcessMemory, QueueStats};

/// Ordered from best to worst, so the rollup is a plain `max`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HealthStatus::Healthy => "HEALTHY",
            HealthStatus::Degraded => "DEGRADED",
            HealthStatus::Unhealthy => "UNHEALTHY",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: HealthStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    pub last_check: DateTime<Utc>,
}

impl ComponentHealth {
    pub fn new(status: HealthStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            details: None,
            last_check: Utc::now(),
        }
    }

    pub fn healthy(message: impl Into<String>) -> Self {
        Self::new(HealthStatus::Healthy, message)
    }

    pub fn degraded(message: impl Into<String>) -> Self {
        Self::new(HealthStatus::Degraded, message)
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self::new(HealthStatus::Unhealthy, message)
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Verdict for a probe that returned an error, panicked or timed out
    pub fn failed(component: &str, error: impl fmt::Display) -> Self {
        Self::unhealthy(format!("{component} check failed: {error}"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Components {
    pub queue: ComponentHealth,
    pub cache: ComponentHealth,
    pub workers: ComponentHealth,
    pub external_api: ComponentHealth,
    pub memory: ComponentHealth,
}

impl Components {
    pub fn iter(&self) -> impl Iterator<Item = &ComponentHealth> {
        [
            &self.queue,
            &self.cache,
            &self.workers,
            &self.external_api,
            &self.memory,
        ]
        .into_iter()
    }

    /// Worst status among the components
    pub fn rollup(&self) -> HealthStatus {
        rollup(self.iter().map(|c| c.status))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSummary {
    pub queue_depth: u64,
    pub active_jobs: u64,
    pub failed_jobs: u64,
    pub completed_jobs: u64,
    pub error_rate: f64,
    pub avg_processing_time_ms: f64,
}

impl MetricsSummary {
    pub fn from_snapshot(snapshot: &MetricsSnapshot) -> Self {
        let queue = &snapshot.queue;
        Self {
            queue_depth: queue.depth,
            active_jobs: queue.stats.active,
            failed_jobs: queue.stats.failed,
            completed_jobs: queue.stats.completed,
            error_rate: queue.error_rate,
            avg_processing_time_ms: queue.throughput.avg_processing_time_ms,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemHealthReport {
    pub status: HealthStatus,
    pub timestamp: DateTime<Utc>,
    pub uptime_secs: u64,
    pub components: Components,
    pub metrics: MetricsSummary,
    pub alerts: Vec<String>,
}

/// HEALTHY only when every status is HEALTHY, otherwise the worst one
pub fn rollup(statuses: impl IntoIterator<Item = HealthStatus>) -> HealthStatus {
    statuses.into_iter().max().unwrap_or(HealthStatus::Healthy)
}

pub fn queue_health(stats: &QueueStats, paused: bool, config: &HealthConfig) -> ComponentHealth {
    let depth = stats.depth();
    let details = json!({
        "waiting": stats.waiting,
        "active": stats.active,
        "completed": stats.completed,
        "failed": stats.failed,
        "delayed": stats.delayed,
        "depth": depth,
        "paused": paused,
    });

    let health = if paused {
        ComponentHealth::degraded("Queue is paused")
    } else if depth > config.queue_depth_limit {
        ComponentHealth::degraded(format!(
            "High queue depth: {depth} jobs (threshold: {})",
            config.queue_depth_limit
        ))
    } else if stats.failed > config.failed_jobs_limit {
        ComponentHealth::degraded(format!(
            "High failed job count: {} (threshold: {})",
            stats.failed, config.failed_jobs_limit
        ))
    } else {
        ComponentHealth::healthy(format!("Queue is healthy with {depth} queued jobs"))
    };

    health.with_details(details)
}

/// `ping` is the raw ping reply, `memory_used` the parsed `used_memory` field
pub fn cache_health(ping: &str, memory_used: Option<u64>, config: &HealthConfig) -> ComponentHealth {
    if ping.trim() != "PONG" {
        return ComponentHealth::unhealthy(format!("Unexpected ping response: {ping}"));
    }

    let Some(memory_used) = memory_used else {
        return ComponentHealth::healthy("Cache is connected");
    };

    let details = json!({ "memory_used": memory_used });
    if bytes_to_mb(memory_used) > config.cache_memory_limit_mb {
        ComponentHealth::degraded(format!("High cache memory usage: {}", format_mb(memory_used)))
            .with_details(details)
    } else {
        ComponentHealth::healthy(format!("Cache is connected, using {}", format_mb(memory_used)))
            .with_details(details)
    }
}

pub fn worker_health(worker_count: usize, paused: bool) -> ComponentHealth {
    let details = json!({ "workers": worker_count, "paused": paused });

    let health = if worker_count == 0 {
        ComponentHealth::degraded("No active workers detected")
    } else if paused {
        ComponentHealth::degraded(format!("{worker_count} workers connected but the queue is paused"))
    } else {
        ComponentHealth::healthy(format!("{worker_count} active workers"))
    };

    health.with_details(details)
}

pub fn api_health(
    success_rate: f64,
    metrics: &ApiMetrics,
    heartbeat_seen: bool,
    config: &HealthConfig,
) -> ComponentHealth {
    let details = json!({
        "success_rate": success_rate,
        "total_requests": metrics.total_requests,
        "failed_requests": metrics.failed_requests,
        "rate_limited_requests": metrics.rate_limited_requests,
        "scheduler_active": heartbeat_seen,
    });

    let health = if !heartbeat_seen {
        ComponentHealth::degraded(format!(
            "No {} job ran within the last {} minutes",
            config.scheduler_job_name,
            config.scheduler_window_secs / 60
        ))
    } else if success_rate < config.api_success_rate_min {
        ComponentHealth::degraded(format!("Low API success rate: {success_rate:.2}%"))
    } else if metrics.failed_requests > config.api_error_limit {
        ComponentHealth::degraded(format!("High API error count: {}", metrics.failed_requests))
    } else {
        ComponentHealth::healthy(format!("External API is healthy ({success_rate:.2}% success rate)"))
    };

    health.with_details(details)
}

/// Verdict when the API integration could not be inspected at all
pub fn api_unavailable(error: impl fmt::Display) -> ComponentHealth {
    ComponentHealth::degraded(format!("External API integration not available: {error}"))
}

pub fn memory_health(memory: &ProcessMemory, config: &HealthConfig) -> ComponentHealth {
    let used_mb = memory.used_mb();
    let usage = format!("Memory usage: {}", format_mb(memory.used));
    let details = json!({
        "used": memory.used,
        "virtual_size": memory.virtual_size,
        "system_total": memory.system_total,
    });

    let health = if used_mb > config.memory_unhealthy_mb {
        ComponentHealth::unhealthy(usage)
    } else if used_mb > config.memory_degraded_mb {
        ComponentHealth::degraded(usage)
    } else {
        ComponentHealth::healthy(usage)
    };

    health.with_details(details)
}

/// Whether the scheduler's heartbeat job was active within the window
pub fn scheduler_heartbeat(jobs: &[JobInfo], job_name: &str, window: Duration, now: DateTime<Utc>) -> bool {
    let since = now - window;
    jobs.iter()
        .filter(|job| job.name == job_name)
        .filter_map(JobInfo::last_activity)
        .any(|at| at >= since)
}
