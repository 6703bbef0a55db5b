//! Ad hoc threshold checks
//!
//! Two loose checks live next to the rule engine:
//!
//! - the sampler compares every snapshot against [`Thresholds`] and publishes
//!   the breached descriptions as a single event
//! - the health report carries free-text alert strings for a large backlog,
//!   many failed jobs and a high error rate
//!
//! Neither produces lifecycle alerts; those come from [`super::rules`].

use crate::config::{HealthConfig, Thresholds};
use crate::util::format_mb;
use crate::{MetricsSnapshot, QueueStats};

/// Descriptions of every threshold the snapshot exceeds
pub fn sampler_breaches(snapshot: &MetricsSnapshot, thresholds: &Thresholds) -> Vec<String> {
    let mut breaches = Vec::new();
    let queue = &snapshot.queue;

    if queue.depth > thresholds.queue_depth {
        breaches.push(format!(
            "Queue depth ({}) exceeds threshold ({})",
            queue.depth, thresholds.queue_depth
        ));
    }

    if queue.error_rate > thresholds.error_rate {
        breaches.push(format!(
            "Error rate ({:.2}%) exceeds threshold ({}%)",
            queue.error_rate, thresholds.error_rate
        ));
    }

    if queue.throughput.avg_processing_time_ms > thresholds.avg_processing_time_ms {
        breaches.push(format!(
            "Average processing time ({:.0}ms) exceeds threshold ({}ms)",
            queue.throughput.avg_processing_time_ms, thresholds.avg_processing_time_ms
        ));
    }

    let memory = snapshot.system.memory;
    if memory.used_mb() > thresholds.memory_mb {
        breaches.push(format!(
            "Memory usage ({}) exceeds threshold ({}MB)",
            format_mb(memory.used),
            thresholds.memory_mb
        ));
    }

    breaches
}

/// Free-text alerts attached to the health report
///
/// `error_rate` comes from the sampler's latest snapshot and is skipped when
/// no snapshot exists yet.
pub fn report_alerts(stats: &QueueStats, error_rate: Option<f64>, config: &HealthConfig) -> Vec<String> {
    let mut alerts = Vec::new();

    if stats.waiting > config.report_waiting_limit {
        alerts.push(format!("High queue backlog: {} jobs waiting", stats.waiting));
    }

    if stats.failed > config.report_failed_limit {
        alerts.push(format!("High failure count: {} failed jobs", stats.failed));
    }

    if let Some(rate) = error_rate
        && rate > config.report_error_rate
    {
        alerts.push(format!("High error rate: {rate:.2}%"));
    }

    alerts
}
