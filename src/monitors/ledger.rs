//! Job duration ledger
//!
//! Tracks start/completion of individual jobs and derives rolling throughput
//! and error-rate statistics from the entries that finished in the last
//! minute and hour.
//!
//! The ledger is bounded in two ways: a hard capacity (the entry with the
//! oldest start time is evicted to make room) and an age-based sweep that drops
//! entries started before the retention window.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use tracing::trace;

use crate::JobMetric;

/// Rolling statistics over recently finished jobs
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowStats {
    pub completed_last_minute: u64,
    pub completed_last_hour: u64,
    /// Mean duration of jobs finished in the last hour, 0 when there are none
    pub avg_processing_time_ms: f64,
    pub success_rate: f64,
    pub error_rate: f64,
}

#[derive(Debug)]
pub struct JobLedger {
    jobs: HashMap<String, JobMetric>,
    capacity: usize,
    retention: Duration,
}

impl JobLedger {
    pub fn new(capacity: usize, retention: std::time::Duration) -> Self {
        Self {
            jobs: HashMap::new(),
            capacity: capacity.max(1),
            retention: Duration::from_std(retention).unwrap_or(Duration::hours(24)),
        }
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn get(&self, job_id: &str) -> Option<&JobMetric> {
        self.jobs.get(job_id)
    }

    /// Records the start of a job, replacing any previous entry with the same id
    pub fn start(&mut self, job_id: &str, job_type: &str, now: DateTime<Utc>) {
        if !self.jobs.contains_key(job_id) && self.jobs.len() >= self.capacity {
            self.evict_oldest();
        }

        self.jobs.insert(
            job_id.to_string(),
            JobMetric {
                job_id: job_id.to_string(),
                job_type: job_type.to_string(),
                started_at: now,
                finished_at: None,
                duration_ms: None,
                success: false,
                error: None,
                retries: 0,
            },
        );
    }

    /// Marks a job as finished and returns the updated entry
    ///
    /// Returns `None` for ids that were never started (or already evicted).
    pub fn complete(
        &mut self,
        job_id: &str,
        success: bool,
        error: Option<String>,
        now: DateTime<Utc>,
    ) -> Option<JobMetric> {
        let metric = self.jobs.get_mut(job_id)?;

        let duration = (now - metric.started_at).num_milliseconds().max(0) as u64;
        metric.finished_at = Some(now);
        metric.duration_ms = Some(duration);
        metric.success = success;
        metric.error = error;

        Some(metric.clone())
    }

    pub fn retry(&mut self, job_id: &str) -> bool {
        match self.jobs.get_mut(job_id) {
            Some(metric) => {
                metric.retries += 1;
                true
            }
            None => false,
        }
    }

    pub fn window_stats(&self, now: DateTime<Utc>) -> WindowStats {
        let hour_ago = now - Duration::hours(1);
        let minute_ago = now - Duration::minutes(1);

        let mut completed_last_hour = 0u64;
        let mut completed_last_minute = 0u64;
        let mut successful = 0u64;
        let mut total_duration = 0u64;

        for metric in self.jobs.values() {
            let Some(finished_at) = metric.finished_at else {
                continue;
            };
            if finished_at < hour_ago {
                continue;
            }

            completed_last_hour += 1;
            total_duration += metric.duration_ms.unwrap_or(0);
            if metric.success {
                successful += 1;
            }
            if finished_at >= minute_ago {
                completed_last_minute += 1;
            }
        }

        if completed_last_hour == 0 {
            return WindowStats {
                completed_last_minute: 0,
                completed_last_hour: 0,
                avg_processing_time_ms: 0.0,
                success_rate: 100.0,
                error_rate: 0.0,
            };
        }

        let total = completed_last_hour as f64;
        WindowStats {
            completed_last_minute,
            completed_last_hour,
            avg_processing_time_ms: total_duration as f64 / total,
            success_rate: successful as f64 / total * 100.0,
            error_rate: (completed_last_hour - successful) as f64 / total * 100.0,
        }
    }

    /// Entries ordered by start time, newest first
    pub fn recent(&self, limit: usize) -> Vec<JobMetric> {
        let mut metrics: Vec<&JobMetric> = self.jobs.values().collect();
        metrics.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        metrics.into_iter().take(limit).cloned().collect()
    }

    /// Drops entries started before the retention window, returns how many
    pub fn sweep(&mut self, now: DateTime<Utc>) -> usize {
        let cutoff = now - self.retention;
        let before = self.jobs.len();
        self.jobs.retain(|_, metric| metric.started_at >= cutoff);

        let removed = before - self.jobs.len();
        if removed > 0 {
            trace!("swept {removed} expired job metrics");
        }
        removed
    }

    fn evict_oldest(&mut self) {
        let oldest = self
            .jobs
            .values()
            .min_by_key(|metric| metric.started_at)
            .map(|metric| metric.job_id.clone());

        if let Some(job_id) = oldest {
            trace!("ledger full, evicting job {job_id}");
            self.jobs.remove(&job_id);
        }
    }
}
