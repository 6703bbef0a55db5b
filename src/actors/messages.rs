//! Message types for actor communication
//!
//! ## Design Principles
//!
//! 1. **Commands**: Request/response messages sent to specific actors via mpsc
//! 2. **Events**: Broadcast notifications published to multiple subscribers
//! 3. **Immutability**: Events are cloneable; snapshots are shared as `Arc`

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::oneshot;

use crate::config::{Thresholds, ThresholdsUpdate};
use crate::monitors::alerts::Alert;
use crate::monitors::health::SystemHealthReport;
use crate::monitors::rules::{AlertLevel, AlertRule, AlertType, RuleInfo};
use crate::sources::{JobInfo, JobState};
use crate::{JobMetric, MetricsSnapshot, QueueStats, RateLimitInfo};

/// Events published by the metrics sampler
///
/// Within one tick, `Metrics` is always published before `ThresholdBreach`.
#[derive(Debug, Clone)]
pub enum SamplerEvent {
    Metrics(Arc<MetricsSnapshot>),

    /// At least one ad hoc threshold was exceeded by the latest snapshot
    ThresholdBreach {
        timestamp: DateTime<Utc>,
        breaches: Vec<String>,
    },

    JobComplete(JobMetric),
}

/// Commands that can be sent to the MetricsSamplerActor
#[derive(Debug)]
pub enum SamplerCommand {
    /// Start periodic sampling; answers `false` when already running
    Start {
        interval: Duration,
        respond_to: oneshot::Sender<bool>,
    },

    /// Stop periodic sampling; answers whether it was running
    Stop { respond_to: oneshot::Sender<bool> },

    /// Sample once, outside the timer
    CollectNow {
        respond_to: oneshot::Sender<anyhow::Result<Arc<MetricsSnapshot>>>,
    },

    RecordJobStart { job_id: String, job_type: String },

    RecordJobComplete {
        job_id: String,
        success: bool,
        error: Option<String>,
    },

    RecordJobRetry { job_id: String },

    GetCurrent {
        respond_to: oneshot::Sender<Option<Arc<MetricsSnapshot>>>,
    },

    /// The last `limit` snapshots, oldest first
    GetHistory {
        limit: usize,
        respond_to: oneshot::Sender<Vec<Arc<MetricsSnapshot>>>,
    },

    /// Ledger entries, newest first
    GetJobMetrics {
        limit: usize,
        respond_to: oneshot::Sender<Vec<JobMetric>>,
    },

    UpdateThresholds {
        update: ThresholdsUpdate,
        respond_to: oneshot::Sender<Thresholds>,
    },

    GetThresholds { respond_to: oneshot::Sender<Thresholds> },

    ClearHistory,

    IsRunning { respond_to: oneshot::Sender<bool> },

    Shutdown,
}

/// Alert lifecycle notifications
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "alert", rename_all = "snake_case")]
pub enum AlertEvent {
    Created(Alert),
    Acknowledged(Alert),
    Resolved(Alert),
    Cleared { count: usize },
}

/// Commands that can be sent to the AlertEngineActor
#[derive(Debug)]
pub enum AlertCommand {
    /// Open an alert unconditionally (no rule, no cooldown)
    Create {
        alert_type: AlertType,
        level: AlertLevel,
        message: String,
        details: Option<Value>,
        respond_to: oneshot::Sender<Alert>,
    },

    Acknowledge {
        id: String,
        respond_to: oneshot::Sender<bool>,
    },

    Resolve {
        id: String,
        respond_to: oneshot::Sender<bool>,
    },

    GetActive { respond_to: oneshot::Sender<Vec<Alert>> },

    GetHistory {
        limit: usize,
        respond_to: oneshot::Sender<Vec<Alert>>,
    },

    /// Answers `true` when a rule of the same type and level was replaced
    AddRule {
        rule: AlertRule,
        respond_to: oneshot::Sender<bool>,
    },

    RemoveRule {
        alert_type: AlertType,
        respond_to: oneshot::Sender<bool>,
    },

    GetRules { respond_to: oneshot::Sender<Vec<RuleInfo>> },

    Clear { respond_to: oneshot::Sender<usize> },

    /// Evaluate the rules against a snapshot; answers the alerts opened
    CheckRules {
        snapshot: Arc<MetricsSnapshot>,
        respond_to: oneshot::Sender<Vec<Alert>>,
    },

    /// Run the retention sweep now; answers how many alerts were purged
    PurgeResolved { respond_to: oneshot::Sender<usize> },

    Shutdown,
}

/// Name of a hub subscription
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SubscriptionKey {
    QueueStatus,
    HealthStatus,
    Metrics,
    Job(String),
}

impl fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubscriptionKey::QueueStatus => f.write_str("queue-status"),
            SubscriptionKey::HealthStatus => f.write_str("health-status"),
            SubscriptionKey::Metrics => f.write_str("metrics"),
            SubscriptionKey::Job(id) => write!(f, "job:{id}"),
        }
    }
}

impl FromStr for SubscriptionKey {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queue-status" => Ok(SubscriptionKey::QueueStatus),
            "health-status" => Ok(SubscriptionKey::HealthStatus),
            "metrics" => Ok(SubscriptionKey::Metrics),
            _ => match s.strip_prefix("job:") {
                Some(id) if !id.is_empty() => Ok(SubscriptionKey::Job(id.to_string())),
                _ => anyhow::bail!("unknown subscription key '{s}'"),
            },
        }
    }
}

impl TryFrom<String> for SubscriptionKey {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SubscriptionKey> for String {
    fn from(value: SubscriptionKey) -> Self {
        value.to_string()
    }
}

/// Commands that can be sent to the BroadcastHubActor
#[derive(Debug)]
pub enum HubCommand {
    /// Answers `false` when the key is already subscribed
    Subscribe {
        key: SubscriptionKey,
        interval: Duration,
        respond_to: oneshot::Sender<bool>,
    },

    /// Answers `false` for unknown keys
    Unsubscribe {
        key: SubscriptionKey,
        respond_to: oneshot::Sender<bool>,
    },

    /// Cancels every subscription and stops the sampler; answers how many were cancelled
    UnsubscribeAll { respond_to: oneshot::Sender<usize> },

    ActiveSubscriptions {
        respond_to: oneshot::Sender<Vec<SubscriptionKey>>,
    },

    /// Sent by a job poll after it saw a terminal state
    Finished { key: SubscriptionKey, generation: u64 },

    Shutdown,
}

/// Uniform message relayed to every hub listener
///
/// Serializes as `{"type": "...", "data": {...}, "timestamp": "..."}`.
#[derive(Debug, Clone, Serialize)]
pub struct Envelope {
    #[serde(flatten)]
    pub update: Update,
    pub timestamp: DateTime<Utc>,
}

impl Envelope {
    pub fn now(update: Update) -> Self {
        Self {
            update,
            timestamp: Utc::now(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self.update {
            Update::QueueStatus(_) => "queue-status",
            Update::JobUpdate(_) => "job-update",
            Update::HealthUpdate(_) => "health-update",
            Update::Alert(_) => "alert",
            Update::Metrics(_) => "metrics",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum Update {
    QueueStatus(QueueStatusUpdate),
    JobUpdate(JobUpdate),
    HealthUpdate(Box<SystemHealthReport>),
    Alert(AlertEvent),
    Metrics(Arc<MetricsSnapshot>),
}

#[derive(Debug, Clone, Serialize)]
pub struct QueueStatusUpdate {
    pub stats: QueueStats,
    pub depth: u64,
    pub paused: bool,
    pub rate_limit: RateLimitInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobUpdate {
    pub job_id: String,
    pub name: String,
    pub state: JobState,
    pub progress: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl From<JobInfo> for JobUpdate {
    fn from(job: JobInfo) -> Self {
        let duration_ms = match (job.processed_at, job.finished_at) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds().max(0) as u64),
            _ => None,
        };

        Self {
            job_id: job.id,
            name: job.name,
            state: job.state,
            progress: job.progress,
            failed_reason: job.failed_reason,
            duration_ms,
        }
    }
}

impl From<JobMetric> for JobUpdate {
    fn from(metric: JobMetric) -> Self {
        Self {
            state: if metric.success {
                JobState::Completed
            } else {
                JobState::Failed
            },
            job_id: metric.job_id,
            name: metric.job_type,
            progress: Value::Null,
            failed_reason: metric.error,
            duration_ms: metric.duration_ms,
        }
    }
}
