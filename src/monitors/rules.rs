//! Declarative alert rules
//!
//! A rule is a predicate over a [`MetricsSnapshot`] plus a message template, a
//! severity and a cooldown. Rules are grouped per [`AlertType`]; a type may
//! carry one rule per [`AlertLevel`] (e.g. a warning at depth 1000 and a
//! critical at depth 5000).
//!
//! ## Evaluation
//!
//! ```text
//! for each alert type:
//!   any rule matches → highest matching level fires, unless the type's
//!                      cooldown clock has not elapsed yet (suppressed)
//!   nothing matches  → the type has recovered
//! ```
//!
//! The cooldown clock is shared by all levels of one type: after a warning
//! fired, an escalation to critical inside the cooldown is suppressed too.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::MetricsSnapshot;
use crate::config::Thresholds;
use crate::util::format_mb;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AlertType {
    QueueDepth,
    ErrorRate,
    ProcessingTime,
    MemoryUsage,
    Test,
    Custom(String),
}

impl AlertType {
    pub fn as_str(&self) -> &str {
        match self {
            AlertType::QueueDepth => "queue_depth",
            AlertType::ErrorRate => "error_rate",
            AlertType::ProcessingTime => "processing_time",
            AlertType::MemoryUsage => "memory_usage",
            AlertType::Test => "test",
            AlertType::Custom(name) => name,
        }
    }
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for AlertType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "queue_depth" => AlertType::QueueDepth,
            "error_rate" => AlertType::ErrorRate,
            "processing_time" => AlertType::ProcessingTime,
            "memory_usage" => AlertType::MemoryUsage,
            "test" => AlertType::Test,
            _ => AlertType::Custom(value),
        }
    }
}

impl From<&str> for AlertType {
    fn from(value: &str) -> Self {
        AlertType::from(value.to_string())
    }
}

impl From<AlertType> for String {
    fn from(value: AlertType) -> Self {
        value.as_str().to_string()
    }
}

/// Severity, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Info,
    Warning,
    Error,
    Critical,
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AlertLevel::Info => "info",
            AlertLevel::Warning => "warning",
            AlertLevel::Error => "error",
            AlertLevel::Critical => "critical",
        };
        f.write_str(name)
    }
}

type Condition = Arc<dyn Fn(&MetricsSnapshot) -> bool + Send + Sync>;
type MessageFn = Arc<dyn Fn(&MetricsSnapshot) -> String + Send + Sync>;

#[derive(Clone)]
pub struct AlertRule {
    pub alert_type: AlertType,
    pub level: AlertLevel,
    pub cooldown: Duration,
    condition: Condition,
    message: MessageFn,
}

impl AlertRule {
    pub fn new<C, M>(alert_type: AlertType, level: AlertLevel, condition: C, message: M) -> Self
    where
        C: Fn(&MetricsSnapshot) -> bool + Send + Sync + 'static,
        M: Fn(&MetricsSnapshot) -> String + Send + Sync + 'static,
    {
        Self {
            alert_type,
            level,
            cooldown: Duration::from_secs(300),
            condition: Arc::new(condition),
            message: Arc::new(message),
        }
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn matches(&self, snapshot: &MetricsSnapshot) -> bool {
        (self.condition)(snapshot)
    }

    pub fn message(&self, snapshot: &MetricsSnapshot) -> String {
        (self.message)(snapshot)
    }

    pub fn describe(&self) -> RuleInfo {
        RuleInfo {
            alert_type: self.alert_type.clone(),
            level: self.level,
            cooldown_secs: self.cooldown.as_secs(),
        }
    }
}

impl fmt::Debug for AlertRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlertRule")
            .field("alert_type", &self.alert_type)
            .field("level", &self.level)
            .field("cooldown", &self.cooldown)
            .finish_non_exhaustive()
    }
}

/// Serializable view of a rule (predicates cannot be serialized)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleInfo {
    pub alert_type: AlertType,
    pub level: AlertLevel,
    pub cooldown_secs: u64,
}

/// Result of evaluating one alert type against a snapshot
#[derive(Debug, Clone, PartialEq)]
pub enum RuleOutcome {
    Fire {
        alert_type: AlertType,
        level: AlertLevel,
        message: String,
    },
    /// Condition holds but the type is still cooling down
    Suppressed(AlertType),
    /// No rule of the type matches anymore
    Recovered(AlertType),
}

#[derive(Debug, Default)]
pub struct RuleTable {
    /// Rules per type, sorted by level, most severe first
    rules: BTreeMap<AlertType, Vec<AlertRule>>,
    last_fired: BTreeMap<AlertType, DateTime<Utc>>,
}

impl RuleTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rules(rules: impl IntoIterator<Item = AlertRule>) -> Self {
        let mut table = Self::new();
        for rule in rules {
            table.insert(rule);
        }
        table
    }

    /// Adds a rule; returns `true` when it replaced one of the same type and level
    pub fn insert(&mut self, rule: AlertRule) -> bool {
        let rules = self.rules.entry(rule.alert_type.clone()).or_default();

        let replaced = match rules.iter_mut().find(|r| r.level == rule.level) {
            Some(existing) => {
                *existing = rule;
                true
            }
            None => {
                rules.push(rule);
                false
            }
        };
        rules.sort_by(|a, b| b.level.cmp(&a.level));

        replaced
    }

    /// Removes every rule of the type together with its cooldown clock
    pub fn remove(&mut self, alert_type: &AlertType) -> bool {
        self.last_fired.remove(alert_type);
        self.rules.remove(alert_type).is_some()
    }

    pub fn rules(&self) -> Vec<AlertRule> {
        self.rules.values().flatten().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.rules.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn evaluate(&mut self, snapshot: &MetricsSnapshot, now: DateTime<Utc>) -> Vec<RuleOutcome> {
        let mut outcomes = Vec::with_capacity(self.rules.len());

        for (alert_type, rules) in &self.rules {
            let Some(rule) = rules.iter().find(|rule| rule.matches(snapshot)) else {
                outcomes.push(RuleOutcome::Recovered(alert_type.clone()));
                continue;
            };

            let ready = self
                .last_fired
                .get(alert_type)
                .is_none_or(|last| cooled_down(*last, now, rule.cooldown));

            if !ready {
                outcomes.push(RuleOutcome::Suppressed(alert_type.clone()));
                continue;
            }

            self.last_fired.insert(alert_type.clone(), now);
            outcomes.push(RuleOutcome::Fire {
                alert_type: alert_type.clone(),
                level: rule.level,
                message: rule.message(snapshot),
            });
        }

        outcomes
    }
}

fn cooled_down(last: DateTime<Utc>, now: DateTime<Utc>, cooldown: Duration) -> bool {
    (now - last)
        .to_std()
        .map(|elapsed| elapsed >= cooldown)
        .unwrap_or(false)
}

/// Rule set mirroring the sampler's default thresholds, with critical
/// escalations for queue depth, error rate and memory
pub fn default_rules(cooldown: Duration) -> Vec<AlertRule> {
    let thresholds = Thresholds::default();
    let depth = thresholds.queue_depth;
    let error_rate = thresholds.error_rate;
    let processing = thresholds.avg_processing_time_ms;
    let memory = thresholds.memory_mb;

    vec![
        AlertRule::new(
            AlertType::QueueDepth,
            AlertLevel::Warning,
            move |s| s.queue.depth > depth,
            move |s| format!("Queue depth is {} (threshold: {depth})", s.queue.depth),
        ),
        AlertRule::new(
            AlertType::QueueDepth,
            AlertLevel::Critical,
            |s| s.queue.depth > 5000,
            |s| format!("Queue depth is critically high at {} (threshold: 5000)", s.queue.depth),
        ),
        AlertRule::new(
            AlertType::ErrorRate,
            AlertLevel::Warning,
            move |s| s.queue.error_rate > error_rate,
            move |s| format!("Error rate is {:.2}% (threshold: {error_rate}%)", s.queue.error_rate),
        ),
        AlertRule::new(
            AlertType::ErrorRate,
            AlertLevel::Critical,
            |s| s.queue.error_rate > 25.0,
            |s| format!("Error rate is critically high at {:.2}% (threshold: 25%)", s.queue.error_rate),
        ),
        AlertRule::new(
            AlertType::ProcessingTime,
            AlertLevel::Warning,
            move |s| s.queue.throughput.avg_processing_time_ms > processing,
            move |s| {
                format!(
                    "Average processing time is {:.0}ms (threshold: {processing}ms)",
                    s.queue.throughput.avg_processing_time_ms
                )
            },
        ),
        AlertRule::new(
            AlertType::MemoryUsage,
            AlertLevel::Warning,
            move |s| s.system.memory.used_mb() > memory,
            move |s| format!("Memory usage is {} (threshold: {memory}MB)", format_mb(s.system.memory.used)),
        ),
        AlertRule::new(
            AlertType::MemoryUsage,
            AlertLevel::Critical,
            |s| s.system.memory.used_mb() > 800.0,
            |s| format!("Memory usage is critically high at {} (threshold: 800MB)", format_mb(s.system.memory.used)),
        ),
    ]
    .into_iter()
    .map(|rule| rule.with_cooldown(cooldown))
    .collect()
}
