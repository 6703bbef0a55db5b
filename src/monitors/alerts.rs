//! Alert records and their lifecycle
//!
//! ```text
//! open ──acknowledge──▶ acknowledged
//!   │                        │
//!   └────────resolve─────────┴──▶ resolved ──(retention elapsed)──▶ purged
//! ```
//!
//! Purging only removes the alert from the active set. The bounded history
//! keeps every alert (including its final state) until it is pushed out by
//! newer ones.

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::rules::{AlertLevel, AlertType};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub alert_type: AlertType,
    pub level: AlertLevel,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub acknowledged: bool,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Alert {
    pub fn is_resolved(&self) -> bool {
        self.resolved_at.is_some()
    }
}

#[derive(Debug)]
pub struct AlertBook {
    /// Alerts not yet purged, in creation order
    active: Vec<Alert>,
    history: VecDeque<Alert>,
    history_capacity: usize,
    retention: chrono::Duration,
}

impl AlertBook {
    pub fn new(history_capacity: usize, retention: Duration) -> Self {
        Self {
            active: Vec::new(),
            history: VecDeque::with_capacity(history_capacity),
            history_capacity: history_capacity.max(1),
            retention: chrono::Duration::from_std(retention).unwrap_or(chrono::Duration::minutes(5)),
        }
    }

    pub fn open(
        &mut self,
        alert_type: AlertType,
        level: AlertLevel,
        message: String,
        details: Option<Value>,
        now: DateTime<Utc>,
    ) -> Alert {
        let alert = Alert {
            id: Uuid::new_v4().to_string(),
            alert_type,
            level,
            message,
            details,
            created_at: now,
            acknowledged: false,
            resolved_at: None,
        };

        self.active.push(alert.clone());
        self.history.push_back(alert.clone());
        while self.history.len() > self.history_capacity {
            self.history.pop_front();
        }

        alert
    }

    /// Sets the acknowledged flag once; `None` for unknown, resolved or
    /// already acknowledged alerts
    pub fn acknowledge(&mut self, id: &str) -> Option<Alert> {
        let alert = self.active.iter_mut().find(|a| a.id == id)?;
        if alert.acknowledged || alert.is_resolved() {
            return None;
        }

        alert.acknowledged = true;
        let alert = alert.clone();
        self.sync_history(&alert);
        Some(alert)
    }

    /// Sets `resolved_at`; `None` for unknown or already resolved alerts
    pub fn resolve(&mut self, id: &str, now: DateTime<Utc>) -> Option<Alert> {
        let alert = self.active.iter_mut().find(|a| a.id == id)?;
        if alert.is_resolved() {
            return None;
        }

        alert.resolved_at = Some(now);
        let alert = alert.clone();
        self.sync_history(&alert);
        Some(alert)
    }

    /// Resolves every unresolved alert of the given type
    pub fn resolve_type(&mut self, alert_type: &AlertType, now: DateTime<Utc>) -> Vec<Alert> {
        let ids: Vec<String> = self
            .active
            .iter()
            .filter(|a| &a.alert_type == alert_type && !a.is_resolved())
            .map(|a| a.id.clone())
            .collect();

        ids.iter().filter_map(|id| self.resolve(id, now)).collect()
    }

    /// Unresolved alerts, newest first
    pub fn active(&self) -> Vec<Alert> {
        self.active
            .iter()
            .rev()
            .filter(|a| !a.is_resolved())
            .cloned()
            .collect()
    }

    /// Most recent history entries, newest first
    pub fn history(&self, limit: usize) -> Vec<Alert> {
        self.history.iter().rev().take(limit).cloned().collect()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Drops resolved alerts whose retention elapsed from the active set
    pub fn purge_resolved(&mut self, now: DateTime<Utc>) -> usize {
        let cutoff = now - self.retention;
        let before = self.active.len();
        self.active
            .retain(|a| a.resolved_at.is_none_or(|resolved_at| resolved_at > cutoff));
        before - self.active.len()
    }

    /// Empties the active set and the history, returns how many alerts were active
    pub fn clear(&mut self) -> usize {
        let cleared = self.active.len();
        self.active.clear();
        self.history.clear();
        cleared
    }

    fn sync_history(&mut self, alert: &Alert) {
        if let Some(entry) = self.history.iter_mut().rev().find(|a| a.id == alert.id) {
            *entry = alert.clone();
        }
    }
}
