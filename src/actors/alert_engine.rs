//! AlertEngineActor - Evaluates alert rules and runs the alert lifecycle
//!
//! ## Rule evaluation
//!
//! Every `SamplerEvent::Metrics` is checked against the rule table:
//!
//! ```text
//! condition holds, cooldown elapsed   → open alert, publish Created
//! condition holds, inside cooldown    → ignored
//! condition no longer holds           → resolve open alerts of the type, publish Resolved
//! ```
//!
//! A reaper tick removes resolved alerts from the active set once their
//! retention elapsed. History is bounded and keeps the final state.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use serde_json::{Value, json};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, instrument, trace, warn};

use crate::MetricsSnapshot;
use crate::config::AlertConfig;
use crate::monitors::alerts::{Alert, AlertBook};
use crate::monitors::rules::{AlertLevel, AlertRule, AlertType, RuleInfo, RuleOutcome, RuleTable};

use super::messages::{AlertCommand, AlertEvent, SamplerEvent};

const EVENT_CAPACITY: usize = 256;

pub struct AlertEngineActor {
    rules: RuleTable,

    book: AlertBook,

    reaper_interval: Duration,

    command_rx: mpsc::Receiver<AlertCommand>,

    /// Metrics feed; `None` once the sampler is gone (or when never wired)
    sampler_rx: Option<broadcast::Receiver<SamplerEvent>>,

    event_tx: broadcast::Sender<AlertEvent>,
}

impl AlertEngineActor {
    pub fn new(
        config: &AlertConfig,
        rules: Vec<AlertRule>,
        command_rx: mpsc::Receiver<AlertCommand>,
        sampler_rx: Option<broadcast::Receiver<SamplerEvent>>,
        event_tx: broadcast::Sender<AlertEvent>,
    ) -> Self {
        Self {
            rules: RuleTable::with_rules(rules),
            book: AlertBook::new(config.history_capacity, config.retention()),
            reaper_interval: config.reaper_interval(),
            command_rx,
            sampler_rx,
            event_tx,
        }
    }

    #[instrument(skip(self))]
    pub async fn run(mut self) {
        debug!("starting alert engine actor with {} rules", self.rules.len());

        let mut reaper = interval(self.reaper_interval);
        reaper.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                result = recv_sampler(&mut self.sampler_rx) => {
                    match result {
                        Ok(SamplerEvent::Metrics(snapshot)) => {
                            self.check_rules(&snapshot);
                        }
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!("alert engine lagged, skipped {skipped} sampler events");
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            debug!("sampler channel closed");
                            self.sampler_rx = None;
                        }
                    }
                }

                _ = reaper.tick() => {
                    let purged = self.book.purge_resolved(Utc::now());
                    if purged > 0 {
                        debug!("purged {purged} resolved alerts");
                    }
                }

                cmd = self.command_rx.recv() => {
                    let Some(cmd) = cmd else {
                        warn!("command channel closed, shutting down");
                        break;
                    };
                    if !self.handle_command(cmd) {
                        break;
                    }
                }
            }
        }

        debug!("alert engine actor stopped");
    }

    /// Returns `false` when the actor should stop
    fn handle_command(&mut self, cmd: AlertCommand) -> bool {
        match cmd {
            AlertCommand::Create {
                alert_type,
                level,
                message,
                details,
                respond_to,
            } => {
                let alert = self.create_alert(alert_type, level, message, details);
                let _ = respond_to.send(alert);
            }

            AlertCommand::Acknowledge { id, respond_to } => {
                let acknowledged = match self.book.acknowledge(&id) {
                    Some(alert) => {
                        info!("alert {id} acknowledged");
                        self.publish(AlertEvent::Acknowledged(alert));
                        true
                    }
                    None => false,
                };
                let _ = respond_to.send(acknowledged);
            }

            AlertCommand::Resolve { id, respond_to } => {
                let resolved = match self.book.resolve(&id, Utc::now()) {
                    Some(alert) => {
                        info!("alert {id} resolved");
                        self.publish(AlertEvent::Resolved(alert));
                        true
                    }
                    None => false,
                };
                let _ = respond_to.send(resolved);
            }

            AlertCommand::GetActive { respond_to } => {
                let _ = respond_to.send(self.book.active());
            }

            AlertCommand::GetHistory { limit, respond_to } => {
                let _ = respond_to.send(self.book.history(limit));
            }

            AlertCommand::AddRule { rule, respond_to } => {
                debug!("adding {} rule for {}", rule.level, rule.alert_type);
                let _ = respond_to.send(self.rules.insert(rule));
            }

            AlertCommand::RemoveRule {
                alert_type,
                respond_to,
            } => {
                debug!("removing rules for {alert_type}");
                let _ = respond_to.send(self.rules.remove(&alert_type));
            }

            AlertCommand::GetRules { respond_to } => {
                let rules = self.rules.rules().iter().map(AlertRule::describe).collect();
                let _ = respond_to.send(rules);
            }

            AlertCommand::Clear { respond_to } => {
                let count = self.book.clear();
                info!("cleared {count} alerts");
                self.publish(AlertEvent::Cleared { count });
                let _ = respond_to.send(count);
            }

            AlertCommand::CheckRules {
                snapshot,
                respond_to,
            } => {
                let _ = respond_to.send(self.check_rules(&snapshot));
            }

            AlertCommand::PurgeResolved { respond_to } => {
                let _ = respond_to.send(self.book.purge_resolved(Utc::now()));
            }

            AlertCommand::Shutdown => {
                debug!("received shutdown command");
                return false;
            }
        }

        true
    }

    /// Evaluates every rule type and returns the alerts that were opened
    fn check_rules(&mut self, snapshot: &MetricsSnapshot) -> Vec<Alert> {
        let now = Utc::now();
        let mut opened = Vec::new();

        for outcome in self.rules.evaluate(snapshot, now) {
            match outcome {
                RuleOutcome::Fire {
                    alert_type,
                    level,
                    message,
                } => {
                    let details = serde_json::to_value(snapshot).ok();
                    opened.push(self.create_alert(alert_type, level, message, details));
                }

                RuleOutcome::Suppressed(alert_type) => {
                    trace!("{alert_type} still cooling down");
                }

                RuleOutcome::Recovered(alert_type) => {
                    for alert in self.book.resolve_type(&alert_type, now) {
                        info!("alert {} recovered: {}", alert.id, alert.message);
                        self.publish(AlertEvent::Resolved(alert));
                    }
                }
            }
        }

        opened
    }

    fn create_alert(
        &mut self,
        alert_type: AlertType,
        level: AlertLevel,
        message: String,
        details: Option<Value>,
    ) -> Alert {
        let alert = self.book.open(alert_type, level, message, details, Utc::now());

        match alert.level {
            AlertLevel::Info => info!("[{}] {}", alert.alert_type, alert.message),
            _ => warn!("[{}] {} alert: {}", alert.alert_type, alert.level, alert.message),
        }

        self.publish(AlertEvent::Created(alert.clone()));
        alert
    }

    fn publish(&self, event: AlertEvent) {
        if self.event_tx.send(event).is_err() {
            trace!("no receivers for alert event");
        }
    }
}

async fn recv_sampler(
    rx: &mut Option<broadcast::Receiver<SamplerEvent>>,
) -> Result<SamplerEvent, broadcast::error::RecvError> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Handle for controlling an AlertEngineActor
#[derive(Clone)]
pub struct AlertEngineHandle {
    sender: mpsc::Sender<AlertCommand>,
    event_tx: broadcast::Sender<AlertEvent>,
}

impl AlertEngineHandle {
    /// Spawn a new alert engine; `sampler_rx` feeds it snapshots
    pub fn spawn(
        config: &AlertConfig,
        rules: Vec<AlertRule>,
        sampler_rx: Option<broadcast::Receiver<SamplerEvent>>,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(64);
        let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);

        let actor = AlertEngineActor::new(config, rules, cmd_rx, sampler_rx, event_tx.clone());
        tokio::spawn(actor.run());

        Self {
            sender: cmd_tx,
            event_tx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AlertEvent> {
        self.event_tx.subscribe()
    }

    /// Opens an alert directly, bypassing rules and cooldowns
    pub async fn create_alert(
        &self,
        alert_type: AlertType,
        level: AlertLevel,
        message: impl Into<String>,
        details: Option<Value>,
    ) -> Result<Alert> {
        let message = message.into();
        self.request(
            |respond_to| AlertCommand::Create {
                alert_type,
                level,
                message,
                details,
                respond_to,
            },
            "Create",
        )
        .await
    }

    /// Synthetic INFO alert for checking the notification path
    pub async fn test_alert(&self) -> Result<Alert> {
        self.create_alert(
            AlertType::Test,
            AlertLevel::Info,
            "Test alert",
            Some(json!({ "test": true })),
        )
        .await
    }

    /// `false` when the alert is unknown, resolved or already acknowledged
    pub async fn acknowledge(&self, id: &str) -> Result<bool> {
        let id = id.to_string();
        self.request(|respond_to| AlertCommand::Acknowledge { id, respond_to }, "Acknowledge")
            .await
    }

    /// `false` when the alert is unknown or already resolved
    pub async fn resolve(&self, id: &str) -> Result<bool> {
        let id = id.to_string();
        self.request(|respond_to| AlertCommand::Resolve { id, respond_to }, "Resolve")
            .await
    }

    /// Unresolved alerts, newest first
    pub async fn active(&self) -> Result<Vec<Alert>> {
        self.request(|respond_to| AlertCommand::GetActive { respond_to }, "GetActive")
            .await
    }

    pub async fn history(&self, limit: usize) -> Result<Vec<Alert>> {
        self.request(|respond_to| AlertCommand::GetHistory { limit, respond_to }, "GetHistory")
            .await
    }

    pub async fn add_rule(&self, rule: AlertRule) -> Result<bool> {
        self.request(|respond_to| AlertCommand::AddRule { rule, respond_to }, "AddRule")
            .await
    }

    pub async fn remove_rule(&self, alert_type: AlertType) -> Result<bool> {
        self.request(
            |respond_to| AlertCommand::RemoveRule {
                alert_type,
                respond_to,
            },
            "RemoveRule",
        )
        .await
    }

    pub async fn rules(&self) -> Result<Vec<RuleInfo>> {
        self.request(|respond_to| AlertCommand::GetRules { respond_to }, "GetRules")
            .await
    }

    /// Drops every alert (active and history); returns how many were active
    pub async fn clear(&self) -> Result<usize> {
        self.request(|respond_to| AlertCommand::Clear { respond_to }, "Clear")
            .await
    }

    pub async fn check_rules(&self, snapshot: Arc<MetricsSnapshot>) -> Result<Vec<Alert>> {
        self.request(
            |respond_to| AlertCommand::CheckRules {
                snapshot,
                respond_to,
            },
            "CheckRules",
        )
        .await
    }

    pub async fn purge_resolved(&self) -> Result<usize> {
        self.request(|respond_to| AlertCommand::PurgeResolved { respond_to }, "PurgeResolved")
            .await
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(AlertCommand::Shutdown)
            .await
            .context("failed to send Shutdown command")
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> AlertCommand, name: &str) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(make(tx))
            .await
            .with_context(|| format!("failed to send {name} command"))?;

        rx.await.context("failed to receive response")
    }
}
