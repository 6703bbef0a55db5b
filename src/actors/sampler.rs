//! MetricsSamplerActor - Periodically samples queue and process state
//!
//! ## Message Flow
//!
//! ```text
//! Timer tick → queue stats + process sample + cache info → MetricsSnapshot
//!     ↑                                                        │
//!     │                              ┌─────────────────────────┤
//!     │                              ▼                         ▼
//!     │                      history (bounded)    SamplerEvent::Metrics
//!     │                                           SamplerEvent::ThresholdBreach
//!     │
//!     └─── Commands (Start, Stop, CollectNow, RecordJob*, queries, Shutdown)
//! ```
//!
//! Ticks are handled inline by the actor, so a slow tick delays the next one
//! instead of overlapping it; missed ticks are skipped. Every collaborator
//! call is bounded by the configured call timeout.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{Interval, MissedTickBehavior, interval};
use tracing::{debug, error, instrument, trace, warn};

use crate::config::{SamplerConfig, Thresholds, ThresholdsUpdate};
use crate::monitors::ledger::JobLedger;
use crate::monitors::thresholds::sampler_breaches;
use crate::sources::Sources;
use crate::sources::cache_info::{CONNECTED_CLIENTS, OPS_PER_SEC, USED_MEMORY, info_field};
use crate::util::within;
use crate::{CacheMetrics, JobMetric, MetricsSnapshot, QueueMetrics, Throughput};

use super::messages::{SamplerCommand, SamplerEvent};

const EVENT_CAPACITY: usize = 256;

/// Actor that owns the snapshot history and the job ledger
pub struct MetricsSamplerActor {
    sources: Sources,

    config: SamplerConfig,

    /// Current thresholds (may be changed at runtime)
    thresholds: Thresholds,

    ledger: JobLedger,

    history: VecDeque<Arc<MetricsSnapshot>>,

    /// Sampling timer, `None` while stopped
    ticker: Option<Interval>,

    command_rx: mpsc::Receiver<SamplerCommand>,

    event_tx: broadcast::Sender<SamplerEvent>,
}

impl MetricsSamplerActor {
    pub fn new(
        sources: Sources,
        config: SamplerConfig,
        command_rx: mpsc::Receiver<SamplerCommand>,
        event_tx: broadcast::Sender<SamplerEvent>,
    ) -> Self {
        let ledger = JobLedger::new(
            config.job_ledger_capacity,
            Duration::from_secs(config.job_retention_secs),
        );

        Self {
            sources,
            thresholds: config.thresholds,
            ledger,
            history: VecDeque::with_capacity(config.history_capacity),
            ticker: None,
            command_rx,
            event_tx,
            config,
        }
    }

    #[instrument(skip(self))]
    pub async fn run(mut self) {
        debug!("starting sampler actor");

        loop {
            tokio::select! {
                _ = next_tick(&mut self.ticker) => {
                    if let Err(e) = self.collect().await {
                        error!("failed to collect metrics: {:#}", e);
                    }
                }

                cmd = self.command_rx.recv() => {
                    let Some(cmd) = cmd else {
                        warn!("command channel closed, shutting down");
                        break;
                    };
                    if !self.handle_command(cmd).await {
                        break;
                    }
                }
            }
        }

        debug!("sampler actor stopped");
    }

    /// Returns `false` when the actor should stop
    async fn handle_command(&mut self, cmd: SamplerCommand) -> bool {
        match cmd {
            SamplerCommand::Start { interval, respond_to } => {
                let _ = respond_to.send(self.start(interval));
            }

            SamplerCommand::Stop { respond_to } => {
                let was_running = self.ticker.take().is_some();
                if was_running {
                    debug!("stopped periodic sampling");
                }
                let _ = respond_to.send(was_running);
            }

            SamplerCommand::CollectNow { respond_to } => {
                debug!("received CollectNow command");
                let _ = respond_to.send(self.collect().await);
            }

            SamplerCommand::RecordJobStart { job_id, job_type } => {
                trace!("job {job_id} ({job_type}) started");
                self.ledger.start(&job_id, &job_type, Utc::now());
            }

            SamplerCommand::RecordJobComplete {
                job_id,
                success,
                error,
            } => match self.ledger.complete(&job_id, success, error, Utc::now()) {
                Some(metric) => self.publish(SamplerEvent::JobComplete(metric)),
                None => warn!("completion recorded for unknown job {job_id}"),
            },

            SamplerCommand::RecordJobRetry { job_id } => {
                if !self.ledger.retry(&job_id) {
                    warn!("retry recorded for unknown job {job_id}");
                }
            }

            SamplerCommand::GetCurrent { respond_to } => {
                let _ = respond_to.send(self.history.back().cloned());
            }

            SamplerCommand::GetHistory { limit, respond_to } => {
                let skip = self.history.len().saturating_sub(limit);
                let _ = respond_to.send(self.history.iter().skip(skip).cloned().collect());
            }

            SamplerCommand::GetJobMetrics { limit, respond_to } => {
                let _ = respond_to.send(self.ledger.recent(limit));
            }

            SamplerCommand::UpdateThresholds { update, respond_to } => {
                self.thresholds.apply(update);
                debug!("thresholds updated: {:?}", self.thresholds);
                let _ = respond_to.send(self.thresholds);
            }

            SamplerCommand::GetThresholds { respond_to } => {
                let _ = respond_to.send(self.thresholds);
            }

            SamplerCommand::ClearHistory => {
                debug!("clearing {} snapshots", self.history.len());
                self.history.clear();
            }

            SamplerCommand::IsRunning { respond_to } => {
                let _ = respond_to.send(self.ticker.is_some());
            }

            SamplerCommand::Shutdown => {
                debug!("received shutdown command");
                return false;
            }
        }

        true
    }

    fn start(&mut self, period: Duration) -> bool {
        if self.ticker.is_some() {
            warn!("metrics collection is already running");
            return false;
        }

        // the first tick completes immediately, so sampling starts right away
        let mut ticker = interval(period.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        self.ticker = Some(ticker);

        debug!("started periodic sampling every {}ms", period.as_millis());
        true
    }

    /// Builds one snapshot, records it and publishes the resulting events
    #[instrument(skip(self))]
    async fn collect(&mut self) -> Result<Arc<MetricsSnapshot>> {
        let timeout = self.config.call_timeout();
        let now = Utc::now();

        self.ledger.sweep(now);

        let stats = within(timeout, "queue stats", self.sources.queue.stats())
            .await
            .context("failed to read queue stats")?;

        let system = within(timeout, "process sample", self.sources.runtime.sample())
            .await
            .context("failed to sample process resources")?;

        let cache = self.cache_metrics(timeout).await;
        let window = self.ledger.window_stats(now);

        let snapshot = Arc::new(MetricsSnapshot {
            timestamp: now,
            queue: QueueMetrics {
                depth: stats.depth(),
                stats,
                throughput: Throughput {
                    jobs_per_minute: window.completed_last_minute,
                    jobs_per_hour: window.completed_last_hour,
                    avg_processing_time_ms: window.avg_processing_time_ms,
                },
                error_rate: window.error_rate,
                success_rate: window.success_rate,
            },
            system,
            cache,
            rate_limit: self.sources.api.rate_limit(),
        });

        self.history.push_back(snapshot.clone());
        while self.history.len() > self.config.history_capacity.max(1) {
            self.history.pop_front();
        }

        let breaches = sampler_breaches(&snapshot, &self.thresholds);

        self.publish(SamplerEvent::Metrics(snapshot.clone()));

        if !breaches.is_empty() {
            warn!("{} thresholds exceeded", breaches.len());
            self.publish(SamplerEvent::ThresholdBreach {
                timestamp: now,
                breaches,
            });
        }

        Ok(snapshot)
    }

    /// Cache counters, or a disconnected record when the cache cannot be reached
    async fn cache_metrics(&self, timeout: Duration) -> CacheMetrics {
        let cache = &self.sources.cache;

        let result: Result<CacheMetrics> = async {
            let pong = within(timeout, "cache ping", cache.ping()).await?;
            if pong.trim() != "PONG" {
                debug!("cache answered ping with {:?}", pong.trim());
                return Ok(CacheMetrics::disconnected());
            }

            let memory = within(timeout, "cache memory info", cache.memory_info()).await?;
            let stats = within(timeout, "cache stats info", cache.stats_info()).await?;

            Ok(CacheMetrics {
                connected: true,
                memory_used: info_field(&memory, USED_MEMORY),
                connected_clients: info_field(&stats, CONNECTED_CLIENTS),
                ops_per_sec: info_field(&stats, OPS_PER_SEC),
            })
        }
        .await;

        result.unwrap_or_else(|e| {
            debug!("cache unavailable: {:#}", e);
            CacheMetrics::disconnected()
        })
    }

    fn publish(&self, event: SamplerEvent) {
        // no subscribers is fine
        match self.event_tx.send(event) {
            Ok(receivers) => trace!("published sampler event to {receivers} receivers"),
            Err(_) => trace!("no receivers for sampler event"),
        }
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Handle for controlling a MetricsSamplerActor
///
/// Cheap to clone; every clone talks to the same actor.
#[derive(Clone)]
pub struct SamplerHandle {
    sender: mpsc::Sender<SamplerCommand>,
    event_tx: broadcast::Sender<SamplerEvent>,
}

impl SamplerHandle {
    /// Spawn a new sampler actor (stopped until [`SamplerHandle::start`])
    pub fn spawn(sources: Sources, config: SamplerConfig) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(64);
        let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);

        let actor = MetricsSamplerActor::new(sources, config, cmd_rx, event_tx.clone());
        tokio::spawn(actor.run());

        Self {
            sender: cmd_tx,
            event_tx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SamplerEvent> {
        self.event_tx.subscribe()
    }

    /// Start sampling every `interval`; `false` if it was already running
    pub async fn start(&self, interval: Duration) -> Result<bool> {
        self.request(|respond_to| SamplerCommand::Start { interval, respond_to }, "Start")
            .await
    }

    /// Stop sampling; `false` if it was not running
    pub async fn stop(&self) -> Result<bool> {
        self.request(|respond_to| SamplerCommand::Stop { respond_to }, "Stop")
            .await
    }

    pub async fn collect_now(&self) -> Result<Arc<MetricsSnapshot>> {
        self.request(|respond_to| SamplerCommand::CollectNow { respond_to }, "CollectNow")
            .await?
    }

    pub async fn record_job_start(&self, job_id: &str, job_type: &str) -> Result<()> {
        self.send(SamplerCommand::RecordJobStart {
            job_id: job_id.to_string(),
            job_type: job_type.to_string(),
        })
        .await
    }

    pub async fn record_job_complete(&self, job_id: &str, success: bool, error: Option<String>) -> Result<()> {
        self.send(SamplerCommand::RecordJobComplete {
            job_id: job_id.to_string(),
            success,
            error,
        })
        .await
    }

    pub async fn record_job_retry(&self, job_id: &str) -> Result<()> {
        self.send(SamplerCommand::RecordJobRetry {
            job_id: job_id.to_string(),
        })
        .await
    }

    /// Latest snapshot, if any was collected
    pub async fn current(&self) -> Result<Option<Arc<MetricsSnapshot>>> {
        self.request(|respond_to| SamplerCommand::GetCurrent { respond_to }, "GetCurrent")
            .await
    }

    /// The last `limit` snapshots, oldest first
    pub async fn history(&self, limit: usize) -> Result<Vec<Arc<MetricsSnapshot>>> {
        self.request(|respond_to| SamplerCommand::GetHistory { limit, respond_to }, "GetHistory")
            .await
    }

    /// Ledger entries, newest first
    pub async fn job_metrics(&self, limit: usize) -> Result<Vec<JobMetric>> {
        self.request(
            |respond_to| SamplerCommand::GetJobMetrics { limit, respond_to },
            "GetJobMetrics",
        )
        .await
    }

    pub async fn update_thresholds(&self, update: ThresholdsUpdate) -> Result<Thresholds> {
        self.request(
            |respond_to| SamplerCommand::UpdateThresholds { update, respond_to },
            "UpdateThresholds",
        )
        .await
    }

    pub async fn thresholds(&self) -> Result<Thresholds> {
        self.request(|respond_to| SamplerCommand::GetThresholds { respond_to }, "GetThresholds")
            .await
    }

    pub async fn clear_history(&self) -> Result<()> {
        self.send(SamplerCommand::ClearHistory).await
    }

    pub async fn is_running(&self) -> Result<bool> {
        self.request(|respond_to| SamplerCommand::IsRunning { respond_to }, "IsRunning")
            .await
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.send(SamplerCommand::Shutdown).await
    }

    async fn send(&self, cmd: SamplerCommand) -> Result<()> {
        self.sender
            .send(cmd)
            .await
            .context("failed to send command to sampler")
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> SamplerCommand,
        name: &str,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(make(tx))
            .await
            .with_context(|| format!("failed to send {name} command"))?;

        rx.await.context("failed to receive response")
    }
}
