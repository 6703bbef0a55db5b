//! On-demand health checks
//!
//! [`HealthAggregator::check_health`] probes five components concurrently:
//!
//! ```text
//!              ┌─▶ queue ────────┐
//!              ├─▶ cache ────────┤
//! check_health ├─▶ workers ──────┼─▶ rollup (worst status) + report alerts
//!              ├─▶ external API ─┤
//!              └─▶ memory ───────┘
//! ```
//!
//! Each probe runs in its own task under a timeout. A probe that errors,
//! panics or times out turns into an UNHEALTHY component and never affects
//! its siblings. The external API probe is the exception: an unavailable
//! integration is only DEGRADED.

use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use crate::actors::sampler::SamplerHandle;
use crate::config::HealthConfig;
use crate::monitors::health::{
    self, ComponentHealth, Components, HealthStatus, MetricsSummary, SystemHealthReport,
};
use crate::monitors::thresholds::report_alerts;
use crate::sources::cache_info::{USED_MEMORY, info_field};
use crate::sources::{JobState, Sources};
use crate::util::within;

const HEARTBEAT_STATES: [JobState; 3] = [JobState::Completed, JobState::Active, JobState::Waiting];

#[derive(Clone)]
pub struct HealthAggregator {
    sources: Sources,
    /// Source of the latest snapshot for the metrics summary
    sampler: Option<SamplerHandle>,
    config: Arc<HealthConfig>,
}

impl HealthAggregator {
    pub fn new(sources: Sources, sampler: Option<SamplerHandle>, config: HealthConfig) -> Self {
        Self {
            sources,
            sampler,
            config: Arc::new(config),
        }
    }

    #[instrument(skip(self))]
    pub async fn check_health(&self) -> SystemHealthReport {
        let timeout = self.config.probe_timeout();

        let (queue, cache, workers, external_api, memory) = tokio::join!(
            run_probe("Queue", within(timeout, "queue probe", self.clone().probe_queue())),
            run_probe("Cache", within(timeout, "cache probe", self.clone().probe_cache())),
            run_probe("Workers", within(timeout, "worker probe", self.clone().probe_workers())),
            run_probe("External API", self.clone().probe_api()),
            run_probe("Memory", within(timeout, "memory probe", self.clone().probe_memory())),
        );

        let components = Components {
            queue,
            cache,
            workers,
            external_api,
            memory,
        };
        let status = components.rollup();

        let snapshot = match &self.sampler {
            Some(sampler) => sampler.current().await.unwrap_or_else(|e| {
                warn!("failed to read latest snapshot: {:#}", e);
                None
            }),
            None => None,
        };

        let queue = self.sources.queue.clone();
        let stats = match tokio::spawn(async move { within(timeout, "queue stats", queue.stats()).await }).await {
            Ok(Ok(stats)) => Some(stats),
            Ok(Err(e)) => {
                debug!("no queue stats for report alerts: {:#}", e);
                None
            }
            Err(e) => {
                warn!("queue stats task aborted: {e}");
                None
            }
        };

        let metrics = match (&snapshot, stats) {
            (Some(snapshot), _) => MetricsSummary::from_snapshot(snapshot),
            (None, Some(stats)) => MetricsSummary {
                queue_depth: stats.depth(),
                active_jobs: stats.active,
                failed_jobs: stats.failed,
                completed_jobs: stats.completed,
                ..Default::default()
            },
            (None, None) => MetricsSummary::default(),
        };

        let alerts = stats
            .map(|stats| {
                report_alerts(
                    &stats,
                    snapshot.as_ref().map(|s| s.queue.error_rate),
                    &self.config,
                )
            })
            .unwrap_or_default();

        match status {
            HealthStatus::Healthy => debug!("system is healthy"),
            _ => info!("system is {status}"),
        }

        SystemHealthReport {
            status,
            timestamp: Utc::now(),
            uptime_secs: self.sources.runtime.uptime_secs(),
            components,
            metrics,
            alerts,
        }
    }

    async fn probe_queue(self) -> Result<ComponentHealth> {
        let queue = &self.sources.queue;
        let stats = queue.stats().await.context("failed to read queue stats")?;
        let paused = queue.is_paused().await.context("failed to read pause state")?;

        Ok(health::queue_health(&stats, paused, &self.config))
    }

    async fn probe_cache(self) -> Result<ComponentHealth> {
        let cache = &self.sources.cache;
        let pong = cache.ping().await.context("ping failed")?;
        if pong.trim() != "PONG" {
            return Ok(health::cache_health(&pong, None, &self.config));
        }

        let memory = cache.memory_info().await.context("failed to read memory info")?;
        Ok(health::cache_health(
            &pong,
            info_field(&memory, USED_MEMORY),
            &self.config,
        ))
    }

    async fn probe_workers(self) -> Result<ComponentHealth> {
        let queue = &self.sources.queue;
        let workers = queue.workers().await.context("failed to list workers")?;
        let paused = queue.is_paused().await.context("failed to read pause state")?;

        Ok(health::worker_health(workers.len(), paused))
    }

    /// Never fails: an unreachable integration is reported as DEGRADED
    async fn probe_api(self) -> Result<ComponentHealth> {
        let timeout = self.config.probe_timeout();

        match within(timeout, "external API probe", self.inspect_api()).await {
            Ok(health) => Ok(health),
            Err(e) => {
                debug!("external API not available: {:#}", e);
                Ok(health::api_unavailable(format!("{e:#}")))
            }
        }
    }

    async fn inspect_api(&self) -> Result<ComponentHealth> {
        let api = &self.sources.api;
        let metrics = api.metrics().await.context("failed to read API metrics")?;
        let success_rate = api.success_rate().await.context("failed to read API success rate")?;

        let jobs = self
            .sources
            .queue
            .recent_jobs(&HEARTBEAT_STATES, self.config.scheduler_scan_limit)
            .await
            .context("failed to list recent jobs")?;

        let window = chrono::Duration::seconds(self.config.scheduler_window_secs as i64);
        let heartbeat = health::scheduler_heartbeat(&jobs, &self.config.scheduler_job_name, window, Utc::now());

        Ok(health::api_health(success_rate, &metrics, heartbeat, &self.config))
    }

    async fn probe_memory(self) -> Result<ComponentHealth> {
        let system = self
            .sources
            .runtime
            .sample()
            .await
            .context("failed to sample process memory")?;

        Ok(health::memory_health(&system.memory, &self.config))
    }
}

/// Runs one probe in its own task so a panic stays contained
async fn run_probe<F>(component: &'static str, probe: F) -> ComponentHealth
where
    F: Future<Output = Result<ComponentHealth>> + Send + 'static,
{
    match tokio::spawn(probe).await {
        Ok(Ok(health)) => health,
        Ok(Err(e)) => {
            warn!("{component} probe failed: {:#}", e);
            ComponentHealth::failed(component, format!("{e:#}"))
        }
        Err(e) => {
            warn!("{component} probe aborted: {e}");
            ComponentHealth::failed(component, e)
        }
    }
}
