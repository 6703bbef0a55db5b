//! Composition root
//!
//! Builds one instance of every monitoring service and wires their event
//! channels together. Nothing in the crate is a process-wide singleton; the
//! embedding application owns the [`MonitoringSystem`] and passes handles to
//! whoever needs them.

use std::time::Duration;

use anyhow::Result;
use tracing::{debug, info};

use crate::actors::alert_engine::AlertEngineHandle;
use crate::actors::hub::HubHandle;
use crate::actors::sampler::SamplerHandle;
use crate::config::Config;
use crate::health::HealthAggregator;
use crate::monitors::rules::default_rules;
use crate::sources::Sources;

#[derive(Clone)]
pub struct MonitoringSystem {
    pub sampler: SamplerHandle,
    pub alerts: AlertEngineHandle,
    pub health: HealthAggregator,
    pub hub: HubHandle,
}

impl MonitoringSystem {
    /// Spawns all actors; sampling stays off until something subscribes to metrics
    pub fn start(config: &Config, sources: Sources) -> Self {
        let sampler = SamplerHandle::spawn(sources.clone(), config.sampler.clone());

        let alerts = AlertEngineHandle::spawn(
            &config.alerts,
            default_rules(config.alerts.default_cooldown()),
            Some(sampler.subscribe()),
        );

        let health = HealthAggregator::new(sources.clone(), Some(sampler.clone()), config.health.clone());

        let hub = HubHandle::spawn(
            sources,
            sampler.clone(),
            health.clone(),
            Some(alerts.subscribe()),
            config.sampler.call_timeout(),
            config.hub.channel_capacity,
        );

        info!("monitoring system started");

        Self {
            sampler,
            alerts,
            health,
            hub,
        }
    }

    /// Opens the standing queue-status, health-status and metrics subscriptions
    pub async fn subscribe_defaults(&self, config: &Config) -> Result<()> {
        let hub = &config.hub;
        self.hub
            .subscribe_to_queue_status(Duration::from_millis(hub.queue_status_interval_ms))
            .await?;
        self.hub
            .subscribe_to_health_status(Duration::from_millis(hub.health_interval_ms))
            .await?;
        self.hub
            .subscribe_to_metrics(Duration::from_millis(hub.metrics_interval_ms))
            .await?;

        debug!("default subscriptions active");
        Ok(())
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.hub.unsubscribe_all().await?;
        self.hub.shutdown().await?;
        self.alerts.shutdown().await?;
        self.sampler.shutdown().await?;

        info!("monitoring system stopped");
        Ok(())
    }
}
