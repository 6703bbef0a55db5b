//! BroadcastHubActor - Fans out updates to any number of listeners
//!
//! The hub relays sampler and alert engine events as [`Envelope`]s and runs
//! its own polling subscriptions:
//!
//! | key             | source                                  | ends            |
//! |-----------------|-----------------------------------------|-----------------|
//! | `queue-status`  | queue stats + paused + rate limit poll  | on unsubscribe  |
//! | `health-status` | [`HealthAggregator::check_health`] poll | on unsubscribe  |
//! | `metrics`       | starts the sampler's own timer          | on unsubscribe  |
//! | `job:<id>`      | single job poll                         | terminal state  |
//!
//! Every poll runs as its own task and is aborted on unsubscribe, so results
//! of an in-flight poll are never broadcast after cancellation.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, instrument, trace, warn};

use crate::health::HealthAggregator;
use crate::sources::Sources;
use crate::util::within;

use super::messages::{
    AlertEvent, Envelope, HubCommand, JobUpdate, QueueStatusUpdate, SamplerEvent, SubscriptionKey,
    Update,
};
use super::sampler::SamplerHandle;

/// A live subscription
#[derive(Debug)]
enum Subscription {
    /// Polling task owned by the hub
    Poll { generation: u64, task: JoinHandle<()> },
    /// Metrics are produced by the sampler's own timer; `owned` when this
    /// subscription started it
    Sampler { owned: bool },
}

pub struct BroadcastHubActor {
    sources: Sources,

    sampler: SamplerHandle,

    health: HealthAggregator,

    /// Upper bound for one queue call made by a poll
    call_timeout: Duration,

    subscriptions: HashMap<SubscriptionKey, Subscription>,

    next_generation: u64,

    command_rx: mpsc::Receiver<HubCommand>,

    /// Lets job polls report completion without keeping the hub alive
    command_tx: mpsc::WeakSender<HubCommand>,

    sampler_rx: Option<broadcast::Receiver<SamplerEvent>>,

    alert_rx: Option<broadcast::Receiver<AlertEvent>>,

    envelope_tx: broadcast::Sender<Envelope>,
}

impl BroadcastHubActor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        sources: Sources,
        sampler: SamplerHandle,
        health: HealthAggregator,
        call_timeout: Duration,
        command_rx: mpsc::Receiver<HubCommand>,
        command_tx: mpsc::WeakSender<HubCommand>,
        alert_rx: Option<broadcast::Receiver<AlertEvent>>,
        envelope_tx: broadcast::Sender<Envelope>,
    ) -> Self {
        let sampler_rx = Some(sampler.subscribe());

        Self {
            sources,
            sampler,
            health,
            call_timeout,
            subscriptions: HashMap::new(),
            next_generation: 0,
            command_rx,
            command_tx,
            sampler_rx,
            alert_rx,
            envelope_tx,
        }
    }

    #[instrument(skip(self))]
    pub async fn run(mut self) {
        debug!("starting broadcast hub actor");

        loop {
            tokio::select! {
                result = recv_or_pending(&mut self.sampler_rx) => {
                    match result {
                        Ok(SamplerEvent::Metrics(snapshot)) => self.broadcast(Update::Metrics(snapshot)),
                        Ok(SamplerEvent::JobComplete(metric)) => self.broadcast(Update::JobUpdate(metric.into())),
                        Ok(SamplerEvent::ThresholdBreach { .. }) => {}
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!("hub lagged, skipped {skipped} sampler events");
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            debug!("sampler channel closed");
                            self.sampler_rx = None;
                        }
                    }
                }

                result = recv_or_pending(&mut self.alert_rx) => {
                    match result {
                        Ok(event) => self.broadcast(Update::Alert(event)),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!("hub lagged, skipped {skipped} alert events");
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            debug!("alert channel closed");
                            self.alert_rx = None;
                        }
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

        for (key, subscription) in self.subscriptions.drain() {
            if let Subscription::Poll { task, .. } = subscription {
                trace!("aborting {key} poll");
                task.abort();
            }
        }

        debug!("broadcast hub actor stopped");
    }

    /// Returns `false` when the actor should stop
    async fn handle_command(&mut self, cmd: HubCommand) -> bool {
        match cmd {
            HubCommand::Subscribe {
                key,
                interval,
                respond_to,
            } => {
                let subscribed = self.subscribe(key, interval).await;
                let _ = respond_to.send(subscribed);
            }

            HubCommand::Unsubscribe { key, respond_to } => {
                let _ = respond_to.send(self.unsubscribe(&key).await);
            }

            HubCommand::UnsubscribeAll { respond_to } => {
                let keys: Vec<SubscriptionKey> = self.subscriptions.keys().cloned().collect();
                for key in &keys {
                    self.unsubscribe(key).await;
                }
                // the sampler may have been started outside the hub
                if let Err(e) = self.sampler.stop().await {
                    error!("failed to stop sampler: {:#}", e);
                }
                info!("cancelled {} subscriptions", keys.len());
                let _ = respond_to.send(keys.len());
            }

            HubCommand::ActiveSubscriptions { respond_to } => {
                let mut keys: Vec<SubscriptionKey> = self.subscriptions.keys().cloned().collect();
                keys.sort();
                let _ = respond_to.send(keys);
            }

            HubCommand::Finished { key, generation } => {
                let current = matches!(
                    self.subscriptions.get(&key),
                    Some(Subscription::Poll { generation: g, .. }) if *g == generation
                );
                if current {
                    debug!("{key} reached a terminal state, unsubscribing");
                    self.subscriptions.remove(&key);
                }
            }

            HubCommand::Shutdown => {
                debug!("received shutdown command");
                return false;
            }
        }

        true
    }

    async fn subscribe(&mut self, key: SubscriptionKey, period: Duration) -> bool {
        if self.subscriptions.contains_key(&key) {
            debug!("already subscribed to {key}");
            return false;
        }

        let period = period.max(Duration::from_millis(1));

        let subscription = match &key {
            SubscriptionKey::Metrics => {
                match self.sampler.start(period).await {
                    Ok(owned) => {
                        if !owned {
                            debug!("sampler already running, leaving its timer alone");
                        }
                        Subscription::Sampler { owned }
                    }
                    Err(e) => {
                        error!("failed to start sampler: {:#}", e);
                        return false;
                    }
                }
            }

            SubscriptionKey::QueueStatus => {
                let sources = self.sources.clone();
                let timeout = self.call_timeout;
                self.spawn_poll(period, move || {
                    let sources = sources.clone();
                    async move { poll_queue_status(&sources, timeout).await.map(Update::QueueStatus) }
                })
            }

            SubscriptionKey::HealthStatus => {
                let health = self.health.clone();
                self.spawn_poll(period, move || {
                    let health = health.clone();
                    async move { Ok(Update::HealthUpdate(Box::new(health.check_health().await))) }
                })
            }

            SubscriptionKey::Job(job_id) => self.spawn_job_poll(key.clone(), job_id.clone(), period),
        };

        info!("subscribed to {key}");
        self.subscriptions.insert(key, subscription);
        true
    }

    async fn unsubscribe(&mut self, key: &SubscriptionKey) -> bool {
        match self.subscriptions.remove(key) {
            Some(Subscription::Poll { task, .. }) => {
                task.abort();
            }
            Some(Subscription::Sampler { owned: true }) => {
                if let Err(e) = self.sampler.stop().await {
                    error!("failed to stop sampler: {:#}", e);
                }
            }
            Some(Subscription::Sampler { owned: false }) => {}
            None => {
                debug!("not subscribed to {key}");
                return false;
            }
        }

        info!("unsubscribed from {key}");
        true
    }

    /// Broadcasts the result of `poll` immediately and then every `period`
    fn spawn_poll<P, Fut>(&mut self, period: Duration, poll: P) -> Subscription
    where
        P: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = Result<Update>> + Send + 'static,
    {
        let envelope_tx = self.envelope_tx.clone();

        let task = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                match poll().await {
                    Ok(update) => {
                        let _ = envelope_tx.send(Envelope::now(update));
                    }
                    Err(e) => error!("poll failed: {:#}", e),
                }
            }
        });

        Subscription::Poll {
            generation: self.generation(),
            task,
        }
    }

    /// Polls one job until it completes or fails, then reports back
    fn spawn_job_poll(&mut self, key: SubscriptionKey, job_id: String, period: Duration) -> Subscription {
        let generation = self.generation();
        let envelope_tx = self.envelope_tx.clone();
        let command_tx = self.command_tx.clone();
        let queue = self.sources.queue.clone();
        let timeout = self.call_timeout;

        let task = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;

                let job = match within(timeout, "job lookup", queue.job(&job_id)).await {
                    Ok(Some(job)) => job,
                    Ok(None) => {
                        warn!("job {job_id} not found, ending subscription");
                        break;
                    }
                    Err(e) => {
                        error!("failed to poll job {job_id}: {:#}", e);
                        continue;
                    }
                };

                let terminal = job.state.is_terminal();
                let _ = envelope_tx.send(Envelope::now(Update::JobUpdate(JobUpdate::from(job))));

                if terminal {
                    break;
                }
            }

            if let Some(tx) = command_tx.upgrade() {
                let _ = tx.send(HubCommand::Finished { key, generation }).await;
            }
        });

        Subscription::Poll { generation, task }
    }

    fn generation(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }

    fn broadcast(&self, update: Update) {
        if self.envelope_tx.send(Envelope::now(update)).is_err() {
            trace!("no listeners for envelope");
        }
    }
}

#[instrument(skip(sources))]
async fn poll_queue_status(sources: &Sources, timeout: Duration) -> Result<QueueStatusUpdate> {
    let stats = within(timeout, "queue stats", sources.queue.stats())
        .await
        .context("failed to read queue stats")?;
    let paused = within(timeout, "queue pause state", sources.queue.is_paused())
        .await
        .context("failed to read pause state")?;

    Ok(QueueStatusUpdate {
        depth: stats.depth(),
        stats,
        paused,
        rate_limit: sources.api.rate_limit(),
    })
}

async fn recv_or_pending<T: Clone>(
    rx: &mut Option<broadcast::Receiver<T>>,
) -> Result<T, broadcast::error::RecvError> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Handle for controlling a BroadcastHubActor
#[derive(Clone)]
pub struct HubHandle {
    sender: mpsc::Sender<HubCommand>,
    envelope_tx: broadcast::Sender<Envelope>,
}

impl HubHandle {
    pub fn spawn(
        sources: Sources,
        sampler: SamplerHandle,
        health: HealthAggregator,
        alert_rx: Option<broadcast::Receiver<AlertEvent>>,
        call_timeout: Duration,
        capacity: usize,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(64);
        let (envelope_tx, _) = broadcast::channel(capacity.max(1));

        let actor = BroadcastHubActor::new(
            sources,
            sampler,
            health,
            call_timeout,
            cmd_rx,
            cmd_tx.downgrade(),
            alert_rx,
            envelope_tx.clone(),
        );
        tokio::spawn(actor.run());

        Self {
            sender: cmd_tx,
            envelope_tx,
        }
    }

    /// Register a listener for every envelope
    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.envelope_tx.subscribe()
    }

    pub async fn subscribe_to_queue_status(&self, interval: Duration) -> Result<bool> {
        self.subscribe_to(SubscriptionKey::QueueStatus, interval).await
    }

    pub async fn subscribe_to_health_status(&self, interval: Duration) -> Result<bool> {
        self.subscribe_to(SubscriptionKey::HealthStatus, interval).await
    }

    pub async fn subscribe_to_metrics(&self, interval: Duration) -> Result<bool> {
        self.subscribe_to(SubscriptionKey::Metrics, interval).await
    }

    pub async fn subscribe_to_job(&self, job_id: &str, interval: Duration) -> Result<bool> {
        self.subscribe_to(SubscriptionKey::Job(job_id.to_string()), interval)
            .await
    }

    /// `false` when the key is already subscribed
    pub async fn subscribe_to(&self, key: SubscriptionKey, interval: Duration) -> Result<bool> {
        self.request(
            |respond_to| HubCommand::Subscribe {
                key,
                interval,
                respond_to,
            },
            "Subscribe",
        )
        .await
    }

    /// `false` when the key was not subscribed
    pub async fn unsubscribe(&self, key: SubscriptionKey) -> Result<bool> {
        self.request(|respond_to| HubCommand::Unsubscribe { key, respond_to }, "Unsubscribe")
            .await
    }

    pub async fn unsubscribe_all(&self) -> Result<usize> {
        self.request(|respond_to| HubCommand::UnsubscribeAll { respond_to }, "UnsubscribeAll")
            .await
    }

    /// Active subscription keys, sorted
    pub async fn active_subscriptions(&self) -> Result<Vec<SubscriptionKey>> {
        self.request(
            |respond_to| HubCommand::ActiveSubscriptions { respond_to },
            "ActiveSubscriptions",
        )
        .await
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(HubCommand::Shutdown)
            .await
            .context("failed to send Shutdown command")
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> HubCommand, name: &str) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(make(tx))
            .await
            .with_context(|| format!("failed to send {name} command"))?;

        rx.await.context("failed to receive response")
    }
}
