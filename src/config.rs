use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::trace;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub sampler: SamplerConfig,

    #[serde(default)]
    pub alerts: AlertConfig,

    #[serde(default)]
    pub health: HealthConfig,

    #[serde(default)]
    pub hub: HubConfig,

    /// External API client settings
    #[serde(default)]
    pub api_client: ApiClientConfig,

    /// Redis connection for the cache service and the job queue (optional)
    pub redis: Option<RedisConfig>,

    /// HTTP/websocket server (optional - disabled when absent)
    pub server: Option<ServerConfig>,

    /// Log level for the hub binary ("error", "warn", "info", "debug", "trace")
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SamplerConfig {
    /// Maximum snapshots kept in memory
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    /// Maximum job ledger entries before the oldest are evicted
    #[serde(default = "default_job_ledger_capacity")]
    pub job_ledger_capacity: usize,

    /// Ledger entries older than this are swept on every tick
    #[serde(default = "default_job_retention_secs")]
    pub job_retention_secs: u64,

    /// Upper bound for a single collaborator call during a tick
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,

    #[serde(default)]
    pub thresholds: Thresholds,
}

impl SamplerConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            history_capacity: default_history_capacity(),
            job_ledger_capacity: default_job_ledger_capacity(),
            job_retention_secs: default_job_retention_secs(),
            call_timeout_ms: default_call_timeout_ms(),
            thresholds: Thresholds::default(),
        }
    }
}

/// Ad hoc limits checked by the sampler on every tick
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    #[serde(default = "default_queue_depth_limit")]
    pub queue_depth: u64,

    /// Percent
    #[serde(default = "default_error_rate_limit")]
    pub error_rate: f64,

    #[serde(default = "default_processing_time_limit_ms")]
    pub avg_processing_time_ms: f64,

    #[serde(default = "default_memory_limit_mb")]
    pub memory_mb: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            queue_depth: default_queue_depth_limit(),
            error_rate: default_error_rate_limit(),
            avg_processing_time_ms: default_processing_time_limit_ms(),
            memory_mb: default_memory_limit_mb(),
        }
    }
}

/// Partial threshold update; absent fields keep their current value
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ThresholdsUpdate {
    pub queue_depth: Option<u64>,
    pub error_rate: Option<f64>,
    pub avg_processing_time_ms: Option<f64>,
    pub memory_mb: Option<f64>,
}

impl Thresholds {
    pub fn apply(&mut self, update: ThresholdsUpdate) {
        if let Some(value) = update.queue_depth {
            self.queue_depth = value;
        }
        if let Some(value) = update.error_rate {
            self.error_rate = value;
        }
        if let Some(value) = update.avg_processing_time_ms {
            self.avg_processing_time_ms = value;
        }
        if let Some(value) = update.memory_mb {
            self.memory_mb = value;
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlertConfig {
    #[serde(default = "default_alert_history_capacity")]
    pub history_capacity: usize,

    /// How long a resolved alert stays in the active set
    #[serde(default = "default_alert_retention_secs")]
    pub retention_secs: u64,

    /// How often the reaper looks for expired resolved alerts
    #[serde(default = "default_reaper_interval_secs")]
    pub reaper_interval_secs: u64,

    /// Cooldown used by the default rule set
    #[serde(default = "default_cooldown_secs")]
    pub default_cooldown_secs: u64,
}

impl AlertConfig {
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    pub fn reaper_interval(&self) -> Duration {
        Duration::from_secs(self.reaper_interval_secs.max(1))
    }

    pub fn default_cooldown(&self) -> Duration {
        Duration::from_secs(self.default_cooldown_secs)
    }
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            history_capacity: default_alert_history_capacity(),
            retention_secs: default_alert_retention_secs(),
            reaper_interval_secs: default_reaper_interval_secs(),
            default_cooldown_secs: default_cooldown_secs(),
        }
    }
}

/// Limits used by the health probes and the report's free-text alerts
#[derive(Debug, Clone, Deserialize)]
pub struct HealthConfig {
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,

    #[serde(default = "default_queue_depth_limit")]
    pub queue_depth_limit: u64,

    #[serde(default = "default_failed_jobs_limit")]
    pub failed_jobs_limit: u64,

    #[serde(default = "default_cache_memory_limit_mb")]
    pub cache_memory_limit_mb: f64,

    /// Percent
    #[serde(default = "default_api_success_rate_min")]
    pub api_success_rate_min: f64,

    #[serde(default = "default_api_error_limit")]
    pub api_error_limit: u64,

    /// Job name of the background scheduler's heartbeat job
    #[serde(default = "default_scheduler_job_name")]
    pub scheduler_job_name: String,

    #[serde(default = "default_scheduler_window_secs")]
    pub scheduler_window_secs: u64,

    /// How many recent jobs per state are scanned for the heartbeat
    #[serde(default = "default_scheduler_scan_limit")]
    pub scheduler_scan_limit: usize,

    #[serde(default = "default_memory_degraded_mb")]
    pub memory_degraded_mb: f64,

    #[serde(default = "default_memory_unhealthy_mb")]
    pub memory_unhealthy_mb: f64,

    #[serde(default = "default_queue_depth_limit")]
    pub report_waiting_limit: u64,

    #[serde(default = "default_report_failed_limit")]
    pub report_failed_limit: u64,

    #[serde(default = "default_error_rate_limit")]
    pub report_error_rate: f64,
}

impl HealthConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            probe_timeout_ms: default_probe_timeout_ms(),
            queue_depth_limit: default_queue_depth_limit(),
            failed_jobs_limit: default_failed_jobs_limit(),
            cache_memory_limit_mb: default_cache_memory_limit_mb(),
            api_success_rate_min: default_api_success_rate_min(),
            api_error_limit: default_api_error_limit(),
            scheduler_job_name: default_scheduler_job_name(),
            scheduler_window_secs: default_scheduler_window_secs(),
            scheduler_scan_limit: default_scheduler_scan_limit(),
            memory_degraded_mb: default_memory_degraded_mb(),
            memory_unhealthy_mb: default_memory_unhealthy_mb(),
            report_waiting_limit: default_queue_depth_limit(),
            report_failed_limit: default_report_failed_limit(),
            report_error_rate: default_error_rate_limit(),
        }
    }
}

/// Intervals used by the hub binary when it opens its standing subscriptions
#[derive(Debug, Clone, Deserialize)]
pub struct HubConfig {
    #[serde(default = "default_queue_status_interval_ms")]
    pub queue_status_interval_ms: u64,

    #[serde(default = "default_health_interval_ms")]
    pub health_interval_ms: u64,

    #[serde(default = "default_sample_interval_ms")]
    pub metrics_interval_ms: u64,

    #[serde(default = "default_job_poll_interval_ms")]
    pub job_poll_interval_ms: u64,

    /// Buffer of every broadcast channel
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            queue_status_interval_ms: default_queue_status_interval_ms(),
            health_interval_ms: default_health_interval_ms(),
            metrics_interval_ms: default_sample_interval_ms(),
            job_poll_interval_ms: default_job_poll_interval_ms(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiClientConfig {
    /// Request budget of the external API, in requests per second
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: f64,
}

impl Default for ApiClientConfig {
    fn default() -> Self {
        Self {
            requests_per_second: default_requests_per_second(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: String,

    /// Name of the job queue
    pub queue: String,

    /// Key prefix of the queue's keys
    #[serde(default = "default_queue_prefix")]
    pub prefix: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,

    #[serde(default = "default_enable_cors")]
    pub enable_cors: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_sample_interval_ms() -> u64 {
    5_000
}

fn default_history_capacity() -> usize {
    200
}

fn default_job_ledger_capacity() -> usize {
    10_000
}

fn default_job_retention_secs() -> u64 {
    24 * 60 * 60
}

fn default_call_timeout_ms() -> u64 {
    5_000
}

fn default_queue_depth_limit() -> u64 {
    1_000
}

fn default_error_rate_limit() -> f64 {
    10.0
}

fn default_processing_time_limit_ms() -> f64 {
    30_000.0
}

fn default_memory_limit_mb() -> f64 {
    600.0
}

fn default_alert_history_capacity() -> usize {
    500
}

fn default_alert_retention_secs() -> u64 {
    5 * 60
}

fn default_reaper_interval_secs() -> u64 {
    30
}

fn default_cooldown_secs() -> u64 {
    5 * 60
}

fn default_probe_timeout_ms() -> u64 {
    5_000
}

fn default_failed_jobs_limit() -> u64 {
    100
}

fn default_cache_memory_limit_mb() -> f64 {
    512.0
}

fn default_api_success_rate_min() -> f64 {
    80.0
}

fn default_api_error_limit() -> u64 {
    100
}

fn default_scheduler_job_name() -> String {
    "scheduled-sync".to_string()
}

fn default_scheduler_window_secs() -> u64 {
    60 * 60
}

fn default_scheduler_scan_limit() -> usize {
    50
}

fn default_memory_degraded_mb() -> f64 {
    600.0
}

fn default_memory_unhealthy_mb() -> f64 {
    800.0
}

fn default_report_failed_limit() -> u64 {
    50
}

fn default_queue_status_interval_ms() -> u64 {
    5_000
}

fn default_health_interval_ms() -> u64 {
    30_000
}

fn default_job_poll_interval_ms() -> u64 {
    1_000
}

fn default_channel_capacity() -> usize {
    256
}

fn default_requests_per_second() -> f64 {
    1.0
}

fn default_queue_prefix() -> String {
    "bull".to_string()
}

fn default_enable_cors() -> bool {
    true
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content = std::fs::read_to_string(path)?;
    parse_config(&file_content)
}

pub fn parse_config(content: &str) -> anyhow::Result<Config> {
    serde_json::from_str(content)
        .map_err(|e| anyhow::anyhow!("Invalid configuration file provided: {e}"))
        .inspect(|config| trace!("loaded config: {config:?}"))
}
