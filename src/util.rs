use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;

pub const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

pub fn bytes_to_mb(bytes: u64) -> f64 {
    bytes as f64 / BYTES_PER_MB
}

/// Formats a byte count as megabytes with two decimals, e.g. `"900.00MB"`
pub fn format_mb(bytes: u64) -> String {
    format!("{:.2}MB", bytes_to_mb(bytes))
}

/// Runs `fut` but gives up after `limit`
///
/// Collaborator calls go through this so a hung dependency cannot stall a
/// sampling tick or a health probe.
pub async fn within<T, F>(limit: Duration, what: &str, fut: F) -> anyhow::Result<T>
where
    F: Future<Output = anyhow::Result<T>>,
{
    tokio::time::timeout(limit, fut)
        .await
        .with_context(|| format!("{what} timed out after {}ms", limit.as_millis()))?
}

const MONITOR_CONFIG: &str = "MONITOR_CONFIG";

const DEFAULT_CONFIG: &str = "./monitoring.json";

pub fn get_config_path() -> String {
    std::env::var(MONITOR_CONFIG).unwrap_or_else(|_| DEFAULT_CONFIG.to_string())
}

const REDIS_URL: &str = "REDIS_URL";

pub fn get_redis_url() -> Option<String> {
    std::env::var(REDIS_URL).ok()
}

const MONITOR_API_ADDR: &str = "MONITOR_API_ADDR";

pub fn get_api_addr() -> Option<SocketAddr> {
    let addr_from_env = std::env::var(MONITOR_API_ADDR);
    addr_from_env.ok().and_then(|res| res.parse().ok())
}
