//! Shared request counters for the external API client

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{ApiMetrics, ExternalApi};
use crate::RateLimitInfo;

/// Counters the API client bumps after every request
///
/// Cloning is cheap; all clones share the same counters, so the client and
/// the monitoring services can each hold one.
#[derive(Debug, Clone)]
pub struct ApiCounters {
    inner: Arc<Counters>,
    requests_per_second: f64,
}

#[derive(Debug, Default)]
struct Counters {
    successful: AtomicU64,
    failed: AtomicU64,
    rate_limited: AtomicU64,
    /// Millisecond timestamp of the last request, 0 when none happened yet
    last_request_ms: AtomicI64,
}

impl ApiCounters {
    pub fn new(requests_per_second: f64) -> Self {
        Self {
            inner: Arc::new(Counters::default()),
            requests_per_second,
        }
    }

    pub fn record_success(&self) {
        self.inner.successful.fetch_add(1, Ordering::Relaxed);
        self.touch();
    }

    pub fn record_failure(&self) {
        self.inner.failed.fetch_add(1, Ordering::Relaxed);
        self.touch();
    }

    /// A failed request that was rejected because of the rate limit
    pub fn record_rate_limited(&self) {
        self.inner.rate_limited.fetch_add(1, Ordering::Relaxed);
        self.record_failure();
    }

    pub fn snapshot(&self) -> ApiMetrics {
        let successful_requests = self.inner.successful.load(Ordering::Relaxed);
        let failed_requests = self.inner.failed.load(Ordering::Relaxed);
        let last_ms = self.inner.last_request_ms.load(Ordering::Relaxed);

        ApiMetrics {
            total_requests: successful_requests + failed_requests,
            successful_requests,
            failed_requests,
            rate_limited_requests: self.inner.rate_limited.load(Ordering::Relaxed),
            last_request_at: (last_ms > 0)
                .then(|| DateTime::<Utc>::from_timestamp_millis(last_ms))
                .flatten(),
        }
    }

    fn touch(&self) {
        self.inner
            .last_request_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }
}

/// Successful share in percent; 100 when nothing was requested yet
pub fn success_rate(metrics: &ApiMetrics) -> f64 {
    if metrics.total_requests == 0 {
        return 100.0;
    }
    metrics.successful_requests as f64 / metrics.total_requests as f64 * 100.0
}

#[async_trait]
impl ExternalApi for ApiCounters {
    async fn metrics(&self) -> anyhow::Result<ApiMetrics> {
        Ok(self.snapshot())
    }

    async fn success_rate(&self) -> anyhow::Result<f64> {
        Ok(success_rate(&self.snapshot()))
    }

    fn rate_limit(&self) -> RateLimitInfo {
        let metrics = self.snapshot();
        RateLimitInfo {
            requests_per_second: self.requests_per_second,
            total_requests: metrics.total_requests,
            rate_limited_requests: metrics.rate_limited_requests,
        }
    }
}
