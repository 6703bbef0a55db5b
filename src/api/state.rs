//! API shared state containing the monitoring handles

use std::time::Duration;

use crate::system::MonitoringSystem;

/// Shared state passed to all API handlers
#[derive(Clone)]
pub struct ApiState {
    pub system: MonitoringSystem,

    /// Poll interval for job subscriptions opened over HTTP
    pub job_poll_interval: Duration,
}

impl ApiState {
    pub fn new(system: MonitoringSystem, job_poll_interval: Duration) -> Self {
        Self {
            system,
            job_poll_interval,
        }
    }
}
