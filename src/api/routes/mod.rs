//! HTTP route handlers

pub mod alerts;
pub mod health;
pub mod metrics;
pub mod subscriptions;

use serde::Deserialize;

const DEFAULT_LIMIT: usize = 100;

/// `?limit=N` query parameter
#[derive(Debug, Default, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

impl LimitQuery {
    pub fn limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_LIMIT)
    }
}
