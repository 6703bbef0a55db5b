//! Metrics endpoints backed by the sampler

use std::sync::Arc;

use axum::{
    Json,
    extract::{Query, State},
};

use super::LimitQuery;
use crate::api::error::{ApiError, ApiResult};
use crate::api::state::ApiState;
use crate::config::{Thresholds, ThresholdsUpdate};
use crate::{JobMetric, MetricsSnapshot};

/// GET /api/v1/metrics
pub async fn current(State(state): State<ApiState>) -> ApiResult<Json<Arc<MetricsSnapshot>>> {
    state
        .system
        .sampler
        .current()
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("no metrics sampled yet".to_string()))
}

/// GET /api/v1/metrics/history?limit=N
///
/// Oldest first
pub async fn history(
    State(state): State<ApiState>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<Json<Vec<Arc<MetricsSnapshot>>>> {
    let snapshots = state.system.sampler.history(query.limit()).await?;
    Ok(Json(snapshots))
}

/// GET /api/v1/metrics/jobs?limit=N
pub async fn jobs(
    State(state): State<ApiState>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<Json<Vec<JobMetric>>> {
    let jobs = state.system.sampler.job_metrics(query.limit()).await?;
    Ok(Json(jobs))
}

/// GET /api/v1/metrics/thresholds
pub async fn thresholds(State(state): State<ApiState>) -> ApiResult<Json<Thresholds>> {
    Ok(Json(state.system.sampler.thresholds().await?))
}

/// PUT /api/v1/metrics/thresholds
///
/// Partial update; fields left out keep their value
pub async fn update_thresholds(
    State(state): State<ApiState>,
    Json(update): Json<ThresholdsUpdate>,
) -> ApiResult<Json<Thresholds>> {
    let invalid = [update.error_rate, update.avg_processing_time_ms, update.memory_mb]
        .into_iter()
        .flatten()
        .any(|value| !value.is_finite() || value < 0.0);
    if invalid {
        return Err(ApiError::InvalidRequest(
            "thresholds must be finite and non-negative".to_string(),
        ));
    }

    Ok(Json(state.system.sampler.update_thresholds(update).await?))
}
