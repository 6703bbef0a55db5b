//! Hub subscription endpoints

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};

use crate::actors::messages::SubscriptionKey;
use crate::api::error::{ApiError, ApiResult};
use crate::api::state::ApiState;

/// GET /api/v1/subscriptions
pub async fn list(State(state): State<ApiState>) -> ApiResult<Json<Vec<SubscriptionKey>>> {
    Ok(Json(state.system.hub.active_subscriptions().await?))
}

/// POST /api/v1/subscriptions/jobs/{id}
///
/// 201 when a new job poll started, 200 when the job was already followed
pub async fn subscribe_job(State(state): State<ApiState>, Path(id): Path<String>) -> ApiResult<StatusCode> {
    if id.trim().is_empty() {
        return Err(ApiError::InvalidRequest("job id must not be empty".to_string()));
    }

    let created = state
        .system
        .hub
        .subscribe_to_job(&id, state.job_poll_interval)
        .await?;

    Ok(if created { StatusCode::CREATED } else { StatusCode::OK })
}

/// DELETE /api/v1/subscriptions/{key}
pub async fn unsubscribe(State(state): State<ApiState>, Path(key): Path<String>) -> ApiResult<StatusCode> {
    let key: SubscriptionKey = key
        .parse()
        .map_err(|e: anyhow::Error| ApiError::InvalidRequest(e.to_string()))?;

    if state.system.hub.unsubscribe(key.clone()).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("no subscription '{key}'")))
    }
}
