//! Alert endpoints backed by the alert engine

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde_json::{Value, json};

use super::LimitQuery;
use crate::api::error::{ApiError, ApiResult};
use crate::api::state::ApiState;
use crate::monitors::alerts::Alert;
use crate::monitors::rules::{AlertType, RuleInfo};

/// GET /api/v1/alerts
///
/// Unresolved alerts, newest first
pub async fn active(State(state): State<ApiState>) -> ApiResult<Json<Vec<Alert>>> {
    Ok(Json(state.system.alerts.active().await?))
}

/// GET /api/v1/alerts/history?limit=N
pub async fn history(
    State(state): State<ApiState>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<Json<Vec<Alert>>> {
    Ok(Json(state.system.alerts.history(query.limit()).await?))
}

/// GET /api/v1/alerts/rules
pub async fn rules(State(state): State<ApiState>) -> ApiResult<Json<Vec<RuleInfo>>> {
    Ok(Json(state.system.alerts.rules().await?))
}

/// POST /api/v1/alerts/{id}/acknowledge
pub async fn acknowledge(State(state): State<ApiState>, Path(id): Path<String>) -> ApiResult<Json<Value>> {
    if state.system.alerts.acknowledge(&id).await? {
        Ok(Json(json!({ "acknowledged": id })))
    } else {
        Err(ApiError::NotFound(format!("no open alert '{id}'")))
    }
}

/// POST /api/v1/alerts/{id}/resolve
pub async fn resolve(State(state): State<ApiState>, Path(id): Path<String>) -> ApiResult<Json<Value>> {
    if state.system.alerts.resolve(&id).await? {
        Ok(Json(json!({ "resolved": id })))
    } else {
        Err(ApiError::NotFound(format!("no unresolved alert '{id}'")))
    }
}

/// POST /api/v1/alerts/test
pub async fn test_alert(State(state): State<ApiState>) -> ApiResult<(StatusCode, Json<Alert>)> {
    let alert = state.system.alerts.test_alert().await?;
    Ok((StatusCode::CREATED, Json(alert)))
}

/// DELETE /api/v1/alerts
pub async fn clear(State(state): State<ApiState>) -> ApiResult<Json<Value>> {
    let count = state.system.alerts.clear().await?;
    Ok(Json(json!({ "cleared": count })))
}

/// DELETE /api/v1/alerts/rules/{type}
pub async fn remove_rule(
    State(state): State<ApiState>,
    Path(alert_type): Path<String>,
) -> ApiResult<StatusCode> {
    let alert_type = AlertType::from(alert_type);
    if state.system.alerts.remove_rule(alert_type.clone()).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("no rules for '{alert_type}'")))
    }
}
