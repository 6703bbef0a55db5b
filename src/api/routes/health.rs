//! Health check endpoint

use axum::{Json, extract::State, http::StatusCode};

use crate::api::state::ApiState;
use crate::monitors::health::{HealthStatus, SystemHealthReport};

/// GET /api/v1/health
///
/// 503 when the system is UNHEALTHY
pub async fn health_check(State(state): State<ApiState>) -> (StatusCode, Json<SystemHealthReport>) {
    let report = state.system.health.check_health().await;

    let code = match report.status {
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
    };

    (code, Json(report))
}
