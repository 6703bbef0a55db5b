//! Failures surfaced by the monitoring endpoints
//!
//! Every error leaves the API as `{"error": "<message>"}`. Handler failures
//! that come from a handle call (`anyhow::Error`) mean an actor is gone or a
//! collaborator misbehaved and map to 500.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug)]
pub enum ApiError {
    /// Rejected path segment or body, e.g. an unknown subscription key
    InvalidRequest(String),

    /// No such alert, rule type, subscription or snapshot
    NotFound(String),

    /// Actor unreachable or a collaborator call failed
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            ApiError::InvalidRequest(msg) | ApiError::NotFound(msg) | ApiError::Internal(msg) => msg,
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        // keep the whole context chain, e.g. "failed to send Active command: channel closed"
        ApiError::Internal(format!("{err:#}"))
    }
}
