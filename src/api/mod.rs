//! REST API and WebSocket server for the monitoring system
//!
//! ## Endpoints
//!
//! - `GET /api/v1/health` - Full system health report
//! - `GET /api/v1/metrics` - Latest snapshot
//! - `GET /api/v1/metrics/history` - Snapshot history (oldest first)
//! - `GET /api/v1/metrics/jobs` - Recent job ledger entries
//! - `GET|PUT /api/v1/metrics/thresholds` - Sampler thresholds
//! - `GET /api/v1/alerts` - Active alerts
//! - `GET /api/v1/alerts/history` - Alert history
//! - `GET /api/v1/alerts/rules` - Alert rules
//! - `POST /api/v1/alerts/{id}/acknowledge|resolve` - Alert lifecycle
//! - `POST /api/v1/alerts/test` - Raise a test alert
//! - `DELETE /api/v1/alerts` - Clear alerts and history
//! - `DELETE /api/v1/alerts/rules/{type}` - Remove the rules of a type
//! - `GET /api/v1/subscriptions` - Active hub subscriptions
//! - `POST /api/v1/subscriptions/jobs/{id}` - Follow one job
//! - `DELETE /api/v1/subscriptions/{key}` - Cancel a subscription
//! - `WS /api/v1/stream` - Every hub envelope as JSON text

pub mod error;
pub mod routes;
pub mod state;
pub mod websocket;

pub use error::{ApiError, ApiResult};
pub use state::ApiState;

use std::net::SocketAddr;

use axum::{
    Router,
    routing::{delete, get, post},
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::ServerConfig;

/// Builds the router without binding a socket
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/v1/health", get(routes::health::health_check))
        .route("/api/v1/metrics", get(routes::metrics::current))
        .route("/api/v1/metrics/history", get(routes::metrics::history))
        .route("/api/v1/metrics/jobs", get(routes::metrics::jobs))
        .route(
            "/api/v1/metrics/thresholds",
            get(routes::metrics::thresholds).put(routes::metrics::update_thresholds),
        )
        .route(
            "/api/v1/alerts",
            get(routes::alerts::active).delete(routes::alerts::clear),
        )
        .route("/api/v1/alerts/history", get(routes::alerts::history))
        .route("/api/v1/alerts/rules", get(routes::alerts::rules))
        .route("/api/v1/alerts/rules/:alert_type", delete(routes::alerts::remove_rule))
        .route("/api/v1/alerts/test", post(routes::alerts::test_alert))
        .route("/api/v1/alerts/:id/acknowledge", post(routes::alerts::acknowledge))
        .route("/api/v1/alerts/:id/resolve", post(routes::alerts::resolve))
        .route("/api/v1/subscriptions", get(routes::subscriptions::list))
        .route(
            "/api/v1/subscriptions/jobs/:id",
            post(routes::subscriptions::subscribe_job),
        )
        .route(
            "/api/v1/subscriptions/:key",
            delete(routes::subscriptions::unsubscribe),
        )
        .route("/api/v1/stream", get(websocket::websocket_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Spawn the API server
///
/// Starts an Axum HTTP server in a background task and returns the bound
/// address.
pub async fn spawn_api_server(config: &ServerConfig, state: ApiState) -> anyhow::Result<SocketAddr> {
    info!("starting API server on {}", config.bind_addr);

    let mut app = router(state);

    if config.enable_cors {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        app = app.layer(cors);
    }

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    let addr = listener.local_addr()?;

    info!("API server listening on {}", addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("API server error: {}", e);
        }
    });

    Ok(addr)
}
