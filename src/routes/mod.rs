use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::app_state::AppState;

pub mod auth;
pub mod bulk_upload;
pub mod health;
pub mod metrics;

/// Build the HTTP router.
pub fn router(state: AppState, prometheus: Arc<PrometheusHandle>, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/api/v1/bulk-upload/jobs", get(bulk_upload::list_jobs))
        .route(
            "/api/v1/bulk-upload/{id}",
            post(bulk_upload::start_bulk_upload),
        )
        .route(
            "/api/v1/bulk-upload/{id}/status",
            get(bulk_upload::get_job_status),
        )
        .route(
            "/api/v1/bulk-upload/{id}/results",
            get(bulk_upload::get_job_results),
        )
        .route(
            "/api/v1/bulk-upload/{id}/cancel",
            post(bulk_upload::cancel_job),
        )
        .with_state(state)
        // Prometheus metrics endpoint (separate state)
        .route(
            "/metrics",
            get(metrics::prometheus_metrics).with_state(prometheus),
        )
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(RequestBodyLimitLayer::new(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
}
