use axum::extract::State;
use axum::response::IntoResponse;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::Arc;

/// Install the Prometheus recorder and describe the application metrics.
pub fn install_recorder() -> Result<Arc<PrometheusHandle>, metrics_exporter_prometheus::BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    metrics::describe_counter!("bulk_upload_jobs_total", "Bulk upload jobs accepted");
    metrics::describe_counter!("bulk_upload_jobs_completed", "Bulk upload jobs that completed");
    metrics::describe_counter!(
        "bulk_upload_jobs_failed",
        "Bulk upload jobs that failed on a job-level fault"
    );
    metrics::describe_counter!("bulk_upload_items_total", "Items processed, by outcome");
    metrics::describe_histogram!("bulk_upload_item_seconds", "Time to process one item");
    metrics::describe_histogram!("scorer_request_seconds", "Latency of AI scoring calls");
    metrics::describe_counter!(
        "scorer_fallbacks_total",
        "AI responses that could not be parsed and fell back to defaults"
    );
    metrics::describe_gauge!("bulk_upload_queue_depth", "Jobs waiting in the queue");

    Ok(Arc::new(handle))
}

/// Prometheus metrics scrape endpoint.
pub async fn prometheus_metrics(State(handle): State<Arc<PrometheusHandle>>) -> impl IntoResponse {
    handle.render()
}
