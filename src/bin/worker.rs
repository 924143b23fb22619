use metrics_exporter_prometheus::PrometheusBuilder;
use resume_intake::{
    app_state,
    config::AppConfig,
    db,
    services::{
        queue::{JobQueue, QueueError},
        tracker::{JobTracker, TrackerError},
    },
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting bulk upload worker");

    let config = AppConfig::from_env().expect("Failed to load configuration");

    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], config.worker_metrics_port))
        .install()
        .expect("Failed to install Prometheus exporter");

    tracing::info!("Connecting to PostgreSQL");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    let queue = Arc::new(JobQueue::new(&config.redis_url).expect("Failed to initialize job queue"));

    tracing::info!("Initializing services");
    let tracker = Arc::new(
        app_state::build_tracker(&config, db_pool, queue.clone())
            .expect("Failed to initialize bulk upload tracker"),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let poll_interval = config.worker_poll_interval();
    let loops = config.worker_concurrency.max(1);

    tracing::info!(loops, "Worker ready, starting job processing loops");
    let handles: Vec<_> = (0..loops)
        .map(|slot| {
            tokio::spawn(run_loop(
                slot,
                queue.clone(),
                tracker.clone(),
                poll_interval,
                shutdown_rx.clone(),
            ))
        })
        .collect();

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown requested; finishing in-flight jobs");
    let _ = shutdown_tx.send(true);

    for handle in handles {
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "Worker loop panicked");
        }
    }
}

/// Pull jobs until shutdown. A job already being processed runs to its end.
async fn run_loop(
    slot: usize,
    queue: Arc<JobQueue>,
    tracker: Arc<JobTracker>,
    poll_interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    while !*shutdown.borrow() {
        match process_next_job(&queue, &tracker).await {
            Ok(true) => {
                tracing::debug!(slot, "Job processed, checking for next job");
            }
            Ok(false) => {
                tracing::trace!(slot, "No jobs available, sleeping");
                tokio::select! {
                    _ = sleep(poll_interval) => {}
                    _ = shutdown.changed() => {}
                }
            }
            Err(e) => {
                tracing::error!(slot, error = %e, "Error processing job, will retry");
                sleep(poll_interval).await;
            }
        }
    }
}

/// Process the next job from the queue.
/// Returns Ok(true) if a job was processed, Ok(false) if no job was available.
async fn process_next_job(queue: &JobQueue, tracker: &JobTracker) -> Result<bool, WorkerError> {
    if let Ok(depth) = queue.queue_depth().await {
        metrics::gauge!("bulk_upload_queue_depth").set(depth as f64);
    }

    let Some(job) = queue.dequeue().await? else {
        return Ok(false);
    };

    tracing::info!(job_id = %job.job_id, "Processing bulk upload job");
    match tracker.run_job(job.job_id).await {
        Ok(()) => {}
        // A job row that vanished cannot be retried.
        Err(TrackerError::NotFound(id)) => {
            tracing::warn!(job_id = %id, "Queued job has no record, dropping");
        }
        Err(e) => {
            // The job row still says `processing` and its uploads are kept;
            // requeueing the processing-list entry resumes it.
            return Err(e.into());
        }
    }

    queue.complete(&job).await?;
    Ok(true)
}

#[derive(Debug, thiserror::Error)]
enum WorkerError {
    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Tracker(#[from] TrackerError),
}
