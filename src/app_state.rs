use sqlx::PgPool;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::db::postgres::PgStore;
use crate::services::{
    auth::TokenVerifier,
    drive::{DriveClient, DriveError},
    encryption::{EncryptionError, UploadCipher},
    extractor::DocumentExtractor,
    fetch::{FetchError, Fetcher},
    processor::ItemProcessor,
    queue::JobQueue,
    scorer::{ScorerAdapter, ScorerError, TextGenerator, WorkersAiClient},
    sources::SourceResolver,
    storage::{R2Client, StorageError, UploadStaging},
    tracker::{JobTracker, TrackerDeps},
};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub queue: Arc<JobQueue>,
    pub tracker: Arc<JobTracker>,
    pub auth: Arc<TokenVerifier>,
}

impl AppState {
    pub fn new(db: PgPool, queue: Arc<JobQueue>, tracker: JobTracker, auth: TokenVerifier) -> Self {
        Self {
            db,
            queue,
            tracker: Arc::new(tracker),
            auth: Arc::new(auth),
        }
    }
}

/// Wire the tracker and its collaborators from configuration.
/// Used by both the API server and the worker.
pub fn build_tracker(
    config: &AppConfig,
    db: PgPool,
    queue: Arc<JobQueue>,
) -> Result<JobTracker, StartupError> {
    let store = Arc::new(PgStore::new(db));

    let r2 = R2Client::new(
        &config.r2_bucket,
        &config.r2_endpoint,
        &config.r2_access_key,
        &config.r2_secret_key,
    )?;
    let cipher = UploadCipher::new(&config.encryption_key)?;
    let staging = UploadStaging::new(Arc::new(r2), Arc::new(cipher));

    let fetcher = Fetcher::new(config.fetch_timeout(), config.max_download_bytes)?;
    let drive = DriveClient::new(fetcher.clone(), config.google_service_account_json.as_deref())?;
    if !drive.is_authenticated() {
        tracing::warn!("No Google service account configured; Drive links are resolved publicly");
    }
    let sources = Arc::new(SourceResolver::new(staging.clone(), Arc::new(drive), fetcher));

    let generator: Option<Arc<dyn TextGenerator>> = match config.workers_ai_credentials() {
        Some((account_id, api_token)) => Some(Arc::new(WorkersAiClient::new(
            account_id,
            api_token,
            config.cf_ai_model.as_deref(),
        )?)),
        None => {
            tracing::warn!("Workers AI credentials missing; bulk upload jobs will fail");
            None
        }
    };
    let scorer = ScorerAdapter::new(generator, config.scorer_max_concurrency);

    let processor = ItemProcessor::new(
        sources.clone(),
        Arc::new(DocumentExtractor),
        scorer.clone(),
        store.clone(),
    );

    Ok(JobTracker::new(TrackerDeps {
        jobs: store.clone(),
        postings: store.clone(),
        resumes: store,
        staging,
        sources,
        processor,
        scorer,
        dispatch: queue,
    }))
}

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("Storage setup failed: {0}")]
    Storage(#[from] StorageError),

    #[error("Encryption setup failed: {0}")]
    Encryption(#[from] EncryptionError),

    #[error("HTTP client setup failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("Google Drive setup failed: {0}")]
    Drive(#[from] DriveError),

    #[error("AI scorer setup failed: {0}")]
    Scorer(#[from] ScorerError),
}
