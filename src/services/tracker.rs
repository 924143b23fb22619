//! Bulk upload job lifecycle.
//!
//! A job is created in `processing`, walked item by item by a worker, and
//! ends `completed` once every item has an outcome or `failed` on a
//! job-level fault or cancellation. The job row is the only shared state:
//! every write is conditional on the job still being `processing`, so
//! whichever of the worker loop and a cancel request lands first wins and the
//! other's writes are dropped.

use std::sync::Arc;
use uuid::Uuid;

use crate::db::{JobStore, PostingStore, ResumeStore, StoreError};
use crate::models::job::{
    BulkUploadJob, IngestMethod, IngestPayload, ItemOutcome, NewBulkUploadJob, Outcome, Owner,
    Requester,
};
use crate::models::upload::{JobResultsResponse, JobStatusResponse, JobSummary};
use crate::services::processor::ItemProcessor;
use crate::services::queue::JobDispatch;
use crate::services::scorer::{ScorerAdapter, ScorerError};
use crate::services::sources::{EnumerationError, SourceResolver};
use crate::services::storage::{StorageError, UploadStaging};

pub const CANCELLED_BY_USER: &str = "Cancelled by user";

const LIST_LIMIT: i64 = 50;

/// A file received with the upload request.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// What the client asked to ingest.
#[derive(Debug, Clone)]
pub enum StartRequest {
    LocalBatch(Vec<UploadedFile>),
    DriveLink(String),
    Spreadsheet(UploadedFile),
}

impl StartRequest {
    pub fn method(&self) -> IngestMethod {
        match self {
            StartRequest::LocalBatch(_) => IngestMethod::LocalBatch,
            StartRequest::DriveLink(_) => IngestMethod::DriveLink,
            StartRequest::Spreadsheet(_) => IngestMethod::Spreadsheet,
        }
    }
}

/// Collaborators of the tracker.
pub struct TrackerDeps {
    pub jobs: Arc<dyn JobStore>,
    pub postings: Arc<dyn PostingStore>,
    pub resumes: Arc<dyn ResumeStore>,
    pub staging: UploadStaging,
    pub sources: Arc<SourceResolver>,
    pub processor: ItemProcessor,
    pub scorer: ScorerAdapter,
    pub dispatch: Arc<dyn JobDispatch>,
}

pub struct JobTracker {
    jobs: Arc<dyn JobStore>,
    postings: Arc<dyn PostingStore>,
    resumes: Arc<dyn ResumeStore>,
    staging: UploadStaging,
    sources: Arc<SourceResolver>,
    processor: ItemProcessor,
    scorer: ScorerAdapter,
    dispatch: Arc<dyn JobDispatch>,
}

impl JobTracker {
    pub fn new(deps: TrackerDeps) -> Self {
        Self {
            jobs: deps.jobs,
            postings: deps.postings,
            resumes: deps.resumes,
            staging: deps.staging,
            sources: deps.sources,
            processor: deps.processor,
            scorer: deps.scorer,
            dispatch: deps.dispatch,
        }
    }

    pub fn scoring_enabled(&self) -> bool {
        self.scorer.is_configured()
    }

    /// Validate and persist a new job, stage its uploads, and hand it to the
    /// workers. Returns as soon as the job is queued.
    pub async fn start_job(
        &self,
        job_posting_id: &str,
        request: StartRequest,
        requester: Requester,
    ) -> Result<Uuid, TrackerError> {
        let job_posting_id = parse_id(job_posting_id, "job posting id")?;
        if self.postings.get_posting(job_posting_id).await?.is_none() {
            return Err(TrackerError::InvalidReference(format!(
                "Job posting {job_posting_id} not found"
            )));
        }

        let job_id = Uuid::new_v4();
        let method = request.method();
        let payload = self.stage(job_id, request).await?;

        let blob_keys: Vec<String> = payload.blob_keys().into_iter().map(String::from).collect();
        let created = self
            .jobs
            .create_job(NewBulkUploadJob {
                id: job_id,
                job_posting_id,
                owner: Owner::from(requester),
                payload,
            })
            .await;
        let job = match created {
            Ok(job) => job,
            Err(e) => {
                tracing::error!(job_id = %job_id, error = %e, "Failed to create bulk upload job");
                let keys: Vec<&str> = blob_keys.iter().map(String::as_str).collect();
                self.staging.discard(&keys).await;
                return Err(e.into());
            }
        };

        metrics::counter!("bulk_upload_jobs_total", "method" => method.to_string()).increment(1);
        tracing::info!(
            job_id = %job.id,
            job_posting_id = %job_posting_id,
            method = %method,
            requester = %requester.id,
            "Bulk upload job created"
        );

        if let Err(e) = self.dispatch.dispatch(job_id).await {
            tracing::error!(job_id = %job_id, error = %e, "Failed to queue bulk upload job");
            self.jobs
                .fail_job(job_id, "Could not queue the job for processing")
                .await?;
            self.staging.discard(&job.payload.blob_keys()).await;
            return Err(TrackerError::Dispatch(e.to_string()));
        }

        Ok(job_id)
    }

    async fn stage(
        &self,
        job_id: Uuid,
        request: StartRequest,
    ) -> Result<IngestPayload, TrackerError> {
        match request {
            StartRequest::LocalBatch(files) => {
                if files.is_empty() {
                    return Err(TrackerError::InvalidInput("No files uploaded".to_string()));
                }
                if let Some(empty) = files.iter().find(|f| f.bytes.is_empty()) {
                    return Err(TrackerError::InvalidInput(format!(
                        "Uploaded file {} is empty",
                        empty.file_name
                    )));
                }

                let mut staged = Vec::with_capacity(files.len());
                for (index, file) in files.iter().enumerate() {
                    let result = self
                        .staging
                        .stage(
                            job_id,
                            index,
                            &file.file_name,
                            file.content_type.as_deref(),
                            &file.bytes,
                        )
                        .await;
                    match result {
                        Ok(file) => staged.push(file),
                        Err(e) => {
                            let keys: Vec<&str> = staged.iter().map(|f| f.blob_key.as_str()).collect();
                            self.staging.discard(&keys).await;
                            return Err(e.into());
                        }
                    }
                }
                Ok(IngestPayload::LocalBatch { files: staged })
            }
            StartRequest::DriveLink(link) => {
                let drive_link = link.trim().to_string();
                if drive_link.is_empty() {
                    return Err(TrackerError::InvalidInput(
                        "A Google Drive link is required".to_string(),
                    ));
                }
                Ok(IngestPayload::DriveLink { drive_link })
            }
            StartRequest::Spreadsheet(file) => {
                if file.bytes.is_empty() {
                    return Err(TrackerError::InvalidInput(
                        "Uploaded spreadsheet is empty".to_string(),
                    ));
                }
                let staged = self
                    .staging
                    .stage(
                        job_id,
                        0,
                        &file.file_name,
                        file.content_type.as_deref(),
                        &file.bytes,
                    )
                    .await?;
                Ok(IngestPayload::Spreadsheet { file: staged })
            }
        }
    }

    /// Worker entry point: run a queued job to a terminal state.
    ///
    /// Item failures are recorded against the item. Job-level faults mark the
    /// job `failed` and are not returned; only store faults while recording
    /// that failure surface as `Err`.
    pub async fn run_job(&self, job_id: Uuid) -> Result<(), TrackerError> {
        let job = self
            .jobs
            .get_job(job_id)
            .await?
            .ok_or(TrackerError::NotFound(job_id))?;

        if job.status.is_terminal() {
            tracing::info!(job_id = %job_id, status = %job.status, "Job already finished, skipping");
            return Ok(());
        }

        tracing::info!(job_id = %job_id, method = %job.method, "Starting bulk upload job");
        let result = self.drive_items(&job).await;

        let outcome = match result {
            Ok(RunEnd::Completed) => {
                metrics::counter!("bulk_upload_jobs_completed").increment(1);
                Ok(())
            }
            Ok(RunEnd::Stopped) => {
                tracing::info!(job_id = %job_id, "Job stopped before completion");
                Ok(())
            }
            Err(fault) => {
                tracing::error!(job_id = %job_id, error = %fault, "Bulk upload job failed");
                metrics::counter!("bulk_upload_jobs_failed").increment(1);
                self.jobs
                    .fail_job(job_id, &fault.to_string())
                    .await
                    .map(|_| ())
                    .map_err(TrackerError::from)
            }
        };

        // On `Err` the job is still `processing`; keep its uploads so it can be rerun.
        if outcome.is_ok() {
            self.staging.discard(&job.payload.blob_keys()).await;
        }
        outcome
    }

    async fn drive_items(&self, job: &BulkUploadJob) -> Result<RunEnd, JobFault> {
        self.scorer.ensure_configured()?;

        let posting = self
            .postings
            .get_posting(job.job_posting_id)
            .await?
            .ok_or(JobFault::PostingMissing(job.job_posting_id))?;

        let items = self.sources.enumerate(&job.payload).await?;

        // A redelivered job keeps its total and continues after the last
        // recorded outcome.
        let total = if job.total_items == 0 {
            let total = u32::try_from(items.len()).unwrap_or(u32::MAX);
            if !self.jobs.set_total_items(job.id, total).await? {
                return Ok(RunEnd::Stopped);
            }
            tracing::info!(job_id = %job.id, total, "Enumerated job items");
            total
        } else {
            job.total_items
        };
        if items.len() < total as usize {
            return Err(JobFault::SourceChanged {
                expected: total,
                found: items.len(),
            });
        }
        let done = job.results.len();
        if done > 0 {
            tracing::info!(job_id = %job.id, done, total, "Resuming partly processed job");
        }

        for item in items.iter().take(total as usize).skip(done) {
            let label = item.label();
            // A failed write means the job left `processing` (cancelled).
            if !self.jobs.set_current_item(job.id, &label).await? {
                return Ok(RunEnd::Stopped);
            }

            let outcome = match self.processor.process(job.id, item, &posting).await {
                Ok(record) => ItemOutcome::success(label, record.id, item.source_url()),
                Err(e) => ItemOutcome::failed(label, e.to_string(), item.source_url()),
            };

            if !self.jobs.record_outcome(job.id, &outcome).await? {
                return Ok(RunEnd::Stopped);
            }
        }

        if !self.jobs.complete_job(job.id).await? {
            return Ok(RunEnd::Stopped);
        }
        tracing::info!(job_id = %job.id, total, "Bulk upload job completed");
        Ok(RunEnd::Completed)
    }

    pub async fn get_status(
        &self,
        job_id: &str,
        requester: &Requester,
    ) -> Result<JobStatusResponse, TrackerError> {
        let job = self.owned_job(job_id, requester).await?;
        Ok(JobStatusResponse::from(&job))
    }

    pub async fn get_results(
        &self,
        job_id: &str,
        requester: &Requester,
    ) -> Result<JobResultsResponse, TrackerError> {
        let job = self.owned_job(job_id, requester).await?;

        let resume_ids: Vec<Uuid> = job
            .results
            .iter()
            .filter(|r| r.outcome == Outcome::Success)
            .filter_map(|r| r.result_id)
            .collect();
        let successful_resumes = self.resumes.get_resumes(&resume_ids).await?;
        let failed_files = job
            .results
            .iter()
            .filter(|r| r.outcome == Outcome::Failed)
            .cloned()
            .collect();

        Ok(JobResultsResponse {
            job_id: job.id,
            status: job.status,
            total: job.total_items,
            successful: job.successful_items,
            failed: job.failed_items,
            successful_resumes,
            failed_files,
        })
    }

    /// The requester's jobs, newest first.
    pub async fn list_jobs(&self, requester: &Requester) -> Result<Vec<JobSummary>, TrackerError> {
        let jobs = self
            .jobs
            .list_jobs_for_owner(Owner::from(*requester), LIST_LIMIT)
            .await?;
        Ok(jobs.iter().map(JobSummary::from).collect())
    }

    /// Stop a running job. The item in flight finishes; no further item
    /// starts. Cancelling a finished job leaves it unchanged.
    pub async fn cancel(
        &self,
        job_id: &str,
        requester: &Requester,
    ) -> Result<JobStatusResponse, TrackerError> {
        let job = self.owned_job(job_id, requester).await?;
        if self.jobs.fail_job(job.id, CANCELLED_BY_USER).await? {
            tracing::info!(job_id = %job.id, requester = %requester.id, "Bulk upload job cancelled");
        }

        let current = self
            .jobs
            .get_job(job.id)
            .await?
            .ok_or(TrackerError::NotFound(job.id))?;
        Ok(JobStatusResponse::from(&current))
    }

    async fn owned_job(
        &self,
        job_id: &str,
        requester: &Requester,
    ) -> Result<BulkUploadJob, TrackerError> {
        let job_id = parse_id(job_id, "job id")?;
        let job = self
            .jobs
            .get_job(job_id)
            .await?
            .ok_or(TrackerError::NotFound(job_id))?;

        if !job.owner.is_owned_by(requester) {
            tracing::warn!(job_id = %job_id, requester = %requester.id, "Job access denied");
            return Err(TrackerError::AccessDenied);
        }
        Ok(job)
    }
}

fn parse_id(value: &str, what: &str) -> Result<Uuid, TrackerError> {
    Uuid::parse_str(value.trim())
        .map_err(|_| TrackerError::InvalidInput(format!("Invalid {what}: {value}")))
}

enum RunEnd {
    Completed,
    /// The job left `processing` underneath the loop.
    Stopped,
}

/// Faults that fail a whole job.
#[derive(Debug, thiserror::Error)]
enum JobFault {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ScorerError),

    #[error("Job posting {0} no longer exists")]
    PostingMissing(Uuid),

    #[error(transparent)]
    Enumeration(#[from] EnumerationError),

    #[error("Source now lists {found} items but the job was started with {expected}")]
    SourceChanged { expected: u32, found: usize },

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    InvalidReference(String),

    #[error("Bulk upload job {0} not found")]
    NotFound(Uuid),

    #[error("You do not have access to this bulk upload job")]
    AccessDenied,

    #[error("Failed to stage upload: {0}")]
    Staging(#[from] StorageError),

    #[error("Failed to queue job: {0}")]
    Dispatch(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}
