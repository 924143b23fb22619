use garde::Validate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::job::{BulkUploadJob, IngestMethod, ItemOutcome, JobStatus};
use crate::models::resume::ResumeRecord;

/// JSON body accepted for drive-link uploads.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct DriveUploadRequest {
    #[garde(length(min = 1, max = 64))]
    pub upload_method: String,

    #[garde(length(min = 10, max = 2048))]
    pub drive_link: String,
}

/// Response after a bulk upload has been accepted.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartJobResponse {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub message: String,
}

/// Progress snapshot served to polling clients.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusResponse {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub total_files: u32,
    pub processed_files: u32,
    pub successful_files: u32,
    pub failed_files: u32,
    pub current_file: Option<String>,
    pub error: Option<String>,
}

impl From<&BulkUploadJob> for JobStatusResponse {
    fn from(job: &BulkUploadJob) -> Self {
        Self {
            job_id: job.id,
            status: job.status,
            total_files: job.total_items,
            processed_files: job.processed_items,
            successful_files: job.successful_items,
            failed_files: job.failed_items,
            current_file: job.current_item.clone(),
            error: job.error.clone(),
        }
    }
}

/// Final (or partial) results of a job.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResultsResponse {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub total: u32,
    pub successful: u32,
    pub failed: u32,
    pub successful_resumes: Vec<ResumeRecord>,
    pub failed_files: Vec<ItemOutcome>,
}

/// One row of the requester's job list.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSummary {
    pub job_posting_id: Uuid,
    pub method: IngestMethod,
    #[serde(flatten)]
    pub progress: JobStatusResponse,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl From<&BulkUploadJob> for JobSummary {
    fn from(job: &BulkUploadJob) -> Self {
        Self {
            job_posting_id: job.job_posting_id,
            method: job.method,
            progress: JobStatusResponse::from(job),
            created_at: job.created_at,
        }
    }
}
