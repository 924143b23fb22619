use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;
use uuid::Uuid;

use crate::models::job::{BulkUploadJob, ItemOutcome, NewBulkUploadJob, Owner};
use crate::models::resume::{JobPosting, ResumeRecord};

pub mod memory;
pub mod postgres;
pub mod queries;
pub mod resume_queries;

/// Initialize PostgreSQL connection pool
pub async fn init_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(database_url)
        .await
}

/// Run database migrations
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| sqlx::Error::Migrate(Box::new(e)))
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Corrupt record {id}: {reason}")]
    Corrupt { id: Uuid, reason: String },
}

/// Persistence for bulk upload job records.
///
/// Every mutating call is a no-op once the job is terminal; the returned
/// `bool` reports whether the write was applied.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn create_job(&self, job: NewBulkUploadJob) -> Result<BulkUploadJob, StoreError>;

    async fn get_job(&self, job_id: Uuid) -> Result<Option<BulkUploadJob>, StoreError>;

    async fn list_jobs_for_owner(
        &self,
        owner: Owner,
        limit: i64,
    ) -> Result<Vec<BulkUploadJob>, StoreError>;

    async fn set_total_items(&self, job_id: Uuid, total: u32) -> Result<bool, StoreError>;

    async fn set_current_item(&self, job_id: Uuid, label: &str) -> Result<bool, StoreError>;

    /// Append an outcome to the log and bump `processed` plus the matching
    /// success/failure counter in a single write.
    async fn record_outcome(&self, job_id: Uuid, outcome: &ItemOutcome)
        -> Result<bool, StoreError>;

    /// `processing` -> `completed`, clearing the current item.
    async fn complete_job(&self, job_id: Uuid) -> Result<bool, StoreError>;

    /// `processing` -> `failed` with the given error message.
    async fn fail_job(&self, job_id: Uuid, error: &str) -> Result<bool, StoreError>;
}

/// Persistence for scored resume records.
#[async_trait]
pub trait ResumeStore: Send + Sync {
    async fn insert_resume(&self, resume: &ResumeRecord) -> Result<(), StoreError>;

    /// Fetch resumes by id, preserving the order of `ids` and skipping unknown ids.
    async fn get_resumes(&self, ids: &[Uuid]) -> Result<Vec<ResumeRecord>, StoreError>;
}

/// Read access to job postings.
#[async_trait]
pub trait PostingStore: Send + Sync {
    async fn get_posting(&self, posting_id: Uuid) -> Result<Option<JobPosting>, StoreError>;
}
