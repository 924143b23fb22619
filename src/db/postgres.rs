use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::{queries, resume_queries, JobStore, PostingStore, ResumeStore, StoreError};
use crate::models::job::{BulkUploadJob, ItemOutcome, NewBulkUploadJob, Owner};
use crate::models::resume::{JobPosting, ResumeRecord};

/// Postgres-backed implementation of the store traits.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for PgStore {
    async fn create_job(&self, job: NewBulkUploadJob) -> Result<BulkUploadJob, StoreError> {
        queries::create_job(&self.pool, &job).await
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Option<BulkUploadJob>, StoreError> {
        queries::get_job(&self.pool, job_id).await
    }

    async fn list_jobs_for_owner(
        &self,
        owner: Owner,
        limit: i64,
    ) -> Result<Vec<BulkUploadJob>, StoreError> {
        queries::list_jobs_for_owner(&self.pool, owner, limit).await
    }

    async fn set_total_items(&self, job_id: Uuid, total: u32) -> Result<bool, StoreError> {
        queries::set_total_items(&self.pool, job_id, total).await
    }

    async fn set_current_item(&self, job_id: Uuid, label: &str) -> Result<bool, StoreError> {
        queries::set_current_item(&self.pool, job_id, label).await
    }

    async fn record_outcome(
        &self,
        job_id: Uuid,
        outcome: &ItemOutcome,
    ) -> Result<bool, StoreError> {
        queries::record_outcome(&self.pool, job_id, outcome).await
    }

    async fn complete_job(&self, job_id: Uuid) -> Result<bool, StoreError> {
        queries::complete_job(&self.pool, job_id).await
    }

    async fn fail_job(&self, job_id: Uuid, error: &str) -> Result<bool, StoreError> {
        queries::fail_job(&self.pool, job_id, error).await
    }
}

#[async_trait]
impl ResumeStore for PgStore {
    async fn insert_resume(&self, resume: &ResumeRecord) -> Result<(), StoreError> {
        resume_queries::insert_resume(&self.pool, resume).await
    }

    async fn get_resumes(&self, ids: &[Uuid]) -> Result<Vec<ResumeRecord>, StoreError> {
        resume_queries::get_resumes(&self.pool, ids).await
    }
}

#[async_trait]
impl PostingStore for PgStore {
    async fn get_posting(&self, posting_id: Uuid) -> Result<Option<JobPosting>, StoreError> {
        Ok(resume_queries::get_job_posting(&self.pool, posting_id).await?)
    }
}
