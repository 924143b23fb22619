//! In-memory store used by tests and local runs without Postgres.
//!
//! Each mutation takes the write lock for its whole read-modify-write, which
//! gives the same atomicity as the single-statement updates in `queries`.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::db::{JobStore, PostingStore, ResumeStore, StoreError};
use crate::models::job::{
    BulkUploadJob, ItemOutcome, JobStatus, NewBulkUploadJob, Outcome, Owner,
};
use crate::models::resume::{JobPosting, ResumeRecord};

#[derive(Default)]
pub struct MemoryStore {
    jobs: RwLock<HashMap<Uuid, BulkUploadJob>>,
    resumes: RwLock<HashMap<Uuid, ResumeRecord>>,
    postings: RwLock<HashMap<Uuid, JobPosting>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_posting(&self, posting: JobPosting) {
        self.postings.write().await.insert(posting.id, posting);
    }

    pub async fn resume_count(&self) -> usize {
        self.resumes.read().await.len()
    }

    /// Apply `f` to a job still in `processing`. Returns whether it ran.
    async fn update_processing<F>(&self, job_id: Uuid, f: F) -> bool
    where
        F: FnOnce(&mut BulkUploadJob),
    {
        let mut jobs = self.jobs.write().await;
        match jobs.get_mut(&job_id) {
            Some(job) if job.status == JobStatus::Processing => {
                f(job);
                job.updated_at = Utc::now();
                true
            }
            _ => false,
        }
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn create_job(&self, job: NewBulkUploadJob) -> Result<BulkUploadJob, StoreError> {
        let now = Utc::now();
        let record = BulkUploadJob {
            id: job.id,
            job_posting_id: job.job_posting_id,
            owner: job.owner,
            method: job.payload.method(),
            payload: job.payload,
            status: JobStatus::Processing,
            total_items: 0,
            processed_items: 0,
            successful_items: 0,
            failed_items: 0,
            current_item: None,
            error: None,
            results: Vec::new(),
            created_at: now,
            updated_at: now,
            completed_at: None,
        };
        self.jobs.write().await.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Option<BulkUploadJob>, StoreError> {
        Ok(self.jobs.read().await.get(&job_id).cloned())
    }

    async fn list_jobs_for_owner(
        &self,
        owner: Owner,
        limit: i64,
    ) -> Result<Vec<BulkUploadJob>, StoreError> {
        let jobs = self.jobs.read().await;
        let mut owned: Vec<BulkUploadJob> =
            jobs.values().filter(|job| job.owner == owner).cloned().collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        owned.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(owned)
    }

    async fn set_total_items(&self, job_id: Uuid, total: u32) -> Result<bool, StoreError> {
        Ok(self
            .update_processing(job_id, |job| job.total_items = total)
            .await)
    }

    async fn set_current_item(&self, job_id: Uuid, label: &str) -> Result<bool, StoreError> {
        Ok(self
            .update_processing(job_id, |job| job.current_item = Some(label.to_string()))
            .await)
    }

    async fn record_outcome(
        &self,
        job_id: Uuid,
        outcome: &ItemOutcome,
    ) -> Result<bool, StoreError> {
        Ok(self
            .update_processing(job_id, |job| {
                job.processed_items += 1;
                match outcome.outcome {
                    Outcome::Success => job.successful_items += 1,
                    Outcome::Failed => job.failed_items += 1,
                }
                job.results.push(outcome.clone());
            })
            .await)
    }

    async fn complete_job(&self, job_id: Uuid) -> Result<bool, StoreError> {
        Ok(self
            .update_processing(job_id, |job| {
                job.status = JobStatus::Completed;
                job.current_item = None;
                job.completed_at = Some(Utc::now());
            })
            .await)
    }

    async fn fail_job(&self, job_id: Uuid, error: &str) -> Result<bool, StoreError> {
        Ok(self
            .update_processing(job_id, |job| {
                job.status = JobStatus::Failed;
                job.error = Some(error.to_string());
                job.completed_at = Some(Utc::now());
            })
            .await)
    }
}

#[async_trait]
impl ResumeStore for MemoryStore {
    async fn insert_resume(&self, resume: &ResumeRecord) -> Result<(), StoreError> {
        self.resumes
            .write()
            .await
            .insert(resume.id, resume.clone());
        Ok(())
    }

    async fn get_resumes(&self, ids: &[Uuid]) -> Result<Vec<ResumeRecord>, StoreError> {
        let resumes = self.resumes.read().await;
        Ok(ids.iter().filter_map(|id| resumes.get(id).cloned()).collect())
    }
}

#[async_trait]
impl PostingStore for MemoryStore {
    async fn get_posting(&self, posting_id: Uuid) -> Result<Option<JobPosting>, StoreError> {
        Ok(self.postings.read().await.get(&posting_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::job::IngestPayload;

    fn new_job() -> NewBulkUploadJob {
        NewBulkUploadJob {
            id: Uuid::new_v4(),
            job_posting_id: Uuid::new_v4(),
            owner: Owner::Recruiter(Uuid::new_v4()),
            payload: IngestPayload::DriveLink {
                drive_link: "https://drive.google.com/drive/folders/abc123".to_string(),
            },
        }
    }

    #[tokio::test]
    async fn test_terminal_job_ignores_further_writes() {
        let store = MemoryStore::new();
        let job = store.create_job(new_job()).await.unwrap();

        assert!(store.fail_job(job.id, "boom").await.unwrap());
        assert!(!store.complete_job(job.id).await.unwrap());
        assert!(!store.set_total_items(job.id, 4).await.unwrap());
        let outcome = ItemOutcome::failed("a.pdf".to_string(), "x".to_string(), None);
        assert!(!store.record_outcome(job.id, &outcome).await.unwrap());

        let stored = store.get_job(job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
        assert_eq!(stored.error.as_deref(), Some("boom"));
        assert_eq!(stored.total_items, 0);
        assert_eq!(stored.processed_items, 0);
    }

    #[tokio::test]
    async fn test_record_outcome_keeps_counters_consistent() {
        let store = MemoryStore::new();
        let job = store.create_job(new_job()).await.unwrap();

        let ok = ItemOutcome::success("a.pdf".to_string(), Uuid::new_v4(), None);
        let bad = ItemOutcome::failed("b.pdf".to_string(), "bad".to_string(), None);
        store.record_outcome(job.id, &ok).await.unwrap();
        store.record_outcome(job.id, &bad).await.unwrap();

        let stored = store.get_job(job.id).await.unwrap().unwrap();
        assert_eq!(stored.processed_items, 2);
        assert_eq!(stored.successful_items + stored.failed_items, stored.processed_items);
        assert_eq!(stored.results, vec![ok, bad]);
    }

    #[tokio::test]
    async fn test_list_jobs_filters_by_owner() {
        let store = MemoryStore::new();
        let mine = store.create_job(new_job()).await.unwrap();
        store.create_job(new_job()).await.unwrap();

        let listed = store.list_jobs_for_owner(mine.owner, 10).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, mine.id);
    }
}
