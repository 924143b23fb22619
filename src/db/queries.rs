use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::StoreError;
use crate::models::job::{
    BulkUploadJob, IngestMethod, ItemOutcome, JobStatus, NewBulkUploadJob, Outcome, Owner,
};

const JOB_COLUMNS: &str = r#"
    id, job_posting_id, recruiter_id, manager_id, method, payload, status,
    total_items, processed_items, successful_items, failed_items,
    current_item, error, results, created_at, updated_at, completed_at
"#;

#[derive(Debug, sqlx::FromRow)]
struct JobRow {
    id: Uuid,
    job_posting_id: Uuid,
    recruiter_id: Option<Uuid>,
    manager_id: Option<Uuid>,
    method: String,
    payload: serde_json::Value,
    status: String,
    total_items: i32,
    processed_items: i32,
    successful_items: i32,
    failed_items: i32,
    current_item: Option<String>,
    error: Option<String>,
    results: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<JobRow> for BulkUploadJob {
    type Error = StoreError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let id = row.id;
        let corrupt = |reason: String| StoreError::Corrupt { id, reason };

        let owner = Owner::from_columns(row.recruiter_id, row.manager_id)
            .ok_or_else(|| corrupt("job must have exactly one owner".to_string()))?;
        let method = row
            .method
            .parse::<IngestMethod>()
            .map_err(|_| corrupt(format!("unknown method '{}'", row.method)))?;
        let status = row
            .status
            .parse::<JobStatus>()
            .map_err(|_| corrupt(format!("unknown status '{}'", row.status)))?;

        Ok(BulkUploadJob {
            id: row.id,
            job_posting_id: row.job_posting_id,
            owner,
            method,
            payload: serde_json::from_value(row.payload)?,
            status,
            total_items: counter(row.total_items),
            processed_items: counter(row.processed_items),
            successful_items: counter(row.successful_items),
            failed_items: counter(row.failed_items),
            current_item: row.current_item,
            error: row.error,
            results: serde_json::from_value(row.results)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
            completed_at: row.completed_at,
        })
    }
}

fn counter(value: i32) -> u32 {
    u32::try_from(value).unwrap_or(0)
}

/// Insert a new bulk upload job in `processing`
pub async fn create_job(
    pool: &PgPool,
    job: &NewBulkUploadJob,
) -> Result<BulkUploadJob, StoreError> {
    let payload = serde_json::to_value(&job.payload)?;

    let row: JobRow = sqlx::query_as(&format!(
        r#"
        INSERT INTO bulk_upload_jobs (id, job_posting_id, recruiter_id, manager_id, method, payload, status)
        VALUES ($1, $2, $3, $4, $5, $6, 'processing')
        RETURNING {JOB_COLUMNS}
        "#
    ))
    .bind(job.id)
    .bind(job.job_posting_id)
    .bind(job.owner.recruiter_id())
    .bind(job.owner.manager_id())
    .bind(job.payload.method().to_string())
    .bind(payload)
    .fetch_one(pool)
    .await?;

    row.try_into()
}

/// Get a job by ID
pub async fn get_job(pool: &PgPool, job_id: Uuid) -> Result<Option<BulkUploadJob>, StoreError> {
    let row: Option<JobRow> = sqlx::query_as(&format!(
        "SELECT {JOB_COLUMNS} FROM bulk_upload_jobs WHERE id = $1"
    ))
    .bind(job_id)
    .fetch_optional(pool)
    .await?;

    row.map(BulkUploadJob::try_from).transpose()
}

/// Most recent jobs belonging to an owner
pub async fn list_jobs_for_owner(
    pool: &PgPool,
    owner: Owner,
    limit: i64,
) -> Result<Vec<BulkUploadJob>, StoreError> {
    let rows: Vec<JobRow> = sqlx::query_as(&format!(
        r#"
        SELECT {JOB_COLUMNS}
        FROM bulk_upload_jobs
        WHERE ($1::uuid IS NOT NULL AND recruiter_id = $1)
           OR ($2::uuid IS NOT NULL AND manager_id = $2)
        ORDER BY created_at DESC
        LIMIT $3
        "#
    ))
    .bind(owner.recruiter_id())
    .bind(owner.manager_id())
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(BulkUploadJob::try_from).collect()
}

/// Record the number of enumerated items
pub async fn set_total_items(pool: &PgPool, job_id: Uuid, total: u32) -> Result<bool, StoreError> {
    let result = sqlx::query(
        r#"
        UPDATE bulk_upload_jobs
        SET total_items = $2, updated_at = NOW()
        WHERE id = $1 AND status = 'processing'
        "#,
    )
    .bind(job_id)
    .bind(i32::try_from(total).unwrap_or(i32::MAX))
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Update the label of the item being processed
pub async fn set_current_item(pool: &PgPool, job_id: Uuid, label: &str) -> Result<bool, StoreError> {
    let result = sqlx::query(
        r#"
        UPDATE bulk_upload_jobs
        SET current_item = $2, updated_at = NOW()
        WHERE id = $1 AND status = 'processing'
        "#,
    )
    .bind(job_id)
    .bind(label)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Append one item outcome and bump the counters in a single statement
pub async fn record_outcome(
    pool: &PgPool,
    job_id: Uuid,
    outcome: &ItemOutcome,
) -> Result<bool, StoreError> {
    let (succeeded, failed) = match outcome.outcome {
        Outcome::Success => (1, 0),
        Outcome::Failed => (0, 1),
    };
    let entry = serde_json::to_value(outcome)?;

    let result = sqlx::query(
        r#"
        UPDATE bulk_upload_jobs
        SET processed_items = processed_items + 1,
            successful_items = successful_items + $2,
            failed_items = failed_items + $3,
            results = results || jsonb_build_array($4::jsonb),
            updated_at = NOW()
        WHERE id = $1 AND status = 'processing'
        "#,
    )
    .bind(job_id)
    .bind(succeeded)
    .bind(failed)
    .bind(entry)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Mark a job completed
pub async fn complete_job(pool: &PgPool, job_id: Uuid) -> Result<bool, StoreError> {
    let result = sqlx::query(
        r#"
        UPDATE bulk_upload_jobs
        SET status = 'completed',
            current_item = NULL,
            updated_at = NOW(),
            completed_at = NOW()
        WHERE id = $1 AND status = 'processing'
        "#,
    )
    .bind(job_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Mark a job failed, keeping whatever progress was recorded
pub async fn fail_job(pool: &PgPool, job_id: Uuid, error: &str) -> Result<bool, StoreError> {
    let result = sqlx::query(
        r#"
        UPDATE bulk_upload_jobs
        SET status = 'failed',
            error = $2,
            updated_at = NOW(),
            completed_at = NOW()
        WHERE id = $1 AND status = 'processing'
        "#,
    )
    .bind(job_id)
    .bind(error)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}
