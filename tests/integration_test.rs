use resume_intake::{
    config::AppConfig,
    db::{self, postgres::PgStore, JobStore, PostingStore},
    models::job::{IngestPayload, ItemOutcome, JobStatus, NewBulkUploadJob, Owner},
    services::{
        encryption::UploadCipher,
        queue::{JobDispatch, JobQueue},
        storage::{R2Client, UploadStaging},
    },
};
use std::sync::Arc;
use uuid::Uuid;

/// Integration test: job storage against the real infrastructure
///
/// This test verifies:
/// 1. Database connection and schema
/// 2. Encrypted staging through R2 (stage/load/discard)
/// 3. Job queue (dispatch/dequeue/complete)
/// 4. Conditional job writes (counters, terminal guard)
///
/// Note: This requires a running PostgreSQL and Redis instance and R2
/// credentials, configured via environment variables.
#[tokio::test]
#[ignore] // Run with: cargo test --test integration_test -- --ignored
async fn test_full_integration() {
    let config = AppConfig::from_env().expect("Failed to load config");

    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");
    db::run_migrations(&db_pool)
        .await
        .expect("Failed to run migrations");
    let store = PgStore::new(db_pool.clone());

    let r2 = R2Client::new(
        &config.r2_bucket,
        &config.r2_endpoint,
        &config.r2_access_key,
        &config.r2_secret_key,
    )
    .expect("Failed to initialize R2");
    let cipher = UploadCipher::new(&config.encryption_key).expect("Failed to initialize cipher");
    let staging = UploadStaging::new(Arc::new(r2), Arc::new(cipher));
    let queue = JobQueue::new(&config.redis_url).expect("Failed to initialize queue");

    // 1. Seed a posting the job can reference
    let posting_id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO job_postings (id, title, description, requirements, category) \
         VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(posting_id)
    .bind("Integration Test Engineer")
    .bind("Keeps the pipeline honest")
    .bind(vec!["Rust".to_string()])
    .bind("QA")
    .execute(&db_pool)
    .await
    .expect("Failed to insert posting");

    let posting = store
        .get_posting(posting_id)
        .await
        .expect("Failed to read posting")
        .expect("Posting not found");
    assert_eq!(posting.category_tag(), "qa");

    // 2. Stage an upload and read it back
    let job_id = Uuid::new_v4();
    let resume = b"%PDF-1.4 integration resume bytes";
    let staged = staging
        .stage(job_id, 0, "resume.pdf", Some("application/pdf"), resume)
        .await
        .expect("Staging failed");
    assert!(staged.blob_key.starts_with(&format!("bulk/{job_id}/")));

    let loaded = staging.load(&staged).await.expect("Load failed");
    assert_eq!(loaded, resume);

    // 3. Create the job row
    let owner = Owner::Recruiter(Uuid::new_v4());
    let job = store
        .create_job(NewBulkUploadJob {
            id: job_id,
            job_posting_id: posting_id,
            owner,
            payload: IngestPayload::LocalBatch {
                files: vec![staged.clone()],
            },
        })
        .await
        .expect("Failed to create job");
    assert_eq!(job.status, JobStatus::Processing);
    assert_eq!(job.total_items, 0);

    // 4. Queue round trip
    queue.dispatch(job_id).await.expect("Failed to dispatch");
    let dequeued = queue
        .dequeue()
        .await
        .expect("Failed to dequeue")
        .expect("No job in queue");
    assert_eq!(dequeued.job_id, job_id);
    queue.complete(&dequeued).await.expect("Failed to ack job");

    // 5. Progress writes
    assert!(store.set_total_items(job_id, 2).await.expect("set total"));
    assert!(store
        .set_current_item(job_id, "resume.pdf")
        .await
        .expect("set current"));
    let ok = ItemOutcome::success("resume.pdf".to_string(), Uuid::new_v4(), None);
    let bad = ItemOutcome::failed("photo.png".to_string(), "Unsupported".to_string(), None);
    assert!(store.record_outcome(job_id, &ok).await.expect("record ok"));
    assert!(store.record_outcome(job_id, &bad).await.expect("record bad"));
    assert!(store.complete_job(job_id).await.expect("complete"));

    // 6. Terminal guard
    assert!(!store.fail_job(job_id, "late cancel").await.expect("fail"));

    let stored = store
        .get_job(job_id)
        .await
        .expect("Failed to get job")
        .expect("Job not found");
    assert_eq!(stored.status, JobStatus::Completed);
    assert_eq!(
        (stored.processed_items, stored.successful_items, stored.failed_items),
        (2, 1, 1)
    );
    assert!(stored.current_item.is_none());
    assert!(stored.error.is_none());
    assert_eq!(stored.results, vec![ok, bad]);
    assert_eq!(stored.payload, job.payload);

    let listed = store
        .list_jobs_for_owner(owner, 10)
        .await
        .expect("Failed to list jobs");
    assert!(listed.iter().any(|j| j.id == job_id));

    // 7. Cleanup
    staging.discard(&[staged.blob_key.as_str()]).await;
    assert!(staging.load(&staged).await.is_err());

    sqlx::query("DELETE FROM bulk_upload_jobs WHERE id = $1")
        .bind(job_id)
        .execute(&db_pool)
        .await
        .expect("Failed to delete job");
    sqlx::query("DELETE FROM job_postings WHERE id = $1")
        .bind(posting_id)
        .execute(&db_pool)
        .await
        .expect("Failed to delete posting");
}

/// Test database health
#[tokio::test]
#[ignore]
async fn test_database_connection() {
    let config = AppConfig::from_env().expect("Failed to load config");

    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    let result: (i32,) = sqlx::query_as("SELECT 1")
        .fetch_one(&db_pool)
        .await
        .expect("Failed to execute query");

    assert_eq!(result.0, 1);
}

/// Test Redis health
#[tokio::test]
#[ignore]
async fn test_redis_connection() {
    let config = AppConfig::from_env().expect("Failed to load config");

    let queue = JobQueue::new(&config.redis_url).expect("Failed to initialize queue");
    queue.health_check().await.expect("Redis health check failed");
    queue.queue_depth().await.expect("Failed to read queue depth");
}
