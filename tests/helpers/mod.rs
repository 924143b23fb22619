//! In-process wiring of the job tracker with in-memory stores and scripted
//! collaborators.

#![allow(dead_code)]

use async_trait::async_trait;
use base64::Engine;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Notify, Semaphore};
use uuid::Uuid;

use resume_intake::db::memory::MemoryStore;
use resume_intake::db::{JobStore, StoreError};
use resume_intake::models::job::{
    BulkUploadJob, IngestPayload, ItemOutcome, JobStatus, NewBulkUploadJob, Owner, Requester,
    Role,
};
use resume_intake::models::resume::JobPosting;
use resume_intake::models::upload::JobStatusResponse;
use resume_intake::services::drive::DriveClient;
use resume_intake::services::encryption::UploadCipher;
use resume_intake::services::extractor::{DocumentKind, ExtractionError, TextExtractor};
use resume_intake::services::fetch::Fetcher;
use resume_intake::services::processor::ItemProcessor;
use resume_intake::services::queue::{JobDispatch, QueueError};
use resume_intake::services::scorer::{ScorerAdapter, ScorerError, TextGenerator};
use resume_intake::services::sources::SourceResolver;
use resume_intake::services::storage::{MemoryBlobStore, UploadStaging};
use resume_intake::services::tracker::{JobTracker, TrackerDeps, UploadedFile};

use crate::fixtures::{ResumeFixture, ANALYSIS_ANSWER, ATS_ANSWER, PDF_HEADER};

/// Reads the text that follows the fake PDF header; DOCX is not used here.
pub struct HeaderTextExtractor;

impl TextExtractor for HeaderTextExtractor {
    fn extract(&self, bytes: &[u8], kind: DocumentKind) -> Result<String, ExtractionError> {
        match kind {
            DocumentKind::Pdf => {
                let body = bytes.strip_prefix(PDF_HEADER).unwrap_or(bytes);
                Ok(String::from_utf8_lossy(body).into_owned())
            }
            DocumentKind::Docx => Err(ExtractionError::Docx("not a docx".to_string())),
        }
    }
}

/// Answers each prompt kind with a canned reply and counts calls.
pub struct ScriptedGenerator {
    analysis: String,
    ats: String,
    calls: AtomicUsize,
    gate: Option<Gate>,
}

/// Holds every call until released; signals when the first call arrives.
struct Gate {
    started: Arc<Notify>,
    release: Arc<Semaphore>,
}

impl ScriptedGenerator {
    pub fn valid() -> Self {
        Self::answering(ANALYSIS_ANSWER, ATS_ANSWER)
    }

    pub fn answering(analysis: &str, ats: &str) -> Self {
        Self {
            analysis: analysis.to_string(),
            ats: ats.to_string(),
            calls: AtomicUsize::new(0),
            gate: None,
        }
    }

    /// A generator whose calls block until `release` gets permits.
    pub fn gated(started: Arc<Notify>, release: Arc<Semaphore>) -> Self {
        Self {
            gate: Some(Gate { started, release }),
            ..Self::valid()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate_content(&self, prompt: &str) -> Result<String, ScorerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.started.notify_one();
            gate.release
                .acquire()
                .await
                .map_err(|_| ScorerError::Closed)?
                .forget();
        }
        if prompt.starts_with("Analyze") {
            Ok(self.analysis.clone())
        } else {
            Ok(self.ats.clone())
        }
    }
}

/// Records dispatched job ids; optionally refuses them.
#[derive(Default)]
pub struct RecordingDispatch {
    pub dispatched: Mutex<Vec<Uuid>>,
    pub refuse: bool,
}

impl RecordingDispatch {
    pub fn refusing() -> Self {
        Self {
            refuse: true,
            ..Self::default()
        }
    }

    pub fn ids(&self) -> Vec<Uuid> {
        self.dispatched.lock().map(|ids| ids.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl JobDispatch for RecordingDispatch {
    async fn dispatch(&self, job_id: Uuid) -> Result<(), QueueError> {
        if self.refuse {
            let cause = serde_json::from_str::<u8>("queue offline").unwrap_err();
            return Err(QueueError::Serialize(cause));
        }
        if let Ok(mut ids) = self.dispatched.lock() {
            ids.push(job_id);
        }
        Ok(())
    }
}

/// Job store that starts failing every write once its budget runs out,
/// as a database outage would.
pub struct FlakyJobStore {
    inner: Arc<MemoryStore>,
    write_budget: AtomicUsize,
}

impl FlakyJobStore {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            write_budget: AtomicUsize::new(usize::MAX),
        }
    }

    /// Allow `writes` more writes, then fail.
    pub fn fail_after(&self, writes: usize) {
        self.write_budget.store(writes, Ordering::SeqCst);
    }

    pub fn recover(&self) {
        self.write_budget.store(usize::MAX, Ordering::SeqCst);
    }

    fn spend(&self, job_id: Uuid) -> Result<(), StoreError> {
        self.write_budget
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .map(|_| ())
            .map_err(|_| StoreError::Corrupt {
                id: job_id,
                reason: "database unavailable".to_string(),
            })
    }
}

#[async_trait]
impl JobStore for FlakyJobStore {
    async fn create_job(&self, job: NewBulkUploadJob) -> Result<BulkUploadJob, StoreError> {
        self.spend(job.id)?;
        self.inner.create_job(job).await
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Option<BulkUploadJob>, StoreError> {
        self.inner.get_job(job_id).await
    }

    async fn list_jobs_for_owner(
        &self,
        owner: Owner,
        limit: i64,
    ) -> Result<Vec<BulkUploadJob>, StoreError> {
        self.inner.list_jobs_for_owner(owner, limit).await
    }

    async fn set_total_items(&self, job_id: Uuid, total: u32) -> Result<bool, StoreError> {
        self.spend(job_id)?;
        self.inner.set_total_items(job_id, total).await
    }

    async fn set_current_item(&self, job_id: Uuid, label: &str) -> Result<bool, StoreError> {
        self.spend(job_id)?;
        self.inner.set_current_item(job_id, label).await
    }

    async fn record_outcome(
        &self,
        job_id: Uuid,
        outcome: &ItemOutcome,
    ) -> Result<bool, StoreError> {
        self.spend(job_id)?;
        self.inner.record_outcome(job_id, outcome).await
    }

    async fn complete_job(&self, job_id: Uuid) -> Result<bool, StoreError> {
        self.spend(job_id)?;
        self.inner.complete_job(job_id).await
    }

    async fn fail_job(&self, job_id: Uuid, error: &str) -> Result<bool, StoreError> {
        self.spend(job_id)?;
        self.inner.fail_job(job_id, error).await
    }
}

/// A tracker plus handles on everything behind it.
pub struct TestTracker {
    pub tracker: JobTracker,
    pub store: Arc<MemoryStore>,
    pub jobs: Arc<FlakyJobStore>,
    pub blobs: Arc<MemoryBlobStore>,
    pub staging: UploadStaging,
    pub sources: Arc<SourceResolver>,
    pub dispatch: Arc<RecordingDispatch>,
    pub posting: JobPosting,
}

pub struct Options {
    pub generator: Option<Arc<dyn TextGenerator>>,
    pub dispatch: RecordingDispatch,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            generator: Some(Arc::new(ScriptedGenerator::valid())),
            dispatch: RecordingDispatch::default(),
        }
    }
}

pub async fn tracker() -> TestTracker {
    tracker_with(Options::default()).await
}

pub async fn tracker_with(options: Options) -> TestTracker {
    let store = Arc::new(MemoryStore::new());
    let blobs = Arc::new(MemoryBlobStore::new());
    let key = base64::engine::general_purpose::STANDARD.encode([7u8; 32]);
    let cipher = Arc::new(UploadCipher::new(&key).expect("valid test key"));
    let staging = UploadStaging::new(blobs.clone(), cipher);

    let fetcher = Fetcher::new(Duration::from_secs(2), 1024 * 1024).expect("http client");
    let drive = Arc::new(DriveClient::new(fetcher.clone(), None).expect("public drive client"));
    let sources = Arc::new(SourceResolver::new(staging.clone(), drive, fetcher));

    let scorer = ScorerAdapter::new(options.generator, 2);
    let processor = ItemProcessor::new(
        sources.clone(),
        Arc::new(HeaderTextExtractor),
        scorer.clone(),
        store.clone(),
    );

    let posting = posting();
    store.insert_posting(posting.clone()).await;

    let jobs = Arc::new(FlakyJobStore::new(store.clone()));
    let dispatch = Arc::new(options.dispatch);
    let tracker = JobTracker::new(TrackerDeps {
        jobs: jobs.clone(),
        postings: store.clone(),
        resumes: store.clone(),
        staging: staging.clone(),
        sources: sources.clone(),
        processor,
        scorer,
        dispatch: dispatch.clone(),
    });

    TestTracker {
        tracker,
        store,
        jobs,
        blobs,
        staging,
        sources,
        dispatch,
        posting,
    }
}

pub fn posting() -> JobPosting {
    JobPosting {
        id: Uuid::new_v4(),
        title: "Senior Backend Engineer".to_string(),
        description: "Build and run high-throughput Rust services.".to_string(),
        requirements: vec!["Rust".to_string(), "PostgreSQL".to_string()],
        category: Some("Software Engineering".to_string()),
        recruiter_id: None,
        manager_id: None,
    }
}

pub fn recruiter() -> Requester {
    Requester {
        id: Uuid::new_v4(),
        role: Role::Recruiter,
    }
}

pub fn manager() -> Requester {
    Requester {
        id: Uuid::new_v4(),
        role: Role::Manager,
    }
}

pub fn upload(fixture: &ResumeFixture) -> UploadedFile {
    UploadedFile {
        file_name: fixture.file_name.to_string(),
        content_type: fixture.content_type.map(String::from),
        bytes: fixture.bytes.clone(),
    }
}

impl TestTracker {
    pub async fn payload(&self, job_id: Uuid) -> IngestPayload {
        self.store
            .get_job(job_id)
            .await
            .expect("store read")
            .expect("job exists")
            .payload
    }

    pub async fn status(&self, job_id: Uuid, requester: &Requester) -> JobStatusResponse {
        self.tracker
            .get_status(&job_id.to_string(), requester)
            .await
            .expect("job status")
    }

    /// Assert the counter relations every snapshot must satisfy.
    pub fn assert_consistent(status: &JobStatusResponse) {
        assert_eq!(
            status.successful_files + status.failed_files,
            status.processed_files,
            "successful + failed must equal processed"
        );
        assert!(status.processed_files <= status.total_files);
        if status.status == JobStatus::Completed {
            assert_eq!(status.processed_files, status.total_files);
        }
    }
}

// HTTP helpers for tests that drive a running server.

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartResponse {
    pub job_id: Uuid,
    pub status: String,
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusBody {
    pub job_id: Uuid,
    pub status: String,
    pub total_files: u32,
    pub processed_files: u32,
    pub successful_files: u32,
    pub failed_files: u32,
    pub current_file: Option<String>,
    pub error: Option<String>,
}

/// Sign a bearer token with the server's `JWT_SECRET`.
pub fn bearer_token(requester: Requester) -> String {
    let secret = std::env::var("JWT_SECRET").expect("JWT_SECRET must be set");
    resume_intake::services::auth::TokenVerifier::new(&secret)
        .and_then(|verifier| verifier.issue(requester, 3600))
        .expect("Failed to sign token")
}

/// Upload local resume files as one bulk job.
pub async fn upload_resumes(
    client: &reqwest::Client,
    base_url: &str,
    token: &str,
    job_posting_id: &str,
    files: &[ResumeFixture],
) -> Result<StartResponse, Box<dyn std::error::Error>> {
    let mut form = reqwest::multipart::Form::new().text("uploadMethod", "folder");
    for fixture in files {
        let mut part =
            reqwest::multipart::Part::bytes(fixture.bytes.clone()).file_name(fixture.file_name);
        if let Some(content_type) = fixture.content_type {
            part = part.mime_str(content_type)?;
        }
        form = form.part("files", part);
    }

    let response = client
        .post(format!("{base_url}/api/v1/bulk-upload/{job_posting_id}"))
        .bearer_auth(token)
        .multipart(form)
        .send()
        .await?;

    if response.status() != reqwest::StatusCode::ACCEPTED {
        let status = response.status();
        let body = response.text().await?;
        return Err(format!("Upload failed with status {status}: {body}").into());
    }
    Ok(response.json().await?)
}

pub async fn get_job_status(
    client: &reqwest::Client,
    base_url: &str,
    token: &str,
    job_id: Uuid,
) -> Result<StatusBody, Box<dyn std::error::Error>> {
    let response = client
        .get(format!("{base_url}/api/v1/bulk-upload/{job_id}/status"))
        .bearer_auth(token)
        .send()
        .await?
        .error_for_status()?;
    Ok(response.json().await?)
}

/// Poll until the job leaves `processing` (max 120 seconds).
pub async fn wait_for_job(
    client: &reqwest::Client,
    base_url: &str,
    token: &str,
    job_id: Uuid,
) -> Result<StatusBody, Box<dyn std::error::Error>> {
    let max_attempts = 120;
    for attempt in 1..=max_attempts {
        let status = get_job_status(client, base_url, token, job_id).await?;
        if status.status != "processing" {
            return Ok(status);
        }
        if attempt % 10 == 0 {
            println!(
                "  Waiting for job {} ({}/{} items)...",
                job_id, status.processed_files, status.total_files
            );
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
    Err(format!("Job {job_id} did not finish within {max_attempts} seconds").into())
}
