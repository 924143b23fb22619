use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

/// Lifecycle status of a bulk upload job.
///
/// `Processing` is the only non-terminal state.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobStatus {
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, JobStatus::Processing)
    }
}

/// How the source items of a job are obtained.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum IngestMethod {
    LocalBatch,
    DriveLink,
    Spreadsheet,
}

impl IngestMethod {
    /// Map the `uploadMethod` form value sent by clients.
    pub fn from_upload_method(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "folder" | "files" | "local" | "local_batch" => Some(IngestMethod::LocalBatch),
            "drive" | "drive_link" | "gdrive" => Some(IngestMethod::DriveLink),
            "sheet" | "sheets" | "spreadsheet" | "csv" | "excel" => Some(IngestMethod::Spreadsheet),
            _ => None,
        }
    }
}

/// An uploaded file staged in object storage until the worker picks it up.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StagedFile {
    pub file_name: String,
    pub content_type: Option<String>,
    pub size_bytes: u64,
    pub blob_key: String,
}

/// Method-specific configuration persisted with the job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IngestPayload {
    LocalBatch { files: Vec<StagedFile> },
    DriveLink { drive_link: String },
    Spreadsheet { file: StagedFile },
}

impl IngestPayload {
    pub fn method(&self) -> IngestMethod {
        match self {
            IngestPayload::LocalBatch { .. } => IngestMethod::LocalBatch,
            IngestPayload::DriveLink { .. } => IngestMethod::DriveLink,
            IngestPayload::Spreadsheet { .. } => IngestMethod::Spreadsheet,
        }
    }

    /// Object storage keys owned by this payload.
    pub fn blob_keys(&self) -> Vec<&str> {
        match self {
            IngestPayload::LocalBatch { files } => {
                files.iter().map(|f| f.blob_key.as_str()).collect()
            }
            IngestPayload::DriveLink { .. } => Vec::new(),
            IngestPayload::Spreadsheet { file } => vec![file.blob_key.as_str()],
        }
    }
}

/// Requester role carried in the bearer token.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Role {
    Recruiter,
    Manager,
}

/// The authenticated caller of an API operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Requester {
    pub id: Uuid,
    pub role: Role,
}

/// Owner of a job. A job belongs to exactly one recruiter or one manager.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "role", content = "id", rename_all = "snake_case")]
pub enum Owner {
    Recruiter(Uuid),
    Manager(Uuid),
}

impl Owner {
    pub fn recruiter_id(&self) -> Option<Uuid> {
        match self {
            Owner::Recruiter(id) => Some(*id),
            Owner::Manager(_) => None,
        }
    }

    pub fn manager_id(&self) -> Option<Uuid> {
        match self {
            Owner::Manager(id) => Some(*id),
            Owner::Recruiter(_) => None,
        }
    }

    /// Rebuild an owner from the two nullable owner columns.
    pub fn from_columns(recruiter_id: Option<Uuid>, manager_id: Option<Uuid>) -> Option<Self> {
        match (recruiter_id, manager_id) {
            (Some(id), None) => Some(Owner::Recruiter(id)),
            (None, Some(id)) => Some(Owner::Manager(id)),
            _ => None,
        }
    }

    pub fn is_owned_by(&self, requester: &Requester) -> bool {
        match (self, requester.role) {
            (Owner::Recruiter(id), Role::Recruiter) => *id == requester.id,
            (Owner::Manager(id), Role::Manager) => *id == requester.id,
            _ => false,
        }
    }
}

impl From<Requester> for Owner {
    fn from(requester: Requester) -> Self {
        match requester.role {
            Role::Recruiter => Owner::Recruiter(requester.id),
            Role::Manager => Owner::Manager(requester.id),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Failed,
}

/// One entry of a job's append-only result log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ItemOutcome {
    pub source_label: String,
    pub outcome: Outcome,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub result_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub source_url: Option<String>,
}

impl ItemOutcome {
    pub fn success(source_label: String, result_id: Uuid, source_url: Option<String>) -> Self {
        Self {
            source_label,
            outcome: Outcome::Success,
            result_id: Some(result_id),
            error: None,
            source_url,
        }
    }

    pub fn failed(source_label: String, error: String, source_url: Option<String>) -> Self {
        Self {
            source_label,
            outcome: Outcome::Failed,
            result_id: None,
            error: Some(error),
            source_url,
        }
    }
}

/// A bulk upload job: one request to ingest many resumes against a job posting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkUploadJob {
    pub id: Uuid,
    pub job_posting_id: Uuid,
    pub owner: Owner,
    pub method: IngestMethod,
    pub payload: IngestPayload,
    pub status: JobStatus,
    pub total_items: u32,
    pub processed_items: u32,
    pub successful_items: u32,
    pub failed_items: u32,
    pub current_item: Option<String>,
    pub error: Option<String>,
    pub results: Vec<ItemOutcome>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Fields required to insert a new job.
#[derive(Debug, Clone)]
pub struct NewBulkUploadJob {
    pub id: Uuid,
    pub job_posting_id: Uuid,
    pub owner: Owner,
    pub payload: IngestPayload,
}
