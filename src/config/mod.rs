use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000"). Optional for worker processes.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// PostgreSQL connection string
    pub database_url: String,

    /// Redis connection string for the job queue
    pub redis_url: String,

    /// R2 bucket used to stage uploads
    pub r2_bucket: String,

    /// R2 access key ID (S3-compatible)
    pub r2_access_key: String,

    /// R2 secret access key (S3-compatible)
    pub r2_secret_key: String,

    /// R2 endpoint URL
    pub r2_endpoint: String,

    /// AES-256-GCM encryption key for staged uploads (base64-encoded, 32 bytes)
    pub encryption_key: String,

    /// HS256 secret for bearer tokens
    pub jwt_secret: String,

    /// Cloudflare account ID. AI scoring is disabled when unset.
    pub cf_account_id: Option<String>,

    /// Cloudflare Workers AI API token
    pub cf_api_token: Option<String>,

    /// Workers AI text model override
    pub cf_ai_model: Option<String>,

    /// Google service account key (JSON) for Drive access. Public links only when unset.
    pub google_service_account_json: Option<String>,

    /// Maximum concurrent AI calls per process
    #[serde(default = "default_scorer_max_concurrency")]
    pub scorer_max_concurrency: usize,

    /// Timeout for downloading one remote document
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    /// Largest remote document that will be downloaded
    #[serde(default = "default_max_download_bytes")]
    pub max_download_bytes: usize,

    /// Largest accepted upload request body
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,

    /// Worker sleep between empty queue polls
    #[serde(default = "default_worker_poll_interval_ms")]
    pub worker_poll_interval_ms: u64,

    /// Port of the worker's Prometheus scrape endpoint
    #[serde(default = "default_worker_metrics_port")]
    pub worker_metrics_port: u16,

    /// Jobs a single worker process runs at once
    #[serde(default = "default_worker_concurrency")]
    pub worker_concurrency: usize,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_scorer_max_concurrency() -> usize {
    4
}

fn default_fetch_timeout_secs() -> u64 {
    30
}

fn default_max_download_bytes() -> usize {
    20 * 1024 * 1024
}

fn default_max_upload_bytes() -> usize {
    100 * 1024 * 1024
}

fn default_worker_poll_interval_ms() -> u64 {
    1000
}

fn default_worker_metrics_port() -> u16 {
    9091
}

fn default_worker_concurrency() -> usize {
    2
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    /// Workers AI credentials, when both halves are present.
    pub fn workers_ai_credentials(&self) -> Option<(&str, &str)> {
        match (self.cf_account_id.as_deref(), self.cf_api_token.as_deref()) {
            (Some(account), Some(token)) if !account.is_empty() && !token.is_empty() => {
                Some((account, token))
            }
            _ => None,
        }
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn worker_poll_interval(&self) -> Duration {
        Duration::from_millis(self.worker_poll_interval_ms)
    }
}
