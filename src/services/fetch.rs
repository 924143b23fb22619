use reqwest::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder, StatusCode};
use std::time::Duration;

const MAX_ATTEMPTS: u32 = 3;
const BASE_BACKOFF: Duration = Duration::from_millis(500);

/// Body of a successful download.
#[derive(Debug, Clone)]
pub struct FetchedBody {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
    /// File name advertised by `Content-Disposition`, if any.
    pub file_name: Option<String>,
}

impl FetchedBody {
    pub fn is_html(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|ct| ct.to_ascii_lowercase().starts_with("text/html"))
    }
}

/// HTTP downloader shared by the Drive and direct-link sources.
///
/// Connection errors, timeouts, 429 and 5xx responses are retried with
/// exponential backoff; anything else is returned immediately.
#[derive(Clone)]
pub struct Fetcher {
    http: Client,
    timeout: Duration,
    max_bytes: usize,
}

impl Fetcher {
    pub fn new(timeout: Duration, max_bytes: usize) -> Result<Self, FetchError> {
        let http = Client::builder()
            .user_agent(concat!("resume-intake/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;
        Ok(Self {
            http,
            timeout,
            max_bytes,
        })
    }

    pub fn http(&self) -> &Client {
        &self.http
    }

    /// GET `url` with the default timeout.
    pub async fn get(&self, url: &str) -> Result<FetchedBody, FetchError> {
        self.get_with_timeout(url, self.timeout).await
    }

    pub async fn get_with_timeout(
        &self,
        url: &str,
        timeout: Duration,
    ) -> Result<FetchedBody, FetchError> {
        self.send(|| self.http.get(url).timeout(timeout)).await
    }

    /// Send the request built by `build`, retrying transient failures.
    pub async fn send<F>(&self, build: F) -> Result<FetchedBody, FetchError>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.send_once(build()).await {
                Err(e) if e.is_transient() && attempt < MAX_ATTEMPTS => {
                    let delay = BASE_BACKOFF * (1 << (attempt - 1));
                    tracing::warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient fetch failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                result => return result,
            }
        }
    }

    async fn send_once(&self, request: RequestBuilder) -> Result<FetchedBody, FetchError> {
        let response = request.send().await.map_err(FetchError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        if response
            .content_length()
            .is_some_and(|len| len > self.max_bytes as u64)
        {
            return Err(FetchError::TooLarge(self.max_bytes));
        }

        let content_type = header_str(&response, CONTENT_TYPE.as_str());
        let file_name = header_str(&response, CONTENT_DISPOSITION.as_str())
            .as_deref()
            .and_then(disposition_file_name);

        let bytes = response.bytes().await.map_err(FetchError::from_reqwest)?;
        if bytes.len() > self.max_bytes {
            return Err(FetchError::TooLarge(self.max_bytes));
        }

        Ok(FetchedBody {
            bytes: bytes.to_vec(),
            content_type,
            file_name,
        })
    }
}

fn header_str(response: &reqwest::Response, name: &str) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(String::from)
}

/// Pull `filename="..."` out of a `Content-Disposition` header.
fn disposition_file_name(header: &str) -> Option<String> {
    header.split(';').map(str::trim).find_map(|part| {
        let (key, value) = part.split_once('=')?;
        if !key.trim().eq_ignore_ascii_case("filename") {
            return None;
        }
        let value = value.trim().trim_matches('"');
        (!value.is_empty()).then(|| value.to_string())
    })
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Request timed out")]
    Timeout,

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Server responded with HTTP {0}")]
    Status(u16),

    #[error("Download exceeds the {0} byte limit")]
    TooLarge(usize),

    #[error("Request failed: {0}")]
    Request(String),

    #[error("HTTP client setup failed: {0}")]
    Client(String),
}

impl FetchError {
    fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout
        } else if e.is_connect() {
            FetchError::Connect(e.to_string())
        } else {
            FetchError::Request(e.to_string())
        }
    }

    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Timeout | FetchError::Connect(_) => true,
            FetchError::Status(code) => {
                *code == StatusCode::TOO_MANY_REQUESTS.as_u16() || *code >= 500
            }
            _ => false,
        }
    }
}
