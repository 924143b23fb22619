//! Google Drive access for bulk uploads from a shared link.
//!
//! With a service account configured, folders and files are resolved through
//! the Drive v3 API. Without one, public links are resolved on a best-effort
//! basis: the embedded folder view is scraped for file ids and files are
//! fetched through the public download endpoints.

use jsonwebtoken::{Algorithm, EncodingKey, Header};
use regex::Regex;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::services::fetch::{FetchError, FetchedBody, Fetcher};

const DRIVE_API: &str = "https://www.googleapis.com/drive/v3/files";
const DRIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive.readonly";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

const FOLDER_MIME: &str = "application/vnd.google-apps.folder";
const GOOGLE_DOC_MIME: &str = "application/vnd.google-apps.document";
const PDF_MIME: &str = "application/pdf";
const DOCX_MIME: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// Each public download strategy gets this long before the next is tried.
const PUBLIC_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(15);

static FOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/folders/([A-Za-z0-9_-]{10,})").unwrap());
static FILE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/file/d/([A-Za-z0-9_-]{10,})").unwrap());
static DOCUMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/document/d/([A-Za-z0-9_-]{10,})").unwrap());
static ID_PARAM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[?&]id=([A-Za-z0-9_-]{10,})").unwrap());

/// What a Drive link points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriveTarget {
    Folder(String),
    File(String),
    /// A native Google Docs document, exported as DOCX on download.
    Document(String),
}

/// Resolve the folder or file id from any of the common Drive link shapes.
pub fn parse_drive_link(link: &str) -> Option<DriveTarget> {
    let link = link.trim();
    if !(link.contains("drive.google.com") || link.contains("docs.google.com")) {
        return None;
    }

    if let Some(id) = first_capture(&FOLDER_RE, link) {
        return Some(DriveTarget::Folder(id));
    }
    if let Some(id) = first_capture(&FILE_RE, link) {
        return Some(DriveTarget::File(id));
    }
    if let Some(id) = first_capture(&DOCUMENT_RE, link) {
        return Some(DriveTarget::Document(id));
    }
    first_capture(&ID_PARAM_RE, link).map(DriveTarget::File)
}

fn first_capture(re: &Regex, text: &str) -> Option<String> {
    re.captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// A document found in Drive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    pub id: String,
    pub name: String,
    pub mime_type: Option<String>,
}

impl DriveFile {
    pub fn web_url(&self) -> String {
        if self.is_google_doc() {
            format!("https://docs.google.com/document/d/{}/edit", self.id)
        } else {
            format!("https://drive.google.com/file/d/{}/view", self.id)
        }
    }

    fn is_google_doc(&self) -> bool {
        self.mime_type.as_deref() == Some(GOOGLE_DOC_MIME)
    }

    pub fn from_target(target: &DriveTarget) -> Option<Self> {
        match target {
            DriveTarget::File(id) => Some(Self {
                id: id.clone(),
                name: format!("drive-file-{id}"),
                mime_type: None,
            }),
            DriveTarget::Document(id) => Some(Self {
                id: id.clone(),
                name: format!("google-doc-{id}"),
                mime_type: Some(GOOGLE_DOC_MIME.to_string()),
            }),
            DriveTarget::Folder(_) => None,
        }
    }
}

/// Fields of a Google service account key file that are needed here.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

#[derive(Serialize)]
struct GrantClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
    next_page_token: Option<String>,
}

pub struct DriveClient {
    fetcher: Fetcher,
    account: Option<ServiceAccountKey>,
    token: Mutex<Option<CachedToken>>,
}

impl DriveClient {
    /// `service_account_json` is the raw contents of a service account key file.
    pub fn new(fetcher: Fetcher, service_account_json: Option<&str>) -> Result<Self, DriveError> {
        let account = service_account_json
            .map(|json| {
                serde_json::from_str::<ServiceAccountKey>(json)
                    .map_err(|e| DriveError::Credentials(e.to_string()))
            })
            .transpose()?;

        Ok(Self {
            fetcher,
            account,
            token: Mutex::new(None),
        })
    }

    pub fn is_authenticated(&self) -> bool {
        self.account.is_some()
    }

    /// List the resume documents a link points at, in display order.
    pub async fn resolve(&self, target: &DriveTarget) -> Result<Vec<DriveFile>, DriveError> {
        if self.is_authenticated() {
            return match target {
                DriveTarget::Folder(id) => self.list_folder_api(id).await,
                DriveTarget::File(id) | DriveTarget::Document(id) => {
                    let file = self.file_metadata(id).await?;
                    if file.mime_type.as_deref() == Some(FOLDER_MIME) {
                        self.list_folder_api(id).await
                    } else {
                        Ok(vec![file])
                    }
                }
            };
        }

        match target {
            DriveTarget::Folder(id) => self.list_folder_public(id).await,
            other => Ok(DriveFile::from_target(other).into_iter().collect()),
        }
    }

    /// Download the bytes of one Drive document.
    pub async fn download(&self, file: &DriveFile) -> Result<FetchedBody, DriveError> {
        let mut body = if self.is_authenticated() {
            self.download_api(file).await?
        } else {
            self.download_public(file).await?
        };

        if file.is_google_doc() {
            body.content_type = Some(DOCX_MIME.to_string());
        } else if body.content_type.is_none() {
            body.content_type = file.mime_type.clone();
        }
        Ok(body)
    }

    async fn access_token(&self) -> Result<String, DriveError> {
        let account = self
            .account
            .as_ref()
            .ok_or_else(|| DriveError::Credentials("no service account configured".to_string()))?;

        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at > Instant::now() + Duration::from_secs(60) {
                return Ok(token.value.clone());
            }
        }

        let now = chrono::Utc::now().timestamp();
        let claims = GrantClaims {
            iss: &account.client_email,
            scope: DRIVE_SCOPE,
            aud: &account.token_uri,
            iat: now,
            exp: now + 3600,
        };
        let key = EncodingKey::from_rsa_pem(account.private_key.as_bytes())
            .map_err(|e| DriveError::Credentials(e.to_string()))?;
        let assertion = jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &key)
            .map_err(|e| DriveError::Credentials(e.to_string()))?;

        let http = self.fetcher.http();
        let body = self
            .fetcher
            .send(|| {
                http.post(&account.token_uri).form(&[
                    ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                    ("assertion", assertion.as_str()),
                ])
            })
            .await
            .map_err(|e| DriveError::Auth(e.to_string()))?;
        let token: TokenResponse =
            serde_json::from_slice(&body.bytes).map_err(|e| DriveError::Auth(e.to_string()))?;

        tracing::debug!(expires_in = token.expires_in, "Obtained Drive access token");
        *cached = Some(CachedToken {
            value: token.access_token.clone(),
            expires_at: Instant::now() + Duration::from_secs(token.expires_in),
        });
        Ok(token.access_token)
    }

    async fn list_folder_api(&self, folder_id: &str) -> Result<Vec<DriveFile>, DriveError> {
        let token = self.access_token().await?;
        let http = self.fetcher.http();
        let query = format!("'{folder_id}' in parents and trashed = false");

        let mut files = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut params = vec![
                ("q", query.clone()),
                ("fields", "nextPageToken, files(id, name, mimeType)".to_string()),
                ("orderBy", "name".to_string()),
                ("pageSize", "100".to_string()),
                ("supportsAllDrives", "true".to_string()),
                ("includeItemsFromAllDrives", "true".to_string()),
            ];
            if let Some(next) = &page_token {
                params.push(("pageToken", next.clone()));
            }

            let body = self
                .fetcher
                .send(|| http.get(DRIVE_API).bearer_auth(&token).query(&params))
                .await
                .map_err(|e| DriveError::from_fetch(folder_id, e))?;
            let page: FileList = serde_json::from_slice(&body.bytes)
                .map_err(|e| DriveError::Api(e.to_string()))?;

            files.extend(page.files.into_iter().filter(is_resume_document));
            match page.next_page_token {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }

        tracing::info!(folder_id, files = files.len(), "Listed Drive folder");
        Ok(files)
    }

    async fn file_metadata(&self, file_id: &str) -> Result<DriveFile, DriveError> {
        let token = self.access_token().await?;
        let http = self.fetcher.http();
        let url = format!("{DRIVE_API}/{file_id}");
        let body = self
            .fetcher
            .send(|| {
                http.get(&url)
                    .bearer_auth(&token)
                    .query(&[("fields", "id, name, mimeType"), ("supportsAllDrives", "true")])
            })
            .await
            .map_err(|e| DriveError::from_fetch(file_id, e))?;
        serde_json::from_slice(&body.bytes).map_err(|e| DriveError::Api(e.to_string()))
    }

    async fn download_api(&self, file: &DriveFile) -> Result<FetchedBody, DriveError> {
        let token = self.access_token().await?;
        let http = self.fetcher.http();
        let (url, params): (String, Vec<(&str, &str)>) = if file.is_google_doc() {
            (
                format!("{DRIVE_API}/{}/export", file.id),
                vec![("mimeType", DOCX_MIME)],
            )
        } else {
            (
                format!("{DRIVE_API}/{}", file.id),
                vec![("alt", "media"), ("supportsAllDrives", "true")],
            )
        };

        self.fetcher
            .send(|| http.get(&url).bearer_auth(&token).query(&params))
            .await
            .map_err(|e| DriveError::from_fetch(&file.id, e))
    }

    async fn list_folder_public(&self, folder_id: &str) -> Result<Vec<DriveFile>, DriveError> {
        let url = format!("https://drive.google.com/embeddedfolderview?id={folder_id}#list");
        let body = self
            .fetcher
            .get_with_timeout(&url, PUBLIC_ATTEMPT_TIMEOUT)
            .await
            .map_err(|e| DriveError::from_fetch(folder_id, e))?;

        let html = String::from_utf8_lossy(&body.bytes);
        let files = parse_folder_view(&html);
        if files.is_empty() {
            return Err(DriveError::NotPublic(folder_id.to_string()));
        }

        tracing::info!(folder_id, files = files.len(), "Resolved public Drive folder");
        Ok(files)
    }

    async fn download_public(&self, file: &DriveFile) -> Result<FetchedBody, DriveError> {
        let candidates = if file.is_google_doc() {
            vec![format!(
                "https://docs.google.com/document/d/{}/export?format=docx",
                file.id
            )]
        } else {
            vec![
                format!("https://drive.google.com/uc?export=download&id={}", file.id),
                format!(
                    "https://drive.google.com/uc?export=download&id={}&confirm=t",
                    file.id
                ),
                format!(
                    "https://drive.usercontent.google.com/download?id={}&export=download&confirm=t",
                    file.id
                ),
            ]
        };

        for url in &candidates {
            match self.fetcher.get_with_timeout(url, PUBLIC_ATTEMPT_TIMEOUT).await {
                // An HTML body is a sign-in page or the large-file warning.
                Ok(body) if body.is_html() => {
                    tracing::debug!(file_id = %file.id, url = %url, "Public download returned HTML");
                }
                Ok(body) => return Ok(body),
                Err(e) => {
                    tracing::debug!(file_id = %file.id, url = %url, error = %e, "Public download attempt failed");
                }
            }
        }

        Err(DriveError::NotPublic(file.id.clone()))
    }
}

fn is_resume_document(file: &DriveFile) -> bool {
    matches!(
        file.mime_type.as_deref(),
        Some(PDF_MIME) | Some(DOCX_MIME) | Some(GOOGLE_DOC_MIME)
    )
}

fn has_resume_extension(name: &str) -> bool {
    match name.rsplit_once('.') {
        Some((_, ext)) => matches!(ext.to_ascii_lowercase().as_str(), "pdf" | "docx"),
        None => true,
    }
}

/// Extract the files listed by Drive's embedded folder view.
fn parse_folder_view(html: &str) -> Vec<DriveFile> {
    let document = Html::parse_document(html);
    let entry_sel = Selector::parse("div.flip-entry").expect("valid selector");
    let title_sel = Selector::parse(".flip-entry-title").expect("valid selector");
    let link_sel = Selector::parse("a[href]").expect("valid selector");

    let mut files = Vec::new();
    for entry in document.select(&entry_sel) {
        let href = entry
            .select(&link_sel)
            .next()
            .and_then(|a| a.value().attr("href"))
            .unwrap_or_default();

        let target = match parse_drive_link(href) {
            Some(DriveTarget::Folder(_)) => continue,
            Some(target) => Some(target),
            None => entry
                .value()
                .attr("id")
                .and_then(|id| id.strip_prefix("entry-"))
                .map(|id| DriveTarget::File(id.to_string())),
        };
        let Some(mut file) = target.as_ref().and_then(DriveFile::from_target) else {
            continue;
        };

        let title = entry
            .select(&title_sel)
            .next()
            .map(|t| t.text().collect::<String>().trim().to_string())
            .unwrap_or_default();
        if !title.is_empty() {
            file.name = title;
        }
        if file.is_google_doc() || has_resume_extension(&file.name) {
            files.push(file);
        }
    }
    files
}

#[derive(Debug, thiserror::Error)]
pub enum DriveError {
    #[error("Invalid Google Drive credentials: {0}")]
    Credentials(String),

    #[error("Google authentication failed: {0}")]
    Auth(String),

    #[error("Drive item {0} was not found or is not shared with the service account")]
    NotAccessible(String),

    #[error(
        "Drive item {0} is not publicly accessible. Share it as \"Anyone with the link\", or download the files and use local upload instead"
    )]
    NotPublic(String),

    #[error("Unexpected Drive API response: {0}")]
    Api(String),

    #[error(transparent)]
    Fetch(#[from] FetchError),
}

impl DriveError {
    fn from_fetch(id: &str, error: FetchError) -> Self {
        match error {
            FetchError::Status(403) | FetchError::Status(404) => {
                DriveError::NotAccessible(id.to_string())
            }
            other => DriveError::Fetch(other),
        }
    }
}
