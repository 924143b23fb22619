use axum::extract::{FromRequest, Multipart, Path, Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::Json;
use garde::Validate;

use crate::app_state::AppState;
use crate::errors::AppError;
use crate::models::job::{IngestMethod, JobStatus, Requester};
use crate::models::upload::{
    DriveUploadRequest, JobResultsResponse, JobStatusResponse, JobSummary, StartJobResponse,
};
use crate::services::tracker::{StartRequest, UploadedFile};

/// POST /api/v1/bulk-upload/{job_posting_id}: start a bulk upload.
///
/// Accepts multipart form data (local files or a spreadsheet) or a JSON body
/// carrying a Google Drive link.
pub async fn start_bulk_upload(
    State(state): State<AppState>,
    requester: Requester,
    Path(job_posting_id): Path<String>,
    request: Request,
) -> Result<(StatusCode, Json<StartJobResponse>), AppError> {
    let is_json = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.to_ascii_lowercase().starts_with("application/json"));

    let start_request = if is_json {
        let Json(body) = Json::<DriveUploadRequest>::from_request(request, &state)
            .await
            .map_err(|e| AppError::Validation(e.body_text()))?;
        body.validate()
            .map_err(|e| AppError::UnprocessableEntity(e.to_string()))?;
        drive_request(&body)?
    } else {
        let multipart = Multipart::from_request(request, &state)
            .await
            .map_err(|e| AppError::Validation(e.body_text()))?;
        read_multipart(multipart).await?
    };

    let method = start_request.method();
    let job_id = state
        .tracker
        .start_job(&job_posting_id, start_request, requester)
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(StartJobResponse {
            job_id,
            status: JobStatus::Processing,
            message: format!("Bulk upload accepted ({method}); poll the status endpoint for progress"),
        }),
    ))
}

fn drive_request(body: &DriveUploadRequest) -> Result<StartRequest, AppError> {
    match IngestMethod::from_upload_method(&body.upload_method) {
        Some(IngestMethod::DriveLink) => Ok(StartRequest::DriveLink(body.drive_link.clone())),
        Some(other) => Err(AppError::Validation(format!(
            "Upload method {other} requires a multipart upload"
        ))),
        None => Err(AppError::Validation(format!(
            "Unknown upload method: {}",
            body.upload_method
        ))),
    }
}

/// Fields collected from a multipart upload before the method is decided.
#[derive(Default)]
struct UploadForm {
    upload_method: Option<String>,
    drive_link: Option<String>,
    files: Vec<UploadedFile>,
    spreadsheet: Option<UploadedFile>,
}

async fn read_multipart(mut multipart: Multipart) -> Result<StartRequest, AppError> {
    let mut form = UploadForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(e.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "uploadMethod" => {
                form.upload_method = Some(field.text().await.map_err(bad_field)?);
            }
            "driveLink" => {
                form.drive_link = Some(field.text().await.map_err(bad_field)?);
            }
            "files" | "files[]" | "resumes" | "resumes[]" => {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let content_type = field.content_type().map(String::from);
                let bytes = field.bytes().await.map_err(bad_field)?;
                form.files.push(UploadedFile {
                    file_name,
                    content_type,
                    bytes: bytes.to_vec(),
                });
            }
            "spreadsheet" | "file" => {
                let file_name = field.file_name().unwrap_or("spreadsheet").to_string();
                let content_type = field.content_type().map(String::from);
                let bytes = field.bytes().await.map_err(bad_field)?;
                form.spreadsheet = Some(UploadedFile {
                    file_name,
                    content_type,
                    bytes: bytes.to_vec(),
                });
            }
            other => tracing::debug!(field = %other, "Ignoring unknown multipart field"),
        }
    }

    form.into_request()
}

fn bad_field(e: axum::extract::multipart::MultipartError) -> AppError {
    AppError::Validation(e.body_text())
}

impl UploadForm {
    fn into_request(mut self) -> Result<StartRequest, AppError> {
        let method = match self.upload_method.as_deref() {
            Some(value) => IngestMethod::from_upload_method(value)
                .ok_or_else(|| AppError::Validation(format!("Unknown upload method: {value}")))?,
            None if self.spreadsheet.is_some() => IngestMethod::Spreadsheet,
            None if !self.files.is_empty() => IngestMethod::LocalBatch,
            None if self.drive_link.is_some() => IngestMethod::DriveLink,
            None => return Err(AppError::Validation("No files or link provided".to_string())),
        };

        match method {
            IngestMethod::LocalBatch => Ok(StartRequest::LocalBatch(self.files)),
            IngestMethod::DriveLink => self
                .drive_link
                .map(StartRequest::DriveLink)
                .ok_or_else(|| AppError::Validation("driveLink is required".to_string())),
            IngestMethod::Spreadsheet => {
                let file = match self.spreadsheet.take() {
                    Some(file) => file,
                    None if self.files.len() == 1 => self.files.remove(0),
                    None => {
                        return Err(AppError::Validation(
                            "Exactly one spreadsheet file is required".to_string(),
                        ))
                    }
                };
                Ok(StartRequest::Spreadsheet(file))
            }
        }
    }
}

/// GET /api/v1/bulk-upload/{job_id}/status
pub async fn get_job_status(
    State(state): State<AppState>,
    requester: Requester,
    Path(job_id): Path<String>,
) -> Result<Json<JobStatusResponse>, AppError> {
    Ok(Json(state.tracker.get_status(&job_id, &requester).await?))
}

/// GET /api/v1/bulk-upload/{job_id}/results
pub async fn get_job_results(
    State(state): State<AppState>,
    requester: Requester,
    Path(job_id): Path<String>,
) -> Result<Json<JobResultsResponse>, AppError> {
    Ok(Json(state.tracker.get_results(&job_id, &requester).await?))
}

/// POST /api/v1/bulk-upload/{job_id}/cancel
pub async fn cancel_job(
    State(state): State<AppState>,
    requester: Requester,
    Path(job_id): Path<String>,
) -> Result<Json<JobStatusResponse>, AppError> {
    Ok(Json(state.tracker.cancel(&job_id, &requester).await?))
}

/// GET /api/v1/bulk-upload/jobs: the caller's jobs, newest first.
pub async fn list_jobs(
    State(state): State<AppState>,
    requester: Requester,
) -> Result<Json<Vec<JobSummary>>, AppError> {
    Ok(Json(state.tracker.list_jobs(&requester).await?))
}
