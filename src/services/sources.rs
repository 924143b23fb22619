//! Source items of a bulk upload: enumeration per ingestion method and
//! resolution of each item to raw document bytes.

use std::sync::Arc;

use crate::models::job::{IngestPayload, StagedFile};
use crate::services::drive::{parse_drive_link, DriveClient, DriveError, DriveFile};
use crate::services::fetch::{FetchError, Fetcher};
use crate::services::spreadsheet::{self, SheetLink, SpreadsheetError};
use crate::services::storage::{StorageError, UploadStaging};

/// One unit of work within a job.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceItem {
    Staged(StagedFile),
    Drive {
        file: DriveFile,
        /// The link the item was listed under, when it came from a spreadsheet.
        listed_as: Option<String>,
    },
    Remote {
        url: String,
    },
}

impl SourceItem {
    /// Human-readable name shown as the current item and in the result log.
    pub fn label(&self) -> String {
        match self {
            SourceItem::Staged(file) => file.file_name.clone(),
            SourceItem::Drive {
                listed_as: Some(link),
                ..
            } => link.clone(),
            SourceItem::Drive { file, .. } => file.name.clone(),
            SourceItem::Remote { url } => url.clone(),
        }
    }

    pub fn source_url(&self) -> Option<String> {
        match self {
            SourceItem::Staged(_) => None,
            SourceItem::Drive {
                listed_as: Some(link),
                ..
            } => Some(link.clone()),
            SourceItem::Drive { file, .. } => Some(file.web_url()),
            SourceItem::Remote { url } => Some(url.clone()),
        }
    }
}

/// Raw bytes of a source item.
#[derive(Debug, Clone)]
pub struct ItemContent {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

pub struct SourceResolver {
    staging: UploadStaging,
    drive: Arc<DriveClient>,
    fetcher: Fetcher,
}

impl SourceResolver {
    pub fn new(staging: UploadStaging, drive: Arc<DriveClient>, fetcher: Fetcher) -> Self {
        Self {
            staging,
            drive,
            fetcher,
        }
    }

    /// List the items of a job in processing order.
    pub async fn enumerate(
        &self,
        payload: &IngestPayload,
    ) -> Result<Vec<SourceItem>, EnumerationError> {
        let items: Vec<SourceItem> = match payload {
            IngestPayload::LocalBatch { files } => {
                files.iter().cloned().map(SourceItem::Staged).collect()
            }
            IngestPayload::DriveLink { drive_link } => self.enumerate_drive(drive_link).await?,
            IngestPayload::Spreadsheet { file } => self.enumerate_spreadsheet(file).await?,
        };

        if items.is_empty() {
            return Err(EnumerationError::NoItemsFound);
        }
        Ok(items)
    }

    async fn enumerate_drive(&self, link: &str) -> Result<Vec<SourceItem>, EnumerationError> {
        let target = parse_drive_link(link).ok_or_else(|| {
            EnumerationError::UnreachableSource(
                "Could not find a folder or file id in the Google Drive link".to_string(),
            )
        })?;

        let files = self.drive.resolve(&target).await.map_err(|e| {
            tracing::warn!(
                link = %link,
                authenticated = self.drive.is_authenticated(),
                error = %e,
                "Could not resolve Drive link"
            );
            EnumerationError::UnreachableSource(e.to_string())
        })?;

        Ok(files
            .into_iter()
            .map(|file| SourceItem::Drive {
                file,
                listed_as: None,
            })
            .collect())
    }

    async fn enumerate_spreadsheet(
        &self,
        file: &StagedFile,
    ) -> Result<Vec<SourceItem>, EnumerationError> {
        let bytes = self.staging.load(file).await?;
        let file_name = file.file_name.clone();
        let content_type = file.content_type.clone();

        // calamine and csv parsing are synchronous.
        let links = tokio::task::spawn_blocking(move || {
            spreadsheet::extract_links(&file_name, content_type.as_deref(), &bytes)
        })
        .await
        .map_err(|e| SpreadsheetError::Unreadable(e.to_string()))??;

        Ok(links
            .into_iter()
            .filter_map(|link| match link {
                SheetLink::Drive { target, url } => {
                    DriveFile::from_target(&target).map(|file| SourceItem::Drive {
                        file,
                        listed_as: Some(url),
                    })
                }
                SheetLink::Direct { url } => Some(SourceItem::Remote { url }),
            })
            .collect())
    }

    /// Resolve an item to its document bytes.
    pub async fn load(&self, item: &SourceItem) -> Result<ItemContent, SourceError> {
        match item {
            SourceItem::Staged(file) => Ok(ItemContent {
                file_name: file.file_name.clone(),
                content_type: file.content_type.clone(),
                bytes: self.staging.load(file).await?,
            }),
            SourceItem::Drive { file, .. } => {
                let body = self.drive.download(file).await?;
                Ok(ItemContent {
                    file_name: body.file_name.unwrap_or_else(|| file.name.clone()),
                    content_type: body.content_type,
                    bytes: body.bytes,
                })
            }
            SourceItem::Remote { url } => {
                let body = self.fetcher.get(url).await?;
                if body.is_html() {
                    return Err(SourceError::NotADocument(url.clone()));
                }
                let fallback_name = url
                    .split(['?', '#'])
                    .next()
                    .and_then(|path| path.rsplit('/').next())
                    .unwrap_or("download")
                    .to_string();
                Ok(ItemContent {
                    file_name: body.file_name.unwrap_or(fallback_name),
                    content_type: body.content_type,
                    bytes: body.bytes,
                })
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EnumerationError {
    #[error("No resume files found to process")]
    NoItemsFound,

    #[error("Could not access the upload source: {0}")]
    UnreachableSource(String),

    #[error(transparent)]
    Unreadable(#[from] SpreadsheetError),

    #[error("Could not read the staged upload: {0}")]
    Storage(#[from] StorageError),
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Could not read the staged upload: {0}")]
    Storage(#[from] StorageError),

    #[error("Could not download from Google Drive: {0}")]
    Drive(#[from] DriveError),

    #[error("Download failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("{0} returned a web page instead of a document")]
    NotADocument(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::drive::DriveTarget;

    #[test]
    fn test_labels_and_urls() {
        let staged = SourceItem::Staged(StagedFile {
            file_name: "jane.pdf".to_string(),
            content_type: None,
            size_bytes: 3,
            blob_key: "bulk/x/0000-jane.pdf".to_string(),
        });
        assert_eq!(staged.label(), "jane.pdf");
        assert_eq!(staged.source_url(), None);

        let file = DriveFile::from_target(&DriveTarget::File("1AbCdEfGhIjK".to_string())).unwrap();
        let listed = SourceItem::Drive {
            file: file.clone(),
            listed_as: Some("https://drive.google.com/open?id=1AbCdEfGhIjK".to_string()),
        };
        assert_eq!(listed.label(), "https://drive.google.com/open?id=1AbCdEfGhIjK");

        let from_folder = SourceItem::Drive {
            file,
            listed_as: None,
        };
        assert_eq!(from_folder.label(), "drive-file-1AbCdEfGhIjK");
        assert_eq!(
            from_folder.source_url().as_deref(),
            Some("https://drive.google.com/file/d/1AbCdEfGhIjK/view")
        );
    }
}
