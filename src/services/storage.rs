use async_trait::async_trait;
use s3::creds::Credentials;
use s3::{Bucket, Region};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::job::StagedFile;
use crate::services::encryption::{EncryptionError, UploadCipher};

/// Object storage used to stage uploaded files between the API and the worker.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn upload(&self, key: &str, data: &[u8], content_type: &str) -> Result<(), StorageError>;

    async fn download(&self, key: &str) -> Result<Vec<u8>, StorageError>;

    async fn delete(&self, key: &str) -> Result<(), StorageError>;
}

/// Client for Cloudflare R2 object storage (S3-compatible).
pub struct R2Client {
    bucket: Box<Bucket>,
}

impl R2Client {
    pub fn new(
        bucket_name: &str,
        endpoint: &str,
        access_key: &str,
        secret_key: &str,
    ) -> Result<Self, StorageError> {
        let region = Region::Custom {
            region: "auto".to_string(),
            endpoint: endpoint.to_string(),
        };

        let credentials =
            Credentials::new(Some(access_key), Some(secret_key), None, None, None)
                .map_err(|e| StorageError::Config(e.to_string()))?;

        let bucket = Bucket::new(bucket_name, region, credentials)
            .map_err(|e| StorageError::Config(e.to_string()))?;

        Ok(Self { bucket })
    }
}

#[async_trait]
impl BlobStore for R2Client {
    async fn upload(&self, key: &str, data: &[u8], content_type: &str) -> Result<(), StorageError> {
        let response = self
            .bucket
            .put_object_with_content_type(key, data, content_type)
            .await
            .map_err(|e| StorageError::S3(e.to_string()))?;
        check_status(key, response.status_code())
    }

    async fn download(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let response = self
            .bucket
            .get_object(key)
            .await
            .map_err(|e| StorageError::S3(e.to_string()))?;
        check_status(key, response.status_code())?;
        Ok(response.to_vec())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.bucket
            .delete_object(key)
            .await
            .map_err(|e| StorageError::S3(e.to_string()))?;
        Ok(())
    }
}

/// Process-local blob store for tests and single-process development.
#[derive(Default)]
pub struct MemoryBlobStore {
    objects: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn upload(&self, key: &str, data: &[u8], _content_type: &str) -> Result<(), StorageError> {
        self.objects
            .write()
            .await
            .insert(key.to_string(), data.to_vec());
        Ok(())
    }

    async fn download(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        self.objects
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.objects.write().await.remove(key);
        Ok(())
    }
}

/// Encrypts uploads into a [`BlobStore`] under per-job keys and reads them back.
#[derive(Clone)]
pub struct UploadStaging {
    blobs: Arc<dyn BlobStore>,
    cipher: Arc<UploadCipher>,
}

impl UploadStaging {
    pub fn new(blobs: Arc<dyn BlobStore>, cipher: Arc<UploadCipher>) -> Self {
        Self { blobs, cipher }
    }

    /// Encrypt and upload one file for `job_id`. `index` keeps keys unique
    /// when a batch contains duplicate file names.
    pub async fn stage(
        &self,
        job_id: Uuid,
        index: usize,
        file_name: &str,
        content_type: Option<&str>,
        data: &[u8],
    ) -> Result<StagedFile, StorageError> {
        let blob_key = format!("bulk/{}/{:04}-{}", job_id, index, sanitize_name(file_name));
        let sealed = self.cipher.seal(&blob_key, data)?;
        self.blobs
            .upload(&blob_key, &sealed, "application/octet-stream")
            .await?;

        Ok(StagedFile {
            file_name: file_name.to_string(),
            content_type: content_type.map(String::from),
            size_bytes: data.len() as u64,
            blob_key,
        })
    }

    pub async fn load(&self, file: &StagedFile) -> Result<Vec<u8>, StorageError> {
        let sealed = self.blobs.download(&file.blob_key).await?;
        Ok(self.cipher.open(&file.blob_key, &sealed)?)
    }

    /// Delete staged blobs, logging rather than failing on individual errors.
    pub async fn discard(&self, keys: &[&str]) {
        for key in keys {
            if let Err(e) = self.blobs.delete(key).await {
                tracing::warn!(blob_key = %key, error = %e, "Failed to delete staged upload");
            }
        }
    }
}

// Error statuses come back as Ok responses without the `fail-on-err` feature.
fn check_status(key: &str, status: u16) -> Result<(), StorageError> {
    match status {
        200..=299 => Ok(()),
        404 => Err(StorageError::NotFound(key.to_string())),
        other => Err(StorageError::S3(format!("HTTP {other} for {key}"))),
    }
}

fn sanitize_name(name: &str) -> String {
    let cleaned: String = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(name)
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .take(120)
        .collect();

    if cleaned.trim_matches('.').is_empty() {
        "upload".to_string()
    } else {
        cleaned
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("S3 operation failed: {0}")]
    S3(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Storage configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Encryption(#[from] EncryptionError),
}
