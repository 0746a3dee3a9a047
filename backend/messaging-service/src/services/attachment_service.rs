//! Attachment validation and blob storage.
//!
//! Blobs are content-addressed: the reference handed back to callers (and
//! stored as `Attachment::file_url`) is `sha256:<hex digest>`, so uploading
//! the same bytes twice yields the same reference.

use async_trait::async_trait;
use bytes::Bytes;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::error::{AppError, AppResult, RejectReason};
use crate::models::Attachment;

/// Hard upload limit: 200 MiB.
pub const MAX_ATTACHMENT_BYTES: u64 = 200 * 1024 * 1024;

const DEFAULT_FILE_TYPE: &str = "application/octet-stream";
const REFERENCE_PREFIX: &str = "sha256:";

/// A file as received from the caller.
#[derive(Debug, Clone)]
pub struct FileUpload {
    pub file_name: String,
    /// MIME type as reported by the client. Blank means unknown.
    pub file_type: String,
    pub data: Bytes,
}

impl FileUpload {
    pub fn new(file_name: impl Into<String>, file_type: impl Into<String>, data: Bytes) -> Self {
        Self {
            file_name: file_name.into(),
            file_type: file_type.into(),
            data,
        }
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, reference: &str, data: Bytes) -> AppResult<()>;

    async fn get(&self, reference: &str) -> AppResult<Option<Bytes>>;
}

#[derive(Default)]
pub struct InMemoryBlobStore {
    blobs: RwLock<HashMap<String, Bytes>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn put(&self, reference: &str, data: Bytes) -> AppResult<()> {
        self.blobs.write().await.insert(reference.to_string(), data);
        Ok(())
    }

    async fn get(&self, reference: &str) -> AppResult<Option<Bytes>> {
        Ok(self.blobs.read().await.get(reference).cloned())
    }
}

/// Stores each blob as one file named after its digest.
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub async fn open(root: impl Into<PathBuf>) -> AppResult<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        tracing::info!(root = %root.display(), "Filesystem blob store ready");
        Ok(Self { root })
    }

    fn path_for(&self, reference: &str) -> AppResult<PathBuf> {
        let digest = reference
            .strip_prefix(REFERENCE_PREFIX)
            .filter(|d| !d.is_empty() && d.chars().all(|c| c.is_ascii_hexdigit()))
            .ok_or_else(|| AppError::validation(format!("invalid blob reference: {reference}")))?;
        Ok(self.root.join(digest))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, reference: &str, data: Bytes) -> AppResult<()> {
        let path = self.path_for(reference)?;
        if tokio::fs::try_exists(&path).await? {
            return Ok(());
        }
        // Runs to completion even when the caller times out, so a blob is
        // either fully persisted or its temp file is removed.
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || persist_blob(&root, &path, &data))
            .await
            .map_err(|e| AppError::Internal(format!("blob write task failed: {e}")))?
    }

    async fn get(&self, reference: &str) -> AppResult<Option<Bytes>> {
        let path = self.path_for(reference)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Writes `data` to a uniquely named temp file under `root` and renames it
/// onto `path`. Concurrent writers of the same digest each use their own temp
/// file; losing the rename to another writer is fine since the content is
/// identical.
fn persist_blob(root: &Path, path: &Path, data: &[u8]) -> AppResult<()> {
    let mut partial = tempfile::Builder::new()
        .prefix(".upload-")
        .suffix(".partial")
        .tempfile_in(root)?;
    partial.write_all(data)?;
    match partial.persist(path) {
        Ok(_) => Ok(()),
        Err(_) if path.exists() => Ok(()),
        Err(e) => Err(e.error.into()),
    }
}

pub struct AttachmentService {
    blobs: Arc<dyn BlobStore>,
    store_timeout: Duration,
}

impl AttachmentService {
    pub fn new(blobs: Arc<dyn BlobStore>, store_timeout: Duration) -> Self {
        Self {
            blobs,
            store_timeout,
        }
    }

    pub fn validate_size(size: u64) -> AppResult<()> {
        if size > MAX_ATTACHMENT_BYTES {
            return Err(AppError::Rejected(RejectReason::TooLarge {
                size,
                limit: MAX_ATTACHMENT_BYTES,
            }));
        }
        Ok(())
    }

    pub fn validate(&self, file: &FileUpload) -> AppResult<()> {
        if file.file_name.trim().is_empty() {
            return Err(AppError::validation("file name is required"));
        }
        Self::validate_size(file.size())
    }

    /// Validates and persists the upload, returning the attachment metadata
    /// to put on the message. Bounded by the configured store timeout.
    pub async fn store(&self, file: &FileUpload) -> AppResult<Attachment> {
        self.validate(file)?;

        let reference = content_reference(&file.data);
        match tokio::time::timeout(
            self.store_timeout,
            self.blobs.put(&reference, file.data.clone()),
        )
        .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::error!(error = %e, file_name = %file.file_name, "Blob store write failed");
                return Err(match e {
                    AppError::Storage(_) | AppError::StorageTimeout(_) => e,
                    other => AppError::Storage(other.to_string()),
                });
            }
            Err(_) => {
                tracing::warn!(
                    file_name = %file.file_name,
                    timeout = ?self.store_timeout,
                    "Blob store write timed out"
                );
                return Err(AppError::StorageTimeout(self.store_timeout));
            }
        }

        let file_type = match file.file_type.trim() {
            "" => DEFAULT_FILE_TYPE.to_string(),
            t => t.to_string(),
        };

        tracing::debug!(
            file_name = %file.file_name,
            size = file.size(),
            reference = %reference,
            "Attachment stored"
        );

        Ok(Attachment {
            file_name: file.file_name.trim().to_string(),
            file_size: file.size(),
            file_type,
            file_url: reference,
        })
    }

    pub async fn fetch(&self, file_url: &str) -> AppResult<Bytes> {
        self.blobs
            .get(file_url)
            .await?
            .ok_or_else(|| AppError::not_found("attachment", file_url))
    }
}

fn content_reference(data: &[u8]) -> String {
    let digest = Sha256::digest(data);
    format!("{REFERENCE_PREFIX}{}", hex::encode(digest))
}

/// Whether the UI should offer an inline preview for this MIME type.
pub fn is_previewable(file_type: &str) -> bool {
    file_type.starts_with("image/")
}

/// Formats a byte count with 1024-based units, e.g. `1.5 KB` or `200 MB`.
pub fn human_readable_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];

    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    let mut exponent = 0usize;
    while exponent + 1 < UNITS.len() && bytes >= 1u64 << (10 * (exponent + 1)) {
        exponent += 1;
    }

    let value = bytes as f64 / (1u64 << (10 * exponent)) as f64;
    let formatted = format!("{value:.2}");
    let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
    format!("{trimmed} {}", UNITS[exponent])
}
