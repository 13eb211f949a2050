/// Upload storage for report images
use crate::{
    error::{ApiError, ApiResult},
    images::DEFAULT_IMAGE_PREFIX,
};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;
use uuid::Uuid;

/// Extensions accepted for uploads (compared lowercase)
pub const ALLOWED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif"];

/// Placeholder files expected in the upload directory, one per seeded category
pub const DEFAULT_IMAGE_FILES: &[&str] = &[
    "default_traffic.jpg",
    "default_infrastructure.jpg",
    "default_environment.jpg",
    "default_public_safety.jpg",
    "default_community_events.jpg",
];

/// Upload storage backend
#[async_trait]
pub trait UploadBackend: Send + Sync {
    /// Store a file under `name`, replacing any existing file
    async fn put(&self, name: &str, data: &[u8]) -> ApiResult<()>;

    /// Delete a file; deleting a missing file is not an error
    async fn delete(&self, name: &str) -> ApiResult<()>;

    /// Check if a file exists
    async fn exists(&self, name: &str) -> ApiResult<bool>;
}

/// Flat directory backend; files are served as-is from `/uploads`
#[derive(Clone)]
pub struct DiskUploadBackend {
    base_path: PathBuf,
}

impl DiskUploadBackend {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn file_path(&self, name: &str) -> PathBuf {
        self.base_path.join(name)
    }
}

#[async_trait]
impl UploadBackend for DiskUploadBackend {
    async fn put(&self, name: &str, data: &[u8]) -> ApiResult<()> {
        fs::create_dir_all(&self.base_path).await?;
        fs::write(self.file_path(name), data).await?;
        Ok(())
    }

    async fn delete(&self, name: &str) -> ApiResult<()> {
        match fs::remove_file(self.file_path(name)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ApiError::Io(e)),
        }
    }

    async fn exists(&self, name: &str) -> ApiResult<bool> {
        Ok(fs::try_exists(self.file_path(name)).await?)
    }
}

/// Reduce a client-supplied file name to a safe single path component.
///
/// Directory parts are dropped, whitespace becomes `_`, and anything outside
/// `[A-Za-z0-9._-]` is removed. Leading dots are stripped so the result can
/// never be hidden or a parent reference.
pub fn sanitize_filename(name: &str) -> Option<String> {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);

    let cleaned: String = base
        .chars()
        .filter_map(|c| match c {
            c if c.is_ascii_alphanumeric() => Some(c),
            '.' | '-' | '_' => Some(c),
            c if c.is_whitespace() => Some('_'),
            _ => None,
        })
        .collect();

    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned.to_string())
    }
}

/// Lowercased extension if it is one we accept
pub fn allowed_extension(name: &str) -> Option<String> {
    let (_, ext) = name.rsplit_once('.')?;
    let ext = ext.to_ascii_lowercase();
    ALLOWED_EXTENSIONS.contains(&ext.as_str()).then_some(ext)
}

/// Validates and stores uploaded image files
#[derive(Clone)]
pub struct ImageStore {
    backend: Arc<dyn UploadBackend>,
    max_upload_bytes: usize,
}

impl ImageStore {
    pub fn new(backend: Arc<dyn UploadBackend>, max_upload_bytes: usize) -> Self {
        Self {
            backend,
            max_upload_bytes,
        }
    }

    /// Store an upload and return the file name to record.
    ///
    /// Names are prefixed with a random id so uploads never collide and never
    /// carry the placeholder prefix. With `allow_placeholder` set, a file named
    /// `default_*` is stored under its exact name instead.
    pub async fn save(
        &self,
        original_name: &str,
        data: &[u8],
        allow_placeholder: bool,
    ) -> ApiResult<String> {
        if data.is_empty() {
            return Err(ApiError::Validation("Uploaded file is empty".to_string()));
        }

        if data.len() > self.max_upload_bytes {
            return Err(ApiError::PayloadTooLarge(format!(
                "Upload of {} bytes exceeds the {} byte limit",
                data.len(),
                self.max_upload_bytes
            )));
        }

        let name = sanitize_filename(original_name)
            .ok_or_else(|| ApiError::Validation("Invalid file name".to_string()))?;

        if allowed_extension(&name).is_none() {
            return Err(ApiError::Validation(format!(
                "File type not allowed, expected one of: {}",
                ALLOWED_EXTENSIONS.join(", ")
            )));
        }

        let stored_name = if allow_placeholder && name.starts_with(DEFAULT_IMAGE_PREFIX) {
            name
        } else {
            format!("{}_{}", Uuid::new_v4().simple(), name)
        };

        self.backend.put(&stored_name, data).await?;
        tracing::debug!("Stored upload {} ({} bytes)", stored_name, data.len());

        Ok(stored_name)
    }

    /// Remove a stored file
    pub async fn remove(&self, name: &str) -> ApiResult<()> {
        // Stored names are always single components; refuse anything else
        match sanitize_filename(name) {
            Some(ref safe) if safe == name => self.backend.delete(name).await,
            _ => {
                tracing::warn!("Refusing to remove suspicious upload path {:?}", name);
                Ok(())
            }
        }
    }

    /// Placeholder files missing from storage
    pub async fn missing_default_images(&self) -> ApiResult<Vec<&'static str>> {
        let mut missing = Vec::new();
        for name in DEFAULT_IMAGE_FILES {
            if !self.backend.exists(name).await? {
                missing.push(*name);
            }
        }
        Ok(missing)
    }

    /// Log a warning for every placeholder file that is missing
    pub async fn check_default_images(&self) -> ApiResult<()> {
        let missing = self.missing_default_images().await?;

        if missing.is_empty() {
            tracing::info!("All {} default images present", DEFAULT_IMAGE_FILES.len());
        }
        for name in missing {
            tracing::warn!("Default image {} is missing from the upload directory", name);
        }

        Ok(())
    }
}
