//! Image persistence seam.
//!
//! The pipeline only needs "save these bytes, give me a relative path";
//! [`LocalImageStore`] is the disk-backed implementation the worker binary
//! wires in. Tests substitute their own.

use std::path::PathBuf;

use uuid::Uuid;

/// Errors from the image store layer.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("image write failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Persists generated image bytes and hands back a relative path for the
/// generation record.
#[async_trait::async_trait]
pub trait ImageStore: Send + Sync {
    async fn save(&self, bytes: &[u8], mime_type: &str) -> Result<String, StorageError>;
}

/// Filesystem-backed image store rooted at a configured directory.
pub struct LocalImageStore {
    root: PathBuf,
}

impl LocalImageStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait::async_trait]
impl ImageStore for LocalImageStore {
    async fn save(&self, bytes: &[u8], mime_type: &str) -> Result<String, StorageError> {
        let relative = format!(
            "generated/{}.{}",
            Uuid::new_v4(),
            extension_for_mime(mime_type)
        );
        let full = self.root.join(&relative);
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&full, bytes).await?;
        Ok(relative)
    }
}

/// File extension for a generated image's MIME type.
pub fn extension_for_mime(mime_type: &str) -> &'static str {
    match mime_type {
        "image/png" => "png",
        "image/jpeg" => "jpg",
        "image/webp" => "webp",
        _ => "bin",
    }
}

/// MIME type guessed from a reference file's extension.
pub fn mime_type_for_path(path: &str) -> &'static str {
    let ext = path.rsplit('.').next().unwrap_or_default();
    match ext.to_ascii_lowercase().as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        _ => "application/octet-stream",
    }
}
