//! Media store and upload janitor.
//!
//! Uploaded files live in one flat directory and are referenced from the
//! database by filename only. Database state is authoritative: file deletion
//! is best-effort and never rolls back a committed transaction.

use std::path::{Path, PathBuf};

use uuid::Uuid;

pub const MAX_FILE_SIZE: usize = 5 * 1024 * 1024; // 5MB
pub const ALLOWED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif"];

#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("empty file")]
    Empty,
    #[error("file too large, maximum size is 5MB")]
    TooLarge,
    #[error("unsupported file type, allowed: JPEG, PNG, WebP, GIF")]
    UnsupportedType,
    #[error("invalid filename")]
    InvalidFilename,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Sniff the real content type from the leading bytes.
fn image_mime_from_magic_bytes(bytes: &[u8]) -> Option<&'static str> {
    if bytes.len() < 4 {
        return None;
    }
    match bytes {
        // JPEG: FF D8 FF
        [0xFF, 0xD8, 0xFF, ..] => Some("image/jpeg"),
        // PNG: 89 50 4E 47
        [0x89, 0x50, 0x4E, 0x47, ..] => Some("image/png"),
        // GIF: 47 49 46 38
        [0x47, 0x49, 0x46, 0x38, ..] => Some("image/gif"),
        // WebP: 52 49 46 46 ... 57 45 42 50
        [0x52, 0x49, 0x46, 0x46, _, _, _, _, 0x57, 0x45, 0x42, 0x50, ..] => Some("image/webp"),
        _ => None,
    }
}

fn extension_from_mime(mime: &str) -> &'static str {
    match mime {
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        _ => "bin",
    }
}

/// Reject path traversal and special characters.
fn is_safe_filename(filename: &str) -> bool {
    !filename.is_empty()
        && !filename.contains("..")
        && !filename.contains('/')
        && !filename.contains('\\')
        && !filename.contains('\0')
}

#[derive(Debug, Clone)]
pub struct MediaStore {
    dir: PathBuf,
}

impl MediaStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn ensure_dir(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await
    }

    /// Validate and persist an uploaded file. Returns the generated filename
    /// (uuid plus extension) that content rows reference.
    pub async fn store(&self, original_name: &str, bytes: &[u8]) -> Result<String, MediaError> {
        if bytes.is_empty() {
            return Err(MediaError::Empty);
        }
        if bytes.len() > MAX_FILE_SIZE {
            return Err(MediaError::TooLarge);
        }

        let original_ext = original_name
            .rsplit('.')
            .next()
            .unwrap_or("")
            .to_lowercase();
        if !ALLOWED_EXTENSIONS.contains(&original_ext.as_str()) {
            return Err(MediaError::UnsupportedType);
        }

        // The declared extension is not trusted; the content decides.
        let mime = image_mime_from_magic_bytes(bytes).ok_or(MediaError::UnsupportedType)?;
        let filename = format!("{}.{}", Uuid::new_v4(), extension_from_mime(mime));

        self.ensure_dir().await?;
        tokio::fs::write(self.dir.join(&filename), bytes).await?;

        tracing::info!("Stored upload: {} ({} bytes)", filename, bytes.len());
        Ok(filename)
    }

    /// Best-effort delete of an orphaned file. Errors are logged and
    /// swallowed: the referencing rows are already gone and a leftover file
    /// is a recoverable leak, not a correctness violation.
    pub async fn delete_if_exists(&self, filename: &str) {
        if !is_safe_filename(filename) {
            tracing::warn!("Refusing to delete suspicious filename: {:?}", filename);
            return;
        }

        match tokio::fs::remove_file(self.dir.join(filename)).await {
            Ok(()) => tracing::info!("Deleted orphaned file: {}", filename),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("Orphaned file already gone: {}", filename);
            }
            Err(e) => tracing::warn!("Failed to delete file {}: {}", filename, e),
        }
    }

    /// Janitor pass over a batch of filenames. One failure never stops the
    /// rest.
    pub async fn delete_all(&self, filenames: &[String]) {
        for filename in filenames {
            self.delete_if_exists(filename).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Smallest valid PNG header followed by padding.
    fn png_bytes() -> Vec<u8> {
        let mut bytes = vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
        bytes.extend_from_slice(&[0u8; 64]);
        bytes
    }

    #[test]
    fn test_magic_bytes_detection() {
        assert_eq!(
            image_mime_from_magic_bytes(&[0xFF, 0xD8, 0xFF, 0xE0]),
            Some("image/jpeg")
        );
        assert_eq!(image_mime_from_magic_bytes(&png_bytes()), Some("image/png"));
        assert_eq!(image_mime_from_magic_bytes(b"GIF89a.."), Some("image/gif"));
        assert_eq!(image_mime_from_magic_bytes(b"not an image"), None);
        assert_eq!(image_mime_from_magic_bytes(&[0xFF]), None);
    }

    #[test]
    fn test_is_safe_filename() {
        assert!(is_safe_filename("abc.png"));
        assert!(!is_safe_filename("../etc/passwd"));
        assert!(!is_safe_filename("a/b.png"));
        assert!(!is_safe_filename("a\\b.png"));
        assert!(!is_safe_filename(""));
    }

    #[tokio::test]
    async fn test_store_generates_uuid_name_with_extension() {
        let dir = tempfile::tempdir().unwrap();
        let store = MediaStore::new(dir.path());

        let filename = store.store("photo.png", &png_bytes()).await.unwrap();
        assert!(filename.ends_with(".png"));
        assert!(dir.path().join(&filename).exists());
    }

    #[tokio::test]
    async fn test_store_rejects_disallowed_extension() {
        let dir = tempfile::tempdir().unwrap();
        let store = MediaStore::new(dir.path());

        let result = store.store("script.sh", &png_bytes()).await;
        assert!(matches!(result, Err(MediaError::UnsupportedType)));
    }

    #[tokio::test]
    async fn test_store_rejects_mismatched_content() {
        let dir = tempfile::tempdir().unwrap();
        let store = MediaStore::new(dir.path());

        let result = store.store("fake.png", b"plain text pretending").await;
        assert!(matches!(result, Err(MediaError::UnsupportedType)));
    }

    #[tokio::test]
    async fn test_store_rejects_oversized_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = MediaStore::new(dir.path());

        let mut bytes = png_bytes();
        bytes.resize(MAX_FILE_SIZE + 1, 0);
        let result = store.store("big.png", &bytes).await;
        assert!(matches!(result, Err(MediaError::TooLarge)));
    }

    #[tokio::test]
    async fn test_delete_if_exists_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = MediaStore::new(dir.path());

        let filename = store.store("photo.png", &png_bytes()).await.unwrap();
        store.delete_if_exists(&filename).await;
        assert!(!dir.path().join(&filename).exists());
    }

    #[tokio::test]
    async fn test_delete_if_exists_swallows_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = MediaStore::new(dir.path());

        // Must not panic or error.
        store.delete_if_exists("no-such-file.png").await;
    }

    #[tokio::test]
    async fn test_delete_all_continues_past_failures() {
        let dir = tempfile::tempdir().unwrap();
        let store = MediaStore::new(dir.path());

        let a = store.store("a.png", &png_bytes()).await.unwrap();
        let b = store.store("b.png", &png_bytes()).await.unwrap();

        store
            .delete_all(&[a.clone(), "missing.png".to_string(), b.clone()])
            .await;
        assert!(!dir.path().join(&a).exists());
        assert!(!dir.path().join(&b).exists());
    }
}
