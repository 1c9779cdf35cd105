//! Per-request upload scratch space
//!
//! Uploaded audio is written into a fresh temporary directory that is
//! removed when the [`ScopedUpload`] is dropped, on every exit path.

use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::debug;

/// Uploaded file living in its own temporary directory
#[derive(Debug)]
pub struct ScopedUpload {
    path: PathBuf,
    original_name: String,
    dir: TempDir,
}

impl ScopedUpload {
    /// Write `bytes` into a new temporary directory
    ///
    /// # Arguments
    /// * `original_name` - Client-supplied filename (sanitized before use)
    /// * `bytes` - File contents
    ///
    /// # Errors
    /// I/O errors creating the directory or writing the file
    pub async fn write(original_name: Option<&str>, bytes: &[u8]) -> std::io::Result<Self> {
        let dir = tempfile::Builder::new().prefix("mme-upload-").tempdir()?;
        let original_name = original_name
            .map(str::to_string)
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| "audio".to_string());
        let path = dir.path().join(sanitize_filename(&original_name));

        tokio::fs::write(&path, bytes).await?;

        debug!(
            path = %path.display(),
            bytes = bytes.len(),
            "Upload written to scoped directory"
        );

        Ok(Self {
            path,
            original_name,
            dir,
        })
    }

    /// Path of the written file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Filename as supplied by the client
    pub fn original_name(&self) -> &str {
        &self.original_name
    }

    /// Directory holding the upload
    pub fn dir(&self) -> &Path {
        self.dir.path()
    }
}

/// Make a client filename safe for the local filesystem
///
/// Keeps ASCII alphanumerics, `-`, `_` and `.`; everything else becomes
/// `_`. Leading dots are stripped so the result is never hidden or a
/// parent reference.
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = cleaned.trim_start_matches('.');
    if trimmed.is_empty() {
        "audio".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("My Song (live).mp3"), "My_Song__live_.mp3");
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("..\\evil.wav"), "evil.wav");
        assert_eq!(sanitize_filename("Café.flac"), "Caf_.flac");
        assert_eq!(sanitize_filename("..."), "audio");
    }

    #[tokio::test]
    async fn test_directory_removed_on_drop() {
        let upload = ScopedUpload::write(Some("track.wav"), b"RIFF").await.unwrap();
        let dir = upload.dir().to_path_buf();
        assert!(upload.path().exists());
        assert_eq!(upload.original_name(), "track.wav");
        assert!(upload.path().starts_with(&dir));

        drop(upload);
        assert!(!dir.exists());
    }

    #[tokio::test]
    async fn test_missing_name_defaults() {
        let upload = ScopedUpload::write(None, b"x").await.unwrap();
        assert_eq!(upload.original_name(), "audio");
        assert!(upload.path().ends_with("audio"));
    }
}
