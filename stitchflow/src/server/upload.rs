//! Streaming multipart parts to the staging directory.

use crate::core::{StagedFile, UploadBatch};
use crate::errors::{Result, StitchflowError};
use crate::utils::{sanitize_file_name, staged_file_name, unix_millis};
use axum::extract::multipart::{Field, Multipart};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// Writes every file part named `field_name` into the batch's staging directory.
///
/// Parts with another name, or without a filename, are skipped. Files are
/// stored as `<unix-millis>-<sanitised name>` in arrival order.
///
/// # Errors
///
/// [`StitchflowError::Upload`] for a malformed body or more than
/// `max_files` files, [`StitchflowError::Io`] if a file cannot be written.
pub async fn stage_uploads(
    multipart: &mut Multipart,
    field_name: &str,
    max_files: usize,
    batch: &mut UploadBatch,
) -> Result<()> {
    while let Some(field) = multipart.next_field().await.map_err(upload_error)? {
        if field.name() != Some(field_name) {
            debug!(field = ?field.name(), "skipping unexpected multipart field");
            continue;
        }
        let Some(original_name) = field.file_name().map(str::to_owned) else {
            debug!(field = field_name, "skipping multipart field without a filename");
            continue;
        };
        if batch.len() >= max_files {
            return Err(StitchflowError::Upload(format!(
                "Too many files: at most {max_files} are accepted"
            )));
        }

        let (path, file) = create_unique(batch.staging_dir(), &original_name).await?;
        let bytes = match write_field(field, file).await {
            Ok(bytes) => bytes,
            Err(err) => {
                if let Err(remove_err) = tokio::fs::remove_file(&path).await {
                    warn!(path = %path.display(), error = %remove_err, "failed to remove partial upload");
                }
                return Err(err);
            }
        };
        debug!(path = %path.display(), bytes, "stored upload");
        batch.push(StagedFile::new(original_name, path));
    }
    Ok(())
}

/// Opens a fresh file for `original_name`, never overwriting an existing one.
async fn create_unique(dir: &Path, original_name: &str) -> std::io::Result<(PathBuf, File)> {
    let millis = unix_millis();
    let mut attempt = 0u32;
    loop {
        let name = if attempt == 0 {
            staged_file_name(millis, original_name)
        } else {
            format!("{millis}-{attempt}-{}", sanitize_file_name(original_name))
        };
        let path = dir.join(name);
        match OpenOptions::new().write(true).create_new(true).open(&path).await {
            Ok(file) => return Ok((path, file)),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => attempt += 1,
            Err(err) => return Err(err),
        }
    }
}

async fn write_field(mut field: Field<'_>, mut file: File) -> Result<u64> {
    let mut written = 0u64;
    while let Some(chunk) = field.chunk().await.map_err(upload_error)? {
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    Ok(written)
}

fn upload_error(err: axum::extract::multipart::MultipartError) -> StitchflowError {
    StitchflowError::Upload(err.body_text())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_create_unique_avoids_collisions() {
        let dir = TempDir::new().unwrap();
        let (first, _) = create_unique(dir.path(), "a.jpg").await.unwrap();
        std::fs::write(&first, b"x").unwrap();

        let mut seen = vec![first];
        for _ in 0..3 {
            let (path, _) = create_unique(dir.path(), "a.jpg").await.unwrap();
            assert!(!seen.contains(&path));
            assert!(path.to_string_lossy().ends_with("a.jpg"));
            seen.push(path);
        }
    }

    #[tokio::test]
    async fn test_create_unique_sanitises_name() {
        let dir = TempDir::new().unwrap();
        let (path, _) = create_unique(dir.path(), "../evil name.jpg").await.unwrap();
        assert_eq!(path.parent(), Some(dir.path()));
        assert!(path.file_name().unwrap().to_string_lossy().ends_with("-evil_name.jpg"));
    }
}
