//! Upload batch type.

use crate::utils::RequestId;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// One uploaded file after the upload layer placed it on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StagedFile {
    /// Filename as sent by the client.
    pub original_name: String,
    /// Where the file was written.
    pub path: PathBuf,
}

impl StagedFile {
    /// Creates a staged file entry.
    #[must_use]
    pub fn new(original_name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            original_name: original_name.into(),
            path: path.into(),
        }
    }
}

/// Ordered set of uploaded files belonging to one request.
///
/// The batch is owned by the request that created it. Order follows the
/// order in which the multipart parts arrived.
#[derive(Debug, Clone, Serialize)]
pub struct UploadBatch {
    request_id: RequestId,
    staging_dir: PathBuf,
    files: Vec<StagedFile>,
}

impl UploadBatch {
    /// Creates an empty batch staged under `staging_dir`.
    #[must_use]
    pub fn new(request_id: RequestId, staging_dir: impl Into<PathBuf>) -> Self {
        Self {
            request_id,
            staging_dir: staging_dir.into(),
            files: Vec::new(),
        }
    }

    /// Appends a file to the batch.
    pub fn push(&mut self, file: StagedFile) {
        self.files.push(file);
    }

    /// Adds a file, builder style.
    #[must_use]
    pub fn with_file(mut self, file: StagedFile) -> Self {
        self.push(file);
        self
    }

    /// Returns the id of the request that owns this batch.
    #[must_use]
    pub const fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Returns the directory the files were written to.
    #[must_use]
    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    /// Returns the staged files in arrival order.
    #[must_use]
    pub fn files(&self) -> &[StagedFile] {
        &self.files
    }

    /// Returns the on-disk paths in arrival order.
    #[must_use]
    pub fn paths(&self) -> Vec<PathBuf> {
        self.files.iter().map(|f| f.path.clone()).collect()
    }

    /// Returns the number of files.
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Returns true if no file was received.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_keeps_arrival_order() {
        let batch = UploadBatch::new(RequestId::new(), "/tmp/staging")
            .with_file(StagedFile::new("b.jpg", "/tmp/staging/2-b.jpg"))
            .with_file(StagedFile::new("a.jpg", "/tmp/staging/1-a.jpg"));

        assert_eq!(batch.len(), 2);
        assert!(!batch.is_empty());
        assert_eq!(
            batch.paths(),
            vec![
                PathBuf::from("/tmp/staging/2-b.jpg"),
                PathBuf::from("/tmp/staging/1-a.jpg")
            ]
        );
        assert_eq!(batch.files()[0].original_name, "b.jpg");
    }

    #[test]
    fn test_empty_batch() {
        let batch = UploadBatch::new(RequestId::new(), "/tmp/staging");
        assert!(batch.is_empty());
        assert_eq!(batch.staging_dir(), Path::new("/tmp/staging"));
    }
}
