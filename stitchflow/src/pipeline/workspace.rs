//! Per-request staging and output directories.

use crate::config::{RetentionPolicy, StitchConfig};
use crate::core::{ArtifactRole, UploadBatch};
use crate::utils::RequestId;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// The directories one request reads from and writes to.
///
/// With isolation enabled each request gets `<root>/<request_id>/` under both
/// the upload and the output root. Without it every request shares the roots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestDirs {
    upload_dir: PathBuf,
    output_dir: PathBuf,
    isolated: bool,
}

impl RequestDirs {
    /// Resolves the directories for `request_id`.
    #[must_use]
    pub fn resolve(config: &StitchConfig, request_id: RequestId) -> Self {
        if config.isolate_requests {
            let leaf = request_id.to_string();
            Self {
                upload_dir: config.upload_dir.join(&leaf),
                output_dir: config.output_dir.join(&leaf),
                isolated: true,
            }
        } else {
            Self {
                upload_dir: config.upload_dir.clone(),
                output_dir: config.output_dir.clone(),
                isolated: false,
            }
        }
    }

    /// Where uploads are staged.
    #[must_use]
    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    /// Where the stitcher writes its images.
    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Whether the directories belong to this request alone.
    #[must_use]
    pub const fn is_isolated(&self) -> bool {
        self.isolated
    }

    /// Creates the upload directory.
    pub async fn create_upload_dir(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.upload_dir).await
    }

    /// Creates the output directory.
    pub async fn create_output_dir(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.output_dir).await
    }
}

/// Removes artifact files left in `output_dir` by an earlier run.
///
/// Must be called while holding the directory's lock.
pub(crate) async fn clear_stale_artifacts(output_dir: &Path) -> std::io::Result<()> {
    for role in ArtifactRole::ALL {
        match tokio::fs::remove_file(output_dir.join(role.file_name())).await {
            Ok(()) => debug!(%role, "removed stale artifact"),
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => return Err(err),
        }
    }
    Ok(())
}

/// Applies the retention policy once a request's response has been built.
///
/// Cleanup failures are logged and otherwise ignored.
pub(crate) async fn apply_retention(policy: RetentionPolicy, dirs: &RequestDirs, batch: &UploadBatch) {
    if policy == RetentionPolicy::Delete {
        discard_request(dirs, batch).await;
    }
}

/// Removes everything a request left on disk.
///
/// Isolated requests lose both of their directories; in shared roots only
/// the batch's own files are removed.
pub(crate) async fn discard_request(dirs: &RequestDirs, batch: &UploadBatch) {
    if dirs.is_isolated() {
        for dir in [dirs.upload_dir(), dirs.output_dir()] {
            if let Err(err) = tokio::fs::remove_dir_all(dir).await {
                if err.kind() != ErrorKind::NotFound {
                    warn!(dir = %dir.display(), error = %err, "failed to remove request directory");
                }
            }
        }
        return;
    }

    for file in batch.files() {
        if let Err(err) = tokio::fs::remove_file(&file.path).await {
            if err.kind() != ErrorKind::NotFound {
                warn!(path = %file.path.display(), error = %err, "failed to remove upload");
            }
        }
    }
}
