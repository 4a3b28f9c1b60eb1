//! Reads the stitcher's output images after a successful run.

use crate::core::{ArtifactPlan, ArtifactRole, CompletedRun, StitchArtifacts};
use crate::errors::{Result, StitchflowError};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Loads the artifacts named by an [`ArtifactPlan`] from an output directory.
#[derive(Debug, Clone)]
pub struct ResultAssembler {
    output_dir: PathBuf,
    plan: ArtifactPlan,
}

impl ResultAssembler {
    /// Creates an assembler reading `plan` from `output_dir`.
    #[must_use]
    pub fn new(output_dir: impl Into<PathBuf>, plan: ArtifactPlan) -> Self {
        Self {
            output_dir: output_dir.into(),
            plan,
        }
    }

    /// Directory artifacts are read from.
    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Where `role`'s image is expected.
    #[must_use]
    pub fn artifact_path(&self, role: ArtifactRole) -> PathBuf {
        self.output_dir.join(role.file_name())
    }

    /// Reads every artifact in the plan.
    ///
    /// Taking the [`CompletedRun`] ties the snapshot to a run that exited
    /// with code 0.
    ///
    /// # Errors
    ///
    /// [`StitchflowError::ArtifactReadFailure`] for the first required
    /// artifact that is missing or unreadable. Optional artifacts that cannot
    /// be read are left out of the snapshot.
    pub async fn assemble(&self, run: &CompletedRun) -> Result<StitchArtifacts> {
        let mut artifacts = StitchArtifacts::for_run(run);

        for &role in self.plan.required() {
            let path = self.artifact_path(role);
            let bytes = tokio::fs::read(&path)
                .await
                .map_err(|source| StitchflowError::ArtifactReadFailure { role, path, source })?;
            artifacts.insert(role, bytes);
        }

        for &role in self.plan.optional() {
            let path = self.artifact_path(role);
            match tokio::fs::read(&path).await {
                Ok(bytes) => artifacts.insert(role, bytes),
                Err(err) if err.kind() == ErrorKind::NotFound => {
                    debug!(%role, "optional artifact not produced");
                }
                Err(err) => {
                    warn!(%role, path = %path.display(), error = %err, "failed to read optional artifact");
                }
            }
        }

        debug!(
            artifacts = artifacts.len(),
            bytes = artifacts.total_bytes(),
            "artifacts loaded"
        );
        Ok(artifacts)
    }
}
