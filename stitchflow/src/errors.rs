//! Error types for stitchflow.
//!
//! Every failure a stitch request can run into is a variant of
//! [`StitchflowError`]. None of them is fatal to the server: the HTTP layer
//! turns each one into a structured JSON failure response.

use crate::core::{ArtifactRole, ProcessFailure};
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Convenience result alias.
pub type Result<T, E = StitchflowError> = std::result::Result<T, E>;

/// The main error type for stitchflow operations.
#[derive(Debug, Error)]
pub enum StitchflowError {
    /// The request carried no files.
    #[error("No files were uploaded.")]
    UploadMissing,

    /// Uploaded files never became non-empty within the bound.
    #[error("Timeout waiting for files to be written ({waited_ms} ms, {} pending)", .pending.len())]
    StabilityTimeout {
        /// How long the watcher polled.
        waited_ms: u64,
        /// Paths still missing or empty at the last probe.
        pending: Vec<PathBuf>,
    },

    /// The stitcher executable could not be started.
    #[error("{0}")]
    ProcessLaunchFailure(ProcessFailure),

    /// The stitcher exited with a non-zero code.
    #[error("{0}")]
    ProcessExitFailure(ProcessFailure),

    /// The stitcher ran past its wait bound and was killed.
    #[error("{0}")]
    ProcessTimeout(ProcessFailure),

    /// An expected output image is missing or unreadable.
    #[error("Failed to read {role} artifact at {}: {source}", .path.display())]
    ArtifactReadFailure {
        /// Which artifact.
        role: ArtifactRole,
        /// Where it was expected.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Storing an upload failed, or the multipart body was malformed.
    #[error("Upload error: {0}")]
    Upload(String),

    /// A configuration error.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Diagnostic detail attached to process failures in the full response variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureDetails {
    /// Exit code or sentinel.
    pub code: i32,
    /// Raw stdout.
    pub stdout: String,
    /// Raw stderr.
    pub stderr: String,
}

impl StitchflowError {
    /// Wraps a process failure in the variant matching its kind.
    #[must_use]
    pub fn from_process(failure: ProcessFailure) -> Self {
        use crate::core::FailureKind;
        match failure.kind {
            FailureKind::Launch => Self::ProcessLaunchFailure(failure),
            FailureKind::Exit => Self::ProcessExitFailure(failure),
            FailureKind::Timeout => Self::ProcessTimeout(failure),
        }
    }

    /// Stable machine-readable code for the error class.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::UploadMissing => "upload_missing",
            Self::StabilityTimeout { .. } => "stability_timeout",
            Self::ProcessLaunchFailure(_) => "process_launch_failure",
            Self::ProcessExitFailure(_) => "process_exit_failure",
            Self::ProcessTimeout(_) => "process_timeout",
            Self::ArtifactReadFailure { .. } => "artifact_read_failure",
            Self::Upload(_) => "upload_error",
            Self::Config(_) => "config_error",
            Self::Io(_) => "io_error",
        }
    }

    /// Human-readable reason for the JSON `reason` field.
    ///
    /// Process failures report the classifier's reason verbatim.
    #[must_use]
    pub fn reason(&self) -> String {
        match self.process_failure() {
            Some(failure) => failure.reason.clone(),
            None => self.to_string(),
        }
    }

    /// The attached process failure, if any.
    #[must_use]
    pub const fn process_failure(&self) -> Option<&ProcessFailure> {
        match self {
            Self::ProcessLaunchFailure(f) | Self::ProcessExitFailure(f) | Self::ProcessTimeout(f) => {
                Some(f)
            }
            _ => None,
        }
    }

    /// `{code, stdout, stderr}` for process failures.
    #[must_use]
    pub fn details(&self) -> Option<FailureDetails> {
        self.process_failure().map(|f| FailureDetails {
            code: f.exit_code,
            stdout: f.stdout.clone(),
            stderr: f.stderr.clone(),
        })
    }

    /// Returns true for errors caused by the client's request rather than
    /// by the stitcher or the host.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(self, Self::UploadMissing | Self::Upload(_))
    }
}

/// Error raised while loading or validating configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment variable held a value of the wrong shape.
    #[error("Invalid value for {var}: '{value}' is not {expected}")]
    InvalidValue {
        /// Variable name.
        var: String,
        /// Offending value.
        value: String,
        /// What was expected.
        expected: String,
    },

    /// A loaded configuration is unusable.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl ConfigError {
    /// Creates an invalid-value error.
    #[must_use]
    pub fn invalid_value(
        var: impl Into<String>,
        value: impl Into<String>,
        expected: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            var: var.into(),
            value: value.into(),
            expected: expected.into(),
        }
    }
}
