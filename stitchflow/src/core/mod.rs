//! Core domain model types for stitchflow.
//!
//! This module contains the values that flow through one stitch request:
//! - The upload batch handed over by the upload layer
//! - The classified outcome of the stitcher subprocess
//! - The artifact roles and the artifact snapshot read after a successful run

mod artifact;
mod batch;
mod outcome;

pub use artifact::{ArtifactPlan, ArtifactRole, StitchArtifacts};
pub use batch::{StagedFile, UploadBatch};
pub use outcome::{
    CompletedRun, FailureKind, ProcessFailure, ProcessOutcome, LAUNCH_FAILURE_EXIT_CODE,
    TIMEOUT_EXIT_CODE,
};
