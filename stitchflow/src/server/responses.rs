//! JSON response bodies for both response variants.

use crate::config::ResponseVariant;
use crate::core::{ArtifactRole, StitchArtifacts};
use crate::errors::{FailureDetails, StitchflowError};
use crate::utils::iso_timestamp;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// Message attached to every successful stitch.
pub const SUCCESS_MESSAGE: &str = "Panorama stitched successfully";

/// Message attached to full-variant failures.
pub const FAILURE_MESSAGE: &str = "Panorama stitching failed";

/// Message returned by the liveness route.
pub const LIVENESS_MESSAGE: &str = "Server is running and connected";

/// Minimal variant success: the composite only.
#[derive(Debug, Serialize)]
pub struct MinimalSuccess {
    /// Always [`SUCCESS_MESSAGE`].
    pub message: &'static str,
    /// Base64 composite.
    pub data: String,
}

/// Full variant success: the composite and every face that was read.
#[derive(Debug, Serialize)]
pub struct FullSuccess {
    /// Always `"success"`.
    pub result: &'static str,
    /// Always [`SUCCESS_MESSAGE`].
    pub message: &'static str,
    /// Base64 composite.
    pub panorama: String,
    /// Base64 left face.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub left: Option<String>,
    /// Base64 right face.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub right: Option<String>,
    /// Base64 top face.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top: Option<String>,
    /// Base64 bottom face.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bottom: Option<String>,
    /// Base64 front face.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub front: Option<String>,
    /// Base64 back face.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub back: Option<String>,
}

impl FullSuccess {
    fn from_artifacts(artifacts: &StitchArtifacts) -> Self {
        Self {
            result: "success",
            message: SUCCESS_MESSAGE,
            panorama: artifacts.encoded(ArtifactRole::Panorama).unwrap_or_default(),
            left: artifacts.encoded(ArtifactRole::Left),
            right: artifacts.encoded(ArtifactRole::Right),
            top: artifacts.encoded(ArtifactRole::Top),
            bottom: artifacts.encoded(ArtifactRole::Bottom),
            front: artifacts.encoded(ArtifactRole::Front),
            back: artifacts.encoded(ArtifactRole::Back),
        }
    }
}

/// Failure body shared by both variants; `details` only in the full one.
#[derive(Debug, Serialize)]
pub struct FailureBody {
    /// Always `"failed"`.
    pub result: &'static str,
    /// Summary line.
    pub message: String,
    /// Classified reason.
    pub reason: String,
    /// Raw process diagnostics.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<FailureDetails>,
}

/// Liveness body.
#[derive(Debug, Serialize)]
pub struct LivenessBody {
    /// Always `"success"`.
    pub status: &'static str,
    /// Always [`LIVENESS_MESSAGE`].
    pub message: &'static str,
    /// RFC 3339 UTC time of the response.
    pub timestamp: String,
}

impl LivenessBody {
    /// Builds the body for the current instant.
    #[must_use]
    pub fn now() -> Self {
        Self {
            status: "success",
            message: LIVENESS_MESSAGE,
            timestamp: iso_timestamp(),
        }
    }
}

/// Acknowledgement for the single-file route.
#[derive(Debug, Serialize)]
pub struct UploadAck {
    /// `"success"` or `"failed"`.
    pub result: &'static str,
}

/// Renders a successful stitch.
#[must_use]
pub fn success_response(variant: ResponseVariant, artifacts: &StitchArtifacts) -> Response {
    match variant {
        ResponseVariant::Minimal => Json(MinimalSuccess {
            message: SUCCESS_MESSAGE,
            data: artifacts.encoded(ArtifactRole::Panorama).unwrap_or_default(),
        })
        .into_response(),
        ResponseVariant::Full => Json(FullSuccess::from_artifacts(artifacts)).into_response(),
    }
}

/// Renders a failed request.
#[must_use]
pub fn failure_response(variant: ResponseVariant, err: &StitchflowError) -> Response {
    let reason = err.reason();
    let body = match variant {
        ResponseVariant::Minimal => FailureBody {
            result: "failed",
            message: reason.clone(),
            reason,
            details: None,
        },
        ResponseVariant::Full => FailureBody {
            result: "failed",
            message: if err.is_client_error() {
                reason.clone()
            } else {
                FAILURE_MESSAGE.to_string()
            },
            reason,
            details: err.details(),
        },
    };
    (failure_status(variant, err), Json(body)).into_response()
}

/// HTTP status for a failure.
///
/// Client errors are 400 and host errors 500 in both variants. Pipeline
/// failures are 400 in the full variant and 200 in the minimal one.
#[must_use]
pub fn failure_status(variant: ResponseVariant, err: &StitchflowError) -> StatusCode {
    if err.is_client_error() {
        return StatusCode::BAD_REQUEST;
    }
    match (err, variant) {
        (StitchflowError::Io(_) | StitchflowError::Config(_), _) => StatusCode::INTERNAL_SERVER_ERROR,
        (_, ResponseVariant::Minimal) => StatusCode::OK,
        (_, ResponseVariant::Full) => StatusCode::BAD_REQUEST,
    }
}
