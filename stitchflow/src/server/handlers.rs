//! Route handlers.

use super::responses::{failure_response, success_response, LivenessBody, UploadAck};
use super::upload::stage_uploads;
use super::AppState;
use crate::core::UploadBatch;
use crate::errors::StitchflowError;
use crate::pipeline::discard_request;
use crate::utils::RequestId;
use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::{info, warn};

/// Multipart field carrying the batch.
pub const BATCH_FIELD: &str = "files";

/// Multipart field carrying the single connectivity-check file.
pub const SINGLE_FIELD: &str = "file";

/// `POST /upload`: stage the batch, run the pipeline, render the result.
///
/// The response is held until the stitcher has finished.
pub async fn upload_batch(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let pipeline = &state.pipeline;
    let variant = pipeline.config().variant;
    let request_id = RequestId::new();
    let dirs = pipeline.request_dirs(request_id);

    let Ok(mut multipart) = multipart else {
        return failure_response(variant, &StitchflowError::UploadMissing);
    };
    if let Err(err) = dirs.create_upload_dir().await {
        warn!(error = %err, "failed to create upload directory");
        return failure_response(variant, &err.into());
    }

    let mut batch = UploadBatch::new(request_id, dirs.upload_dir());
    let max_files = pipeline.config().max_files;
    if let Err(err) = stage_uploads(&mut multipart, BATCH_FIELD, max_files, &mut batch).await {
        warn!(%request_id, error = %err, "failed to store uploads");
        discard_request(&dirs, &batch).await;
        return failure_response(variant, &err);
    }
    info!(%request_id, files = batch.len(), "received upload request");

    match pipeline.process(batch).await {
        Ok(artifacts) => success_response(variant, &artifacts),
        Err(err) => failure_response(variant, &err),
    }
}

/// `POST /upload/single`: store one file and acknowledge it, nothing else.
pub async fn upload_single(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let failed = (StatusCode::BAD_REQUEST, Json(UploadAck { result: "failed" }));
    let Ok(mut multipart) = multipart else {
        return failed.into_response();
    };

    let request_id = RequestId::new();
    let dirs = state.pipeline.request_dirs(request_id);
    if let Err(err) = dirs.create_upload_dir().await {
        warn!(error = %err, "failed to create upload directory");
        return failed.into_response();
    }

    let mut batch = UploadBatch::new(request_id, dirs.upload_dir());
    match stage_uploads(&mut multipart, SINGLE_FIELD, 1, &mut batch).await {
        Ok(()) if !batch.is_empty() => {
            info!(%request_id, name = %batch.files()[0].original_name, "single file received");
            Json(UploadAck { result: "success" }).into_response()
        }
        Ok(()) => {
            discard_request(&dirs, &batch).await;
            failed.into_response()
        }
        Err(err) => {
            warn!(%request_id, error = %err, "single upload failed");
            discard_request(&dirs, &batch).await;
            failed.into_response()
        }
    }
}

/// `GET /test`: liveness.
pub async fn liveness() -> Json<LivenessBody> {
    Json(LivenessBody::now())
}
