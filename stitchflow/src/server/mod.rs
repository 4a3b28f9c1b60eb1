//! HTTP surface.
//!
//! Three routes:
//! - `POST /upload` runs the whole pipeline on a multipart batch (`files`)
//! - `POST /upload/single` stores one file (`file`) and acknowledges it
//! - `GET /test` reports liveness
//!
//! Every pipeline error becomes a JSON failure body; no request can take
//! the server down.

mod handlers;
pub mod responses;
mod upload;

pub use handlers::{BATCH_FIELD, SINGLE_FIELD};
pub use upload::stage_uploads;

use crate::pipeline::StitchPipeline;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// State shared by all handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    pipeline: StitchPipeline,
}

impl AppState {
    /// Wraps a pipeline.
    #[must_use]
    pub const fn new(pipeline: StitchPipeline) -> Self {
        Self { pipeline }
    }
}

/// Builds the router with tracing and the configured body limit.
pub fn build_router(pipeline: StitchPipeline) -> Router {
    let body_limit = pipeline.config().max_body_bytes;
    Router::new()
        .route("/upload", post(handlers::upload_batch))
        .route("/upload/single", post(handlers::upload_single))
        .route("/test", get(handlers::liveness))
        .with_state(AppState::new(pipeline))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(DefaultBodyLimit::disable())
                .layer(RequestBodyLimitLayer::new(body_limit)),
        )
}

/// Serves `router` on `listener` until Ctrl-C.
pub async fn serve(listener: TcpListener, router: Router) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("Server is running on http://{addr}");
    }
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutdown signal received");
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::config::{ResponseVariant, StitchConfig};
    use anyhow::Result;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use http_body_util::BodyExt;
    use pretty_assertions::assert_eq;
    use serde_json::Value;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;
    use tower::ServiceExt;

    const BOUNDARY: &str = "stitchflow-test-boundary";

    /// Concatenates the inputs into the composite and writes each face.
    const FAKE_STITCHER: &str = r#"#!/bin/sh
touch "$STITCH_OUTPUT_DIR/../launched"
cat "$STITCH_INPUT_DIR"/* > "$STITCH_OUTPUT_DIR/panorama.jpg"
for face in left right top bottom front back; do
  printf '%s' "$face" > "$STITCH_OUTPUT_DIR/panorama_$face.jpg"
done
echo '{"result": "success"}'
"#;

    const FAILING_STITCHER: &str = r#"#!/bin/sh
echo 'loading images'
echo '{"result": "error", "reason": "Not enough keypoints"}'
echo 'traceback' >&2
exit 1
"#;

    struct TestApp {
        root: TempDir,
        config: StitchConfig,
    }

    impl TestApp {
        fn new(script: &str) -> Self {
            let root = TempDir::new().unwrap();
            let script_path = root.path().join("stitcher.sh");
            std::fs::write(&script_path, script).unwrap();
            let config = StitchConfig::new()
                .with_upload_dir(root.path().join("unconverted"))
                .with_output_dir(root.path().join("output"))
                .with_command("/bin/sh", Some(script_path))
                .with_stability_timeout_ms(500)
                .with_process_timeout_ms(10_000);
            Self { root, config }
        }

        fn router(&self) -> Router {
            build_router(StitchPipeline::new(self.config.clone()))
        }

        fn path(&self, rel: &str) -> PathBuf {
            self.root.path().join(rel)
        }

        /// Per-request directories created under `rel`.
        fn request_dirs(&self, rel: &str) -> Result<Vec<PathBuf>> {
            let mut dirs = Vec::new();
            for entry in std::fs::read_dir(self.path(rel))? {
                let path = entry?.path();
                if path.is_dir() {
                    dirs.push(path);
                }
            }
            Ok(dirs)
        }
    }

    fn multipart(field: &str, files: &[(&str, &[u8])]) -> Body {
        let mut body = Vec::new();
        for (name, bytes) in files {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{name}\"\r\nContent-Type: image/jpeg\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(bytes);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        Body::from(body)
    }

    fn post(uri: &str, body: Body) -> Result<Request<Body>> {
        Ok(Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(body)?)
    }

    async fn read_json(response: axum::response::Response) -> Result<Value> {
        let bytes = response.into_body().collect().await?.to_bytes();
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn decoded_len(value: &Value) -> usize {
        STANDARD
            .decode(value.as_str().unwrap_or_default())
            .map(|b| b.len())
            .unwrap_or(usize::MAX)
    }

    fn file_len(path: &Path) -> usize {
        usize::try_from(std::fs::metadata(path).unwrap().len()).unwrap()
    }

    fn three_images() -> Vec<(&'static str, &'static [u8])> {
        vec![
            ("left.jpg", &b"\xFF\xD8left"[..]),
            ("middle.jpg", &b"\xFF\xD8middle"[..]),
            ("right.jpg", &b"\xFF\xD8right"[..]),
        ]
    }

    #[tokio::test]
    async fn test_liveness_route() -> Result<()> {
        let app = TestApp::new(FAKE_STITCHER);
        let request = Request::builder().uri("/test").body(Body::empty())?;
        let response = app.router().oneshot(request).await?;

        assert_eq!(response.status(), StatusCode::OK);
        let body = read_json(response).await?;
        assert_eq!(body["status"], "success");
        assert_eq!(body["message"], "Server is running and connected");
        assert!(chrono::DateTime::parse_from_rfc3339(body["timestamp"].as_str().unwrap_or("")).is_ok());
        Ok(())
    }

    #[tokio::test]
    async fn test_full_variant_end_to_end() -> Result<()> {
        let app = TestApp::new(FAKE_STITCHER);
        let response = app
            .router()
            .oneshot(post("/upload", multipart(BATCH_FIELD, &three_images()))?)
            .await?;

        assert_eq!(response.status(), StatusCode::OK);
        let body = read_json(response).await?;
        assert_eq!(body["result"], "success");
        assert_eq!(body["message"], "Panorama stitched successfully");
        let output = app.request_dirs("output")?;
        assert_eq!(output.len(), 1);
        assert_eq!(decoded_len(&body["panorama"]), file_len(&output[0].join("panorama.jpg")));
        for face in ["left", "right", "top", "bottom", "front", "back"] {
            assert_eq!(STANDARD.decode(body[face].as_str().unwrap_or(""))?, face.as_bytes());
        }

        let uploads = app.request_dirs("unconverted")?;
        assert_eq!(uploads.len(), 1);
        let staged: Vec<String> = std::fs::read_dir(&uploads[0])?
            .map(|e| e.map(|e| e.file_name().to_string_lossy().into_owned()))
            .collect::<std::io::Result<_>>()?;
        assert_eq!(staged.len(), 3);
        assert!(staged.iter().any(|n| n.ends_with("-middle.jpg")));
        Ok(())
    }

    #[tokio::test]
    async fn test_minimal_variant_end_to_end() -> Result<()> {
        let mut app = TestApp::new(FAKE_STITCHER);
        app.config = app.config.clone().with_variant(ResponseVariant::Minimal);
        let response = app
            .router()
            .oneshot(post("/upload", multipart(BATCH_FIELD, &three_images()))?)
            .await?;

        assert_eq!(response.status(), StatusCode::OK);
        let body = read_json(response).await?;
        assert_eq!(body["message"], "Panorama stitched successfully");
        assert!(body.get("result").is_none());
        let expected: usize = three_images().iter().map(|(_, b)| b.len()).sum();
        assert_eq!(decoded_len(&body["data"]), expected);
        let output = app.request_dirs("output")?;
        assert_eq!(decoded_len(&body["data"]), file_len(&output[0].join("panorama.jpg")));
        Ok(())
    }

    #[tokio::test]
    async fn test_zero_files_is_rejected_without_launch() -> Result<()> {
        let app = TestApp::new(FAKE_STITCHER);
        let response = app.router().oneshot(post("/upload", multipart(BATCH_FIELD, &[]))?).await?;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = read_json(response).await?;
        assert_eq!(body["result"], "failed");
        assert_eq!(body["reason"], "No files were uploaded.");
        assert!(!app.path("output/launched").exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_multipart_body_is_rejected() -> Result<()> {
        let app = TestApp::new(FAKE_STITCHER);
        let request = Request::builder()
            .method("POST")
            .uri("/upload")
            .body(Body::empty())?;
        let response = app.router().oneshot(request).await?;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(read_json(response).await?["reason"], "No files were uploaded.");
        Ok(())
    }

    #[tokio::test]
    async fn test_too_many_files() -> Result<()> {
        let mut app = TestApp::new(FAKE_STITCHER);
        app.config = app.config.clone().with_max_files(2);
        let response = app
            .router()
            .oneshot(post("/upload", multipart(BATCH_FIELD, &three_images()))?)
            .await?;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = read_json(response).await?;
        assert!(body["reason"].as_str().unwrap_or("").contains("Too many files"));
        assert!(!app.path("output/launched").exists());
        assert!(app.request_dirs("unconverted")?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_sequential_requests_stitch_only_their_own_uploads() -> Result<()> {
        let app = TestApp::new(FAKE_STITCHER);
        let router = app.router();

        let first = router
            .clone()
            .oneshot(post("/upload", multipart(BATCH_FIELD, &three_images()))?)
            .await?;
        assert_eq!(first.status(), StatusCode::OK);

        let solo: &[u8] = b"\xFF\xD8solo";
        let second = router
            .oneshot(post("/upload", multipart(BATCH_FIELD, &[("solo.jpg", solo)]))?)
            .await?;
        assert_eq!(second.status(), StatusCode::OK);
        let body = read_json(second).await?;
        assert_eq!(STANDARD.decode(body["panorama"].as_str().unwrap_or(""))?, solo);
        Ok(())
    }

    #[tokio::test]
    async fn test_full_variant_failure_carries_details() -> Result<()> {
        let app = TestApp::new(FAILING_STITCHER);
        let response = app
            .router()
            .oneshot(post("/upload", multipart(BATCH_FIELD, &three_images()))?)
            .await?;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = read_json(response).await?;
        assert_eq!(body["result"], "failed");
        assert_eq!(body["reason"], "Not enough keypoints");
        assert_eq!(body["details"]["code"], 1);
        assert!(body["details"]["stdout"].as_str().unwrap_or("").contains("loading images"));
        assert_eq!(body["details"]["stderr"], "traceback\n");
        Ok(())
    }

    #[tokio::test]
    async fn test_minimal_variant_failure_hides_output() -> Result<()> {
        let mut app = TestApp::new(FAILING_STITCHER);
        app.config = app.config.clone().with_variant(ResponseVariant::Minimal);
        let response = app
            .router()
            .oneshot(post("/upload", multipart(BATCH_FIELD, &three_images()))?)
            .await?;

        assert_eq!(response.status(), StatusCode::OK);
        let body = read_json(response).await?;
        assert_eq!(
            body,
            serde_json::json!({
                "result": "failed",
                "message": "Not enough keypoints",
                "reason": "Not enough keypoints",
            })
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_server_keeps_serving_after_failure() -> Result<()> {
        let app = TestApp::new(FAILING_STITCHER);
        let router = app.router();

        let failed = router
            .clone()
            .oneshot(post("/upload", multipart(BATCH_FIELD, &three_images()))?)
            .await?;
        assert_eq!(failed.status(), StatusCode::BAD_REQUEST);

        let request = Request::builder().uri("/test").body(Body::empty())?;
        let alive = router.oneshot(request).await?;
        assert_eq!(alive.status(), StatusCode::OK);
        Ok(())
    }

    #[tokio::test]
    async fn test_single_upload_route() -> Result<()> {
        let app = TestApp::new(FAKE_STITCHER);
        let router = app.router();

        let response = router
            .clone()
            .oneshot(post("/upload/single", multipart(SINGLE_FIELD, &[("probe.jpg", &b"x"[..])]))?)
            .await?;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(read_json(response).await?, serde_json::json!({"result": "success"}));
        assert!(!app.path("output/launched").exists());

        let response = router
            .oneshot(post("/upload/single", multipart(SINGLE_FIELD, &[]))?)
            .await?;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(read_json(response).await?, serde_json::json!({"result": "failed"}));
        Ok(())
    }
}
