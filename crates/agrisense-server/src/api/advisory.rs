//! Pest detection endpoint

use axum::{
    extract::{Multipart, Request, State},
    http::header,
    Json, RequestExt,
};
use serde::Serialize;
use std::time::Duration;
use tracing::{error, info};

use crate::error::ApiError;
use crate::state::AppState;
use agrisense_core::{
    Error as CoreError, ImagePayload, InferenceRequest, InferenceResult,
};

/// Pest detection response
#[derive(Debug, Serialize)]
pub struct PestDetectResponse {
    pub success: bool,
    pub pest: String,
    pub confidence: f64,
}

/// Detect a pest from an uploaded photograph.
pub async fn pest_detect(
    State(state): State<AppState>,
    req: Request,
) -> Result<Json<PestDetectResponse>, ApiError> {
    let image = parse_pest_request(req)
        .await?
        .ok_or_else(|| ApiError::bad_request("Image file missing"))?;

    info!(bytes = image.len(), file_name = ?image.file_name(), "pest detection request");

    // Acquire permit for concurrency limiting (backpressure)
    let _permit = state.acquire_permit().await;

    let timeout = Duration::from_secs(state.request_timeout_secs);
    let result = tokio::time::timeout(
        timeout,
        state
            .orchestrator
            .handle(InferenceRequest::PestImage(image)),
    )
    .await
    .map_err(|_| ApiError::internal("Request timeout"))?
    .map_err(|err| match err {
        CoreError::Validation(v) => ApiError::from(v),
        other => {
            error!(error = ?other, "pest detection failed");
            ApiError::internal("Backend failed").with_details(other.to_string())
        }
    })?;

    match result {
        InferenceResult::Pest { pest, confidence } => Ok(Json(PestDetectResponse {
            success: true,
            pest,
            confidence,
        })),
        InferenceResult::Crop { .. } => {
            Err(ApiError::internal("Unexpected result kind for pest request"))
        }
    }
}

/// Pull the uploaded image out of the multipart body, spooling it to a
/// temporary file. Returns `None` when the request carried no usable image
/// so the caller can answer with the canonical 400.
async fn parse_pest_request(req: Request) -> Result<Option<ImagePayload>, ApiError> {
    let content_type = req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase();

    if !content_type.starts_with("multipart/form-data") {
        return Ok(None);
    }

    let mut multipart = req
        .extract::<Multipart, _>()
        .await
        .map_err(|e| ApiError::bad_request(format!("Invalid multipart payload: {e}")))?;

    let mut image = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Failed reading multipart field: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "image" | "file" => {
                let file_name = field.file_name().map(|s| s.to_string());
                let bytes = field.bytes().await.map_err(|e| {
                    ApiError::bad_request(format!("Failed reading multipart '{name}' field: {e}"))
                })?;
                if !bytes.is_empty() {
                    image = Some(spool_upload(bytes.to_vec(), file_name).await?);
                }
            }
            _ => {}
        }
    }

    Ok(image)
}

/// Write the upload to a temp file off the async runtime.
async fn spool_upload(
    bytes: Vec<u8>,
    file_name: Option<String>,
) -> Result<ImagePayload, ApiError> {
    tokio::task::spawn_blocking(move || ImagePayload::from_bytes(&bytes, file_name))
        .await
        .map_err(|e| ApiError::internal(format!("Upload spool task failed: {e}")))?
        .map_err(|e| ApiError::internal(format!("Failed to spool upload: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::StatusCode;
    use std::sync::Arc;
    use tower::ServiceExt;

    use agrisense_core::{
        CropTransport, HttpAdapter, Orchestrator, ProcessAdapter, SledRecordStore,
    };

    const BOUNDARY: &str = "agrisense-upload-boundary";

    /// The full router over real wiring. The requests below fail validation,
    /// so neither backend is ever contacted.
    fn test_app() -> axum::Router {
        let orchestrator = Orchestrator::with_parts(
            Arc::new(ProcessAdapter::from_argv(
                "/bin/sh",
                vec!["-c".to_string(), "cat >/dev/null".to_string()],
            )),
            Arc::new(HttpAdapter::with_base_url("http://127.0.0.1:9")),
            Arc::new(SledRecordStore::temporary().unwrap()),
            CropTransport::Process,
        );
        crate::api::create_router(crate::state::AppState::new(orchestrator))
    }

    fn multipart_request(body: String) -> Request {
        axum::http::Request::builder()
            .method("POST")
            .uri("/advisory/pest-detect")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_pest_response_envelope_shape() {
        let response = PestDetectResponse {
            success: true,
            pest: "fall armyworm".into(),
            confidence: 93.4,
        };
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "success": true,
                "pest": "fall armyworm",
                "confidence": 93.4
            })
        );
    }

    #[tokio::test]
    async fn test_spool_upload_round_trips_bytes() {
        let image = spool_upload(b"fake-jpeg".to_vec(), Some("leaf.jpg".into()))
            .await
            .unwrap();
        assert_eq!(image.len(), 9);
        assert_eq!(image.file_name(), Some("leaf.jpg"));
        let on_disk = tokio::fs::read(image.path()).await.unwrap();
        assert_eq!(on_disk, b"fake-jpeg");
    }

    #[tokio::test]
    async fn test_non_multipart_request_is_image_missing() {
        let request = axum::http::Request::builder()
            .method("POST")
            .uri("/advisory/pest-detect")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{}"))
            .unwrap();

        let response = test_app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await,
            serde_json::json!({"success": false, "error": "Image file missing"})
        );
    }

    #[tokio::test]
    async fn test_multipart_without_image_part_is_image_missing() {
        let body = format!(
            "--{BOUNDARY}\r\n\
             Content-Disposition: form-data; name=\"note\"\r\n\r\n\
             no file attached\r\n\
             --{BOUNDARY}--\r\n"
        );
        let response = test_app().oneshot(multipart_request(body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await,
            serde_json::json!({"success": false, "error": "Image file missing"})
        );
    }

    #[tokio::test]
    async fn test_empty_image_part_is_image_missing() {
        let body = format!(
            "--{BOUNDARY}\r\n\
             Content-Disposition: form-data; name=\"image\"; filename=\"leaf.jpg\"\r\n\
             Content-Type: image/jpeg\r\n\r\n\
             \r\n\
             --{BOUNDARY}--\r\n"
        );
        let response = test_app().oneshot(multipart_request(body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await,
            serde_json::json!({"success": false, "error": "Image file missing"})
        );
    }
}
